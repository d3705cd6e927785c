use std::fmt::{self, Write as _};
use std::io::IsTerminal;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::types::LogFormat;

/// Gate outcome a log line reports, inferred from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Deny,
    Allow,
}

impl Verdict {
    /// `None` for lines that are not about a gate decision.
    fn of(message: &str) -> Option<Self> {
        let msg = message.to_lowercase();
        // "unbanned" contains "banned"; lifting a ban is an allow
        if msg.contains("unbanned") || msg.contains("ban expired") {
            return Some(Verdict::Allow);
        }
        const DENY: [&str; 5] = [
            "denied",
            "rejected",
            "banned",
            "rate limit exceeded",
            "differs from issuance",
        ];
        if DENY.iter().any(|p| msg.contains(p)) {
            return Some(Verdict::Deny);
        }
        if msg.contains("session authorized") {
            return Some(Verdict::Allow);
        }
        None
    }

    fn tag(self, ansi: bool) -> &'static str {
        match (self, ansi) {
            (Verdict::Deny, true) => "\x1b[31m[DENY]\x1b[0m ",
            (Verdict::Deny, false) => "[DENY] ",
            (Verdict::Allow, true) => "\x1b[34m[ALLOW]\x1b[0m ",
            (Verdict::Allow, false) => "[ALLOW] ",
        }
    }
}

/// Pretty-mode formatter: tags gate decisions with [DENY]/[ALLOW] and,
/// on a terminal, colors the fields the gate logs with.
pub struct VerdictFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> VerdictFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for VerdictFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(verdict) = Verdict::of(&visitor.message) {
            writer.write_str(verdict.tag(self.ansi))?;
        }

        if !self.ansi {
            return self.inner.format_event(ctx, writer, event);
        }
        let mut buf = String::new();
        self.inner.format_event(ctx, Writer::new(&mut buf), event)?;
        writer.write_str(&colorize_fields(&buf))
    }
}

/// Field name -> ANSI color.
const FIELD_COLORS: &[(&str, &str)] = &[
    // who
    ("subject", "36"),
    ("client", "35"),
    ("addr", "35"),
    // where
    ("path", "33"),
    ("rule", "33"),
    // how much
    ("ban_secs", "32"),
    ("count", "32"),
    ("bans_removed", "32"),
    ("rate_records_removed", "32"),
    // why
    ("reason", "31"),
    ("status", "31"),
    ("error", "31"),
];

fn colorize_fields(line: &str) -> String {
    FIELD_COLORS
        .iter()
        .fold(line.to_string(), |acc, (field, color)| {
            let key = format!(" {field}=");
            if acc.contains(&key) {
                acc.replace(&key, &format!(" \x1b[{color}m{field}=\x1b[0m"))
            } else {
                acc
            }
        })
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Install the global subscriber. `level` is an `EnvFilter` directive;
/// an unparsable one falls back to `info`.
pub fn setup_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            tracing_subscriber::fmt()
                .event_format(VerdictFormatter::new(
                    tracing_subscriber::fmt::format::Format::default(),
                    ansi,
                ))
                .with_env_filter(filter)
                .init();
        }
    }
}
