use serde_json::Value;

/// What a scan matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threat {
    BadAgent,
    MaliciousPayload,
}

/// Stateless signature matcher for user agents and request bodies.
///
/// Matching is plain case-insensitive substring search. It catches the
/// usual scanners and injection probes, nothing more.
#[derive(Debug, Clone)]
pub struct ThreatScanner {
    bad_agents: Vec<String>,
    payload_signatures: Vec<String>,
}

impl ThreatScanner {
    pub fn new(bad_agents: &[String], payload_signatures: &[String]) -> Self {
        Self {
            bad_agents: lowercase_all(bad_agents),
            payload_signatures: lowercase_all(payload_signatures),
        }
    }

    pub fn scan_agent(&self, user_agent: &str) -> Option<Threat> {
        let ua = user_agent.to_lowercase();
        self.bad_agents
            .iter()
            .any(|sig| ua.contains(sig.as_str()))
            .then_some(Threat::BadAgent)
    }

    pub fn scan_payload(&self, body: &[u8]) -> Option<Threat> {
        if body.is_empty() || self.payload_signatures.is_empty() {
            return None;
        }
        let canonical = canonical_body(body);
        self.payload_signatures
            .iter()
            .any(|sig| canonical.contains(sig.as_str()))
            .then_some(Threat::MaliciousPayload)
    }
}

/// Lowercase text form of a body. JSON is re-serialized so escapes such as
/// `<script` are decoded and object keys are visible; anything else is
/// taken as (lossy) UTF-8.
pub fn canonical_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value.to_string().to_lowercase(),
        Err(_) => String::from_utf8_lossy(body).to_lowercase(),
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
