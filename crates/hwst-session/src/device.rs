//! Device identity reported by the agent's startup-info diagnostic.

use serde_json::Value;
use smol_str::SmolStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor: Option<SmolStr>,
    pub model: Option<SmolStr>,
    pub serial: Option<SmolStr>,
    pub rdk: Option<SmolStr>,
    pub agent_version: Option<SmolStr>,
}

impl DeviceInfo {
    /// Pick the known keys out of a startup-info log payload; `None` for non-objects.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let field = |key: &str| object.get(key).map(display_value);
        Some(Self {
            vendor: field("Vendor"),
            model: field("Model"),
            serial: field("Serial"),
            rdk: field("RDK"),
            agent_version: field("AgentVersion"),
        })
    }

    /// Labelled identity rows in display order, skipping absent ones.
    pub fn rows(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Vendor", &self.vendor),
            ("Model", &self.model),
            ("Serial", &self.serial),
            ("RDK", &self.rdk),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_deref().map(|value| (label, value)))
    }
}

/// Strings verbatim, everything else in its JSON form.
pub(crate) fn display_value(value: &Value) -> SmolStr {
    match value {
        Value::String(text) => SmolStr::new(text),
        other => SmolStr::new(other.to_string()),
    }
}
