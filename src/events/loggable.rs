use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs; drives retention and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Long-term retention, never auto-deleted (all RBAC mutations)
    Critical,
    /// Medium-term retention (default)
    #[default]
    Important,
    /// Aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Trait for entities that show up in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Entity type name, the prefix in event names like "role.created"
    fn entity_type() -> &'static str;

    /// The subject id (usually the entity's primary key)
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" => Severity::Critical,
            "created" | "updated" => self.severity(),
            _ => self.severity(),
        }
    }
}
