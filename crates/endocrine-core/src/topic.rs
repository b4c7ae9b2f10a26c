//! Topic classification.
//!
//! Topics under `hormone/` and `definition/` belong to the managed namespace
//! and are checked by the dedicated access-control handlers. Everything else
//! is `Other`. Classification never looks at connection state.

/// Prefix of hormone topics.
pub const HORMONE_PREFIX: &str = "hormone/";
/// Prefix of hormone definition topics.
pub const DEFINITION_PREFIX: &str = "definition/";

const MANAGED_PREFIXES: [&str; 2] = [HORMONE_PREFIX, DEFINITION_PREFIX];

/// Result of classifying a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass<'a> {
    /// Managed namespace; `name` is the remainder after the prefix.
    Managed { name: &'a str },
    /// Any other topic.
    Other,
}

impl<'a> TopicClass<'a> {
    pub fn is_managed(&self) -> bool {
        matches!(self, TopicClass::Managed { .. })
    }

    /// Short label for metrics ("managed" / "other").
    pub fn label(&self) -> &'static str {
        match self {
            TopicClass::Managed { .. } => "managed",
            TopicClass::Other => "other",
        }
    }
}

/// Classify a topic. Total over all strings, single prefix scan.
pub fn classify(topic: &str) -> TopicClass<'_> {
    for prefix in MANAGED_PREFIXES {
        if let Some(name) = topic.strip_prefix(prefix) {
            return TopicClass::Managed { name };
        }
    }
    TopicClass::Other
}
