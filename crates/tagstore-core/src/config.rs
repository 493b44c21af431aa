//! Tag persistence configuration.

/// Default number of junction rows per insert statement.
pub const DEFAULT_LINK_BATCH_SIZE: usize = 50;

/// Tuning knobs for saving tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConfig {
    /// Maximum junction rows inserted by a single statement.
    pub link_batch_size: usize,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            link_batch_size: DEFAULT_LINK_BATCH_SIZE,
        }
    }
}

impl TagConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            link_batch_size: parse_batch_size(std::env::var("TAGSTORE_LINK_BATCH_SIZE").ok()),
        }
    }

    pub fn with_link_batch_size(mut self, size: usize) -> Self {
        self.link_batch_size = size.max(1);
        self
    }
}

fn parse_batch_size(raw: Option<String>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LINK_BATCH_SIZE)
}
