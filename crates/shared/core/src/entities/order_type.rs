use serde::{Deserialize, Serialize};

/// Order kinds placed over the event pipes
///
/// Mid-price orders go through the command pipe and are not tracked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Execute at specified price or better
    Limit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Limit => "limit",
        }
    }
}
