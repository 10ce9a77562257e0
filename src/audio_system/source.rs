/// Audio resource kinds
///
/// BGM and SFX live in separate registries and caches, and route through
/// separate buses.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio resource categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Background music, at most one current track
    Bgm,

    /// Sound effects, any number playing at once
    Sfx,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Bgm => write!(f, "BGM"),
            ResourceKind::Sfx => write!(f, "SFX"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::Bgm.to_string(), "BGM");
        assert_eq!(ResourceKind::Sfx.to_string(), "SFX");
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&ResourceKind::Sfx).unwrap();
        assert_eq!(json, "\"sfx\"");
        let kind: ResourceKind = serde_json::from_str("\"bgm\"").unwrap();
        assert_eq!(kind, ResourceKind::Bgm);
    }
}
