// src/profile.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display label used when no profile reference resolves to anything known.
pub const SYSTEM_SETTINGS_LABEL: &str = "Current system settings";

/// Reference to a profile: a well-known keyword or a user-defined GUID.
/// Resolution to an actual [`Profile`] happens fresh on every lookup and may
/// fail for an unknown GUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRef {
    Default,
    Battery,
    Balanced,
    Performance,
    System,
    User,
    Guid(String),
}

impl ProfileRef {
    /// The settings key this reference is stored under.
    pub fn key(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Battery => "battery",
            Self::Balanced => "balanced",
            Self::Performance => "performance",
            Self::System => "system",
            Self::User => "user",
            Self::Guid(guid) => guid,
        }
    }
}

impl From<&str> for ProfileRef {
    fn from(s: &str) -> Self {
        match s {
            "default" => Self::Default,
            "battery" => Self::Battery,
            "balanced" => Self::Balanced,
            "performance" => Self::Performance,
            "system" => Self::System,
            "user" => Self::User,
            guid => Self::Guid(guid.to_string()),
        }
    }
}

impl fmt::Display for ProfileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A named set of CPU frequency/governor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub guid: String,
    pub name: String,
    /// Scaling governor to apply. Empty means "hand control back to the
    /// driver defaults".
    #[serde(default)]
    pub governor: String,
    /// Frequency floor as a percentage of the hardware range.
    #[serde(default)]
    pub min_freq_pct: u8,
    /// Frequency ceiling as a percentage of the hardware range.
    #[serde(default = "full_range")]
    pub max_freq_pct: u8,
    #[serde(default = "turbo_on")]
    pub turbo: bool,
}

fn full_range() -> u8 {
    100
}

fn turbo_on() -> bool {
    true
}

impl Profile {
    /// The "leave the hardware alone" profile: driver defaults, full range.
    pub fn system() -> Self {
        Self {
            guid: "system".to_string(),
            name: SYSTEM_SETTINGS_LABEL.to_string(),
            governor: String::new(),
            min_freq_pct: 0,
            max_freq_pct: 100,
            turbo: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_parsing() {
        assert_eq!(ProfileRef::from("battery"), ProfileRef::Battery);
        assert_eq!(ProfileRef::from("balanced"), ProfileRef::Balanced);
        assert_eq!(ProfileRef::from("performance"), ProfileRef::Performance);
        assert_eq!(ProfileRef::from("system"), ProfileRef::System);
        assert_eq!(ProfileRef::from("default"), ProfileRef::Default);
        assert_eq!(ProfileRef::from("user"), ProfileRef::User);
    }

    #[test]
    fn test_unknown_keyword_is_a_guid() {
        let id = "4f1c2ab8-7c70-44a5-a904-0f0c0f30a1c9";
        assert_eq!(ProfileRef::from(id), ProfileRef::Guid(id.to_string()));
        assert_eq!(ProfileRef::from(id).key(), id);
    }

    #[test]
    fn test_key_round_trip() {
        for key in ["battery", "balanced", "performance", "system", "default", "user"] {
            assert_eq!(ProfileRef::from(key).key(), key);
        }
    }

    #[test]
    fn test_profile_deserializes_with_partial_fields() {
        let p: Profile =
            serde_json::from_str(r#"{"guid": "abc", "name": "Quiet", "governor": "powersave"}"#)
                .unwrap();
        assert_eq!(p.max_freq_pct, 100);
        assert!(p.turbo);
    }

    #[test]
    fn test_system_profile_label() {
        assert_eq!(Profile::system().name, SYSTEM_SETTINGS_LABEL);
        assert!(Profile::system().governor.is_empty());
    }
}
