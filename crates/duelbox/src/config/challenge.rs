use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

/// Configuration for a single coding challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Human-readable name (e.g., "The Palindrome")
    pub name: String,

    /// Problem statement shown to both players
    pub description: String,

    /// Rough difficulty bucket
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Name of the function the harness invokes
    pub entry_point: EntryPoint,

    /// Hidden test cases, in the order they are run
    pub tests: Vec<TestCase>,

    /// Resource limit overrides for this challenge (merged over defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl Challenge {
    /// Number of declared test cases
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }
}

/// Difficulty bucket for a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        write!(f, "{s}")
    }
}

/// One hidden test case
///
/// An array `input` is splatted as the argument list when the entry point is
/// called; a single list-valued argument must be wrapped in an outer array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Argument(s) passed to the entry point
    pub input: serde_json::Value,

    /// Value the entry point must return
    pub expected: serde_json::Value,

    /// Optional note about what the case covers
    #[serde(default)]
    pub description: Option<String>,
}

/// Name of the function the harness calls, restricted to a plain identifier
///
/// The name is spliced into generated harness source, so anything that is not
/// a bare identifier is refused at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint(String);

impl EntryPoint {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_head || !valid_tail {
            return Err(ConfigError::InvalidEntryPoint(name.to_string()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EntryPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntryPoint::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a bare Python identifier (letters, digits, underscores)",
            )
        })
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
