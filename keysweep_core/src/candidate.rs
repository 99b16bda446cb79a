use serde::{Deserialize, Serialize};
use std::fmt;

/// A single credential guess.
///
/// Candidates are immutable once produced. Two generators may yield the same
/// string; uniqueness is enforced by the checkpoint lookup, not here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Candidate {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Candidate {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Candidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_wraps_string() {
        let guess = Candidate::from("cat horse");
        let empty = Candidate::new(String::new());
        assert_eq!(guess.as_str(), "cat horse");
        assert_eq!(guess.len(), 9);
        assert!(!guess.is_empty());
        assert!(empty.is_empty());
        assert_eq!(guess.to_string(), "cat horse");
    }

    #[test]
    fn candidate_serializes_as_plain_string() {
        let guess = Candidate::from("ab");
        let json = serde_json::to_string(&guess).unwrap();
        assert_eq!(json, "\"ab\"");
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guess);
    }
}
