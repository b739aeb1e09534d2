use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of a test within the question bank (1-based).
///
/// This is the bank's internal numbering; the ordinal shown to users is
/// derived per source partition, see `QuestionBank::display_number`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestNumber(u32);

impl TestNumber {
    /// Creates a new `TestNumber`
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Returns the underlying u32 value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestNumber({})", self.0)
    }
}

impl fmt::Display for TestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for parsing a `TestNumber` from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTestNumberError;

impl fmt::Display for ParseTestNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse TestNumber from string")
    }
}

impl std::error::Error for ParseTestNumberError {}

impl FromStr for TestNumber {
    type Err = ParseTestNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(TestNumber::new)
            .map_err(|_| ParseTestNumberError)
    }
}

/// Stable identifier of a question across the whole bank.
///
/// Assigned by the bank (e.g. `test3-q12`) and used as the answer-map key
/// in attempt records and for de-duplication in the stats aggregator. Must
/// never change for a given question between app versions, or previously
/// saved answers would be orphaned.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    /// Creates a `QuestionId` from a bank-assigned identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Composite identifier used by records written before the bank
    /// assigned stable ids: test number plus 1-based question ordinal.
    #[must_use]
    pub fn legacy(test: TestNumber, ordinal: usize) -> Self {
        Self(format!("test{test}-q{ordinal}"))
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuestionId({})", self.0)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Tag naming the question-bank partition a test came from.
///
/// Only affects display numbering and labels, never answer bookkeeping.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    /// Creates a new `SourceTag`
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human label: the tag with its first letter uppercased.
    #[must_use]
    pub fn label(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

impl fmt::Debug for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceTag({})", self.0)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display_and_parse() {
        let number = TestNumber::new(3);
        assert_eq!(number.to_string(), "3");
        assert_eq!("3".parse::<TestNumber>().unwrap(), number);
        assert!("three".parse::<TestNumber>().is_err());
    }

    #[test]
    fn legacy_question_id_shape() {
        let id = QuestionId::legacy(TestNumber::new(4), 12);
        assert_eq!(id.as_str(), "test4-q12");
    }

    #[test]
    fn source_tag_label_uppercases_first_letter() {
        assert_eq!(SourceTag::new("stephane").label(), "Stephane");
        assert_eq!(SourceTag::new("").label(), "");
    }
}
