use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{QuestionId, Selection, SourceTag, TestNumber};

/// What an attempt runs over: one whole test, or every question of one
/// domain pooled across tests. Exactly one of the two, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Test(TestNumber),
    DomainReview(String),
}

impl AttemptKind {
    #[must_use]
    pub fn is_test(&self) -> bool {
        matches!(self, AttemptKind::Test(_))
    }

    #[must_use]
    pub fn test_number(&self) -> Option<TestNumber> {
        match self {
            AttemptKind::Test(number) => Some(*number),
            AttemptKind::DomainReview(_) => None,
        }
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        match self {
            AttemptKind::Test(_) => None,
            AttemptKind::DomainReview(domain) => Some(domain),
        }
    }
}

/// How an attempt presents feedback.
///
/// Review mode reveals per-question correctness immediately; timed mode
/// defers all feedback to the final results computation and runs against a
/// wall-clock limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Review,
    Timed,
}

impl Mode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Review => "review",
            Mode::Timed => "timed",
        }
    }

    /// Lenient parse: timed attempts were historically stored as "test".
    /// Anything unrecognized falls back to review mode.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "timed" | "test" => Mode::Timed,
            _ => Mode::Review,
        }
    }
}

/// Persisted snapshot of one attempt.
///
/// One record exists per test number or per domain name; saving the same
/// attempt again overwrites the previous snapshot (last write wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub kind: AttemptKind,
    pub mode: Mode,
    pub question_index: usize,
    pub answers: BTreeMap<QuestionId, Selection>,
    pub marked: BTreeSet<QuestionId>,
    pub started_at: Option<DateTime<Utc>>,
    pub source: Option<SourceTag>,
    pub last_touched: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// Questions with a non-empty selection. This is the count behind
    /// progress percentages and the resume card.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers
            .values()
            .filter(|selection| !selection.is_empty())
            .count()
    }

    /// First selection present under any of the candidate ids.
    ///
    /// Callers pass the stable id first and the legacy composite id
    /// second, so answers saved by older versions keep resolving.
    #[must_use]
    pub fn selection_for(&self, candidates: &[QuestionId]) -> Option<&Selection> {
        candidates.iter().find_map(|id| self.answers.get(id))
    }

    /// Whether the attempt reached its terminal state.
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn record() -> AttemptRecord {
        let mut answers = BTreeMap::new();
        answers.insert(QuestionId::new("test1-q1"), Selection::from_indices([0]));
        answers.insert(QuestionId::new("test1-q2"), Selection::new());
        answers.insert(QuestionId::new("q7"), Selection::from_indices([1, 2]));
        AttemptRecord {
            kind: AttemptKind::Test(TestNumber::new(1)),
            mode: Mode::Review,
            question_index: 2,
            answers,
            marked: BTreeSet::new(),
            started_at: None,
            source: None,
            last_touched: fixed_now(),
            submitted_at: None,
        }
    }

    #[test]
    fn answered_count_skips_empty_selections() {
        assert_eq!(record().answered_count(), 2);
    }

    #[test]
    fn selection_lookup_falls_back_to_legacy_id() {
        let record = record();
        let found = record
            .selection_for(&[QuestionId::new("missing"), QuestionId::new("test1-q1")])
            .unwrap();
        assert_eq!(*found, Selection::from_indices([0]));
        assert!(record.selection_for(&[QuestionId::new("nope")]).is_none());
    }

    #[test]
    fn mode_parse_accepts_legacy_spelling() {
        assert_eq!(Mode::parse("timed"), Mode::Timed);
        assert_eq!(Mode::parse("test"), Mode::Timed);
        assert_eq!(Mode::parse("review"), Mode::Review);
        assert_eq!(Mode::parse("???"), Mode::Review);
    }
}
