use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AttemptKind, QuestionId, SourceTag, TestNumber};

/// Set of selected option indices for one question.
///
/// Stored as an ordered set so that selection order and duplicate picks
/// never matter: `[2, 0]` and `[0, 0, 2]` are the same selection as
/// `[0, 2]`. An empty selection means "unanswered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<usize>);

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a selection from option indices in any order, collapsing
    /// duplicates.
    #[must_use]
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        Self(indices.into_iter().collect())
    }

    pub fn insert(&mut self, index: usize) {
        self.0.insert(index);
    }

    pub fn remove(&mut self, index: usize) {
        self.0.remove(&index);
    }

    /// Toggles an option in or out of the selection.
    pub fn toggle(&mut self, index: usize) {
        if !self.0.remove(&index) {
            self.0.insert(index);
        }
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Exact set equality. This is the whole correctness rule: there is no
    /// partial credit.
    #[must_use]
    pub fn matches(&self, other: &Selection) -> bool {
        self.0 == other.0
    }
}

impl FromIterator<usize> for Selection {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One multiple-choice question as supplied by the question bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    domain: String,
    options: Vec<String>,
    correct: Selection,
}

impl Question {
    #[must_use]
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        domain: impl Into<String>,
        options: Vec<String>,
        correct: Selection,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            domain: domain.into(),
            options,
            correct,
        }
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct(&self) -> &Selection {
        &self.correct
    }

    /// Whether `selected` is exactly the correct option set.
    #[must_use]
    pub fn is_correct(&self, selected: &Selection) -> bool {
        self.correct.matches(selected)
    }
}

struct TestEntry {
    source: SourceTag,
    questions: Vec<Question>,
}

/// Read-only view of the full question bank, keyed by test number.
///
/// Supplied externally; this core never parses question content. The
/// `domains` list fixes the ordering used by the insights aggregator.
pub struct QuestionBank {
    domains: Vec<String>,
    tests: BTreeMap<TestNumber, TestEntry>,
}

impl QuestionBank {
    #[must_use]
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains,
            tests: BTreeMap::new(),
        }
    }

    pub fn insert_test(&mut self, number: TestNumber, source: SourceTag, questions: Vec<Question>) {
        self.tests.insert(number, TestEntry { source, questions });
    }

    /// Fixed domain ordering for dashboards and tie-breaking.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Test numbers in ascending order.
    pub fn test_numbers(&self) -> impl Iterator<Item = TestNumber> + '_ {
        self.tests.keys().copied()
    }

    #[must_use]
    pub fn test_questions(&self, number: TestNumber) -> Option<&[Question]> {
        self.tests
            .get(&number)
            .map(|entry| entry.questions.as_slice())
    }

    #[must_use]
    pub fn source(&self, number: TestNumber) -> Option<&SourceTag> {
        self.tests.get(&number).map(|entry| &entry.source)
    }

    /// All questions labeled with `domain`, in bank order (ascending test
    /// number, then position within the test).
    #[must_use]
    pub fn domain_questions(&self, domain: &str) -> Vec<&Question> {
        self.tests
            .values()
            .flat_map(|entry| entry.questions.iter())
            .filter(|question| question.domain() == domain)
            .collect()
    }

    /// Ordinal of a test among the tests sharing its source partition.
    ///
    /// This is what users see ("Test 2"), independent of the bank's
    /// internal numbering which may have gaps.
    #[must_use]
    pub fn display_number(&self, number: TestNumber) -> Option<usize> {
        let source = self.source(number)?;
        self.tests
            .iter()
            .filter(|(_, entry)| entry.source == *source)
            .position(|(candidate, _)| *candidate == number)
            .map(|position| position + 1)
    }

    /// How many questions an attempt over `kind` spans.
    #[must_use]
    pub fn question_count(&self, kind: &AttemptKind) -> usize {
        match kind {
            AttemptKind::Test(number) => self.test_questions(*number).map_or(0, <[Question]>::len),
            AttemptKind::DomainReview(domain) => self.domain_questions(domain).len(),
        }
    }
}
