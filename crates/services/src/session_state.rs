use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use exam_core::Clock;
use exam_core::model::{
    AttemptKind, AttemptRecord, Mode, Question, QuestionId, Selection, SourceTag, TestNumber,
    UserKey, UserProfile,
};

/// Wall-clock limit of a timed attempt.
pub const TEST_DURATION_MINUTES: i64 = 130;

#[must_use]
pub fn test_duration() -> Duration {
    Duration::minutes(TEST_DURATION_MINUTES)
}

/// Working state of the one active attempt plus the authenticated
/// identity.
///
/// This is the only mutable shared structure in the system. It is created
/// once at app start, owned by the caller, and passed by reference into
/// every service operation; no service keeps its own copy. No validation
/// happens here; callers are responsible for index bounds and for
/// keeping the selection consistent with the loaded question list.
#[derive(Debug, Default)]
pub struct SessionState {
    current_test: Option<TestNumber>,
    selected_domain: Option<String>,
    mode: Option<Mode>,
    source: Option<SourceTag>,
    questions: Vec<Question>,
    question_index: usize,
    answers: BTreeMap<QuestionId, Selection>,
    marked: BTreeSet<QuestionId>,
    started_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    profile: Option<UserProfile>,
    user_email: Option<String>,
    user_name: Option<String>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Identity ──────────────────────────────────────────────────────────

    pub fn set_identity(&mut self, profile: UserProfile, email: &str, name: &str) {
        self.profile = Some(profile);
        self.user_email = Some(email.to_string());
        self.user_name = Some(name.to_string());
    }

    pub fn clear_identity(&mut self) {
        self.profile = None;
        self.user_email = None;
        self.user_name = None;
    }

    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn profile_mut(&mut self) -> Option<&mut UserProfile> {
        self.profile.as_mut()
    }

    #[must_use]
    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Partition key for the authenticated identity, if any.
    #[must_use]
    pub fn user_key(&self) -> Option<UserKey> {
        self.user_email.as_deref().map(UserKey::from_email)
    }

    // ─── Attempt selection ─────────────────────────────────────────────────

    #[must_use]
    pub fn current_test(&self) -> Option<TestNumber> {
        self.current_test
    }

    pub fn set_current_test(&mut self, test: Option<TestNumber>) {
        self.current_test = test;
    }

    #[must_use]
    pub fn selected_domain(&self) -> Option<&str> {
        self.selected_domain.as_deref()
    }

    pub fn set_selected_domain(&mut self, domain: Option<String>) {
        self.selected_domain = domain;
    }

    #[must_use]
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Option<Mode>) {
        self.mode = mode;
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceTag> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<SourceTag>) {
        self.source = source;
    }

    /// The attempt this session is working on. A test selection takes
    /// precedence over a leftover domain selection.
    #[must_use]
    pub fn attempt_kind(&self) -> Option<AttemptKind> {
        if let Some(test) = self.current_test {
            return Some(AttemptKind::Test(test));
        }
        self.selected_domain
            .clone()
            .map(AttemptKind::DomainReview)
    }

    // ─── Questions & navigation ────────────────────────────────────────────

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.questions = questions;
    }

    #[must_use]
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn set_question_index(&mut self, index: usize) {
        self.question_index = index;
    }

    pub fn advance_question(&mut self) {
        self.question_index += 1;
    }

    pub fn previous_question(&mut self) {
        self.question_index = self.question_index.saturating_sub(1);
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.question_index)
    }

    // ─── Answers & marks ───────────────────────────────────────────────────

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Selection> {
        &self.answers
    }

    #[must_use]
    pub fn selection(&self, id: &QuestionId) -> Option<&Selection> {
        self.answers.get(id)
    }

    pub fn set_answer(&mut self, id: QuestionId, selection: Selection) {
        self.answers.insert(id, selection);
    }

    pub fn clear_answer(&mut self, id: &QuestionId) {
        self.answers.remove(id);
    }

    #[must_use]
    pub fn marked(&self) -> &BTreeSet<QuestionId> {
        &self.marked
    }

    pub fn toggle_marked(&mut self, id: &QuestionId) {
        if !self.marked.remove(id) {
            self.marked.insert(id.clone());
        }
    }

    // ─── Timer ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn set_started_at(&mut self, at: Option<DateTime<Utc>>) {
        self.started_at = at;
    }

    /// Record the attempt start; set once when the attempt begins.
    pub fn start_timer(&mut self, clock: &Clock) {
        self.started_at = Some(clock.now());
    }

    /// Time spent since the attempt started, if it has.
    #[must_use]
    pub fn elapsed(&self, clock: &Clock) -> Option<Duration> {
        self.started_at.map(|started| clock.now() - started)
    }

    /// Remaining wall-clock time of a timed attempt, clamped at zero.
    /// Before the timer starts the full duration remains.
    #[must_use]
    pub fn remaining_time(&self, clock: &Clock) -> Duration {
        match self.elapsed(clock) {
            Some(elapsed) => (test_duration() - elapsed).max(Duration::zero()),
            None => test_duration(),
        }
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn set_submitted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.submitted_at = at;
    }

    // ─── Snapshots ─────────────────────────────────────────────────────────

    /// Snapshot the attempt-scoped state into a persistable record.
    /// `None` when no test or domain is selected.
    #[must_use]
    pub fn snapshot_record(&self, last_touched: DateTime<Utc>) -> Option<AttemptRecord> {
        let kind = self.attempt_kind()?;
        Some(AttemptRecord {
            kind,
            mode: self.mode.unwrap_or_default(),
            question_index: self.question_index,
            answers: self.answers.clone(),
            marked: self.marked.clone(),
            started_at: self.started_at,
            source: self.source.clone(),
            last_touched,
            submitted_at: self.submitted_at,
        })
    }

    /// Overwrite every attempt-scoped field from a loaded record.
    pub fn restore_record(&mut self, record: AttemptRecord, questions: Vec<Question>) {
        match &record.kind {
            AttemptKind::Test(number) => {
                self.current_test = Some(*number);
                self.selected_domain = None;
            }
            AttemptKind::DomainReview(domain) => {
                self.current_test = None;
                self.selected_domain = Some(domain.clone());
            }
        }
        self.mode = Some(record.mode);
        self.question_index = record.question_index;
        self.answers = record.answers;
        self.marked = record.marked;
        self.started_at = record.started_at;
        self.submitted_at = record.submitted_at;
        self.source = record.source;
        self.questions = questions;
    }

    /// Clear all attempt-scoped state, keeping the authenticated identity.
    pub fn reset_test_state(&mut self) {
        self.current_test = None;
        self.selected_domain = None;
        self.mode = None;
        self.source = None;
        self.questions = Vec::new();
        self.question_index = 0;
        self.answers = BTreeMap::new();
        self.marked = BTreeSet::new();
        self.started_at = None;
        self.submitted_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::{fixed_clock, fixed_now};

    fn signed_in_session() -> SessionState {
        let mut session = SessionState::new();
        session.set_identity(
            UserProfile::new("Sam", "sam@example.com", fixed_now()),
            "sam@example.com",
            "Sam",
        );
        session
    }

    #[test]
    fn attempt_kind_prefers_test_over_domain() {
        let mut session = SessionState::new();
        assert_eq!(session.attempt_kind(), None);

        session.set_selected_domain(Some("Storage".into()));
        assert_eq!(
            session.attempt_kind(),
            Some(AttemptKind::DomainReview("Storage".into()))
        );

        session.set_current_test(Some(TestNumber::new(2)));
        assert_eq!(
            session.attempt_kind(),
            Some(AttemptKind::Test(TestNumber::new(2)))
        );
    }

    #[test]
    fn reset_preserves_identity() {
        let mut session = signed_in_session();
        session.set_current_test(Some(TestNumber::new(1)));
        session.set_mode(Some(Mode::Timed));
        session.set_answer(QuestionId::new("q1"), Selection::from_indices([0]));
        session.toggle_marked(&QuestionId::new("q1"));
        session.start_timer(&fixed_clock());

        session.reset_test_state();

        assert_eq!(session.attempt_kind(), None);
        assert!(session.answers().is_empty());
        assert!(session.marked().is_empty());
        assert_eq!(session.started_at(), None);
        assert_eq!(session.user_email(), Some("sam@example.com"));
        assert!(session.profile().is_some());
    }

    #[test]
    fn previous_question_saturates_at_zero() {
        let mut session = SessionState::new();
        session.previous_question();
        assert_eq!(session.question_index(), 0);
        session.advance_question();
        session.previous_question();
        assert_eq!(session.question_index(), 0);
    }

    #[test]
    fn toggle_marked_flips_membership() {
        let mut session = SessionState::new();
        let id = QuestionId::new("q3");
        session.toggle_marked(&id);
        assert!(session.marked().contains(&id));
        session.toggle_marked(&id);
        assert!(!session.marked().contains(&id));
    }

    #[test]
    fn remaining_time_clamps_at_zero() {
        let mut session = SessionState::new();
        let mut clock = fixed_clock();
        assert_eq!(session.remaining_time(&clock), test_duration());

        session.start_timer(&clock);
        clock.advance(Duration::minutes(30));
        assert_eq!(
            session.remaining_time(&clock),
            Duration::minutes(TEST_DURATION_MINUTES - 30)
        );

        clock.advance(Duration::minutes(200));
        assert_eq!(session.remaining_time(&clock), Duration::zero());
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let mut session = signed_in_session();
        session.set_current_test(Some(TestNumber::new(3)));
        session.set_mode(Some(Mode::Review));
        session.set_question_index(4);
        session.set_answer(QuestionId::new("q1"), Selection::from_indices([1]));

        let record = session.snapshot_record(fixed_now()).unwrap();
        assert_eq!(record.kind, AttemptKind::Test(TestNumber::new(3)));
        assert_eq!(record.question_index, 4);

        let mut other = SessionState::new();
        other.restore_record(record, Vec::new());
        assert_eq!(other.current_test(), Some(TestNumber::new(3)));
        assert_eq!(
            other.selection(&QuestionId::new("q1")),
            Some(&Selection::from_indices([1]))
        );
    }

    #[test]
    fn snapshot_without_attempt_is_none() {
        let session = signed_in_session();
        assert!(session.snapshot_record(fixed_now()).is_none());
    }
}
