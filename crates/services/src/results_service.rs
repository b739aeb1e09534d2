//! Final scoring and the submitted-test history.
//!
//! Review mode shows correctness as the user answers; timed mode defers
//! everything to this computation. Submitting a timed test is the one
//! transition into the attempt's terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use exam_core::model::{Mode, Question, QuestionId, Selection, percentage};
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::{ProfileError, ProgressError};
use crate::profile_service::ProfileService;
use crate::progress_service::ProgressService;
use crate::session_state::SessionState;

/// Score required to pass, in percent.
pub const PASSING_SCORE_PERCENT: u32 = 72;

/// How many submitted tests the history keeps, most recent first.
const MAX_SUBMITTED_TESTS: usize = 50;

/// Outcome of scoring one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSummary {
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub total: usize,
    pub accuracy: u32,
    pub passing: bool,
}

/// Per-domain score split for the results breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainScore {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
}

impl DomainScore {
    #[must_use]
    pub fn percent(&self) -> u32 {
        percentage(self.correct, self.total)
    }
}

/// One entry of the submitted-test history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTest {
    pub id: String,
    pub test: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub accuracy: u32,
    pub is_passing: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Score an attempt: every question is correct, incorrect or unanswered;
/// accuracy is correct over ALL questions (unanswered count against you).
#[must_use]
pub fn score_summary(
    questions: &[Question],
    answers: &BTreeMap<QuestionId, Selection>,
) -> ScoreSummary {
    let mut correct = 0;
    let mut incorrect = 0;
    let mut unanswered = 0;

    for question in questions {
        match answers.get(question.id()) {
            Some(selection) if !selection.is_empty() => {
                if question.is_correct(selection) {
                    correct += 1;
                } else {
                    incorrect += 1;
                }
            }
            _ => unanswered += 1,
        }
    }

    let total = questions.len();
    let accuracy = percentage(correct, total);
    ScoreSummary {
        correct,
        incorrect,
        unanswered,
        total,
        accuracy,
        passing: accuracy >= PASSING_SCORE_PERCENT,
    }
}

/// Split the score by domain, in question encounter order.
#[must_use]
pub fn domain_breakdown(
    questions: &[Question],
    answers: &BTreeMap<QuestionId, Selection>,
) -> Vec<(String, DomainScore)> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: BTreeMap<String, DomainScore> = BTreeMap::new();

    for question in questions {
        if !scores.contains_key(question.domain()) {
            order.push(question.domain().to_string());
        }
        let entry = scores.entry(question.domain().to_string()).or_default();
        entry.total += 1;
        match answers.get(question.id()) {
            Some(selection) if !selection.is_empty() => {
                if question.is_correct(selection) {
                    entry.correct += 1;
                } else {
                    entry.incorrect += 1;
                }
            }
            _ => entry.unanswered += 1,
        }
    }

    order
        .into_iter()
        .map(|domain| {
            let score = scores.remove(&domain).unwrap_or_default();
            (domain, score)
        })
        .collect()
}

#[derive(Clone)]
pub struct ResultsService {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    keys: KeySpace,
    profiles: Arc<ProfileService>,
    progress: Arc<ProgressService>,
}

impl ResultsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn ProgressStore>,
        keys: KeySpace,
        profiles: Arc<ProfileService>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            clock,
            store,
            keys,
            profiles,
            progress,
        }
    }

    /// Score the active attempt. For a timed test this is the terminal
    /// transition: the record is marked submitted, the run is appended to
    /// the submitted-test history, and `tests_completed` advances.
    ///
    /// Returns `None` when no questions are loaded.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the record or profile cannot be
    /// persisted.
    pub async fn submit_test(
        &self,
        session: &mut SessionState,
    ) -> Result<Option<ScoreSummary>, ProfileError> {
        if session.questions().is_empty() {
            return Ok(None);
        }
        let summary = score_summary(session.questions(), session.answers());

        if session.mode() == Some(Mode::Timed) {
            let now = self.clock.now();
            session.set_submitted_at(Some(now));
            self.progress
                .save_progress(session)
                .await
                .map_err(ProfileError::from)?;

            if let (Some(test), Some(user)) = (session.current_test(), session.user_key()) {
                let entry = SubmittedTest {
                    id: format!("{test}-{}", now.timestamp_millis()),
                    test: test.value(),
                    source: session.source().map(|tag| tag.as_str().to_string()),
                    correct: summary.correct,
                    incorrect: summary.incorrect,
                    unanswered: summary.unanswered,
                    accuracy: summary.accuracy,
                    is_passing: summary.passing,
                    submitted_at: now,
                };

                let key = self.keys.submitted_key(&user);
                let mut history = match self.store.load(&key).await? {
                    Some(raw) => serde_json::from_str::<Vec<SubmittedTest>>(&raw)
                        .unwrap_or_default(),
                    None => Vec::new(),
                };
                history.insert(0, entry);
                history.truncate(MAX_SUBMITTED_TESTS);
                self.store
                    .save(&key, &serde_json::to_string(&history)?)
                    .await?;
            }

            if let Some(profile) = session.profile_mut() {
                profile.stats.tests_completed += 1;
            }
            self.profiles.save_profile(session).await?;
        }

        Ok(Some(summary))
    }

    /// Submitted-test history for the signed-in user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be read.
    pub async fn submitted_tests(
        &self,
        session: &SessionState,
    ) -> Result<Vec<SubmittedTest>, ProgressError> {
        let Some(user) = session.user_key() else {
            return Ok(Vec::new());
        };
        let key = self.keys.submitted_key(&user);
        match self.store.load(&key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }
}
