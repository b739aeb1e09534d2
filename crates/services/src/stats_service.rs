//! Aggregate statistics and per-domain insights.
//!
//! Stats are always rebuilt from scratch by scanning every persisted
//! attempt record (plus, optionally, the live session). Incremental
//! bookkeeping would drift the moment a partial sync or an abandoned tab
//! landed a record behind our back; a full rescan is cheap at this scale
//! and self-healing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use exam_core::model::{
    AttemptKind, Question, QuestionBank, QuestionId, Selection, percentage,
};
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::{ProfileError, ProgressError};
use crate::profile_service::ProfileService;
use crate::progress_service::parse_record;
use crate::session_state::SessionState;

/// Per-domain answer bookkeeping for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainStats {
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub accuracy: u32,
}

/// Dashboard insight block: domain breakdown plus highlights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insights {
    /// One entry per bank domain, in the bank's fixed ordering.
    pub domain_stats: Vec<(String, DomainStats)>,
    pub strongest_domain: Option<String>,
    pub weakest_domain: Option<String>,
    pub total_questions: usize,
    pub total_answered: usize,
    pub total_correct: usize,
    pub overall_accuracy: u32,
}

#[derive(Clone)]
pub struct StatsService {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    bank: Arc<QuestionBank>,
    keys: KeySpace,
    profiles: Arc<ProfileService>,
}

impl StatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn ProgressStore>,
        bank: Arc<QuestionBank>,
        keys: KeySpace,
        profiles: Arc<ProfileService>,
    ) -> Self {
        Self {
            clock,
            store,
            bank,
            keys,
            profiles,
        }
    }

    /// Rebuild the profile's aggregate stats from every persisted record
    /// (and the live session when `include_current_session` is set), then
    /// persist the profile locally and queue its remote write.
    ///
    /// Questions are de-duplicated by their stable id: a question answered
    /// both in a test attempt and in a domain review counts once, with the
    /// first-encountered answer winning (tests scan before domains, in
    /// ascending test number). `tests_completed` is left untouched; it is
    /// not derivable from attempt records.
    ///
    /// No-op when no identity is signed in.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the store cannot be read or the profile
    /// cannot be persisted.
    pub async fn recalculate_user_stats(
        &self,
        session: &mut SessionState,
        include_current_session: bool,
    ) -> Result<(), ProfileError> {
        let Some(user) = session.user_key() else {
            return Ok(());
        };
        if session.profile().is_none() {
            return Ok(());
        }

        let mut seen: BTreeSet<QuestionId> = BTreeSet::new();
        let mut correct_total = 0_usize;
        let mut domains: BTreeSet<String> = BTreeSet::new();

        let mut fold = |question: &Question, selection: &Selection| {
            if selection.is_empty() {
                return;
            }
            if seen.insert(question.id().clone()) {
                if question.is_correct(selection) {
                    correct_total += 1;
                }
                domains.insert(question.domain().to_string());
            }
        };

        if include_current_session {
            for question in session.questions() {
                if let Some(selection) = session.selection(question.id()) {
                    fold(question, selection);
                }
            }
        }

        for number in self.bank.test_numbers() {
            let key = self.keys.progress_key(&user, &AttemptKind::Test(number));
            let Some(raw) = self.store.load(&key).await? else {
                continue;
            };
            let Some(record) = parse_record(&raw) else {
                continue;
            };
            if record.kind != AttemptKind::Test(number) {
                continue;
            }
            let Some(questions) = self.bank.test_questions(number) else {
                continue;
            };
            for (index, question) in questions.iter().enumerate() {
                let candidates = [question.id().clone(), QuestionId::legacy(number, index + 1)];
                if let Some(selection) = record.selection_for(&candidates) {
                    fold(question, selection);
                }
            }
        }

        for key in self.store.list_keys(&self.keys.progress_prefix(&user)).await? {
            let Some(raw) = self.store.load(&key).await? else {
                continue;
            };
            let Some(record) = parse_record(&raw) else {
                continue;
            };
            let AttemptKind::DomainReview(domain) = &record.kind else {
                continue;
            };
            for question in self.bank.domain_questions(domain) {
                let candidates = [question.id().clone()];
                if let Some(selection) = record.selection_for(&candidates) {
                    fold(question, selection);
                }
            }
        }

        let now = self.clock.now();
        if let Some(profile) = session.profile_mut() {
            profile.stats.total_questions_answered = seen.len();
            profile.stats.total_correct_answers = correct_total;
            profile.stats.questions_answered = seen;
            profile.stats.domains_practiced = domains;
            profile.stats.last_activity = Some(now);
        }
        self.profiles.save_profile(session).await?;
        Ok(())
    }

    /// Read-only per-domain breakdown for the dashboard. `None` when no
    /// identity is signed in.
    ///
    /// Domain totals cover the questions of every attempted record;
    /// questions already counted from a test attempt are not counted again
    /// from a domain review. Strongest/weakest ties resolve to the earlier
    /// domain in the bank's fixed ordering.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be read.
    pub async fn calculate_insights(
        &self,
        session: &SessionState,
    ) -> Result<Option<Insights>, ProgressError> {
        let Some(user) = session.user_key() else {
            return Ok(None);
        };

        let mut domain_stats: BTreeMap<&str, DomainStats> = self
            .bank
            .domains()
            .iter()
            .map(|domain| (domain.as_str(), DomainStats::default()))
            .collect();
        let mut seen: BTreeSet<QuestionId> = BTreeSet::new();

        for number in self.bank.test_numbers() {
            let key = self.keys.progress_key(&user, &AttemptKind::Test(number));
            let Some(raw) = self.store.load(&key).await? else {
                continue;
            };
            let Some(record) = parse_record(&raw) else {
                continue;
            };
            if record.kind != AttemptKind::Test(number) {
                continue;
            }
            let Some(questions) = self.bank.test_questions(number) else {
                continue;
            };
            for (index, question) in questions.iter().enumerate() {
                let Some(stats) = domain_stats.get_mut(question.domain()) else {
                    continue;
                };
                stats.total += 1;
                let candidates = [question.id().clone(), QuestionId::legacy(number, index + 1)];
                match record.selection_for(&candidates) {
                    Some(selection) if !selection.is_empty() => {
                        stats.answered += 1;
                        seen.insert(question.id().clone());
                        if question.is_correct(selection) {
                            stats.correct += 1;
                        } else {
                            stats.incorrect += 1;
                        }
                    }
                    _ => stats.unanswered += 1,
                }
            }
        }

        for key in self.store.list_keys(&self.keys.progress_prefix(&user)).await? {
            let Some(raw) = self.store.load(&key).await? else {
                continue;
            };
            let Some(record) = parse_record(&raw) else {
                continue;
            };
            let AttemptKind::DomainReview(domain) = &record.kind else {
                continue;
            };
            for question in self.bank.domain_questions(domain) {
                if seen.contains(question.id()) {
                    continue;
                }
                let candidates = [question.id().clone()];
                let Some(selection) = record.selection_for(&candidates) else {
                    continue;
                };
                if selection.is_empty() {
                    continue;
                }
                let Some(stats) = domain_stats.get_mut(question.domain()) else {
                    continue;
                };
                stats.total += 1;
                stats.answered += 1;
                seen.insert(question.id().clone());
                if question.is_correct(selection) {
                    stats.correct += 1;
                } else {
                    stats.incorrect += 1;
                }
            }
        }

        for stats in domain_stats.values_mut() {
            stats.accuracy = percentage(stats.correct, stats.answered);
        }

        // Highlights use strict comparisons so the first domain in the
        // fixed ordering wins accuracy ties.
        let mut strongest: Option<(&str, u32)> = None;
        let mut weakest: Option<(&str, u32)> = None;
        for domain in self.bank.domains() {
            let Some(stats) = domain_stats.get(domain.as_str()) else {
                continue;
            };
            if stats.answered == 0 {
                continue;
            }
            if strongest.is_none_or(|(_, best)| stats.accuracy > best) {
                strongest = Some((domain, stats.accuracy));
            }
            if weakest.is_none_or(|(_, worst)| stats.accuracy < worst) {
                weakest = Some((domain, stats.accuracy));
            }
        }

        let ordered: Vec<(String, DomainStats)> = self
            .bank
            .domains()
            .iter()
            .map(|domain| {
                (
                    domain.clone(),
                    domain_stats.get(domain.as_str()).cloned().unwrap_or_default(),
                )
            })
            .collect();

        let total_questions = ordered.iter().map(|(_, s)| s.total).sum();
        let total_answered = ordered.iter().map(|(_, s)| s.answered).sum();
        let total_correct = ordered.iter().map(|(_, s)| s.correct).sum();

        Ok(Some(Insights {
            domain_stats: ordered,
            strongest_domain: strongest.map(|(domain, _)| domain.to_string()),
            weakest_domain: weakest.map(|(domain, _)| domain.to_string()),
            total_questions,
            total_answered,
            total_correct,
            overall_accuracy: percentage(total_correct, total_answered),
        }))
    }
}
