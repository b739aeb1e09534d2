use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::model::QuestionId;

/// Aggregate counters shown on the dashboard.
///
/// Everything except `tests_completed` is rebuilt from scratch by the
/// stats aggregator on every recomputation; blind increments would drift
/// whenever a partial sync lands. `tests_completed` is the one counter
/// that cannot be derived from attempt records, so it advances exactly
/// once per submitted timed test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total_questions_answered: usize,
    pub total_correct_answers: usize,
    pub tests_completed: u32,
    pub domains_practiced: BTreeSet<String>,
    pub questions_answered: BTreeSet<QuestionId>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl UserStats {
    /// Overall accuracy percentage, 0 when nothing was answered.
    #[must_use]
    pub fn accuracy(&self) -> u32 {
        percentage(self.total_correct_answers, self.total_questions_answered)
    }
}

/// Rounded percentage helper shared by stats, insights and resume math.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

/// One authenticated user's profile.
///
/// Created on first sign-in for an email, mutated only through full stats
/// recomputation, and deleted only by the explicit confirmed reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub stats: UserStats,
}

impl UserProfile {
    /// Fresh profile with zeroed stats, as built on first authentication.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            created_at,
            stats: UserStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn accuracy_guards_division_by_zero() {
        let stats = UserStats::default();
        assert_eq!(stats.accuracy(), 0);
    }

    #[test]
    fn accuracy_rounds_to_nearest_percent() {
        let stats = UserStats {
            total_questions_answered: 3,
            total_correct_answers: 2,
            ..UserStats::default()
        };
        assert_eq!(stats.accuracy(), 67);
    }

    #[test]
    fn new_profile_starts_zeroed() {
        let profile = UserProfile::new("Sam", "sam@example.com", fixed_now());
        assert_eq!(profile.stats, UserStats::default());
        assert_eq!(profile.stats.tests_completed, 0);
    }
}
