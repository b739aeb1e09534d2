//! Wire-format documents.
//!
//! This module is the single (de)serialization boundary between the
//! in-memory model (sets, typed ids) and the persisted/synced JSON shape
//! (arrays, plain strings). Set-vs-array duality stops here; business
//! logic only ever sees the model types. The same document shape is
//! written to the local store and to the remote collection, so a record
//! pulled down during reconciliation can be dropped into local storage
//! verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use exam_core::model::{
    AttemptKind, AttemptRecord, Mode, QuestionId, Selection, SourceTag, TestNumber, UserProfile,
    UserStats,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    #[error("progress document names neither a test nor a domain")]
    MissingAttemptKind,
}

/// JSON shape of one attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_domain: Option<String>,
    pub mode: String,
    #[serde(default)]
    pub question_index: usize,
    #[serde(default)]
    pub answers: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub marked: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl ProgressDocument {
    #[must_use]
    pub fn from_record(record: &AttemptRecord) -> Self {
        let (test, selected_domain) = match &record.kind {
            AttemptKind::Test(number) => (Some(number.value()), None),
            AttemptKind::DomainReview(domain) => (None, Some(domain.clone())),
        };
        Self {
            test,
            selected_domain,
            mode: record.mode.as_str().to_string(),
            question_index: record.question_index,
            answers: record
                .answers
                .iter()
                .map(|(id, selection)| (id.as_str().to_string(), selection.iter().collect()))
                .collect(),
            marked: record.marked.iter().map(|id| id.as_str().to_string()).collect(),
            start_time: record.started_at,
            source: record.source.as_ref().map(|tag| tag.as_str().to_string()),
            timestamp: record.last_touched,
            submitted_at: record.submitted_at,
            user_email: None,
            user_name: None,
            synced_at: None,
        }
    }

    /// Attach the identity fields required by remote access-control rules.
    #[must_use]
    pub fn with_identity(mut self, email: &str, name: Option<&str>) -> Self {
        self.user_email = Some(email.to_string());
        self.user_name = name.map(ToString::to_string);
        self
    }

    /// Rehydrate the in-memory record.
    ///
    /// # Errors
    ///
    /// Returns `WireError::MissingAttemptKind` if the document names
    /// neither a test nor a domain.
    pub fn into_record(self) -> Result<AttemptRecord, WireError> {
        let kind = match (self.test, self.selected_domain) {
            (Some(number), _) => AttemptKind::Test(TestNumber::new(number)),
            (None, Some(domain)) => AttemptKind::DomainReview(domain),
            (None, None) => return Err(WireError::MissingAttemptKind),
        };
        Ok(AttemptRecord {
            kind,
            mode: Mode::parse(&self.mode),
            question_index: self.question_index,
            answers: self
                .answers
                .into_iter()
                .map(|(id, indices)| (QuestionId::new(id), Selection::from_indices(indices)))
                .collect(),
            marked: self.marked.into_iter().map(QuestionId::new).collect(),
            started_at: self.start_time,
            source: self.source.map(SourceTag::new),
            last_touched: self.timestamp,
            submitted_at: self.submitted_at,
        })
    }
}

/// JSON shape of the aggregate stats block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDocument {
    #[serde(default)]
    pub total_questions_answered: usize,
    #[serde(default)]
    pub total_correct_answers: usize,
    #[serde(default)]
    pub tests_completed: u32,
    #[serde(default)]
    pub domains_practiced: Vec<String>,
    #[serde(default)]
    pub questions_answered: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// JSON shape of the user profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub stats: StatsDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    #[must_use]
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            created_at: profile.created_at,
            stats: StatsDocument {
                total_questions_answered: profile.stats.total_questions_answered,
                total_correct_answers: profile.stats.total_correct_answers,
                tests_completed: profile.stats.tests_completed,
                domains_practiced: profile.stats.domains_practiced.iter().cloned().collect(),
                questions_answered: profile
                    .stats
                    .questions_answered
                    .iter()
                    .map(|id| id.as_str().to_string())
                    .collect(),
                last_activity: profile.stats.last_activity,
            },
            user_email: Some(profile.email.clone()),
            synced_at: None,
        }
    }

    #[must_use]
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            name: self.name,
            email: self.email,
            created_at: self.created_at,
            stats: UserStats {
                total_questions_answered: self.stats.total_questions_answered,
                total_correct_answers: self.stats.total_correct_answers,
                tests_completed: self.stats.tests_completed,
                domains_practiced: self.stats.domains_practiced.into_iter().collect(),
                questions_answered: self
                    .stats
                    .questions_answered
                    .into_iter()
                    .map(QuestionId::new)
                    .collect(),
                last_activity: self.stats.last_activity,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_now;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn set_valued_fields_round_trip_through_arrays() {
        let mut profile = UserProfile::new("Sam", "sam@example.com", fixed_now());
        profile.stats.domains_practiced = ["B", "A"].iter().map(ToString::to_string).collect();
        profile.stats.questions_answered =
            [QuestionId::new("q2"), QuestionId::new("q1")].into_iter().collect();

        let json = serde_json::to_string(&ProfileDocument::from_profile(&profile)).unwrap();
        let parsed: ProfileDocument = serde_json::from_str(&json).unwrap();
        let restored = parsed.into_profile();

        let expected: BTreeSet<String> = ["A", "B"].iter().map(ToString::to_string).collect();
        assert_eq!(restored.stats.domains_practiced, expected);
        assert_eq!(
            restored.stats.questions_answered,
            profile.stats.questions_answered
        );
    }

    #[test]
    fn progress_document_round_trips_a_record() {
        let mut answers = BTreeMap::new();
        answers.insert(QuestionId::new("test3-q1"), Selection::from_indices([2, 0]));
        let record = AttemptRecord {
            kind: AttemptKind::Test(TestNumber::new(3)),
            mode: Mode::Timed,
            question_index: 1,
            answers,
            marked: [QuestionId::new("test3-q1")].into_iter().collect(),
            started_at: Some(fixed_now()),
            source: Some(SourceTag::new("alpha")),
            last_touched: fixed_now(),
            submitted_at: None,
        };

        let doc = ProgressDocument::from_record(&record).with_identity("sam@example.com", Some("Sam"));
        let json = serde_json::to_string(&doc).unwrap();
        let restored: AttemptRecord = serde_json::from_str::<ProgressDocument>(&json)
            .unwrap()
            .into_record()
            .unwrap();

        assert_eq!(restored, record);
    }

    #[test]
    fn document_without_test_or_domain_is_rejected() {
        let doc: ProgressDocument =
            serde_json::from_str(r#"{"mode":"review","timestamp":"2024-03-01T12:00:00Z"}"#)
                .unwrap();
        assert!(matches!(
            doc.into_record(),
            Err(WireError::MissingAttemptKind)
        ));
    }

    #[test]
    fn legacy_timed_mode_spelling_is_accepted() {
        let doc: ProgressDocument = serde_json::from_str(
            r#"{"test":1,"mode":"test","timestamp":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        let record = doc.into_record().unwrap();
        assert_eq!(record.mode, Mode::Timed);
    }
}
