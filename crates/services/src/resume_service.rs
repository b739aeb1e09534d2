//! "Continue where you left off" resolution.
//!
//! Works entirely off the Local Progress Store (after one remote
//! reconciliation pass), never off the live session: the resume card has
//! to reflect what would actually load, including records written on
//! another device.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use exam_core::model::{
    AttemptKind, AttemptRecord, Mode, QuestionBank, SourceTag, percentage,
};
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::ProgressError;
use crate::progress_service::parse_record;
use crate::session_state::SessionState;
use crate::sync_client::SyncClient;

/// Everything the dashboard needs to render the continue card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDetails {
    pub display_name: String,
    pub mode: Mode,
    /// 1-based position to land on when resuming.
    pub current_question: usize,
    pub total_questions: usize,
    pub answered_count: usize,
    pub progress_percent: u32,
    pub last_accessed: String,
    pub kind: AttemptKind,
    pub source: Option<SourceTag>,
}

#[derive(Clone)]
pub struct ResumeService {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    sync: SyncClient,
    bank: Arc<QuestionBank>,
    keys: KeySpace,
}

impl ResumeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn ProgressStore>,
        sync: SyncClient,
        bank: Arc<QuestionBank>,
        keys: KeySpace,
    ) -> Self {
        Self {
            clock,
            store,
            sync,
            bank,
            keys,
        }
    }

    /// Most recently touched attempt that has not been submitted, or
    /// `None` when nothing is resumable.
    ///
    /// Triggers a progress reconciliation pass first so records written on
    /// another device participate in the scan. Ties on `lastTouched` go to
    /// the lexically first key; unreadable records are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be read.
    pub async fn last_progress_point(
        &self,
        session: &SessionState,
    ) -> Result<Option<AttemptRecord>, ProgressError> {
        let Some(email) = session.user_email() else {
            return Ok(None);
        };
        let Some(user) = session.user_key() else {
            return Ok(None);
        };

        self.sync.reconcile_progress(email).await?;

        let mut best: Option<AttemptRecord> = None;
        for key in self.store.list_keys(&self.keys.progress_prefix(&user)).await? {
            let Some(raw) = self.store.load(&key).await? else {
                continue;
            };
            let Some(record) = parse_record(&raw) else {
                continue;
            };
            if record.is_submitted() {
                continue;
            }
            // Strictly-greater comparison over keys in lexical order makes
            // the first key win a timestamp tie.
            let newer = best
                .as_ref()
                .is_none_or(|current| record.last_touched > current.last_touched);
            if newer {
                best = Some(record);
            }
        }
        Ok(best)
    }

    /// Completion percentage of an attempt: answered questions over the
    /// attempt's total, rounded. 0 when the attempt spans no questions.
    #[must_use]
    pub fn calculate_progress(&self, record: &AttemptRecord) -> u32 {
        percentage(
            record.answered_count(),
            self.bank.question_count(&record.kind),
        )
    }

    /// Human-readable summary of a resumable attempt.
    #[must_use]
    pub fn progress_details(&self, record: &AttemptRecord) -> ProgressDetails {
        let total_questions = self.bank.question_count(&record.kind);
        let display_name = match &record.kind {
            AttemptKind::Test(number) => {
                let ordinal = self
                    .bank
                    .display_number(*number)
                    .unwrap_or(number.value() as usize);
                match &record.source {
                    Some(source) => format!("{} Test {ordinal}", source.label()),
                    None => format!("Test {ordinal}"),
                }
            }
            AttemptKind::DomainReview(domain) => domain.clone(),
        };

        ProgressDetails {
            display_name,
            mode: record.mode,
            current_question: record.question_index + 1,
            total_questions,
            answered_count: record.answered_count(),
            progress_percent: percentage(record.answered_count(), total_questions),
            last_accessed: format_last_accessed(self.clock.now(), record.last_touched),
            kind: record.kind.clone(),
            source: record.source.clone(),
        }
    }
}

/// Bucketed relative-time label for the continue card.
#[must_use]
pub fn format_last_accessed(now: DateTime<Utc>, touched: DateTime<Utc>) -> String {
    let elapsed = now - touched;
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes} minute{} ago", plural(minutes))
    } else if hours < 24 {
        format!("{hours} hour{} ago", plural(hours))
    } else if days < 7 {
        format!("{days} day{} ago", plural(days))
    } else {
        touched.format("%Y-%m-%d").to_string()
    }
}

fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}
