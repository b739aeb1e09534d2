//! Save/load/clear of one attempt's persisted record.
//!
//! Orchestrates Session State ↔ Local Progress Store ↔ Remote Sync
//! Client. The local store is the primary copy; the remote write rides the
//! debounced queue and the remote copy is only consulted when the local
//! record is missing (cross-device resume).

use std::sync::Arc;

use tracing::warn;

use exam_core::model::{AttemptKind, AttemptRecord, Question, QuestionBank, UserKey};
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::ProgressError;
use crate::session_state::SessionState;
use crate::sync_client::{SyncClient, collections};
use crate::wire::ProgressDocument;

#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    sync: SyncClient,
    bank: Arc<QuestionBank>,
    keys: KeySpace,
}

impl ProgressService {
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

    /// Snapshot the session's attempt into its record, update the
    /// current-attempt pointer, and queue the remote write.
    ///
    /// Returns `Ok(false)` without touching storage when no identity is
    /// present or no attempt is selected.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be written.
    pub async fn save_progress(&self, session: &SessionState) -> Result<bool, ProgressError> {
        let Some(email) = session.user_email() else {
            warn!("cannot save progress: no authenticated identity");
            return Ok(false);
        };
        let Some(record) = session.snapshot_record(self.clock.now()) else {
            if session.answers().is_empty() {
                warn!("cannot save progress: no test or domain selected");
            } else {
                warn!("cannot save progress: answers exist but no attempt is selected");
            }
            return Ok(false);
        };

        let user = UserKey::from_email(email);
        let progress_key = self.keys.progress_key(&user, &record.kind);
        let document =
            ProgressDocument::from_record(&record).with_identity(email, session.user_name());

        let raw = serde_json::to_string(&document)?;
        self.store.save(&progress_key, &raw).await?;
        self.store
            .save(&self.keys.current_key(&user), &progress_key)
            .await?;

        self.sync.queue_write(
            collections::PROGRESS,
            &progress_key,
            serde_json::to_value(&document)?,
        );

        Ok(true)
    }

    /// Pure read of the saved record for one attempt; `None` when absent
    /// or unreadable.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be read.
    pub async fn get_saved_progress(
        &self,
        session: &SessionState,
        kind: &AttemptKind,
    ) -> Result<Option<AttemptRecord>, ProgressError> {
        let Some(user) = session.user_key() else {
            return Ok(None);
        };
        let key = self.keys.progress_key(&user, kind);
        self.load_record(&key).await
    }

    /// Load a saved record into the session, overwriting every
    /// attempt-scoped field and installing the matching question list.
    ///
    /// With `kind = None` the current-attempt pointer decides which record
    /// loads. Returns whether a record was found and applied.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be read.
    pub async fn load_saved_progress(
        &self,
        session: &mut SessionState,
        kind: Option<AttemptKind>,
    ) -> Result<bool, ProgressError> {
        let Some(user) = session.user_key() else {
            return Ok(false);
        };

        let key = match kind {
            Some(kind) => self.keys.progress_key(&user, &kind),
            None => match self.store.load(&self.keys.current_key(&user)).await? {
                Some(pointed) => pointed,
                None => return Ok(false),
            },
        };

        let Some(record) = self.load_record(&key).await? else {
            return Ok(false);
        };

        let questions = self.questions_for(&record.kind);
        session.restore_record(record, questions);
        Ok(true)
    }

    /// Remove the attempt's record; clears the current-attempt pointer too
    /// when it referenced this record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the local store cannot be written.
    pub async fn clear_saved_progress(
        &self,
        session: &SessionState,
        kind: &AttemptKind,
    ) -> Result<(), ProgressError> {
        let Some(user) = session.user_key() else {
            return Ok(());
        };
        let key = self.keys.progress_key(&user, kind);
        self.store.remove(&key).await?;

        let current_key = self.keys.current_key(&user);
        if self.store.load(&current_key).await?.as_deref() == Some(key.as_str()) {
            self.store.remove(&current_key).await?;
        }
        Ok(())
    }

    /// Question list an attempt runs over, cloned out of the bank.
    #[must_use]
    pub fn questions_for(&self, kind: &AttemptKind) -> Vec<Question> {
        match kind {
            AttemptKind::Test(number) => self
                .bank
                .test_questions(*number)
                .map(<[Question]>::to_vec)
                .unwrap_or_default(),
            AttemptKind::DomainReview(domain) => self
                .bank
                .domain_questions(domain)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// Load and parse one record by key. Local store first; on a miss the
    /// remote copy is consulted and, when found, written back locally for
    /// offline access. A record that fails to parse counts as absent.
    pub(crate) async fn load_record(
        &self,
        key: &str,
    ) -> Result<Option<AttemptRecord>, ProgressError> {
        if let Some(raw) = self.store.load(key).await? {
            match parse_record(&raw) {
                Some(record) => return Ok(Some(record)),
                None => warn!(key, "skipping malformed progress record"),
            }
        }

        if let Some(value) = self.sync.read(collections::PROGRESS, key).await {
            if let Some(record) = serde_json::from_value::<ProgressDocument>(value.clone())
                .ok()
                .and_then(|doc| doc.into_record().ok())
            {
                self.store.save(key, &serde_json::to_string(&value)?).await?;
                return Ok(Some(record));
            }
        }

        Ok(None)
    }
}

/// Parse a raw stored document into a record; `None` for malformed data.
pub(crate) fn parse_record(raw: &str) -> Option<AttemptRecord> {
    serde_json::from_str::<ProgressDocument>(raw)
        .ok()
        .and_then(|document| document.into_record().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::NoopRemote;
    use exam_core::model::{QuestionId, Selection, TestNumber, UserProfile};
    use exam_core::time::{fixed_clock, fixed_now};
    use storage::store::MemoryStore;

    fn service(store: MemoryStore) -> ProgressService {
        let store: Arc<dyn ProgressStore> = Arc::new(store);
        let sync = SyncClient::new(
            Arc::new(NoopRemote),
            Arc::clone(&store),
            KeySpace::default(),
            fixed_clock(),
        );
        ProgressService::new(
            fixed_clock(),
            store,
            sync,
            Arc::new(QuestionBank::new(Vec::new())),
            KeySpace::default(),
        )
    }

    #[tokio::test]
    async fn save_without_identity_is_a_silent_noop() {
        let store = MemoryStore::new();
        let service = service(store.clone());

        let mut session = SessionState::new();
        session.set_current_test(Some(TestNumber::new(1)));
        session.set_answer(QuestionId::new("q1"), Selection::from_indices([0]));

        assert!(!service.save_progress(&session).await.unwrap());
        assert!(store.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_without_attempt_selection_is_a_noop() {
        let store = MemoryStore::new();
        let service = service(store.clone());

        let mut session = SessionState::new();
        session.set_identity(
            UserProfile::new("Sam", "sam@example.com", fixed_now()),
            "sam@example.com",
            "Sam",
        );
        assert!(!service.save_progress(&session).await.unwrap());
        assert!(store.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_local_record_counts_as_absent() {
        let store = MemoryStore::new();
        store
            .save("examprep-progress-sam@example.com-test1", "{not json")
            .await
            .unwrap();
        let service = service(store);

        let mut session = SessionState::new();
        session.set_identity(
            UserProfile::new("Sam", "sam@example.com", fixed_now()),
            "sam@example.com",
            "Sam",
        );
        let record = service
            .get_saved_progress(&session, &AttemptKind::Test(TestNumber::new(1)))
            .await
            .unwrap();
        assert!(record.is_none());
    }
}
