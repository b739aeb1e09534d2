use std::sync::Arc;

use exam_core::model::QuestionBank;
use exam_core::{Clock, KeySpace};
use storage::sqlite::SqliteStore;
use storage::store::ProgressStore;

use crate::error::AppServicesError;
use crate::notify::Notifier;
use crate::profile_service::ProfileService;
use crate::progress_service::ProgressService;
use crate::remote::RemoteStore;
use crate::results_service::ResultsService;
use crate::resume_service::ResumeService;
use crate::stats_service::StatsService;
use crate::sync_client::SyncClient;

/// Assembles the progress core's services over one store, one remote and
/// one clock.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    resume: Arc<ResumeService>,
    stats: Arc<StatsService>,
    results: Arc<ResultsService>,
    profiles: Arc<ProfileService>,
    sync: SyncClient,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        bank: Arc<QuestionBank>,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppServicesError> {
        let store = SqliteStore::open(db_url).await?;
        Ok(Self::assemble(Arc::new(store), clock, bank, remote, notifier))
    }

    /// Wire the services over an already-open store.
    #[must_use]
    pub fn assemble(
        store: Arc<dyn ProgressStore>,
        clock: Clock,
        bank: Arc<QuestionBank>,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let keys = KeySpace::default();
        let sync = SyncClient::new(remote, Arc::clone(&store), keys.clone(), clock);

        let profiles = Arc::new(ProfileService::new(
            clock,
            Arc::clone(&store),
            sync.clone(),
            keys.clone(),
            notifier,
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&store),
            sync.clone(),
            Arc::clone(&bank),
            keys.clone(),
        ));
        let resume = Arc::new(ResumeService::new(
            clock,
            Arc::clone(&store),
            sync.clone(),
            Arc::clone(&bank),
            keys.clone(),
        ));
        let stats = Arc::new(StatsService::new(
            clock,
            Arc::clone(&store),
            Arc::clone(&bank),
            keys.clone(),
            Arc::clone(&profiles),
        ));
        let results = Arc::new(ResultsService::new(
            clock,
            store,
            keys,
            Arc::clone(&profiles),
            Arc::clone(&progress),
        ));

        Self {
            progress,
            resume,
            stats,
            results,
            profiles,
            sync,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn resume(&self) -> Arc<ResumeService> {
        Arc::clone(&self.resume)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsService> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn results(&self) -> Arc<ResultsService> {
        Arc::clone(&self.results)
    }

    #[must_use]
    pub fn profiles(&self) -> Arc<ProfileService> {
        Arc::clone(&self.profiles)
    }

    #[must_use]
    pub fn sync(&self) -> SyncClient {
        self.sync.clone()
    }

    /// Best-effort teardown flush of whatever writes are still queued.
    /// Callers fire this on shutdown without blocking on its outcome.
    pub async fn shutdown(&self) {
        self.sync.flush().await;
    }
}
