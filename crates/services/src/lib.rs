#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod notify;
pub mod profile_service;
pub mod progress_service;
pub mod remote;
pub mod results_service;
pub mod resume_service;
pub mod session_state;
pub mod stats_service;
pub mod sync_client;
pub mod wire;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProfileError, ProgressError, SyncError};
pub use notify::{NoopNotifier, Notifier};
pub use profile_service::ProfileService;
pub use progress_service::ProgressService;
pub use remote::{
    HttpRemoteStore, MemoryRemote, NoopRemote, QueuedWrite, RemoteConfig, RemoteStore,
    remote_from_env,
};
pub use results_service::{
    PASSING_SCORE_PERCENT, DomainScore, ResultsService, ScoreSummary, SubmittedTest,
    domain_breakdown, score_summary,
};
pub use resume_service::{ProgressDetails, ResumeService, format_last_accessed};
pub use session_state::{SessionState, TEST_DURATION_MINUTES, test_duration};
pub use stats_service::{DomainStats, Insights, StatsService};
pub use sync_client::{SAVE_DEBOUNCE, SyncClient, collections};
pub use wire::{ProfileDocument, ProgressDocument, StatsDocument, WireError};
