//! User profile lifecycle: sign-in, persistence, and the confirmed reset.

use std::sync::Arc;

use tracing::warn;

use exam_core::model::{UserKey, UserProfile};
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::ProfileError;
use crate::notify::Notifier;
use crate::session_state::SessionState;
use crate::sync_client::{SyncClient, collections};
use crate::wire::ProfileDocument;

#[derive(Clone)]
pub struct ProfileService {
    clock: Clock,
    store: Arc<dyn ProgressStore>,
    sync: SyncClient,
    keys: KeySpace,
    notifier: Arc<dyn Notifier>,
}

impl ProfileService {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn ProgressStore>,
        sync: SyncClient,
        keys: KeySpace,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            store,
            sync,
            keys,
            notifier,
        }
    }

    /// Install the identity for `email` into the session.
    ///
    /// Runs the one-shot remote reconciliation first (remote profile wins
    /// on login), then loads the local profile or creates a fresh one on
    /// first authentication. Returns the profile now active.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the local store cannot be accessed.
    pub async fn sign_in(
        &self,
        session: &mut SessionState,
        email: &str,
        display_name: &str,
    ) -> Result<UserProfile, ProfileError> {
        self.sync.reconcile_profile_on_login(email).await?;

        let user = UserKey::from_email(email);
        let profile_key = self.keys.profile_key(&user);

        let profile = match self.store.load(&profile_key).await? {
            Some(raw) => match serde_json::from_str::<ProfileDocument>(&raw) {
                Ok(document) => {
                    let mut profile = document.into_profile();
                    if profile.name.is_empty() {
                        profile.name = display_name.to_string();
                    }
                    if profile.email.is_empty() {
                        profile.email = email.to_string();
                    }
                    profile
                }
                Err(err) => {
                    warn!(error = %err, "replacing malformed profile record");
                    self.create_profile(email, display_name).await?
                }
            },
            None => self.create_profile(email, display_name).await?,
        };

        let name = if profile.name.is_empty() {
            fallback_name(email, display_name)
        } else {
            profile.name.clone()
        };
        session.set_identity(profile.clone(), email, &name);
        Ok(profile)
    }

    async fn create_profile(
        &self,
        email: &str,
        display_name: &str,
    ) -> Result<UserProfile, ProfileError> {
        let profile = UserProfile::new(
            fallback_name(email, display_name),
            email,
            self.clock.now(),
        );
        self.persist(&profile).await?;
        Ok(profile)
    }

    /// Persist the session's profile locally and queue the remote write.
    /// Returns `Ok(false)` when no identity is present.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the local store cannot be written.
    pub async fn save_profile(&self, session: &SessionState) -> Result<bool, ProfileError> {
        let Some(profile) = session.profile() else {
            return Ok(false);
        };
        self.persist(profile).await?;
        Ok(true)
    }

    async fn persist(&self, profile: &UserProfile) -> Result<(), ProfileError> {
        let user = UserKey::from_email(&profile.email);
        let document = ProfileDocument::from_profile(profile);
        let raw = serde_json::to_string(&document)?;
        self.store.save(&self.keys.profile_key(&user), &raw).await?;
        self.sync.queue_write(
            collections::USERS,
            user.as_str(),
            serde_json::to_value(&document)?,
        );
        Ok(())
    }

    /// Destroy every attempt record for the authenticated identity, local
    /// and remote, and zero the profile's aggregate stats.
    ///
    /// This is the one user-initiated destructive flow, so unlike the rest
    /// of the sync surface its remote failure propagates: the caller has
    /// already confirmed the action and deserves to know it half-applied.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if local removal or the remote purge fails.
    pub async fn perform_reset(&self, session: &mut SessionState) -> Result<(), ProfileError> {
        let Some(user) = session.user_key() else {
            return Ok(());
        };

        if let Some(profile) = session.profile_mut() {
            profile.stats = exam_core::model::UserStats {
                last_activity: Some(self.clock.now()),
                ..Default::default()
            };
        }
        self.save_profile(session).await?;

        let mut removed = self.store.list_keys(&self.keys.progress_prefix(&user)).await?;
        removed.push(self.keys.current_key(&user));
        removed.push(self.keys.submitted_key(&user));
        for key in &removed {
            self.store.remove(key).await?;
        }

        let outcome = self.sync.purge(collections::PROGRESS, &removed).await;
        session.reset_test_state();

        match outcome {
            Ok(()) => {
                self.notifier.notify("All progress data has been reset.");
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify("Progress was reset on this device, but the remote copy could not be cleared.");
                Err(err.into())
            }
        }
    }
}

fn fallback_name(email: &str, display_name: &str) -> String {
    if !display_name.is_empty() {
        return display_name.to_string();
    }
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use crate::remote::MemoryRemote;
    use exam_core::time::fixed_clock;
    use serde_json::json;
    use storage::store::MemoryStore;

    fn service(remote: MemoryRemote, store: MemoryStore) -> ProfileService {
        let store: Arc<dyn ProgressStore> = Arc::new(store);
        let sync = SyncClient::new(
            Arc::new(remote),
            Arc::clone(&store),
            KeySpace::default(),
            fixed_clock(),
        );
        ProfileService::new(
            fixed_clock(),
            store,
            sync,
            KeySpace::default(),
            Arc::new(NoopNotifier),
        )
    }

    #[tokio::test]
    async fn first_sign_in_creates_a_zeroed_profile() {
        let service = service(MemoryRemote::new(), MemoryStore::new());
        let mut session = SessionState::new();

        let profile = service
            .sign_in(&mut session, "sam@example.com", "Sam")
            .await
            .unwrap();

        assert_eq!(profile.name, "Sam");
        assert_eq!(profile.stats.total_questions_answered, 0);
        assert_eq!(session.user_email(), Some("sam@example.com"));
    }

    #[tokio::test]
    async fn sign_in_prefers_the_remote_profile() {
        let remote = MemoryRemote::new();
        remote.seed(
            "users",
            "sam@example.com",
            json!({
                "name": "Sam (desk)",
                "email": "sam@example.com",
                "createdAt": "2024-01-01T00:00:00Z",
                "stats": {
                    "totalQuestionsAnswered": 12,
                    "totalCorrectAnswers": 9,
                    "testsCompleted": 1,
                    "domainsPracticed": ["Storage"],
                    "questionsAnswered": ["test1-q1"]
                }
            }),
        );
        let store = MemoryStore::new();
        // Stale local copy that the login reconciliation must overwrite.
        store
            .save(
                "examprep-user-sam@example.com",
                r#"{"name":"Sam","email":"sam@example.com","createdAt":"2024-01-01T00:00:00Z","stats":{}}"#,
            )
            .await
            .unwrap();

        let service = service(remote, store);
        let mut session = SessionState::new();
        let profile = service
            .sign_in(&mut session, "sam@example.com", "Sam")
            .await
            .unwrap();

        assert_eq!(profile.name, "Sam (desk)");
        assert_eq!(profile.stats.total_questions_answered, 12);
        assert_eq!(profile.stats.tests_completed, 1);
    }

    #[tokio::test]
    async fn sign_in_falls_back_to_the_email_local_part() {
        let service = service(MemoryRemote::new(), MemoryStore::new());
        let mut session = SessionState::new();
        let profile = service
            .sign_in(&mut session, "kim@example.com", "")
            .await
            .unwrap();
        assert_eq!(profile.name, "kim");
    }
}
