//! Construction of the persisted record keys.
//!
//! Key shapes are a compatibility surface: records written by one version
//! must stay addressable by the next, both in the on-device store and as
//! remote document ids.

use crate::model::{AttemptKind, UserKey};

/// Default namespace prefixed to every key.
pub const DEFAULT_NAMESPACE: &str = "examprep";

/// Builds every storage key used by the progress core.
///
/// All keys are partitioned by [`UserKey`] so multiple accounts can share
/// one device without mixing records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeySpace {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of the user profile record: `{ns}-user-{userKey}`.
    #[must_use]
    pub fn profile_key(&self, user: &UserKey) -> String {
        format!("{}-user-{}", self.namespace, user)
    }

    /// Key of one attempt record:
    /// `{ns}-progress-{userKey}-test{N}` or
    /// `{ns}-progress-{userKey}-domain-{Domain-Slug}`.
    #[must_use]
    pub fn progress_key(&self, user: &UserKey, kind: &AttemptKind) -> String {
        match kind {
            AttemptKind::Test(number) => {
                format!("{}-progress-{}-test{}", self.namespace, user, number)
            }
            AttemptKind::DomainReview(domain) => format!(
                "{}-progress-{}-domain-{}",
                self.namespace,
                user,
                domain_slug(domain)
            ),
        }
    }

    /// Prefix shared by every attempt record of one user; scans list keys
    /// under this.
    #[must_use]
    pub fn progress_prefix(&self, user: &UserKey) -> String {
        format!("{}-progress-{}-", self.namespace, user)
    }

    /// Pointer key naming the most recently active attempt record:
    /// `{ns}-current-progress-{userKey}`.
    #[must_use]
    pub fn current_key(&self, user: &UserKey) -> String {
        format!("{}-current-progress-{}", self.namespace, user)
    }

    /// Key of the submitted-test history: `{ns}-submitted-{userKey}`.
    #[must_use]
    pub fn submitted_key(&self, user: &UserKey) -> String {
        format!("{}-submitted-{}", self.namespace, user)
    }
}

/// Domain name as it appears inside a key: spaces become hyphens.
#[must_use]
pub fn domain_slug(domain: &str) -> String {
    domain
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestNumber;

    fn user() -> UserKey {
        UserKey::from_email("student@example.com")
    }

    #[test]
    fn key_shapes_are_stable() {
        let keys = KeySpace::default();
        let user = user();
        assert_eq!(
            keys.profile_key(&user),
            "examprep-user-student@example.com"
        );
        assert_eq!(
            keys.progress_key(&user, &AttemptKind::Test(TestNumber::new(3))),
            "examprep-progress-student@example.com-test3"
        );
        assert_eq!(
            keys.progress_key(
                &user,
                &AttemptKind::DomainReview("Design Secure Architectures".into())
            ),
            "examprep-progress-student@example.com-domain-Design-Secure-Architectures"
        );
        assert_eq!(
            keys.current_key(&user),
            "examprep-current-progress-student@example.com"
        );
        assert_eq!(
            keys.submitted_key(&user),
            "examprep-submitted-student@example.com"
        );
    }

    #[test]
    fn progress_keys_live_under_the_progress_prefix() {
        let keys = KeySpace::default();
        let user = user();
        let prefix = keys.progress_prefix(&user);
        assert!(keys
            .progress_key(&user, &AttemptKind::Test(TestNumber::new(1)))
            .starts_with(&prefix));
        assert!(keys
            .progress_key(&user, &AttemptKind::DomainReview("Storage".into()))
            .starts_with(&prefix));
        // The pointer key is deliberately outside the prefix so scans
        // never parse it as a record.
        assert!(!keys.current_key(&user).starts_with(&prefix));
    }

    #[test]
    fn domain_slug_collapses_whitespace() {
        assert_eq!(domain_slug("Design Secure  Architectures"), "Design-Secure-Architectures");
    }
}
