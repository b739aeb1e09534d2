use std::fmt;

/// Storage partition key derived from an authenticated email address.
///
/// Derivation: lowercase the email, then replace every character outside
/// `[a-z0-9@.-]` with `-`. The function is pure and deterministic so the
/// same account converges on the same records from any device.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(String);

impl UserKey {
    #[must_use]
    pub fn from_email(email: &str) -> Self {
        let key = email
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '@' | '.' | '-' => c,
                _ => '-',
            })
            .collect();
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserKey({})", self.0)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
