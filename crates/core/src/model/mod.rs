mod attempt;
mod ids;
mod profile;
mod question;
mod user_key;

pub use attempt::{AttemptKind, AttemptRecord, Mode};
pub use ids::{ParseTestNumberError, QuestionId, SourceTag, TestNumber};
pub use profile::{percentage, UserProfile, UserStats};
pub use question::{Question, QuestionBank, Selection};
pub use user_key::UserKey;
