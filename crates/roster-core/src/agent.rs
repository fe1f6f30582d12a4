//! Member records
//!
//! An `Agent` is one row of the remote directory after mapping. The
//! experience total is never stored: it is always the sum of the three
//! components, so recomputing it reproduces the visible value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Member role, ordered by privilege
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular member
    #[default]
    Student,
    /// Group leader
    Leader,
    /// Organisation director
    Director,
}

impl Role {
    /// Stable wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Leader => "LEADER",
            Role::Director => "DIRECTOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short secret material (PIN, security answer).
///
/// Never printed, wiped on drop, and skipped when an agent is persisted.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value (trimmed)
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Trimmed string equality
    #[inline]
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate.trim()
    }

    /// No secret configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expose the value to a caller that must transmit it
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// The three experience sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperienceComponents {
    /// Scripture study points
    pub biblical: u32,
    /// Participation / notes points
    pub participatory: u32,
    /// Leadership points
    pub leadership: u32,
}

impl ExperienceComponents {
    /// Create components
    #[inline]
    #[must_use]
    pub fn new(biblical: u32, participatory: u32, leadership: u32) -> Self {
        Self {
            biblical,
            participatory,
            leadership,
        }
    }

    /// Sum of all components
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.biblical) + u64::from(self.participatory) + u64::from(self.leadership)
    }
}

/// Read / deleted notification ids for one agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    /// Ids the agent has opened
    #[serde(default)]
    pub read: BTreeSet<String>,
    /// Ids the agent has dismissed
    #[serde(default)]
    pub deleted: BTreeSet<String>,
}

impl NotificationPreferences {
    /// Both sets empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.deleted.is_empty()
    }

    /// Set union, in place
    pub fn merge(&mut self, other: &NotificationPreferences) {
        self.read.extend(other.read.iter().cloned());
        self.deleted.extend(other.deleted.iter().cloned());
    }

    /// Unread badge: ids neither deleted nor read
    #[must_use]
    pub fn unread_count<'a, I>(&self, notification_ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        notification_ids
            .into_iter()
            .filter(|id| !self.deleted.contains(*id) && !self.read.contains(*id))
            .count()
    }
}

/// A member record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Identifier, matched case-insensitively
    pub id: String,
    /// Display name
    pub name: String,
    /// Avatar
    #[serde(default)]
    pub photo_url: String,
    /// Login PIN
    #[serde(skip)]
    pub secret: Secret,
    /// Experience sources
    pub experience: ExperienceComponents,
    /// Completed certificates
    #[serde(default)]
    pub certificates: u32,
    /// Current rank label
    pub rank: String,
    /// Derived role
    pub role: Role,
    /// Raw access level as reported by the directory
    #[serde(default)]
    pub access_level: String,
    /// Membership status
    #[serde(default)]
    pub status: String,
    /// Registered platform credential handle
    #[serde(default)]
    pub biometric_credential: Option<String>,
    /// Notification state mirrored on the directory
    #[serde(default)]
    pub notification_prefs: NotificationPreferences,
    /// Last attendance mark
    #[serde(default)]
    pub last_attendance: Option<String>,
    /// Security question for secret reset
    #[serde(default)]
    pub security_question: String,
    /// Security answer
    #[serde(skip)]
    pub security_answer: Secret,
    /// Directory demands a new PIN on next login
    #[serde(default)]
    pub must_change_secret: bool,
}

impl Agent {
    /// Create a bare agent
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rank: "RECLUTA".to_string(),
            ..Self::default()
        }
    }

    /// With secret
    #[inline]
    #[must_use]
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Secret::new(secret);
        self
    }

    /// With experience
    #[inline]
    #[must_use]
    pub fn with_experience(mut self, experience: ExperienceComponents) -> Self {
        self.experience = experience;
        self
    }

    /// With rank
    #[inline]
    #[must_use]
    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = rank.into();
        self
    }

    /// With certificates
    #[inline]
    #[must_use]
    pub fn with_certificates(mut self, certificates: u32) -> Self {
        self.certificates = certificates;
        self
    }

    /// With role
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// With biometric handle
    #[inline]
    #[must_use]
    pub fn with_biometric(mut self, handle: impl Into<String>) -> Self {
        self.biometric_credential = Some(handle.into());
        self
    }

    /// Derived experience total
    #[inline]
    #[must_use]
    pub fn experience_total(&self) -> u64 {
        self.experience.total()
    }

    /// Whether a platform credential is on file
    #[inline]
    #[must_use]
    pub fn has_biometric(&self) -> bool {
        self.biometric_credential
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experience_total_is_component_sum() {
        let agent = Agent::new("V-1", "Ana").with_experience(ExperienceComponents::new(40, 30, 0));
        assert_eq!(agent.experience_total(), 70);
    }

    #[test]
    fn secret_is_trimmed_and_redacted() {
        let secret = Secret::new(" 1234 ");
        assert!(secret.matches("1234"));
        assert!(secret.matches(" 1234\n"));
        assert!(!secret.matches("4321"));
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }

    #[test]
    fn secrets_are_not_persisted() {
        let agent = Agent::new("V-1", "Ana").with_secret("9999");
        let json = serde_json::to_string(&agent).unwrap();
        assert!(!json.contains("9999"));

        let back: Agent = serde_json::from_str(&json).unwrap();
        assert!(back.secret.is_empty());
    }

    #[test]
    fn empty_handle_is_not_registered() {
        let agent = Agent::new("V-1", "Ana").with_biometric("  ");
        assert!(!agent.has_biometric());
        assert!(Agent::new("V-1", "Ana").with_biometric("abc").has_biometric());
    }

    #[test]
    fn unread_excludes_read_and_deleted() {
        let mut prefs = NotificationPreferences::default();
        prefs.read.insert("n1".into());
        prefs.deleted.insert("n2".into());
        assert_eq!(prefs.unread_count(["n1", "n2", "n3"]), 1);
    }

    #[test]
    fn role_ordering_puts_director_first() {
        assert!(Role::Director > Role::Leader);
        assert!(Role::Leader > Role::Student);
    }
}
