use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// -- Friend requests --

/// Lifecycle of a friend request. `Pending` is the only state that can move;
/// `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// What the recipient decided to do with a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("friend request already {0}")]
pub struct AlreadyResolved(pub FriendRequestStatus);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownVariant(pub String);

impl FriendRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Apply a decision. Only pending requests can be resolved, and a
    /// resolved request never moves again.
    pub fn resolve(self, decision: Decision) -> Result<Self, AlreadyResolved> {
        match (self, decision) {
            (Self::Pending, Decision::Accept) => Ok(Self::Accepted),
            (Self::Pending, Decision::Reject) => Ok(Self::Rejected),
            (done, _) => Err(AlreadyResolved(done)),
        }
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendRequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Which side of a friend request the viewer is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

// -- Presence --

/// Presence is an append-only event log; online state is derived from the
/// latest event rather than stored as a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    Login,
    Logout,
}

impl PresenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

impl FromStr for PresenceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "logout" => Ok(Self::Logout),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl Presence {
    /// Derive presence from the member's most recent event. Members who never
    /// logged in are offline and were last seen when they joined.
    pub fn derive(latest: Option<(PresenceKind, DateTime<Utc>)>, date_joined: DateTime<Utc>) -> Self {
        match latest {
            Some((kind, at)) => Self {
                online: kind == PresenceKind::Login,
                last_seen: at,
            },
            None => Self {
                online: false,
                last_seen: date_joined,
            },
        }
    }
}

// -- Listing filters --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum MemberOrdering {
    #[serde(rename = "date_joined")]
    DateJoined,
    #[default]
    #[serde(rename = "-date_joined")]
    DateJoinedDesc,
    #[serde(rename = "username")]
    Username,
    #[serde(rename = "-username")]
    UsernameDesc,
}

impl MemberOrdering {
    /// ORDER BY clause for the members table aliased as `m`.
    pub fn order_by(self) -> &'static str {
        match self {
            Self::DateJoined => "m.date_joined ASC, m.rowid ASC",
            Self::DateJoinedDesc => "m.date_joined DESC, m.rowid DESC",
            Self::Username => "m.username ASC",
            Self::UsernameDesc => "m.username DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionSide {
    /// Members the subject follows.
    #[default]
    Following,
    /// Members following the subject.
    Followers,
}
