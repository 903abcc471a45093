//! Core record types for the ledger
//!
//! Records are serialized with `bincode` inside the store and with camelCase
//! field names when rendered as JSON by the request façade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Nanoseconds per day
pub const NANOS_PER_DAY: u64 = 86_400 * 1_000_000_000;

/// Identifier of a user, milestone, reward or transaction.
///
/// Always holds the canonical lowercase hyphenated UUID form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(Uuid);

impl EntityId {
    /// Wrap a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse the `8-4-4-4-12` hex shape. Other UUID spellings (simple,
    /// braced, URN) are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 36 {
            return None;
        }
        for (i, b) in bytes.iter().enumerate() {
            let ok = match i {
                8 | 13 | 18 | 23 => *b == b'-',
                _ => b.is_ascii_hexdigit(),
            };
            if !ok {
                return None;
            }
        }
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Store key (canonical lowercase form)
    pub fn to_key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        EntityId::parse(&value).ok_or_else(|| format!("'{}' is not a valid uuid", value))
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// Role tag carried by a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Program member
    User,
    /// Verifies sobriety claims and mints tokens
    Validator,
    /// Manages the catalogue and other users
    Admin,
}

impl Role {
    /// Tag as written on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Validator => "validator",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "validator" => Ok(Role::Validator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("role='{}' is not a known role.", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique id
    pub id: EntityId,

    /// Display name (non-empty)
    pub name: String,

    /// Start of the sobriety period (nanoseconds since Unix epoch)
    pub sobriety_date: u64,

    /// Token balance
    pub tokens: u64,

    /// Milestones already rewarded, in claim order
    pub claimed_milestones: Vec<EntityId>,

    /// Role tags
    pub roles: BTreeSet<Role>,
}

impl User {
    /// Time sober at `now`, in nanoseconds
    pub fn elapsed_sober(&self, now: u64) -> u64 {
        now.saturating_sub(self.sobriety_date)
    }

    /// Check whether a milestone was already rewarded
    pub fn has_claimed(&self, milestone_id: &EntityId) -> bool {
        self.claimed_milestones.contains(milestone_id)
    }

    /// Check role membership
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Sobriety-duration threshold with a one-time token reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    /// Unique id
    pub id: EntityId,

    /// Required sobriety duration in days (> 0)
    pub duration_in_days: u64,

    /// Tokens granted on claim (> 0)
    pub token_reward: u64,

    /// Human-readable description
    pub description: String,
}

impl Milestone {
    /// Required duration in nanoseconds
    pub fn required_duration(&self) -> u64 {
        self.duration_in_days.saturating_mul(NANOS_PER_DAY)
    }

    /// A milestone is reached once elapsed time strictly exceeds the threshold
    pub fn is_reached(&self, elapsed: u64) -> bool {
        elapsed > self.required_duration()
    }
}

/// Catalogued reward redeemable for tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    /// Unique id
    pub id: EntityId,

    /// Price in tokens
    pub token_cost: u64,

    /// Human-readable description
    pub description: String,

    /// Remaining redemptions
    pub availability: u64,
}

/// What a transaction recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    /// Tokens created for a user
    Mint,
    /// Tokens moved between users
    Transfer,
    /// Tokens spent on a reward
    #[serde(rename_all = "camelCase")]
    Redemption {
        /// Redeemed reward
        reward_id: EntityId,
    },
    /// Tokens granted for a milestone
    #[serde(rename_all = "camelCase")]
    MilestoneReward {
        /// Claimed milestone
        milestone_id: EntityId,
    },
}

/// Audit record of a balance change. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique id
    pub id: EntityId,

    /// Kind of balance change
    pub kind: TransactionKind,

    /// Debited user (absent for minted tokens)
    pub from_user_id: Option<EntityId>,

    /// Credited user (absent for redemptions)
    pub to_user_id: Option<EntityId>,

    /// Token amount
    pub amount: u64,

    /// Commit time (nanoseconds since Unix epoch)
    pub timestamp: u64,
}

impl Transaction {
    /// Check whether the user is on either side of the transaction
    pub fn involves(&self, user_id: &EntityId) -> bool {
        self.from_user_id.as_ref() == Some(user_id) || self.to_user_id.as_ref() == Some(user_id)
    }
}

/// Input for `add_user`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    /// Display name
    pub name: String,

    /// Role tags; empty means `user`
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Input for `add_milestone`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonePayload {
    /// Required sobriety duration in days
    pub duration_in_days: u64,

    /// Tokens granted on claim
    pub token_reward: u64,

    /// Human-readable description
    pub description: String,
}

/// Input for `add_reward`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPayload {
    /// Price in tokens
    pub token_cost: u64,

    /// Human-readable description
    pub description: String,

    /// Number of redemptions on offer
    pub availability: u64,
}
