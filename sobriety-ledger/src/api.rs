//! Request façade: commands in, tagged replies out
//!
//! A request is an [`Envelope`] carrying an optional caller id and a
//! [`Command`]. On the wire (JSON):
//!
//! ```text
//! {"caller": null, "command": {"method": "mintTokens", "params": {"userId": "…", "amount": 50}}}
//! ```
//!
//! Every domain outcome becomes a [`Reply`]: `{"Ok": …}` or
//! `{"Err": {"NotFound": "…"}}`. Store and actor failures are not replies;
//! they surface as `Err` from [`Dispatcher::dispatch`].

use crate::{
    auth::{self, Admission},
    error::{Error, ErrorKind, Result},
    storage::RecordStoreExt,
    types::{EntityId, Milestone, MilestonePayload, Reward, RewardPayload, Transaction, User, UserPayload},
    validation::parse_id,
    Ledger,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// One ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Command {
    /// Register a user
    AddUser(UserPayload),
    /// Fetch a user
    GetUser {
        /// User id
        id: String,
    },
    /// Every user
    ListUsers,
    /// Add a milestone
    AddMilestone(MilestonePayload),
    /// Fetch a milestone
    GetMilestone {
        /// Milestone id
        id: String,
    },
    /// Every milestone
    ListMilestones,
    /// Add a reward
    AddReward(RewardPayload),
    /// Fetch a reward
    GetReward {
        /// Reward id
        id: String,
    },
    /// Every reward
    ListRewards,
    /// Credit new tokens
    #[serde(rename_all = "camelCase")]
    MintTokens {
        /// Credited user
        user_id: String,
        /// Token amount
        amount: u64,
    },
    /// Move tokens between users
    #[serde(rename_all = "camelCase")]
    TransferTokens {
        /// Debited user
        from_user_id: String,
        /// Credited user
        to_user_id: String,
        /// Token amount
        amount: u64,
    },
    /// Spend tokens on a reward
    #[serde(rename_all = "camelCase")]
    RedeemReward {
        /// Redeeming user
        user_id: String,
        /// Reward to redeem
        reward_id: String,
    },
    /// Claim newly reached milestones
    #[serde(rename_all = "camelCase")]
    CheckAndRewardMilestones {
        /// User to evaluate
        user_id: String,
    },
    /// Fetch a transaction
    GetTransaction {
        /// Transaction id
        id: String,
    },
    /// Transactions involving a user
    #[serde(rename_all = "camelCase")]
    ListTransactions {
        /// User id
        user_id: String,
    },
}

impl Command {
    /// Wire name of the command
    pub fn method(&self) -> &'static str {
        match self {
            Command::AddUser(_) => "addUser",
            Command::GetUser { .. } => "getUser",
            Command::ListUsers => "listUsers",
            Command::AddMilestone(_) => "addMilestone",
            Command::GetMilestone { .. } => "getMilestone",
            Command::ListMilestones => "listMilestones",
            Command::AddReward(_) => "addReward",
            Command::GetReward { .. } => "getReward",
            Command::ListRewards => "listRewards",
            Command::MintTokens { .. } => "mintTokens",
            Command::TransferTokens { .. } => "transferTokens",
            Command::RedeemReward { .. } => "redeemReward",
            Command::CheckAndRewardMilestones { .. } => "checkAndRewardMilestones",
            Command::GetTransaction { .. } => "getTransaction",
            Command::ListTransactions { .. } => "listTransactions",
        }
    }
}

/// Command plus the id of the user issuing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Calling user, required when roles are enforced
    #[serde(default)]
    pub caller: Option<String>,

    /// Operation to run
    pub command: Command,
}

impl Envelope {
    /// Envelope without a caller
    pub fn anonymous(command: Command) -> Self {
        Self {
            caller: None,
            command,
        }
    }

    /// Envelope issued by `caller`
    pub fn from_caller(caller: impl Into<String>, command: Command) -> Self {
        Self {
            caller: Some(caller.into()),
            command,
        }
    }
}

/// Successful result of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// One user
    User(User),
    /// Many users
    Users(Vec<User>),
    /// One milestone
    Milestone(Milestone),
    /// Many milestones
    Milestones(Vec<Milestone>),
    /// One reward
    Reward(Reward),
    /// Many rewards
    Rewards(Vec<Reward>),
    /// One transaction
    Transaction(Transaction),
    /// Many transactions
    Transactions(Vec<Transaction>),
    /// Newly claimed milestone ids
    Claimed(Vec<EntityId>),
}

/// Caller-facing error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Bad input
    InvalidPayload(String),
    /// Unknown id
    NotFound(String),
    /// Role check failed
    Unauthorized(String),
}

impl Message {
    /// Build from a domain error; `None` for fatal errors
    pub fn from_error(err: &Error) -> Option<Self> {
        let text = err.to_string();
        err.kind().map(|kind| match kind {
            ErrorKind::InvalidPayload => Message::InvalidPayload(text),
            ErrorKind::NotFound => Message::NotFound(text),
            ErrorKind::Unauthorized => Message::Unauthorized(text),
        })
    }
}

/// Tagged result of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reply {
    /// Command succeeded
    Ok(Outcome),
    /// Command was rejected
    Err(Message),
}

impl Reply {
    /// True for `Ok`
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// Rejection for input that could not be parsed into an envelope
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        Reply::Err(Message::InvalidPayload(format!(
            "Malformed request: {}",
            reason
        )))
    }
}

/// Runs envelopes against a ledger, enforcing roles when configured
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ledger: Arc<Ledger>,
    enforce_roles: bool,
}

impl Dispatcher {
    /// Dispatcher over `ledger`
    pub fn new(ledger: Arc<Ledger>, enforce_roles: bool) -> Self {
        Self {
            ledger,
            enforce_roles,
        }
    }

    /// Underlying ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Run one envelope. Domain errors become `Reply::Err`; fatal errors are
    /// returned as `Err`.
    pub fn dispatch(&self, envelope: Envelope) -> Result<Reply> {
        let method = envelope.command.method();
        let result = self
            .check_caller(&envelope)
            .and_then(|admission| self.execute(envelope.command, admission));

        match result {
            Ok(outcome) => Ok(Reply::Ok(outcome)),
            Err(err) => match Message::from_error(&err) {
                Some(message) => {
                    warn!(method, error = %err, "Command rejected");
                    Ok(Reply::Err(message))
                }
                None => Err(err),
            },
        }
    }

    fn check_caller(&self, envelope: &Envelope) -> Result<Admission> {
        if !self.enforce_roles {
            return Ok(Admission::Granted);
        }

        let caller = match &envelope.caller {
            Some(raw) => {
                let id = parse_id("caller", raw)?;
                let user = self
                    .ledger
                    .store()
                    .get::<User>(&id)?
                    .ok_or_else(|| Error::Unauthorized(format!("unknown caller {}", id)))?;
                Some(user)
            }
            None => None,
        };

        auth::authorize(&auth::requirement(&envelope.command), caller.as_ref())
    }

    fn execute(&self, command: Command, admission: Admission) -> Result<Outcome> {
        let ledger = &self.ledger;
        let outcome = match command {
            Command::AddUser(payload) => match admission {
                Admission::Granted => Outcome::User(ledger.add_user(payload)?),
                Admission::FirstUserOnly => Outcome::User(ledger.bootstrap_user(payload)?),
            },
            Command::GetUser { id } => Outcome::User(ledger.get_user(&id)?),
            Command::ListUsers => Outcome::Users(ledger.list_users()?),
            Command::AddMilestone(payload) => Outcome::Milestone(ledger.add_milestone(payload)?),
            Command::GetMilestone { id } => Outcome::Milestone(ledger.get_milestone(&id)?),
            Command::ListMilestones => Outcome::Milestones(ledger.list_milestones()?),
            Command::AddReward(payload) => Outcome::Reward(ledger.add_reward(payload)?),
            Command::GetReward { id } => Outcome::Reward(ledger.get_reward(&id)?),
            Command::ListRewards => Outcome::Rewards(ledger.list_rewards()?),
            Command::MintTokens { user_id, amount } => {
                Outcome::Transaction(ledger.mint_tokens(&user_id, amount)?)
            }
            Command::TransferTokens {
                from_user_id,
                to_user_id,
                amount,
            } => Outcome::Transaction(ledger.transfer_tokens(&from_user_id, &to_user_id, amount)?),
            Command::RedeemReward { user_id, reward_id } => {
                Outcome::Transaction(ledger.redeem_reward(&user_id, &reward_id)?)
            }
            Command::CheckAndRewardMilestones { user_id } => {
                Outcome::Claimed(ledger.check_and_reward_milestones(&user_id)?)
            }
            Command::GetTransaction { id } => Outcome::Transaction(ledger.get_transaction(&id)?),
            Command::ListTransactions { user_id } => {
                Outcome::Transactions(ledger.list_transactions(&user_id)?)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn dispatcher(enforce_roles: bool) -> Dispatcher {
        let ledger = Arc::new(Ledger::new(Arc::new(MemoryStorage::new())).unwrap());
        Dispatcher::new(ledger, enforce_roles)
    }

    fn created_user(reply: Reply) -> User {
        match reply {
            Reply::Ok(Outcome::User(user)) => user,
            other => panic!("expected a user, got {:?}", other),
        }
    }

    #[test]
    fn test_command_json_shape() {
        let envelope: Envelope = serde_json::from_value(json!({
            "caller": null,
            "command": {
                "method": "transferTokens",
                "params": {
                    "fromUserId": "a",
                    "toUserId": "b",
                    "amount": 7
                }
            }
        }))
        .unwrap();
        assert_eq!(
            envelope.command,
            Command::TransferTokens {
                from_user_id: "a".into(),
                to_user_id: "b".into(),
                amount: 7
            }
        );

        let add: Command = serde_json::from_value(json!({
            "method": "addMilestone",
            "params": {"durationInDays": 30, "tokenReward": 100, "description": "30 days"}
        }))
        .unwrap();
        assert_eq!(add.method(), "addMilestone");
    }

    #[test]
    fn test_reply_json_shape() {
        let d = dispatcher(false);
        let reply = d
            .dispatch(Envelope::anonymous(Command::GetUser {
                id: "not-a-uuid".into(),
            }))
            .unwrap();
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            value,
            json!({"Err": {"InvalidPayload": "id=\"not-a-uuid\" is not in the valid uuid format."}})
        );

        let reply = d
            .dispatch(Envelope::anonymous(Command::AddUser(UserPayload {
                name: "Sam".into(),
                roles: vec![],
            })))
            .unwrap();
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["Ok"]["name"], "Sam");
        assert_eq!(value["Ok"]["tokens"], 0);
    }

    #[test]
    fn test_claimed_reply_is_a_list() {
        let d = dispatcher(false);
        let user = created_user(
            d.dispatch(Envelope::anonymous(Command::AddUser(UserPayload {
                name: "Sam".into(),
                roles: vec![],
            })))
            .unwrap(),
        );
        let reply = d
            .dispatch(Envelope::anonymous(Command::CheckAndRewardMilestones {
                user_id: user.id.to_string(),
            }))
            .unwrap();
        assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"Ok": []}));
    }

    #[test]
    fn test_roles_enforced() {
        let d = dispatcher(true);

        // First user bootstraps without a caller
        let admin = created_user(
            d.dispatch(Envelope::anonymous(Command::AddUser(UserPayload {
                name: "Admin".into(),
                roles: vec!["admin".into()],
            })))
            .unwrap(),
        );

        // Afterwards only admins add users
        let reply = d
            .dispatch(Envelope::anonymous(Command::AddUser(UserPayload {
                name: "Eve".into(),
                roles: vec!["admin".into()],
            })))
            .unwrap();
        assert!(matches!(reply, Reply::Err(Message::Unauthorized(_))));

        let member = created_user(
            d.dispatch(Envelope::from_caller(
                admin.id.to_string(),
                Command::AddUser(UserPayload {
                    name: "Member".into(),
                    roles: vec![],
                }),
            ))
            .unwrap(),
        );

        // Members cannot mint for themselves
        let mint = Command::MintTokens {
            user_id: member.id.to_string(),
            amount: 10,
        };
        let reply = d
            .dispatch(Envelope::from_caller(member.id.to_string(), mint.clone()))
            .unwrap();
        assert!(matches!(reply, Reply::Err(Message::Unauthorized(_))));

        let reply = d
            .dispatch(Envelope::from_caller(admin.id.to_string(), mint))
            .unwrap();
        assert!(reply.is_ok());

        // Members may redeem/claim for themselves
        let reply = d
            .dispatch(Envelope::from_caller(
                member.id.to_string(),
                Command::CheckAndRewardMilestones {
                    user_id: member.id.to_string(),
                },
            ))
            .unwrap();
        assert!(reply.is_ok());

        // Unknown caller
        let reply = d
            .dispatch(Envelope::from_caller(
                "0b6c2e4e-8f59-4d1c-9a38-1f0e5c7d2a11",
                Command::ListRewards,
            ))
            .unwrap();
        assert!(matches!(reply, Reply::Err(Message::Unauthorized(_))));
    }

    #[test]
    fn test_concurrent_anonymous_bootstrap_admits_one() {
        use std::sync::Barrier;
        use std::thread;

        const THREADS: usize = 8;

        for _ in 0..50 {
            let d = dispatcher(true);
            let barrier = Arc::new(Barrier::new(THREADS));

            let workers: Vec<_> = (0..THREADS)
                .map(|i| {
                    let d = d.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        d.dispatch(Envelope::anonymous(Command::AddUser(UserPayload {
                            name: format!("admin-{}", i),
                            roles: vec!["admin".into()],
                        })))
                        .unwrap()
                    })
                })
                .collect();

            let admitted = workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .filter(Reply::is_ok)
                .count();

            assert_eq!(admitted, 1);
            assert_eq!(d.ledger().list_users().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_malformed_reply() {
        let reply = Reply::malformed("expected value at line 1 column 1");
        assert!(matches!(reply, Reply::Err(Message::InvalidPayload(_))));
    }
}
