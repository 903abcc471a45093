//! Token and milestone ledger
//!
//! Every operation reads the records it needs, validates, and then commits
//! all of its writes in one [`Batch`]. Mutations hold the ledger's write
//! guard from the first read to the commit, so no caller can observe a
//! half-applied transfer, redemption or milestone claim.
//!
//! # Example
//!
//! ```no_run
//! use sobriety_ledger::{Ledger, MemoryStorage, MilestonePayload, UserPayload};
//! use std::sync::Arc;
//!
//! # fn main() -> sobriety_ledger::Result<()> {
//! let ledger = Ledger::new(Arc::new(MemoryStorage::new()))?;
//!
//! let user = ledger.add_user(UserPayload { name: "Sam".into(), roles: vec![] })?;
//! ledger.add_milestone(MilestonePayload {
//!     duration_in_days: 30,
//!     token_reward: 100,
//!     description: "30 days".into(),
//! })?;
//!
//! let claimed = ledger.check_and_reward_milestones(&user.id.to_string())?;
//! assert!(claimed.is_empty()); // nothing reached on day zero
//! # Ok(())
//! # }
//! ```

use crate::{
    clock::{Clock, SystemClock},
    config::{Config, StorageBackend},
    error::{Error, Result},
    id::{IdGenerator, UuidGenerator},
    metrics::Metrics,
    storage::{Batch, MemoryStorage, Record, RecordStore, RecordStoreExt, RocksStorage},
    types::{
        EntityId, Milestone, MilestonePayload, Reward, RewardPayload, Transaction,
        TransactionKind, User, UserPayload,
    },
    validation::{self, parse_id},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Main ledger interface
pub struct Ledger {
    /// Record store
    store: Arc<dyn RecordStore>,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Identifier source
    ids: Arc<dyn IdGenerator>,

    /// Counters
    metrics: Metrics,

    /// Serializes mutations
    write_guard: Mutex<()>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Ledger over `store` with the wall clock and random v4 ids
    pub fn new(store: Arc<dyn RecordStore>) -> Result<Self> {
        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            metrics: Metrics::new()?,
            write_guard: Mutex::new(()),
        })
    }

    /// Open the store selected by `config`
    pub fn open(config: &Config) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::RocksDb => Arc::new(RocksStorage::open(&config.storage)?),
        };
        info!(
            service = %config.service_name,
            version = %config.service_version,
            backend = ?config.storage.backend,
            "Ledger opened"
        );
        Self::new(store)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the identifier source
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Counters for this ledger
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying record store
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    // User registry

    /// Register a user with a zero balance and a sobriety date of now
    pub fn add_user(&self, payload: UserPayload) -> Result<User> {
        self.observe(self.insert_user(payload, false))
    }

    /// Register the first user. Fails with `Unauthorized` once any user
    /// exists; the emptiness check and the insert share one critical section.
    pub fn bootstrap_user(&self, payload: UserPayload) -> Result<User> {
        self.observe(self.insert_user(payload, true))
    }

    fn insert_user(&self, payload: UserPayload, only_if_empty: bool) -> Result<User> {
        let (name, roles) = validation::validate_user(&payload)?;

        let user = User {
            id: self.ids.next_id(),
            name,
            sobriety_date: self.clock.now_nanos(),
            tokens: 0,
            claimed_milestones: Vec::new(),
            roles,
        };

        let _guard = self.write_guard.lock();
        if only_if_empty && !self.store.list::<User>()?.is_empty() {
            return Err(Error::Unauthorized(
                "caller is required once users exist".to_string(),
            ));
        }
        self.store.insert(&user)?;
        self.metrics.users_total.inc();

        info!(user_id = %user.id, roles = ?user.roles, "User added");
        Ok(user)
    }

    /// Fetch a user
    pub fn get_user(&self, id: &str) -> Result<User> {
        let id = self.observe(parse_id("id", id))?;
        self.observe(self.load::<User>(&id))
    }

    /// Every user, in key order
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.store.list::<User>()
    }

    // Milestone registry

    /// Add a milestone to the catalogue
    pub fn add_milestone(&self, payload: MilestonePayload) -> Result<Milestone> {
        self.observe(validation::validate_milestone(&payload))?;

        let milestone = Milestone {
            id: self.ids.next_id(),
            duration_in_days: payload.duration_in_days,
            token_reward: payload.token_reward,
            description: payload.description.trim().to_string(),
        };

        let _guard = self.write_guard.lock();
        self.store.insert(&milestone)?;
        self.metrics.milestones_total.inc();

        info!(
            milestone_id = %milestone.id,
            duration_in_days = milestone.duration_in_days,
            token_reward = milestone.token_reward,
            "Milestone added"
        );
        Ok(milestone)
    }

    /// Fetch a milestone
    pub fn get_milestone(&self, id: &str) -> Result<Milestone> {
        let id = self.observe(parse_id("id", id))?;
        self.observe(self.load::<Milestone>(&id))
    }

    /// Every milestone, in key order
    pub fn list_milestones(&self) -> Result<Vec<Milestone>> {
        self.store.list::<Milestone>()
    }

    // Reward catalogue

    /// Add a reward to the catalogue
    pub fn add_reward(&self, payload: RewardPayload) -> Result<Reward> {
        self.observe(validation::validate_reward(&payload))?;

        let reward = Reward {
            id: self.ids.next_id(),
            token_cost: payload.token_cost,
            description: payload.description.trim().to_string(),
            availability: payload.availability,
        };

        let _guard = self.write_guard.lock();
        self.store.insert(&reward)?;
        self.metrics.rewards_total.inc();

        info!(
            reward_id = %reward.id,
            token_cost = reward.token_cost,
            availability = reward.availability,
            "Reward added"
        );
        Ok(reward)
    }

    /// Fetch a reward
    pub fn get_reward(&self, id: &str) -> Result<Reward> {
        let id = self.observe(parse_id("id", id))?;
        self.observe(self.load::<Reward>(&id))
    }

    /// Every reward, in key order
    pub fn list_rewards(&self) -> Result<Vec<Reward>> {
        self.store.list::<Reward>()
    }

    // Token ledger

    /// Credit `amount` new tokens to a user. A zero amount leaves the balance
    /// unchanged but is still recorded.
    pub fn mint_tokens(&self, user_id: &str, amount: u64) -> Result<Transaction> {
        self.observe(self.mint_inner(user_id, amount))
    }

    fn mint_inner(&self, user_id: &str, amount: u64) -> Result<Transaction> {
        let user_id = parse_id("userId", user_id)?;

        let _guard = self.write_guard.lock();
        let mut user = self.load::<User>(&user_id)?;
        user.tokens = credit(user.tokens, amount)?;

        let transaction = self.transaction(TransactionKind::Mint, None, Some(user_id), amount);
        let mut batch = Batch::new();
        batch.put(&user)?;
        batch.put(&transaction)?;
        self.store.commit(batch)?;
        self.metrics.record_minted(amount);

        info!(user_id = %user_id, amount, balance = user.tokens, "Tokens minted");
        Ok(transaction)
    }

    /// Move tokens between two distinct users
    pub fn transfer_tokens(&self, from_id: &str, to_id: &str, amount: u64) -> Result<Transaction> {
        self.observe(self.transfer_inner(from_id, to_id, amount))
    }

    fn transfer_inner(&self, from_id: &str, to_id: &str, amount: u64) -> Result<Transaction> {
        let from_id = parse_id("fromUserId", from_id)?;
        let to_id = parse_id("toUserId", to_id)?;
        if from_id == to_id {
            return Err(Error::InvalidPayload(format!(
                "Cannot transfer tokens from user {} to itself",
                from_id
            )));
        }

        let _guard = self.write_guard.lock();
        let mut from = self.load::<User>(&from_id)?;
        let mut to = self.load::<User>(&to_id)?;

        if from.tokens < amount {
            return Err(Error::InsufficientTokens {
                required: amount,
                available: from.tokens,
            });
        }
        to.tokens = credit(to.tokens, amount)?;
        from.tokens -= amount;

        let transaction =
            self.transaction(TransactionKind::Transfer, Some(from_id), Some(to_id), amount);
        let mut batch = Batch::new();
        batch.put(&from)?;
        batch.put(&to)?;
        batch.put(&transaction)?;
        self.store.commit(batch)?;
        self.metrics.record_transfer(amount);

        info!(
            from_user_id = %from_id,
            to_user_id = %to_id,
            amount,
            "Tokens transferred"
        );
        Ok(transaction)
    }

    /// Spend a user's tokens on a reward
    pub fn redeem_reward(&self, user_id: &str, reward_id: &str) -> Result<Transaction> {
        self.observe(self.redeem_inner(user_id, reward_id))
    }

    fn redeem_inner(&self, user_id: &str, reward_id: &str) -> Result<Transaction> {
        let user_id = parse_id("userId", user_id)?;
        let reward_id = parse_id("rewardId", reward_id)?;

        let _guard = self.write_guard.lock();
        let mut user = self.load::<User>(&user_id)?;
        let mut reward = self.load::<Reward>(&reward_id)?;

        if user.tokens < reward.token_cost {
            return Err(Error::InsufficientTokens {
                required: reward.token_cost,
                available: user.tokens,
            });
        }
        if reward.availability == 0 {
            return Err(Error::RewardUnavailable(reward_id));
        }
        user.tokens -= reward.token_cost;
        reward.availability -= 1;

        let transaction = self.transaction(
            TransactionKind::Redemption { reward_id },
            Some(user_id),
            None,
            reward.token_cost,
        );
        let mut batch = Batch::new();
        batch.put(&user)?;
        batch.put(&reward)?;
        batch.put(&transaction)?;
        self.store.commit(batch)?;
        self.metrics.record_redemption();

        info!(
            user_id = %user_id,
            reward_id = %reward_id,
            cost = reward.token_cost,
            remaining = reward.availability,
            "Reward redeemed"
        );
        Ok(transaction)
    }

    /// Fetch a transaction
    pub fn get_transaction(&self, id: &str) -> Result<Transaction> {
        let id = self.observe(parse_id("id", id))?;
        self.observe(self.load::<Transaction>(&id))
    }

    /// Every transaction where the user is sender or receiver, oldest first
    pub fn list_transactions(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let user_id = self.observe(parse_id("userId", user_id))?;
        self.observe(self.load::<User>(&user_id))?;

        let mut transactions: Vec<Transaction> = self
            .store
            .list::<Transaction>()?
            .into_iter()
            .filter(|tx| tx.involves(&user_id))
            .collect();
        transactions.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));
        Ok(transactions)
    }

    // Milestone evaluator

    /// Grant every milestone the user has newly reached.
    ///
    /// Returns the ids claimed by this call, sorted; an empty list means
    /// nothing new was reached. Claims are terminal, so calling again without
    /// time passing returns an empty list and writes nothing.
    pub fn check_and_reward_milestones(&self, user_id: &str) -> Result<Vec<EntityId>> {
        self.observe(self.evaluate_milestones(user_id))
    }

    fn evaluate_milestones(&self, user_id: &str) -> Result<Vec<EntityId>> {
        let user_id = parse_id("userId", user_id)?;

        let _guard = self.write_guard.lock();
        let mut user = self.load::<User>(&user_id)?;
        let now = self.clock.now_nanos();
        let elapsed = user.elapsed_sober(now);

        let mut reached: Vec<Milestone> = self
            .store
            .list::<Milestone>()?
            .into_iter()
            .filter(|m| m.is_reached(elapsed) && !user.has_claimed(&m.id))
            .collect();
        reached.sort_by(|a, b| a.id.cmp(&b.id));

        if reached.is_empty() {
            debug!(user_id = %user_id, elapsed, "No new milestones");
            return Ok(Vec::new());
        }

        let mut batch = Batch::new();
        let mut granted = 0u64;
        for milestone in &reached {
            user.tokens = credit(user.tokens, milestone.token_reward)?;
            user.claimed_milestones.push(milestone.id);
            granted += milestone.token_reward;

            let transaction = self.transaction(
                TransactionKind::MilestoneReward {
                    milestone_id: milestone.id,
                },
                None,
                Some(user_id),
                milestone.token_reward,
            );
            batch.put(&transaction)?;
        }
        batch.put(&user)?;
        self.store.commit(batch)?;

        let claimed: Vec<EntityId> = reached.iter().map(|m| m.id).collect();
        self.metrics.record_milestone_claims(claimed.len(), granted);

        info!(
            user_id = %user_id,
            claimed = claimed.len(),
            granted,
            balance = user.tokens,
            "Milestones rewarded"
        );
        Ok(claimed)
    }

    // Helpers

    fn load<R: Record>(&self, id: &EntityId) -> Result<R> {
        self.store
            .get::<R>(id)?
            .ok_or_else(|| Error::not_found(R::ENTITY, id))
    }

    fn transaction(
        &self,
        kind: TransactionKind,
        from_user_id: Option<EntityId>,
        to_user_id: Option<EntityId>,
        amount: u64,
    ) -> Transaction {
        Transaction {
            id: self.ids.next_id(),
            kind,
            from_user_id,
            to_user_id,
            amount,
            timestamp: self.clock.now_nanos(),
        }
    }

    /// Count domain rejections on the way out
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if let Some(kind) = err.kind() {
                self.metrics.record_rejection(kind);
                debug!(error = %err, "Operation rejected");
            }
        }
        result
    }
}

fn credit(balance: u64, amount: u64) -> Result<u64> {
    balance.checked_add(amount).ok_or_else(|| {
        Error::InvalidPayload(format!(
            "Crediting {} tokens would overflow balance {}",
            amount, balance
        ))
    })
}
