//! Sobriety Ledger
//!
//! Token, milestone and reward ledger for a sobriety-support community.
//!
//! # Architecture
//!
//! - **Registries**: Users, milestones and rewards keyed by UUID
//! - **Token ledger**: Mints, transfers and redemptions, each recorded as a transaction
//! - **Milestone evaluator**: Grants every reached, unclaimed milestone exactly once
//! - **Single Writer**: One actor task runs commands in order
//! - **Atomic commits**: Each operation writes one batch or nothing
//!
//! # Invariants
//!
//! - Balances never go negative
//! - Transfers conserve tokens: the sender loses exactly what the receiver gains
//! - A milestone is claimed at most once per user
//! - Every balance change has a matching transaction record

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;
pub mod validation;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use api::{Command, Dispatcher, Envelope, Message, Outcome, Reply};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use id::{IdGenerator, UuidGenerator};
pub use ledger::Ledger;
pub use storage::{Batch, MemoryStorage, RecordStore, RecordStoreExt, RocksStorage};
pub use types::{
    EntityId, Milestone, MilestonePayload, Reward, RewardPayload, Role, Transaction,
    TransactionKind, User, UserPayload,
};
