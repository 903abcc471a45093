//! Metrics collection for observability
//!
//! Each ledger owns its own Prometheus registry; nothing is registered
//! globally.
//!
//! # Metrics
//!
//! - `ledger_users_total` - Users registered
//! - `ledger_milestones_total` - Milestones added to the catalogue
//! - `ledger_rewards_total` - Rewards added to the catalogue
//! - `ledger_tokens_minted_total` - Tokens created by mints and milestone claims
//! - `ledger_tokens_transferred_total` - Tokens moved between users
//! - `ledger_redemptions_total` - Rewards redeemed
//! - `ledger_milestone_claims_total` - Milestones claimed
//! - `ledger_rejections_total{kind}` - Operations rejected, by error kind

use crate::error::ErrorKind;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Users registered
    pub users_total: IntCounter,

    /// Milestones added
    pub milestones_total: IntCounter,

    /// Rewards added
    pub rewards_total: IntCounter,

    /// Tokens created
    pub tokens_minted: IntCounter,

    /// Tokens transferred
    pub tokens_transferred: IntCounter,

    /// Rewards redeemed
    pub redemptions_total: IntCounter,

    /// Milestones claimed
    pub milestone_claims_total: IntCounter,

    /// Rejected operations by kind
    pub rejections_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let users_total = counter(&registry, "ledger_users_total", "Users registered")?;
        let milestones_total = counter(
            &registry,
            "ledger_milestones_total",
            "Milestones added to the catalogue",
        )?;
        let rewards_total = counter(
            &registry,
            "ledger_rewards_total",
            "Rewards added to the catalogue",
        )?;
        let tokens_minted = counter(
            &registry,
            "ledger_tokens_minted_total",
            "Tokens created by mints and milestone claims",
        )?;
        let tokens_transferred = counter(
            &registry,
            "ledger_tokens_transferred_total",
            "Tokens moved between users",
        )?;
        let redemptions_total =
            counter(&registry, "ledger_redemptions_total", "Rewards redeemed")?;
        let milestone_claims_total = counter(
            &registry,
            "ledger_milestone_claims_total",
            "Milestones claimed",
        )?;

        let rejections_total = IntCounterVec::new(
            Opts::new("ledger_rejections_total", "Operations rejected, by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        Ok(Self {
            users_total,
            milestones_total,
            rewards_total,
            tokens_minted,
            tokens_transferred,
            redemptions_total,
            milestone_claims_total,
            rejections_total,
            registry,
        })
    }

    /// Record a mint or milestone credit
    pub fn record_minted(&self, amount: u64) {
        self.tokens_minted.inc_by(amount);
    }

    /// Record a transfer
    pub fn record_transfer(&self, amount: u64) {
        self.tokens_transferred.inc_by(amount);
    }

    /// Record a redemption
    pub fn record_redemption(&self) {
        self.redemptions_total.inc();
    }

    /// Record milestone claims and the tokens they granted
    pub fn record_milestone_claims(&self, claims: usize, tokens: u64) {
        self.milestone_claims_total.inc_by(claims as u64);
        self.record_minted(tokens);
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejections_total.with_label_values(&[kind.as_str()]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every counter in the Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
