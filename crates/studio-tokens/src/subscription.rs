//! Subscription Context
//!
//! Resolved caller state handed to the engine by the host after
//! authentication. The cached balance here is a read-through projection
//! for display; the ledger stays canonical.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use studio_common::SubscriptionTier;
use uuid::Uuid;

use crate::ledger::TokenBalance;
use crate::pricing::SubscriptionPlan;

/// Subscription lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Paid up or on the free tier
    Active,
    /// Lapsed without cancellation
    Inactive,
    /// Cancelled by the user
    Cancelled,
    /// Past its end date
    Expired,
    /// Inside a trial window
    Trial,
}

/// Per-user subscription state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscriptionContext {
    /// Owning user
    pub user_id: Uuid,
    /// Current plan; None means free-tier defaults apply
    pub plan: Option<SubscriptionPlan>,
    /// Lifecycle state
    pub status: SubscriptionStatus,
    /// Cached balance view, refreshed after every ledger write
    pub token_balance: TokenBalance,
    /// Demo already granted once; re-grant policy lives with the host
    pub demo_mode_used: bool,
    /// Subscription start
    pub started_at: DateTime<Utc>,
    /// Trial expiry, when status is Trial
    pub trial_end: Option<DateTime<Utc>>,
}

impl UserSubscriptionContext {
    /// Fresh free-tier context
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            plan: None,
            status: SubscriptionStatus::Active,
            token_balance: TokenBalance::zero(),
            demo_mode_used: false,
            started_at: Utc::now(),
            trial_end: None,
        }
    }

    /// Effective tier; free when no plan is attached
    pub fn tier(&self) -> SubscriptionTier {
        self.plan
            .as_ref()
            .map(|p| p.tier)
            .unwrap_or(SubscriptionTier::Free)
    }

    /// Share of the monthly allowance already used, 0-100
    pub fn utilization(&self) -> f64 {
        let Some(plan) = &self.plan else {
            return 0.0;
        };
        let allowance = plan.monthly_allowance();
        if allowance == 0 {
            return 0.0;
        }

        let pct = self.token_balance.used as f64 / allowance as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// True while a trial window is open
    pub fn is_on_trial(&self) -> bool {
        self.status == SubscriptionStatus::Trial
            && self.trial_end.map(|end| end > Utc::now()).unwrap_or(false)
    }
}

/// Subscription lookup failure
#[derive(Debug, Clone)]
pub enum SubscriptionError {
    /// No context registered for the user
    NotFound,
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Subscription not found"),
        }
    }
}

impl std::error::Error for SubscriptionError {}

/// Registry of per-user subscription contexts
pub struct SubscriptionManager {
    subscriptions: Arc<RwLock<HashMap<Uuid, UserSubscriptionContext>>>,
}

impl SubscriptionManager {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a user on free-tier defaults, returning the context
    pub fn register(&self, user_id: Uuid) -> UserSubscriptionContext {
        let ctx = UserSubscriptionContext::new(user_id);
        self.subscriptions.write().insert(user_id, ctx.clone());
        ctx
    }

    /// Context for a user
    pub fn get(&self, user_id: Uuid) -> Option<UserSubscriptionContext> {
        self.subscriptions.read().get(&user_id).cloned()
    }

    /// Context for a user, registering free-tier defaults on first sight
    pub fn get_or_register(&self, user_id: Uuid) -> UserSubscriptionContext {
        if let Some(ctx) = self.get(user_id) {
            return ctx;
        }
        self.register(user_id)
    }

    /// Attach or replace a user's plan
    pub fn set_plan(
        &self,
        user_id: Uuid,
        plan: Option<SubscriptionPlan>,
    ) -> Result<UserSubscriptionContext, SubscriptionError> {
        let mut subs = self.subscriptions.write();
        let ctx = subs.get_mut(&user_id).ok_or(SubscriptionError::NotFound)?;
        ctx.plan = plan;
        Ok(ctx.clone())
    }

    /// Move a user's lifecycle state
    pub fn set_status(
        &self,
        user_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<UserSubscriptionContext, SubscriptionError> {
        let mut subs = self.subscriptions.write();
        let ctx = subs.get_mut(&user_id).ok_or(SubscriptionError::NotFound)?;
        ctx.status = status;
        Ok(ctx.clone())
    }

    /// Flag that the user's one demo grant is consumed
    pub fn mark_demo_used(&self, user_id: Uuid) {
        if let Some(ctx) = self.subscriptions.write().get_mut(&user_id) {
            ctx.demo_mode_used = true;
        }
    }

    /// Refresh the cached balance after a ledger write
    pub fn update_cached_balance(&self, user_id: Uuid, balance: TokenBalance) {
        if let Some(ctx) = self.subscriptions.write().get_mut(&user_id) {
            ctx.token_balance = balance;
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingTable;

    #[test]
    fn test_defaults_are_free_tier() {
        let ctx = UserSubscriptionContext::new(Uuid::new_v4());
        assert_eq!(ctx.tier(), SubscriptionTier::Free);
        assert_eq!(ctx.utilization(), 0.0);
        assert!(!ctx.demo_mode_used);
    }

    #[test]
    fn test_utilization() {
        let table = PricingTable::new();
        let mut ctx = UserSubscriptionContext::new(Uuid::new_v4());
        ctx.plan = table.plan_by_id("basic-monthly");
        ctx.token_balance = TokenBalance {
            total: 500,
            used: 400,
            available: 100,
            last_updated: None,
        };

        assert_eq!(ctx.utilization(), 80.0);
    }

    #[test]
    fn test_utilization_clamped() {
        let table = PricingTable::new();
        let mut ctx = UserSubscriptionContext::new(Uuid::new_v4());
        ctx.plan = table.plan_by_id("free-monthly");
        ctx.token_balance.used = 5000;

        assert_eq!(ctx.utilization(), 100.0);
    }

    #[test]
    fn test_registry_roundtrip() {
        let manager = SubscriptionManager::new();
        let user = Uuid::new_v4();

        assert!(manager.get(user).is_none());
        manager.register(user);
        manager.mark_demo_used(user);

        let ctx = manager.get(user).unwrap();
        assert!(ctx.demo_mode_used);
    }

    #[test]
    fn test_set_plan_requires_registration() {
        let manager = SubscriptionManager::new();
        let user = Uuid::new_v4();
        assert!(manager.set_plan(user, None).is_err());

        manager.register(user);
        let table = PricingTable::new();
        let ctx = manager
            .set_plan(user, table.plan_by_id("premium-monthly"))
            .unwrap();
        assert_eq!(ctx.tier(), SubscriptionTier::Premium);
    }
}
