//! Audio Studio Token Platform
//!
//! Token ledger and entitlement engine gating the studio's metered
//! features behind a consumable balance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       TOKEN PLATFORM                                │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                     TOKEN LEDGER                              │  │
//! │  │   Append-only transactions ─► fold ─► balances (canonical)    │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! │                                                                     │
//! │  ┌────────────┐  ┌─────────────┐  ┌────────────┐  ┌─────────────┐   │
//! │  │  Pricing   │  │ Entitlement │  │   Spend    │  │  Demo Mode  │   │
//! │  │   Table    │  │ Authorizer  │  │  Executor  │  │ Controller  │   │
//! │  └────────────┘  └─────────────┘  └────────────┘  └─────────────┘   │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                 REWARDS & ADVICE                              │  │
//! │  │   Signup | Social | Referral | Upgrade suggestions            │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod advisor;
pub mod demo;
pub mod entitlement;
pub mod ledger;
pub mod metrics;
pub mod pricing;
pub mod rewards;
pub mod spend;
pub mod subscription;

use std::collections::HashMap;
use std::sync::Arc;
use studio_common::FeatureCategory;
use thiserror::Error;
use uuid::Uuid;

pub use demo::{DemoController, DemoRestrictions, DemoSession};
pub use entitlement::{Decision, EntitlementAuthorizer, PricingContext, UsageRequest};
pub use ledger::{
    BalanceAggregator, CreditKind, LedgerError, LedgerStore, MemoryLedger, TokenBalance,
    TokenTransaction, TransactionFilter, TransactionKind,
};
pub use metrics::UsageMetrics;
pub use pricing::{PricingTable, SubscriptionPlan, TokenPack};
pub use rewards::{RewardEngine, SocialAction, SocialPlatform};
pub use spend::{SpendExecutor, SpendReceipt};
pub use subscription::{SubscriptionManager, SubscriptionStatus, UserSubscriptionContext};

/// Engine error taxonomy
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Expected outcome of an over-budget spend; final, never retried
    #[error("insufficient tokens: required {required}, available {available}")]
    InsufficientFunds {
        /// Tokens the request would have cost
        required: u64,
        /// Available balance at decision time
        available: u64,
    },
    /// Concurrent-write precondition failed past the retry budget
    #[error("ledger write conflict")]
    LedgerConflict,
    /// The ledger store cannot be read or written; fail closed
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    /// Caller named a category outside the pricing table
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    /// Caller supplied a non-positive or overflowing amount
    #[error("invalid amount: {0}")]
    InvalidAmount(u64),
}

impl From<LedgerError> for TokenError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict => Self::LedgerConflict,
            LedgerError::Unavailable(msg) => Self::LedgerUnavailable(msg),
        }
    }
}

/// Token Platform facade wiring the engine together for a host
pub struct TokenPlatform {
    store: Arc<dyn LedgerStore>,
    /// Plan and pack catalog
    pub pricing: Arc<PricingTable>,
    /// Read side: balances and history
    pub aggregator: Arc<BalanceAggregator>,
    /// Serialized debits
    pub spend: Arc<SpendExecutor>,
    /// Allow/deny gate
    pub authorizer: Arc<EntitlementAuthorizer>,
    /// Demo scopes
    pub demo: Arc<DemoController>,
    /// Caller contexts
    pub subscriptions: Arc<SubscriptionManager>,
    /// Credit flows
    pub rewards: Arc<RewardEngine>,
}

impl TokenPlatform {
    /// Platform over an in-memory ledger
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryLedger::new()))
    }

    /// Platform over a host-provided ledger store
    pub fn with_store(store: Arc<dyn LedgerStore>) -> Self {
        let pricing = Arc::new(PricingTable::new());
        let aggregator = Arc::new(BalanceAggregator::new(store.clone()));
        let spend = Arc::new(SpendExecutor::new(store.clone()));
        let authorizer = Arc::new(EntitlementAuthorizer::new(
            pricing.clone(),
            aggregator.clone(),
            spend.clone(),
        ));

        Self {
            pricing,
            aggregator,
            spend,
            authorizer,
            demo: Arc::new(DemoController::new()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            rewards: Arc::new(RewardEngine::new(store.clone())),
            store,
        }
    }

    /// Single entry point used by feature handlers before any metered
    /// work. Resolves the caller's context and demo scope, renders the
    /// decision, and refreshes the cached balance after a charge.
    pub fn authorize(
        &self,
        user_id: Uuid,
        request: &UsageRequest,
        demo_session: Option<Uuid>,
    ) -> Result<Decision, TokenError> {
        let subscription = self.subscriptions.get_or_register(user_id);
        let ctx = match demo_session.and_then(|id| self.demo.get(id)) {
            Some(session) => PricingContext::Demo(session),
            None => PricingContext::Ledger,
        };

        let decision = self.authorizer.authorize(&subscription, request, &ctx)?;
        if let Decision::Approved {
            transaction_id: Some(_),
            ..
        } = decision
        {
            let balance = self.aggregator.balance(user_id)?;
            self.subscriptions.update_cached_balance(user_id, balance);
        }
        Ok(decision)
    }

    /// Authorize a raw wire request, validating the category string
    pub fn authorize_raw(
        &self,
        user_id: Uuid,
        category: &str,
        quantity: u64,
        demo_session: Option<Uuid>,
    ) -> Result<Decision, TokenError> {
        let category: FeatureCategory = category
            .parse()
            .map_err(|err: studio_common::UnknownCategory| TokenError::InvalidCategory(err.0))?;
        self.authorize(user_id, &UsageRequest::new(category, quantity), demo_session)
    }

    /// Append-only credit entry point for purchase-completion and reward
    /// flows. Returns the freshly recomputed balance.
    pub fn credit(
        &self,
        user_id: Uuid,
        kind: CreditKind,
        amount: u64,
        category: FeatureCategory,
        description: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<TokenBalance, TokenError> {
        if amount == 0 {
            return Err(TokenError::InvalidAmount(0));
        }

        let tx = TokenTransaction::new(user_id, kind.into(), amount, category, description)
            .with_metadata(metadata);
        let tx_id = tx.id;
        ledger::append_with_retry(self.store.as_ref(), &tx)?;
        tracing::info!(user_id = %user_id, tx_id = %tx_id, amount, ?kind, "tokens credited");

        let balance = self.aggregator.balance(user_id)?;
        self.subscriptions
            .update_cached_balance(user_id, balance.clone());
        Ok(balance)
    }

    /// Credit a completed token-pack purchase: the pack tokens as
    /// `Purchased`, any bonus tokens as `Bonus`.
    pub fn credit_pack_purchase(
        &self,
        user_id: Uuid,
        pack: &TokenPack,
    ) -> Result<TokenBalance, TokenError> {
        let mut balance = self.credit(
            user_id,
            CreditKind::Purchased,
            pack.tokens,
            FeatureCategory::VoiceCloning,
            format!("Token pack: {}", pack.name),
            HashMap::new(),
        )?;

        if pack.bonus_tokens > 0 {
            balance = self.credit(
                user_id,
                CreditKind::Bonus,
                pack.bonus_tokens,
                FeatureCategory::VoiceCloning,
                format!("Token pack bonus: {}", pack.name),
                HashMap::new(),
            )?;
        }

        Ok(balance)
    }

    /// Current balance derived from the ledger
    pub fn balance(&self, user_id: Uuid) -> Result<TokenBalance, TokenError> {
        self.aggregator.balance(user_id).map_err(Into::into)
    }

    /// Current balance partitioned by category
    pub fn balance_by_category(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<FeatureCategory, TokenBalance>, TokenError> {
        self.aggregator
            .balance_by_category(user_id)
            .map_err(Into::into)
    }

    /// Transaction history, newest first
    pub fn transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<TokenTransaction>, TokenError> {
        self.aggregator
            .transactions(user_id, filter)
            .map_err(Into::into)
    }

    /// Usage dashboard view for a user
    pub fn usage_metrics(&self, user_id: Uuid) -> Result<UsageMetrics, TokenError> {
        let transactions = self.store.transactions_for(user_id)?;
        let subscription = self.subscriptions.get_or_register(user_id);
        Ok(metrics::usage_metrics(&transactions, &subscription))
    }

    /// Upgrade suggestion for denial handling; None below the utilization
    /// threshold or at the top tier
    pub fn suggest_upgrade(&self, user_id: Uuid) -> Option<SubscriptionPlan> {
        let subscription = self.subscriptions.get(user_id)?;
        advisor::suggest_upgrade(&subscription, &self.pricing.plans())
    }

    /// Grant a default demo scope and flag the user's grant as consumed
    pub fn start_demo(&self, user_id: Uuid) -> Arc<DemoSession> {
        let session = self.demo.start_default();
        self.subscriptions.mark_demo_used(user_id);
        session
    }

    /// Advance all demo sessions by one minute (external clock tick)
    pub fn tick_demos(&self) {
        self.demo.tick_all();
    }
}

impl Default for TokenPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_then_spend_roundtrip() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();
        platform.subscriptions.register(user);

        let balance = platform
            .credit(
                user,
                CreditKind::Purchased,
                50,
                FeatureCategory::VoiceCloning,
                "seed",
                HashMap::new(),
            )
            .unwrap();
        assert_eq!(balance.available, 50);

        let decision = platform
            .authorize_raw(user, "voice_cloning", 1, None)
            .unwrap();
        match decision {
            Decision::Approved { cost, available, .. } => {
                // No plan attached: default cost applies
                assert_eq!(cost, 10);
                assert_eq!(available, 40);
            }
            other => panic!("expected approval, got {other:?}"),
        }

        // Cached balance reconciles with the ledger
        let cached = platform.subscriptions.get(user).unwrap().token_balance;
        assert_eq!(cached, platform.balance(user).unwrap());
    }

    #[test]
    fn test_invalid_category_rejected_before_ledger() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();

        let err = platform.authorize_raw(user, "mastering", 1, None).unwrap_err();
        assert!(matches!(err, TokenError::InvalidCategory(_)));
        assert!(platform.transactions(user, &TransactionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_credit_rejected() {
        let platform = TokenPlatform::new();
        let err = platform
            .credit(
                Uuid::new_v4(),
                CreditKind::Bonus,
                0,
                FeatureCategory::VoiceCloning,
                "nothing",
                HashMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidAmount(0)));
    }

    #[test]
    fn test_denial_enriched_by_advisor() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();
        platform.subscriptions.register(user);
        platform
            .subscriptions
            .set_plan(user, platform.pricing.plan_by_id("free-monthly"))
            .unwrap();

        platform
            .credit(
                user,
                CreditKind::Purchased,
                50,
                FeatureCategory::VoiceCloning,
                "allowance",
                HashMap::new(),
            )
            .unwrap();

        // Burn down to 5 available: three voice-cloning jobs at 15 each
        for _ in 0..3 {
            let decision = platform
                .authorize(user, &UsageRequest::new(FeatureCategory::VoiceCloning, 1), None)
                .unwrap();
            assert!(decision.is_approved());
        }

        let decision = platform
            .authorize(user, &UsageRequest::new(FeatureCategory::VoiceCloning, 1), None)
            .unwrap();
        match decision {
            Decision::Denied {
                required,
                available,
            } => {
                assert_eq!(required, 15);
                assert_eq!(available, 5);
            }
            other => panic!("expected denial, got {other:?}"),
        }

        // 45 of 50 used: utilization past the threshold, next tier is basic
        let suggestion = platform.suggest_upgrade(user).unwrap();
        assert_eq!(suggestion.tier, studio_common::SubscriptionTier::Basic);
    }

    #[test]
    fn test_demo_lifecycle_against_ledger() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();
        platform.subscriptions.register(user);
        platform
            .credit(
                user,
                CreditKind::Purchased,
                100,
                FeatureCategory::VoiceCloning,
                "seed",
                HashMap::new(),
            )
            .unwrap();

        let session = platform.start_demo(user);
        assert!(platform.subscriptions.get(user).unwrap().demo_mode_used);

        // Demo absorbs the request; ledger untouched beyond the seed credit
        let decision = platform
            .authorize(
                user,
                &UsageRequest::new(FeatureCategory::VideoGeneration, 1),
                Some(session.id),
            )
            .unwrap();
        match decision {
            Decision::Approved { cost, .. } => assert_eq!(cost, 0),
            other => panic!("expected approval, got {other:?}"),
        }
        assert_eq!(session.remaining_allowance(), 75);
        assert_eq!(
            platform
                .transactions(user, &TransactionFilter::default())
                .unwrap()
                .len(),
            1
        );

        // Run the clock out; the same request now debits the ledger
        for _ in 0..demo::DEMO_DURATION_MINUTES {
            platform.tick_demos();
        }
        assert!(!session.is_active());

        let decision = platform
            .authorize(
                user,
                &UsageRequest::new(FeatureCategory::VideoGeneration, 1),
                Some(session.id),
            )
            .unwrap();
        match decision {
            Decision::Approved { cost, available, .. } => {
                assert_eq!(cost, 25);
                assert_eq!(available, 75);
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn test_pack_purchase_credits_tokens_and_bonus() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();
        let pack = platform.pricing.pack_by_id("standard-pack").unwrap();

        let balance = platform.credit_pack_purchase(user, &pack).unwrap();
        assert_eq!(balance.available, 275);

        let purchased = platform
            .transactions(
                user,
                &TransactionFilter {
                    kind: Some(TransactionKind::Purchased),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(purchased.len(), 1);
        assert_eq!(purchased[0].amount, 250);
    }

    #[test]
    fn test_usage_metrics_via_platform() {
        let platform = TokenPlatform::new();
        let user = Uuid::new_v4();
        platform
            .credit(
                user,
                CreditKind::Purchased,
                100,
                FeatureCategory::VoiceCloning,
                "seed",
                HashMap::new(),
            )
            .unwrap();
        platform
            .authorize(user, &UsageRequest::new(FeatureCategory::StemSeparation, 2), None)
            .unwrap();

        let metrics = platform.usage_metrics(user).unwrap();
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.total_tokens_used, 10);
        assert_eq!(
            metrics.most_used_category,
            Some(FeatureCategory::StemSeparation)
        );
    }
}
