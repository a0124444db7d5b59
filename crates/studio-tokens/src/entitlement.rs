//! Entitlement Authorizer
//!
//! The single gate feature handlers consult before doing any metered
//! work. Prices the request for the caller's tier, checks the derived
//! balance, and delegates the debit to the spend executor. An active
//! demo scope absorbs the request instead; the ledger is never touched
//! on that path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use studio_common::FeatureCategory;
use uuid::Uuid;

use crate::demo::DemoSession;
use crate::ledger::BalanceAggregator;
use crate::pricing::PricingTable;
use crate::spend::SpendExecutor;
use crate::subscription::UserSubscriptionContext;
use crate::TokenError;

/// A feature-usage request as handed in by the host
#[derive(Debug, Clone)]
pub struct UsageRequest {
    /// Feature family being invoked
    pub category: FeatureCategory,
    /// Invocation count to price
    pub quantity: u64,
    /// Ledger description for the debit
    pub description: String,
    /// Opaque attachments copied onto the debit
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UsageRequest {
    /// Request with a generated description
    pub fn new(category: FeatureCategory, quantity: u64) -> Self {
        Self {
            category,
            quantity,
            description: format!("{category} x{quantity}"),
            metadata: HashMap::new(),
        }
    }

    /// Override the ledger description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach opaque metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// How this request is to be priced. Passed in explicitly; the authorizer
/// never infers demo state from ambient flags.
#[derive(Clone)]
pub enum PricingContext {
    /// Price and debit through the ledger
    Ledger,
    /// Absorb into this demo scope while it lasts
    Demo(Arc<DemoSession>),
}

/// Allow/deny outcome of an authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decision {
    /// Request may proceed
    Approved {
        /// Tokens charged to the ledger; 0 on the demo path
        cost: u64,
        /// Available balance after the charge
        available: u64,
        /// Appended debit, when the ledger was charged
        transaction_id: Option<Uuid>,
    },
    /// Insufficient funds; terminal for this request
    Denied {
        /// Tokens the request would have cost
        required: u64,
        /// Available balance at decision time
        available: u64,
    },
}

impl Decision {
    /// True for the approved arm
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Renders allow/deny decisions for feature requests
pub struct EntitlementAuthorizer {
    pricing: Arc<PricingTable>,
    aggregator: Arc<BalanceAggregator>,
    spend: Arc<SpendExecutor>,
}

impl EntitlementAuthorizer {
    /// Authorizer over the pricing table, read side, and spend executor
    pub fn new(
        pricing: Arc<PricingTable>,
        aggregator: Arc<BalanceAggregator>,
        spend: Arc<SpendExecutor>,
    ) -> Self {
        Self {
            pricing,
            aggregator,
            spend,
        }
    }

    /// Decide whether the caller may consume `request`. Denial is final
    /// for this request; nothing is retried here.
    pub fn authorize(
        &self,
        subscription: &UserSubscriptionContext,
        request: &UsageRequest,
        ctx: &PricingContext,
    ) -> Result<Decision, TokenError> {
        if request.quantity == 0 {
            return Err(TokenError::InvalidAmount(0));
        }

        let unit_cost = self
            .pricing
            .cost(request.category, subscription.plan.as_ref());
        let cost = unit_cost
            .checked_mul(request.quantity)
            .ok_or(TokenError::InvalidAmount(request.quantity))?;

        if let PricingContext::Demo(session) = ctx {
            if session.eligible(request.category) && session.try_consume(cost) {
                tracing::debug!(
                    user_id = %subscription.user_id,
                    session_id = %session.id,
                    cost,
                    remaining = session.remaining_allowance(),
                    "request absorbed by demo allowance"
                );
                return Ok(Decision::Approved {
                    cost: 0,
                    available: subscription.token_balance.available,
                    transaction_id: None,
                });
            }
            // Exhausted or ineligible demo falls through to ledger pricing.
        }

        let balance = self.aggregator.balance(subscription.user_id)?;
        if balance.available < cost {
            return Ok(Decision::Denied {
                required: cost,
                available: balance.available,
            });
        }

        match self.spend.spend(
            subscription.user_id,
            request.category,
            cost,
            request.description.clone(),
            request.metadata.clone(),
        ) {
            Ok(receipt) => Ok(Decision::Approved {
                cost,
                available: receipt.balance.available,
                transaction_id: Some(receipt.transaction_id),
            }),
            // Lost a race against a concurrent spend; report the shortfall
            // the executor saw.
            Err(TokenError::InsufficientFunds {
                required,
                available,
            }) => Ok(Decision::Denied {
                required,
                available,
            }),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoController;
    use crate::ledger::{LedgerStore, MemoryLedger, TokenTransaction, TransactionKind};
    use crate::subscription::UserSubscriptionContext;

    struct Fixture {
        store: Arc<MemoryLedger>,
        pricing: Arc<PricingTable>,
        authorizer: EntitlementAuthorizer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLedger::new());
        let pricing = Arc::new(PricingTable::new());
        let aggregator = Arc::new(BalanceAggregator::new(store.clone()));
        let spend = Arc::new(SpendExecutor::new(store.clone()));
        let authorizer = EntitlementAuthorizer::new(pricing.clone(), aggregator, spend);
        Fixture {
            store,
            pricing,
            authorizer,
        }
    }

    fn seed(store: &MemoryLedger, user: Uuid, amount: u64) {
        store
            .append(TokenTransaction::new(
                user,
                TransactionKind::Purchased,
                amount,
                FeatureCategory::VoiceCloning,
                "seed",
            ))
            .unwrap();
    }

    fn free_tier_context(fx: &Fixture, user: Uuid) -> UserSubscriptionContext {
        let mut ctx = UserSubscriptionContext::new(user);
        ctx.plan = fx.pricing.plan_by_id("free-monthly");
        ctx
    }

    #[test]
    fn test_free_tier_spend_approved() {
        let fx = fixture();
        let user = Uuid::new_v4();
        seed(&fx.store, user, 50);
        let sub = free_tier_context(&fx, user);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VoiceCloning, 1),
                &PricingContext::Ledger,
            )
            .unwrap();

        match decision {
            Decision::Approved {
                cost,
                available,
                transaction_id,
            } => {
                assert_eq!(cost, 15);
                assert_eq!(available, 35);
                assert!(transaction_id.is_some());
            }
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn test_shortfall_denied_with_amounts() {
        let fx = fixture();
        let user = Uuid::new_v4();
        seed(&fx.store, user, 5);
        let sub = free_tier_context(&fx, user);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VoiceCloning, 1),
                &PricingContext::Ledger,
            )
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
        // Denial leaves the ledger untouched
        assert_eq!(fx.store.transactions_for(user).unwrap().len(), 1);
    }

    #[test]
    fn test_no_plan_uses_default_costs() {
        let fx = fixture();
        let user = Uuid::new_v4();
        seed(&fx.store, user, 50);
        let sub = UserSubscriptionContext::new(user);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VoiceCloning, 1),
                &PricingContext::Ledger,
            )
            .unwrap();

        match decision {
            Decision::Approved { cost, .. } => assert_eq!(cost, 10),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn test_quantity_scales_cost() {
        let fx = fixture();
        let user = Uuid::new_v4();
        seed(&fx.store, user, 100);
        let sub = free_tier_context(&fx, user);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::StemSeparation, 3),
                &PricingContext::Ledger,
            )
            .unwrap();

        match decision {
            Decision::Approved { cost, .. } => assert_eq!(cost, 24),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let fx = fixture();
        let sub = UserSubscriptionContext::new(Uuid::new_v4());

        let err = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VoiceCloning, 0),
                &PricingContext::Ledger,
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidAmount(0)));
    }

    #[test]
    fn test_demo_absorbs_without_ledger_write() {
        let fx = fixture();
        let user = Uuid::new_v4();
        let sub = free_tier_context(&fx, user);

        let demo = DemoController::new();
        let session = demo.start(30, 100);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VideoGeneration, 1),
                &PricingContext::Demo(session.clone()),
            )
            .unwrap();

        match decision {
            Decision::Approved {
                cost,
                transaction_id,
                ..
            } => {
                assert_eq!(cost, 0);
                assert!(transaction_id.is_none());
            }
            other => panic!("expected approval, got {other:?}"),
        }
        // Free-tier video generation costs 30 demo tokens
        assert_eq!(session.remaining_allowance(), 70);
        assert!(fx.store.transactions_for(user).unwrap().is_empty());
    }

    #[test]
    fn test_exhausted_demo_falls_through_to_ledger() {
        let fx = fixture();
        let user = Uuid::new_v4();
        seed(&fx.store, user, 50);
        let sub = free_tier_context(&fx, user);

        let demo = DemoController::new();
        let session = demo.start(30, 10);

        let decision = fx
            .authorizer
            .authorize(
                &sub,
                &UsageRequest::new(FeatureCategory::VoiceCloning, 1),
                &PricingContext::Demo(session.clone()),
            )
            .unwrap();

        match decision {
            Decision::Approved { cost, available, .. } => {
                assert_eq!(cost, 15);
                assert_eq!(available, 35);
            }
            other => panic!("expected approval, got {other:?}"),
        }
        // Demo allowance untouched by the fall-through
        assert_eq!(session.remaining_allowance(), 10);
        assert_eq!(fx.store.transactions_for(user).unwrap().len(), 2);
    }
}
