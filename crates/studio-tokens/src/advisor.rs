//! Upgrade Advisor
//!
//! Pure read-only recommendation used to enrich insufficient-funds
//! denials. Has no authority to modify the subscription.

use crate::pricing::SubscriptionPlan;
use crate::subscription::UserSubscriptionContext;

/// Utilization share above which an upgrade is worth suggesting
const UPGRADE_THRESHOLD_PCT: f64 = 80.0;

/// Suggest the plan one tier above the caller's, or None when utilization
/// is low or the caller is already at the top tier.
pub fn suggest_upgrade(
    subscription: &UserSubscriptionContext,
    available_plans: &[SubscriptionPlan],
) -> Option<SubscriptionPlan> {
    if subscription.utilization() < UPGRADE_THRESHOLD_PCT {
        return None;
    }

    let next_tier = subscription.tier().next()?;
    available_plans
        .iter()
        .find(|plan| plan.tier == next_tier)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenBalance;
    use crate::pricing::PricingTable;
    use studio_common::SubscriptionTier;
    use uuid::Uuid;

    fn context_with(plan_id: &str, used: u64) -> (UserSubscriptionContext, Vec<SubscriptionPlan>) {
        let table = PricingTable::new();
        let mut ctx = UserSubscriptionContext::new(Uuid::new_v4());
        ctx.plan = table.plan_by_id(plan_id);
        ctx.token_balance = TokenBalance {
            total: 0,
            used,
            available: 0,
            last_updated: None,
        };
        (ctx, table.plans())
    }

    #[test]
    fn test_low_utilization_suggests_nothing() {
        let (ctx, plans) = context_with("free-monthly", 10);
        assert!(suggest_upgrade(&ctx, &plans).is_none());
    }

    #[test]
    fn test_heavy_free_user_gets_basic() {
        // 40 of 50: utilization 80%
        let (ctx, plans) = context_with("free-monthly", 40);
        let suggestion = suggest_upgrade(&ctx, &plans).unwrap();
        assert_eq!(suggestion.tier, SubscriptionTier::Basic);
    }

    #[test]
    fn test_top_tier_has_no_upgrade() {
        let (ctx, plans) = context_with("premium-monthly", 2000);
        assert!(suggest_upgrade(&ctx, &plans).is_none());
    }

    #[test]
    fn test_no_plan_suggests_nothing() {
        let table = PricingTable::new();
        let ctx = UserSubscriptionContext::new(Uuid::new_v4());
        assert!(suggest_upgrade(&ctx, &table.plans()).is_none());
    }
}
