//! Pricing Table
//!
//! Tier-dependent token costs with a fixed default table, the subscription
//! plan catalog, and the token-pack catalog. Lookups are pure and total:
//! absence of data always resolves through the defaults.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use studio_common::{BillingCycle, FeatureCategory, SubscriptionTier};

/// Tier-independent default cost per category
pub fn default_cost(category: FeatureCategory) -> u64 {
    match category {
        FeatureCategory::VoiceCloning => 10,
        FeatureCategory::StemSeparation => 5,
        FeatureCategory::VoiceCleaning => 3,
        FeatureCategory::VoiceChanging => 2,
        FeatureCategory::VideoGeneration => 25,
    }
}

/// Token cost of one invocation under a plan. Falls back to the default
/// table when the caller has no plan or the plan's table misses the
/// category; never fails.
pub fn token_cost(category: FeatureCategory, plan: Option<&SubscriptionPlan>) -> u64 {
    plan.and_then(|p| p.cost_table.get(&category).copied())
        .unwrap_or_else(|| default_cost(category))
}

/// Subscription plan reference data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    /// Catalog id, e.g. `premium-monthly`
    pub id: String,
    /// Display name
    pub name: String,
    /// Pricing tier
    pub tier: SubscriptionTier,
    /// Renewal cadence
    pub billing_cycle: BillingCycle,
    /// Price per cycle
    pub price: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Token allowance per cycle
    pub tokens: u64,
    /// Per-category token costs; missing entries fall back to the defaults
    pub cost_table: HashMap<FeatureCategory, u64>,
    /// Upload cap in megabytes
    pub max_file_size_mb: u32,
    /// Parallel job cap
    pub max_concurrent_jobs: u32,
    /// Outputs carry a watermark
    pub watermark: bool,
}

impl SubscriptionPlan {
    /// Allowance normalized to one month
    pub fn monthly_allowance(&self) -> u64 {
        self.tokens / self.billing_cycle.months()
    }
}

/// Purchasable token pack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPack {
    /// Catalog id
    pub id: String,
    /// Display name
    pub name: String,
    /// Tokens credited on purchase
    pub tokens: u64,
    /// Extra tokens credited as a bonus
    pub bonus_tokens: u64,
    /// Price
    pub price: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Marketing copy
    pub description: String,
    /// Highlighted in the storefront
    pub popular: bool,
}

impl TokenPack {
    /// Tokens plus bonus
    pub fn total_tokens(&self) -> u64 {
        self.tokens + self.bonus_tokens
    }
}

/// Plan and pack catalog with pure cost lookups
pub struct PricingTable {
    plans: Arc<RwLock<HashMap<String, SubscriptionPlan>>>,
    packs: Arc<RwLock<HashMap<String, TokenPack>>>,
}

impl PricingTable {
    /// Table preloaded with the built-in catalog
    pub fn new() -> Self {
        let table = Self {
            plans: Arc::new(RwLock::new(HashMap::new())),
            packs: Arc::new(RwLock::new(HashMap::new())),
        };
        table.load_default_catalog();
        table
    }

    fn load_default_catalog(&self) {
        let mut plans = self.plans.write();
        for plan in default_plans() {
            plans.insert(plan.id.clone(), plan);
        }

        let mut packs = self.packs.write();
        for pack in default_packs() {
            packs.insert(pack.id.clone(), pack);
        }
    }

    /// Cost of one invocation under a plan
    pub fn cost(&self, category: FeatureCategory, plan: Option<&SubscriptionPlan>) -> u64 {
        token_cost(category, plan)
    }

    /// Look up a plan by catalog id
    pub fn plan_by_id(&self, id: &str) -> Option<SubscriptionPlan> {
        self.plans.read().get(id).cloned()
    }

    /// All plans
    pub fn plans(&self) -> Vec<SubscriptionPlan> {
        self.plans.read().values().cloned().collect()
    }

    /// Plans of a tier
    pub fn plans_for_tier(&self, tier: SubscriptionTier) -> Vec<SubscriptionPlan> {
        self.plans
            .read()
            .values()
            .filter(|p| p.tier == tier)
            .cloned()
            .collect()
    }

    /// Replace or add a plan (configuration load)
    pub fn insert_plan(&self, plan: SubscriptionPlan) {
        self.plans.write().insert(plan.id.clone(), plan);
    }

    /// Look up a token pack by catalog id
    pub fn pack_by_id(&self, id: &str) -> Option<TokenPack> {
        self.packs.read().get(id).cloned()
    }

    /// All packs, cheapest first
    pub fn packs(&self) -> Vec<TokenPack> {
        let mut packs: Vec<_> = self.packs.read().values().cloned().collect();
        packs.sort_by(|a, b| a.price.cmp(&b.price));
        packs
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

fn cost_table(entries: [(FeatureCategory, u64); 5]) -> HashMap<FeatureCategory, u64> {
    entries.into_iter().collect()
}

fn default_plans() -> Vec<SubscriptionPlan> {
    use FeatureCategory::*;

    let free_costs = cost_table([
        (VoiceCloning, 15),
        (StemSeparation, 8),
        (VoiceCleaning, 5),
        (VoiceChanging, 3),
        (VideoGeneration, 30),
    ]);
    let basic_costs = cost_table([
        (VoiceCloning, 10),
        (StemSeparation, 5),
        (VoiceCleaning, 3),
        (VoiceChanging, 2),
        (VideoGeneration, 25),
    ]);
    let premium_costs = cost_table([
        (VoiceCloning, 7),
        (StemSeparation, 3),
        (VoiceCleaning, 2),
        (VoiceChanging, 1),
        (VideoGeneration, 20),
    ]);

    vec![
        SubscriptionPlan {
            id: "free-monthly".into(),
            name: "Free".into(),
            tier: SubscriptionTier::Free,
            billing_cycle: BillingCycle::Monthly,
            price: dec!(0),
            currency: "USD".into(),
            tokens: 50,
            cost_table: free_costs,
            max_file_size_mb: 10,
            max_concurrent_jobs: 1,
            watermark: true,
        },
        SubscriptionPlan {
            id: "basic-monthly".into(),
            name: "Basic".into(),
            tier: SubscriptionTier::Basic,
            billing_cycle: BillingCycle::Monthly,
            price: dec!(19.99),
            currency: "USD".into(),
            tokens: 500,
            cost_table: basic_costs.clone(),
            max_file_size_mb: 50,
            max_concurrent_jobs: 3,
            watermark: false,
        },
        SubscriptionPlan {
            id: "basic-quarterly".into(),
            name: "Basic".into(),
            tier: SubscriptionTier::Basic,
            billing_cycle: BillingCycle::Quarterly,
            price: dec!(47.97),
            currency: "USD".into(),
            tokens: 1500,
            cost_table: basic_costs,
            max_file_size_mb: 50,
            max_concurrent_jobs: 3,
            watermark: false,
        },
        SubscriptionPlan {
            id: "premium-monthly".into(),
            name: "Premium".into(),
            tier: SubscriptionTier::Premium,
            billing_cycle: BillingCycle::Monthly,
            price: dec!(49.99),
            currency: "USD".into(),
            tokens: 2000,
            cost_table: premium_costs.clone(),
            max_file_size_mb: 200,
            max_concurrent_jobs: 10,
            watermark: false,
        },
        SubscriptionPlan {
            id: "premium-quarterly".into(),
            name: "Premium".into(),
            tier: SubscriptionTier::Premium,
            billing_cycle: BillingCycle::Quarterly,
            price: dec!(112.47),
            currency: "USD".into(),
            tokens: 6000,
            cost_table: premium_costs.clone(),
            max_file_size_mb: 200,
            max_concurrent_jobs: 10,
            watermark: false,
        },
        SubscriptionPlan {
            id: "premium-biyearly".into(),
            name: "Premium".into(),
            tier: SubscriptionTier::Premium,
            billing_cycle: BillingCycle::Biyearly,
            price: dec!(209.95),
            currency: "USD".into(),
            tokens: 12000,
            cost_table: premium_costs.clone(),
            max_file_size_mb: 200,
            max_concurrent_jobs: 10,
            watermark: false,
        },
        SubscriptionPlan {
            id: "premium-yearly".into(),
            name: "Premium".into(),
            tier: SubscriptionTier::Premium,
            billing_cycle: BillingCycle::Yearly,
            price: dec!(359.95),
            currency: "USD".into(),
            tokens: 24000,
            cost_table: premium_costs,
            max_file_size_mb: 200,
            max_concurrent_jobs: 10,
            watermark: false,
        },
    ]
}

fn default_packs() -> Vec<TokenPack> {
    vec![
        TokenPack {
            id: "starter-pack".into(),
            name: "Starter Pack".into(),
            tokens: 100,
            bonus_tokens: 0,
            price: dec!(4.99),
            currency: "USD".into(),
            description: "Perfect for trying out our features".into(),
            popular: false,
        },
        TokenPack {
            id: "standard-pack".into(),
            name: "Standard Pack".into(),
            tokens: 250,
            bonus_tokens: 25,
            price: dec!(9.99),
            currency: "USD".into(),
            description: "Great for regular users".into(),
            popular: true,
        },
        TokenPack {
            id: "pro-pack".into(),
            name: "Pro Pack".into(),
            tokens: 500,
            bonus_tokens: 75,
            price: dec!(17.99),
            currency: "USD".into(),
            description: "Best value for power users".into(),
            popular: false,
        },
        TokenPack {
            id: "business-pack".into(),
            name: "Business Pack".into(),
            tokens: 1000,
            bonus_tokens: 200,
            price: dec!(29.99),
            currency: "USD".into(),
            description: "Ideal for professionals and teams".into(),
            popular: false,
        },
        TokenPack {
            id: "enterprise-pack".into(),
            name: "Enterprise Pack".into(),
            tokens: 2500,
            bonus_tokens: 500,
            price: dec!(59.99),
            currency: "USD".into(),
            description: "Maximum value for heavy users".into(),
            popular: false,
        },
    ]
}
