//! Usage Metrics
//!
//! Dashboard folds over a user's transaction history.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use studio_common::FeatureCategory;

use crate::ledger::{TokenTransaction, TransactionKind};
use crate::subscription::UserSubscriptionContext;

/// Aggregated feature-usage view for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Tokens debited by feature invocations
    pub total_tokens_used: u64,
    /// Spent tokens partitioned by category
    pub tokens_by_category: HashMap<FeatureCategory, u64>,
    /// Number of spent transactions
    pub jobs_completed: u64,
    /// Category with the highest spend, None with no usage
    pub most_used_category: Option<FeatureCategory>,
    /// Share of the monthly allowance used, 0-100
    pub subscription_utilization: f64,
}

/// Fold a user's history into usage metrics
pub fn usage_metrics(
    transactions: &[TokenTransaction],
    subscription: &UserSubscriptionContext,
) -> UsageMetrics {
    let spent: Vec<_> = transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Spent)
        .collect();

    let total_tokens_used = spent.iter().map(|tx| tx.amount).sum();

    let mut tokens_by_category: HashMap<FeatureCategory, u64> = HashMap::new();
    for tx in &spent {
        *tokens_by_category.entry(tx.category).or_default() += tx.amount;
    }

    let most_used_category = tokens_by_category
        .iter()
        .max_by_key(|(_, amount)| **amount)
        .map(|(category, _)| *category);

    UsageMetrics {
        total_tokens_used,
        tokens_by_category,
        jobs_completed: spent.len() as u64,
        most_used_category,
        subscription_utilization: subscription.utilization(),
    }
}
