//! Spend Executor
//!
//! Check-then-append as one atomic unit per user. All spend attempts for
//! a user serialize on that user's lock; spends for different users never
//! contend. At most one debit is appended per call, and the returned
//! balance is recomputed from the store, not locally decremented.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use studio_common::FeatureCategory;
use uuid::Uuid;

use crate::ledger::{
    append_with_retry, fold_balance, LedgerStore, TokenBalance, TokenTransaction, TransactionKind,
};
use crate::TokenError;

/// Outcome of a successful spend
#[derive(Debug, Clone)]
pub struct SpendReceipt {
    /// Id of the appended debit
    pub transaction_id: Uuid,
    /// Balance recomputed after the append
    pub balance: TokenBalance,
}

/// Applies authorized debits to the ledger
pub struct SpendExecutor {
    store: Arc<dyn LedgerStore>,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl SpendExecutor {
    /// Executor over a store
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            user_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Debit `amount` tokens from the user, or fail with
    /// `InsufficientFunds` without touching the ledger.
    pub fn spend(
        &self,
        user_id: Uuid,
        category: FeatureCategory,
        amount: u64,
        description: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<SpendReceipt, TokenError> {
        if amount == 0 {
            return Err(TokenError::InvalidAmount(0));
        }

        let lock = self.lock_for(user_id);
        let _guard = lock.lock();

        // Re-read under the lock; the pre-check the authorizer ran may be
        // stale by the time we hold it.
        let balance = fold_balance(&self.store.transactions_for(user_id)?);
        if balance.available < amount {
            return Err(TokenError::InsufficientFunds {
                required: amount,
                available: balance.available,
            });
        }

        let tx = TokenTransaction::new(
            user_id,
            TransactionKind::Spent,
            amount,
            category,
            description,
        )
        .with_metadata(metadata);
        let transaction_id = tx.id;

        // Transient store failures retry inside the helper; an
        // insufficient-funds decision above is final and never retried.
        append_with_retry(self.store.as_ref(), &tx)?;
        tracing::info!(
            user_id = %user_id,
            tx_id = %transaction_id,
            amount,
            category = %category,
            "tokens spent"
        );

        let balance = fold_balance(&self.store.transactions_for(user_id)?);
        Ok(SpendReceipt {
            transaction_id,
            balance,
        })
    }

}
