//! Token Ledger
//!
//! Append-only transaction log per user, the sole source of truth for
//! balances. Balances are never stored; they are derived by folding the
//! log, so a cached balance can always be reconciled against a full
//! recomputation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use studio_common::FeatureCategory;
use uuid::Uuid;

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credited through reward flows (social tasks, engagement)
    Earned,
    /// Debited by an authorized feature invocation
    Spent,
    /// Credited by a completed token-pack or plan purchase
    Purchased,
    /// Credited by referral completion, signup grants, pack bonuses
    Bonus,
    /// Correction entry; summed into `used` alongside `spent`
    Refund,
}

impl TransactionKind {
    /// Kinds that add to a user's `total`
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Earned | Self::Purchased | Self::Bonus)
    }

    /// Kinds that add to a user's `used`
    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }
}

/// Kinds accepted by the credit entry point. `Spent` is excluded by
/// construction; debits go through the spend executor alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditKind {
    /// Reward flows
    Earned,
    /// Completed purchases
    Purchased,
    /// Referral/signup/pack bonuses
    Bonus,
    /// Correction entries
    Refund,
}

impl From<CreditKind> for TransactionKind {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Earned => Self::Earned,
            CreditKind::Purchased => Self::Purchased,
            CreditKind::Bonus => Self::Bonus,
            CreditKind::Refund => Self::Refund,
        }
    }
}

/// Immutable ledger record. Never updated or deleted; corrections are new
/// `Refund`/`Bonus` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransaction {
    /// Unique transaction id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Credit/debit kind
    pub kind: TransactionKind,
    /// Token amount, always positive
    pub amount: u64,
    /// Feature family the amount applies to
    pub category: FeatureCategory,
    /// Human-readable description
    pub description: String,
    /// Opaque key-value attachments
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Append timestamp
    pub created_at: DateTime<Utc>,
}

impl TokenTransaction {
    /// New transaction with a fresh id and timestamp
    pub fn new(
        user_id: Uuid,
        kind: TransactionKind,
        amount: u64,
        category: FeatureCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            category,
            description: description.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach opaque metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Derived balance view. `available` is clamped to zero for display; the
/// unclamped value is always `total - used` over the full log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Sum of credit kinds
    pub total: u64,
    /// Sum of debit kinds
    pub used: u64,
    /// `total - used`, clamped to >= 0
    pub available: u64,
    /// Timestamp of the newest folded transaction
    pub last_updated: Option<DateTime<Utc>>,
}

impl TokenBalance {
    /// Balance of an empty ledger
    pub fn zero() -> Self {
        Self {
            total: 0,
            used: 0,
            available: 0,
            last_updated: None,
        }
    }
}

impl Default for TokenBalance {
    fn default() -> Self {
        Self::zero()
    }
}

/// Fold a transaction log into a balance
pub fn fold_balance(transactions: &[TokenTransaction]) -> TokenBalance {
    let mut balance = TokenBalance::zero();
    for tx in transactions {
        if tx.kind.is_credit() {
            balance.total += tx.amount;
        } else {
            balance.used += tx.amount;
        }
        balance.last_updated = match balance.last_updated {
            Some(at) if at >= tx.created_at => Some(at),
            _ => Some(tx.created_at),
        };
    }
    balance.available = balance.total.saturating_sub(balance.used);
    balance
}

/// Fold a transaction log into per-category balances
pub fn fold_balance_by_category(
    transactions: &[TokenTransaction],
) -> HashMap<FeatureCategory, TokenBalance> {
    let mut by_category: HashMap<FeatureCategory, Vec<&TokenTransaction>> = HashMap::new();
    for tx in transactions {
        by_category.entry(tx.category).or_default().push(tx);
    }

    by_category
        .into_iter()
        .map(|(category, txs)| {
            let mut balance = TokenBalance::zero();
            for tx in txs {
                if tx.kind.is_credit() {
                    balance.total += tx.amount;
                } else {
                    balance.used += tx.amount;
                }
                balance.last_updated = match balance.last_updated {
                    Some(at) if at >= tx.created_at => Some(at),
                    _ => Some(tx.created_at),
                };
            }
            balance.available = balance.total.saturating_sub(balance.used);
            (category, balance)
        })
        .collect()
}

/// Ledger store failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// A concurrent-write precondition failed; safe to retry
    #[error("concurrent append conflict")]
    Conflict,
    /// The store cannot be read or written right now
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary of the engine. Append and read only; no update or
/// delete is ever issued.
pub trait LedgerStore: Send + Sync {
    /// Append one transaction. Atomic: a concurrent read sees the
    /// transaction fully or not at all. Appending a transaction id the
    /// store has already accepted is a no-op, so a retried append after a
    /// lost acknowledgement cannot double-count.
    fn append(&self, tx: TokenTransaction) -> Result<(), LedgerError>;

    /// All transactions for a user, in append order
    fn transactions_for(&self, user_id: Uuid) -> Result<Vec<TokenTransaction>, LedgerError>;
}

/// Attempt budget for transient store failures
pub(crate) const MAX_APPEND_ATTEMPTS: u32 = 3;

/// Append with a bounded retry budget. Retries conflicts and momentary
/// unavailability only; the final failure is surfaced unchanged.
pub(crate) fn append_with_retry(
    store: &dyn LedgerStore,
    tx: &TokenTransaction,
) -> Result<(), LedgerError> {
    let mut attempt = 1;
    loop {
        match store.append(tx.clone()) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < MAX_APPEND_ATTEMPTS => {
                tracing::warn!(tx_id = %tx.id, attempt, error = %err, "append failed, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// In-memory ledger store. One lock over the whole table gives the
/// all-or-nothing read visibility the aggregator requires.
pub struct MemoryLedger {
    log: RwLock<HashMap<Uuid, Vec<TokenTransaction>>>,
    seen: RwLock<HashSet<Uuid>>,
}

impl MemoryLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self {
            log: RwLock::new(HashMap::new()),
            seen: RwLock::new(HashSet::new()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryLedger {
    fn append(&self, tx: TokenTransaction) -> Result<(), LedgerError> {
        if !self.seen.write().insert(tx.id) {
            tracing::debug!(tx_id = %tx.id, "duplicate append ignored");
            return Ok(());
        }

        self.log.write().entry(tx.user_id).or_default().push(tx);
        Ok(())
    }

    fn transactions_for(&self, user_id: Uuid) -> Result<Vec<TokenTransaction>, LedgerError> {
        Ok(self
            .log
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// History query shape: newest first, optional kind/category filters,
/// offset/limit pagination
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Keep only this kind
    pub kind: Option<TransactionKind>,
    /// Keep only this category
    pub category: Option<FeatureCategory>,
    /// Skip this many matches
    pub offset: usize,
    /// Cap the result length
    pub limit: Option<usize>,
}

/// Read-side of the ledger: balances and history, recomputed from the log
/// on every call
pub struct BalanceAggregator {
    store: Arc<dyn LedgerStore>,
}

impl BalanceAggregator {
    /// Aggregator over a store
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance for a user
    pub fn balance(&self, user_id: Uuid) -> Result<TokenBalance, LedgerError> {
        Ok(fold_balance(&self.store.transactions_for(user_id)?))
    }

    /// Current balance partitioned by category
    pub fn balance_by_category(
        &self,
        user_id: Uuid,
    ) -> Result<HashMap<FeatureCategory, TokenBalance>, LedgerError> {
        Ok(fold_balance_by_category(
            &self.store.transactions_for(user_id)?,
        ))
    }

    /// Transaction history, newest first
    pub fn transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<TokenTransaction>, LedgerError> {
        let mut txs = self.store.transactions_for(user_id)?;
        txs.reverse();

        let filtered = txs
            .into_iter()
            .filter(|tx| filter.kind.map_or(true, |k| tx.kind == k))
            .filter(|tx| filter.category.map_or(true, |c| tx.category == c))
            .skip(filter.offset);

        Ok(match filter.limit {
            Some(limit) => filtered.take(limit).collect(),
            None => filtered.collect(),
        })
    }
}
