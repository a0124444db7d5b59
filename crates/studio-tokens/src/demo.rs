//! Demo Mode
//!
//! Time-boxed, allowance-capped override scope. Demo approvals are
//! absorbed by the session's own counter and never touch the ledger;
//! expiry discards any unspent allowance. Time decay is driven by
//! external clock ticks, not by request volume.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use studio_common::FeatureCategory;
use uuid::Uuid;

/// Default demo window
pub const DEMO_DURATION_MINUTES: u32 = 30;
/// Default demo token allowance
pub const DEMO_TOKEN_ALLOWANCE: u64 = 100;

/// Caps applied to demo-priced work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoRestrictions {
    /// Upload cap in megabytes
    pub max_file_size_mb: u32,
    /// Processing wall-clock cap in seconds
    pub max_processing_secs: u32,
    /// Outputs carry a watermark
    pub watermark_output: bool,
    /// Only the reduced model set is served
    pub limited_models: bool,
}

impl Default for DemoRestrictions {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10,
            max_processing_secs: 300,
            watermark_output: true,
            limited_models: true,
        }
    }
}

/// One demo scope, bound to a browsing/API session
pub struct DemoSession {
    /// Session id the host hands back on each request
    pub id: Uuid,
    active: AtomicBool,
    remaining_minutes: AtomicU32,
    allowance: AtomicU64,
    eligible: Vec<FeatureCategory>,
    /// Caps for demo-priced work
    pub restrictions: DemoRestrictions,
    /// Grant time
    pub started_at: DateTime<Utc>,
}

impl DemoSession {
    fn new(duration_minutes: u32, token_allowance: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            active: AtomicBool::new(true),
            remaining_minutes: AtomicU32::new(duration_minutes),
            allowance: AtomicU64::new(token_allowance),
            eligible: FeatureCategory::ALL.to_vec(),
            restrictions: DemoRestrictions::default(),
            started_at: Utc::now(),
        }
    }

    /// Active and not yet timed out
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.remaining_minutes.load(Ordering::Acquire) > 0
    }

    /// Minutes left in the window
    pub fn remaining_minutes(&self) -> u32 {
        self.remaining_minutes.load(Ordering::Acquire)
    }

    /// Unspent demo allowance
    pub fn remaining_allowance(&self) -> u64 {
        self.allowance.load(Ordering::Acquire)
    }

    /// Category is covered by this demo grant
    pub fn eligible(&self, category: FeatureCategory) -> bool {
        self.eligible.contains(&category)
    }

    /// Absorb a priced request into the demo allowance. False when the
    /// session is dead or the remaining allowance is smaller than `cost`;
    /// the caller then falls through to ledger pricing.
    pub fn try_consume(&self, cost: u64) -> bool {
        if !self.is_active() {
            return false;
        }

        loop {
            let current = self.allowance.load(Ordering::Acquire);
            if current < cost {
                return false;
            }

            if self
                .allowance
                .compare_exchange_weak(
                    current,
                    current - cost,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// One external clock tick: a minute elapsed
    pub fn tick(&self) {
        let left = self.remaining_minutes.load(Ordering::Acquire);
        if left <= 1 {
            self.remaining_minutes.store(0, Ordering::Release);
            self.active.store(false, Ordering::Release);
        } else {
            self.remaining_minutes.store(left - 1, Ordering::Release);
        }
    }

    /// Terminate the session early
    pub fn end(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Registry of live demo sessions
pub struct DemoController {
    sessions: DashMap<Uuid, Arc<DemoSession>>,
}

impl DemoController {
    /// Empty controller
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Grant a demo scope
    pub fn start(&self, duration_minutes: u32, token_allowance: u64) -> Arc<DemoSession> {
        let session = Arc::new(DemoSession::new(duration_minutes, token_allowance));
        tracing::info!(
            session_id = %session.id,
            duration_minutes,
            token_allowance,
            "demo session started"
        );
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Grant a demo scope with the default window and allowance
    pub fn start_default(&self) -> Arc<DemoSession> {
        self.start(DEMO_DURATION_MINUTES, DEMO_TOKEN_ALLOWANCE)
    }

    /// Live session by id
    pub fn get(&self, id: Uuid) -> Option<Arc<DemoSession>> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Advance every session by one minute and drop the dead ones
    pub fn tick_all(&self) {
        for session in self.sessions.iter() {
            session.tick();
        }
        self.sessions.retain(|_, session| session.is_active());
    }

    /// Terminate and drop a session
    pub fn end(&self, id: Uuid) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            session.end();
            tracing::info!(session_id = %id, "demo session ended");
        }
    }
}

impl Default for DemoController {
    fn default() -> Self {
        Self::new()
    }
}
