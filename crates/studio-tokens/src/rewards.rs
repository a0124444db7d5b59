//! Reward Flows
//!
//! Credit side of the ledger: social-engagement rewards, referral
//! completion bonuses, and the signup grant. Every reward lands as an
//! append-only credit transaction; nothing here can debit.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use studio_common::{FeatureCategory, KeyedCooldown};
use uuid::Uuid;

use crate::ledger::{LedgerError, LedgerStore, TokenTransaction, TransactionKind};

/// Social network a reward task lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    /// twitter.com
    Twitter,
    /// facebook.com
    Facebook,
    /// instagram.com
    Instagram,
    /// linkedin.com
    Linkedin,
    /// tiktok.com
    Tiktok,
    /// youtube.com
    Youtube,
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Linkedin => "linkedin",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
        };
        f.write_str(s)
    }
}

/// Engagement action performed on a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialAction {
    /// Follow the studio account
    Follow,
    /// Share a post
    Share,
    /// Like a post
    Like,
    /// Comment on a post
    Comment,
    /// Post about the studio
    Post,
    /// Subscribe to the channel
    Subscribe,
}

impl fmt::Display for SocialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Follow => "follow",
            Self::Share => "share",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Post => "post",
            Self::Subscribe => "subscribe",
        };
        f.write_str(s)
    }
}

/// Tokens earned for one engagement
pub fn social_reward(platform: SocialPlatform, action: SocialAction) -> u64 {
    use SocialAction::*;
    use SocialPlatform::*;

    match (platform, action) {
        (Twitter, Follow) => 5,
        (Twitter, Share) => 3,
        (Twitter, Like) => 1,
        (Twitter, Comment) => 2,
        (Twitter, Post) => 4,
        (Twitter, Subscribe) => 8,
        (Facebook, Follow) => 4,
        (Facebook, Share) => 3,
        (Facebook, Like) => 1,
        (Facebook, Comment) => 2,
        (Facebook, Post) => 3,
        (Facebook, Subscribe) => 6,
        (Instagram, Follow) => 5,
        (Instagram, Share) => 4,
        (Instagram, Like) => 1,
        (Instagram, Comment) => 2,
        (Instagram, Post) => 5,
        (Instagram, Subscribe) => 7,
        (Linkedin, Follow) => 3,
        (Linkedin, Share) => 4,
        (Linkedin, Like) => 1,
        (Linkedin, Comment) => 3,
        (Linkedin, Post) => 6,
        (Linkedin, Subscribe) => 10,
        (Tiktok, Follow) => 6,
        (Tiktok, Share) => 4,
        (Tiktok, Like) => 1,
        (Tiktok, Comment) => 2,
        (Tiktok, Post) => 5,
        (Tiktok, Subscribe) => 9,
        (Youtube, Follow) => 8,
        (Youtube, Share) => 5,
        (Youtube, Like) => 2,
        (Youtube, Comment) => 3,
        (Youtube, Post) => 7,
        (Youtube, Subscribe) => 15,
    }
}

/// Reward amounts and pacing
#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Bonus credited to the referrer on completion
    pub referrer_bonus: u64,
    /// Bonus credited to the referred user on completion
    pub referred_bonus: u64,
    /// One-time grant on signup
    pub signup_grant: u64,
    /// Minimum gap between social rewards per user
    pub social_cooldown: Duration,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            referrer_bonus: 100,
            referred_bonus: 50,
            signup_grant: 50,
            social_cooldown: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Reward flow failure
#[derive(Debug, Clone)]
pub enum RewardError {
    /// User earned a social reward too recently
    CooldownActive,
    /// This (platform, action) task was already completed
    AlreadyCompleted,
    /// Credit could not be appended
    Ledger(LedgerError),
}

impl fmt::Display for RewardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CooldownActive => write!(f, "Social reward cooldown active"),
            Self::AlreadyCompleted => write!(f, "Engagement task already completed"),
            Self::Ledger(err) => write!(f, "Ledger error: {err}"),
        }
    }
}

impl std::error::Error for RewardError {}

impl From<LedgerError> for RewardError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

/// Issues reward credits against the ledger
pub struct RewardEngine {
    store: Arc<dyn LedgerStore>,
    config: RewardConfig,
    cooldown: KeyedCooldown,
    completed: DashMap<(Uuid, SocialPlatform, SocialAction), DateTime<Utc>>,
}

impl RewardEngine {
    /// Engine with the default amounts and a 24 h cooldown
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, RewardConfig::default())
    }

    /// Engine with explicit amounts and pacing
    pub fn with_config(store: Arc<dyn LedgerStore>, config: RewardConfig) -> Self {
        let cooldown = KeyedCooldown::new(config.social_cooldown);
        Self {
            store,
            config,
            cooldown,
            completed: DashMap::new(),
        }
    }

    /// One-time welcome grant for a fresh account
    pub fn grant_signup(&self, user_id: Uuid) -> Result<TokenTransaction, RewardError> {
        // Reward credits land in the voice-cloning bucket.
        let tx = TokenTransaction::new(
            user_id,
            TransactionKind::Bonus,
            self.config.signup_grant,
            FeatureCategory::VoiceCloning,
            "Welcome credit",
        );
        self.store.append(tx.clone())?;
        tracing::info!(user_id = %user_id, amount = tx.amount, "signup grant credited");
        Ok(tx)
    }

    /// Credit a verified engagement; each (platform, action) task pays out
    /// once per user, and successive rewards respect the cooldown.
    pub fn complete_engagement(
        &self,
        user_id: Uuid,
        platform: SocialPlatform,
        action: SocialAction,
    ) -> Result<u64, RewardError> {
        let key = (user_id, platform, action);
        if self.completed.contains_key(&key) {
            return Err(RewardError::AlreadyCompleted);
        }

        let cooldown_key = user_id.to_string();
        if !self.cooldown.ready(&cooldown_key) {
            return Err(RewardError::CooldownActive);
        }

        let amount = social_reward(platform, action);
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("platform".into(), serde_json::json!(platform));
        metadata.insert("action".into(), serde_json::json!(action));

        let tx = TokenTransaction::new(
            user_id,
            TransactionKind::Earned,
            amount,
            FeatureCategory::VoiceCloning,
            format!("Social media engagement: {platform} {action}"),
        )
        .with_metadata(metadata);
        self.store.append(tx)?;

        self.cooldown.try_touch(&cooldown_key);
        self.completed.insert(key, Utc::now());
        tracing::info!(user_id = %user_id, %platform, %action, amount, "engagement reward credited");
        Ok(amount)
    }

    /// Credit both sides of a completed referral
    pub fn complete_referral(
        &self,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> Result<(u64, u64), RewardError> {
        let referrer_tx = TokenTransaction::new(
            referrer_id,
            TransactionKind::Bonus,
            self.config.referrer_bonus,
            FeatureCategory::VoiceCloning,
            format!("Referral bonus for user {referred_id}"),
        );
        self.store.append(referrer_tx)?;

        let referred_tx = TokenTransaction::new(
            referred_id,
            TransactionKind::Bonus,
            self.config.referred_bonus,
            FeatureCategory::VoiceCloning,
            "Referral welcome bonus",
        );
        self.store.append(referred_tx)?;

        tracing::info!(
            referrer_id = %referrer_id,
            referred_id = %referred_id,
            "referral bonuses credited"
        );
        Ok((self.config.referrer_bonus, self.config.referred_bonus))
    }
}
