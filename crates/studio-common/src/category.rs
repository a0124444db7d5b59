//! Feature categories, subscription tiers, and billing cycles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metered feature family a token cost applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    /// Clone a voice from a sample
    VoiceCloning,
    /// Split a mix into stems
    StemSeparation,
    /// Denoise and restore audio
    VoiceCleaning,
    /// Real-time voice transformation
    VoiceChanging,
    /// Generate video from audio/text
    VideoGeneration,
}

impl FeatureCategory {
    /// All categories, in catalog order
    pub const ALL: [FeatureCategory; 5] = [
        FeatureCategory::VoiceCloning,
        FeatureCategory::StemSeparation,
        FeatureCategory::VoiceCleaning,
        FeatureCategory::VoiceChanging,
        FeatureCategory::VideoGeneration,
    ];

    /// Wire name (snake_case, matches the serialized form)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoiceCloning => "voice_cloning",
            Self::StemSeparation => "stem_separation",
            Self::VoiceCleaning => "voice_cleaning",
            Self::VoiceChanging => "voice_changing",
            Self::VideoGeneration => "video_generation",
        }
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice_cloning" => Ok(Self::VoiceCloning),
            "stem_separation" => Ok(Self::StemSeparation),
            "voice_cleaning" => Ok(Self::VoiceCleaning),
            "voice_changing" => Ok(Self::VoiceChanging),
            "video_generation" => Ok(Self::VideoGeneration),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Raised when a wire string names no known category
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown feature category: {0}")]
pub struct UnknownCategory(pub String);

/// Subscription level determining per-category pricing and allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// No paid plan
    Free,
    /// Entry paid plan
    Basic,
    /// Top paid plan
    Premium,
}

impl SubscriptionTier {
    /// Tier ordering, cheapest first
    pub const ORDER: [SubscriptionTier; 3] = [
        SubscriptionTier::Free,
        SubscriptionTier::Basic,
        SubscriptionTier::Premium,
    ];

    /// The tier one step above, None at the top
    pub fn next(&self) -> Option<SubscriptionTier> {
        let idx = Self::ORDER.iter().position(|t| t == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Free
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
        };
        f.write_str(s)
    }
}

/// Billing cycle of a subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    /// Renews every month
    Monthly,
    /// Renews every 3 months
    Quarterly,
    /// Renews every 6 months
    Biyearly,
    /// Renews every 12 months
    Yearly,
}

impl BillingCycle {
    /// Number of months the cycle spans
    pub fn months(&self) -> u64 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Biyearly => 6,
            Self::Yearly => 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in FeatureCategory::ALL {
            let parsed: FeatureCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, cat);
        }
    }

    #[test]
    fn test_category_unknown() {
        let err = "mastering".parse::<FeatureCategory>().unwrap_err();
        assert_eq!(err.0, "mastering");
    }

    #[test]
    fn test_category_serde_wire_names() {
        let json = serde_json::to_string(&FeatureCategory::StemSeparation).unwrap();
        assert_eq!(json, "\"stem_separation\"");
    }

    #[test]
    fn test_tier_order() {
        assert_eq!(SubscriptionTier::Free.next(), Some(SubscriptionTier::Basic));
        assert_eq!(SubscriptionTier::Basic.next(), Some(SubscriptionTier::Premium));
        assert_eq!(SubscriptionTier::Premium.next(), None);
    }

    #[test]
    fn test_cycle_months() {
        assert_eq!(BillingCycle::Monthly.months(), 1);
        assert_eq!(BillingCycle::Yearly.months(), 12);
    }
}
