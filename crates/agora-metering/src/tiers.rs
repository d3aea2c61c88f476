//! Subscription tiers and per-metric quotas.

use std::collections::BTreeMap;

use agora_config::MeteringSettings;

/// Tier every customer starts on, and the fallback for unknown tiers.
pub const FREE_TIER: &str = "free";

/// A per-metric allowance for one billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    /// Whether a customer who has already used `used` units may consume more.
    /// The boundary is exclusive: usage at the limit is no longer allowed.
    pub fn allows(&self, used: i64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(limit) => used >= 0 && (used as u64) < *limit,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl From<i64> for Quota {
    /// Configuration encodes unlimited as `-1`; any negative value is
    /// treated the same.
    fn from(limit: i64) -> Self {
        if limit < 0 {
            Self::Unlimited
        } else {
            Self::Limited(limit as u64)
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(limit) => write!(f, "{limit}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// The tier table: tier name to per-metric quotas.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: BTreeMap<String, BTreeMap<String, Quota>>,
}

impl TierCatalog {
    /// The built-in marketplace tier table.
    pub fn builtin() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert("free".to_string(), Self::tier(&[("ai_interactions", 10), ("bookings", 5), ("listings", 1)]));
        tiers.insert("starter".to_string(), Self::tier(&[("ai_interactions", 200), ("bookings", 50), ("listings", 10)]));
        tiers.insert("professional".to_string(), Self::tier(&[("ai_interactions", 2000), ("bookings", 500), ("listings", 50)]));
        tiers.insert("enterprise".to_string(), Self::tier(&[("ai_interactions", -1), ("bookings", -1), ("listings", -1)]));
        Self { tiers }
    }

    fn tier(limits: &[(&str, i64)]) -> BTreeMap<String, Quota> {
        limits
            .iter()
            .map(|(metric, limit)| (metric.to_string(), Quota::from(*limit)))
            .collect()
    }

    /// Build the catalog from configuration, starting from the built-in
    /// table. Configured tiers replace built-in ones of the same name.
    pub fn from_settings(settings: &MeteringSettings) -> Self {
        let mut catalog = Self::builtin();
        for (tier, limits) in &settings.tiers {
            let quotas = limits
                .iter()
                .map(|(metric, limit)| (metric.clone(), Quota::from(*limit)))
                .collect();
            catalog.tiers.insert(tier.clone(), quotas);
        }
        catalog
    }

    /// Quota for a metric under a tier.
    ///
    /// An unknown tier falls back to `free`; a metric a known tier does not
    /// list is unmetered.
    pub fn quota(&self, tier: &str, metric: &str) -> Quota {
        let quotas = self
            .tiers
            .get(tier)
            .or_else(|| self.tiers.get(FREE_TIER));
        match quotas {
            Some(quotas) => quotas.get(metric).copied().unwrap_or(Quota::Unlimited),
            None => Quota::Unlimited,
        }
    }

    /// Whether usage on this tier is reported to the billing provider.
    /// Free-tier customers have nothing to bill.
    pub fn is_metered(&self, tier: &str) -> bool {
        tier != FREE_TIER
    }

    pub fn tier_names(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
