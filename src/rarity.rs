use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::NftAttribute;

/// Rank assigned to tokens the rarity provider never ranked. Large enough to
/// land in every collection's catch-all tier.
pub const UNRANKED_RANK: u32 = 999_999;

const NEUTRAL_COLOR: u32 = 0x95A5A6;

/// Display tier resolved for a token: a name and an embed color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RarityTier {
    pub name: String,
    pub color: u32,
}

/// One rank bracket. Tiers are kept sorted ascending by `max_rank`; the
/// first tier with `max_rank >= rank` wins.
#[derive(Debug, Clone, Deserialize)]
pub struct TierRule {
    pub max_rank: u32,
    pub name: String,
    pub color: u32,
}

/// Override checked before any rank bracket: a token carrying this exact
/// trait name (value compared case-insensitively) gets the override tier
/// no matter its rank.
#[derive(Debug, Clone, Deserialize)]
pub struct SpecialAttributeRule {
    pub trait_name: String,
    pub trait_value: String,
    pub name: String,
    pub color: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RarityRuleSet {
    pub tiers: Vec<TierRule>,
    pub special_attributes: Vec<SpecialAttributeRule>,
}

/// Classify a token against one rule set. Pure, no I/O.
///
/// Callers map an absent or invalid rank to [`UNRANKED_RANK`] beforehand so
/// unranked tokens fall into the lowest tier instead of erroring.
pub fn classify(rank: u32, attributes: &[NftAttribute], rules: &RarityRuleSet) -> RarityTier {
    for special in &rules.special_attributes {
        let matched = attributes.iter().any(|attr| {
            attr.name == special.trait_name && attr.value.eq_ignore_ascii_case(&special.trait_value)
        });
        if matched {
            return RarityTier {
                name: special.name.clone(),
                color: special.color,
            };
        }
    }

    rules
        .tiers
        .iter()
        .find(|tier| rank <= tier.max_rank)
        .or_else(|| rules.tiers.last())
        .map(|tier| RarityTier {
            name: tier.name.clone(),
            color: tier.color,
        })
        .unwrap_or_else(fallback_tier)
}

fn fallback_tier() -> RarityTier {
    RarityTier {
        name: "Ranked".to_string(),
        color: NEUTRAL_COLOR,
    }
}

/// Per-collection rule sets, built once at startup and injected wherever
/// classification happens. Adding a collection means adding one entry here
/// (or supplying a custom map), never touching `classify`.
#[derive(Debug, Clone)]
pub struct RarityConfig {
    rules: HashMap<String, RarityRuleSet>,
}

impl RarityConfig {
    pub fn new(rules: HashMap<String, RarityRuleSet>) -> Self {
        Self { rules }
    }

    /// The rule sets shipped with the service.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_RULES.clone())
    }

    pub fn rules_for(&self, collection_slug: &str) -> Option<&RarityRuleSet> {
        self.rules.get(collection_slug)
    }

    /// Classify against the collection's rule set, or return the neutral
    /// `Ranked` tier when the collection has no rules configured.
    pub fn classify(&self, collection_slug: &str, rank: u32, attributes: &[NftAttribute]) -> RarityTier {
        match self.rules_for(collection_slug) {
            Some(rules) => classify(rank, attributes, rules),
            None => fallback_tier(),
        }
    }
}

impl Default for RarityConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

static BUILTIN_RULES: Lazy<HashMap<String, RarityRuleSet>> = Lazy::new(|| {
    let mut rules = HashMap::new();

    rules.insert(
        "the_growerz".to_string(),
        RarityRuleSet {
            tiers: standard_tiers(),
            special_attributes: vec![SpecialAttributeRule {
                trait_name: "Signed by haizeel".to_string(),
                trait_value: "true".to_string(),
                name: "Signed".to_string(),
                color: 0xFFD700,
            }],
        },
    );

    rules.insert(
        "midevils".to_string(),
        RarityRuleSet {
            // 5,000 supply: 1/1s 1-27, top 1% mythic, top 4% legendary,
            // top 10% epic, top 30% rare, top 60% uncommon.
            tiers: vec![
                tier(27, "1/1", 0xFFD700),
                tier(50, "Mythic", 0x9932CC),
                tier(200, "Legendary", 0xFFA500),
                tier(500, "Epic", 0xFF4500),
                tier(1500, "Rare", 0x1E90FF),
                tier(3000, "Uncommon", 0x32CD32),
                tier(UNRANKED_RANK, "Common", 0xADFF2F),
            ],
            special_attributes: Vec::new(),
        },
    );

    rules.insert(
        "gainz".to_string(),
        RarityRuleSet {
            tiers: standard_tiers(),
            special_attributes: Vec::new(),
        },
    );

    rules.insert(
        "giga_buds".to_string(),
        RarityRuleSet {
            tiers: standard_tiers(),
            special_attributes: Vec::new(),
        },
    );

    rules
});

fn standard_tiers() -> Vec<TierRule> {
    vec![
        tier(1, "1/1", 0xFFD700),
        tier(71, "Mythic", 0x9932CC),
        tier(361, "Epic", 0xFFA500),
        tier(843, "Rare", 0x1E90FF),
        tier(1446, "Uncommon", 0x32CD32),
        tier(UNRANKED_RANK, "Common", 0xADFF2F),
    ]
}

fn tier(max_rank: u32, name: &str, color: u32) -> TierRule {
    TierRule {
        max_rank,
        name: name.to_string(),
        color,
    }
}

/// Effective rank for classification and display: absent or non-positive
/// ranks become the unranked sentinel.
pub fn effective_rank(rank: Option<i32>) -> u32 {
    match rank {
        Some(r) if r > 0 => r as u32,
        _ => UNRANKED_RANK,
    }
}
