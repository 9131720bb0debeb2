//! Loot containers and rarity rolls

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::LootId;

/// Highest level a loot roll accepts; generators reject anything above.
pub const MAX_LEVEL: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LootRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl LootRarity {
    pub const ALL: [LootRarity; 5] = [
        LootRarity::Common,
        LootRarity::Uncommon,
        LootRarity::Rare,
        LootRarity::Epic,
        LootRarity::Legendary,
    ];

    /// Items every container of this rarity can hold.
    pub fn item_pool(&self) -> &'static [&'static str] {
        match self {
            LootRarity::Common => &["basic_weapon", "basic_armor", "health_potion"],
            LootRarity::Uncommon => &["enhanced_weapon", "enhanced_armor", "mana_potion"],
            LootRarity::Rare => &["magical_weapon", "magical_armor", "elixir"],
            LootRarity::Epic => &["legendary_weapon", "legendary_armor", "phoenix_feather"],
            LootRarity::Legendary => &["artifact_weapon", "artifact_armor", "dragon_scale"],
        }
    }
}

impl std::fmt::Display for LootRarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LootRarity::Common => "common",
            LootRarity::Uncommon => "uncommon",
            LootRarity::Rare => "rare",
            LootRarity::Epic => "epic",
            LootRarity::Legendary => "legendary",
        };
        f.write_str(name)
    }
}

/// Who the roll is for. Boss hoards skew further toward the top tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RarityBias {
    Standard,
    Boss,
}

const BASE_RARITY_WEIGHTS: [f64; 5] = [0.5, 0.3, 0.15, 0.04, 0.01];

/// Rarity weights, indexed like [`LootRarity::ALL`].
pub fn rarity_weights(level: u32, bias: RarityBias) -> [f64; 5] {
    let mut w = BASE_RARITY_WEIGHTS;
    if level > 50 {
        w[3] *= 2.0;
        w[4] *= 1.5;
    } else if level > 30 {
        w[2] *= 1.5;
        w[3] *= 1.3;
    }
    if bias == RarityBias::Boss {
        w[0] *= 0.5;
        w[2] *= 1.5;
        w[3] *= 2.0;
        w[4] *= 2.0;
    }
    w
}

pub fn roll_rarity<R: Rng>(level: u32, bias: RarityBias, rng: &mut R) -> LootRarity {
    // weights are constant and positive
    match WeightedIndex::new(rarity_weights(level, bias)) {
        Ok(dist) => LootRarity::ALL[dist.sample(rng)],
        Err(_) => LootRarity::Common,
    }
}

/// Items found in every kind of container.
const BASE_ITEMS: [&str; 3] = ["gold_coin", "silver_coin", "precious_gem"];

/// Named loot table lookup.
pub fn loot_table(name: &str) -> &'static [&'static str] {
    match name {
        "ancient_relics" => &["ancient_scroll", "mysterious_artifact", "forgotten_tome"],
        "magical_items" => &["magic_wand", "enchanted_ring", "spell_book"],
        "city_treasures" => &["noble_crown", "royal_jewel", "city_seal"],
        "historical_artifacts" => &["historical_document", "ancient_map", "royal_scepter"],
        "dungeon_loot" => &["dark_blade", "shadow_cloak", "soul_gem"],
        "dark_artifacts" => &["cursed_weapon", "demonic_armor", "void_crystal"],
        "magical_tomes" => &["spell_tome", "ritual_book", "arcane_scroll"],
        "enchanted_items" => &["enchanted_sword", "magical_staff", "crystal_orb"],
        "divine_relics" => &["holy_symbol", "sacred_weapon", "blessed_armor"],
        "sacred_items" => &["divine_scroll", "holy_relic", "sacred_gem"],
        _ => &["mysterious_item"],
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LootContainer {
    pub id: LootId,
    pub name: String,
    pub rarity: LootRarity,
    pub items: Vec<String>,
    pub currency: u32,
    pub experience: u32,
    pub locked: bool,
    pub trapped: bool,
}

/// Inputs for one container roll.
#[derive(Clone, Copy, Debug)]
pub struct LootRoll<'a> {
    pub level: u32,
    pub bias: RarityBias,
    /// Items specific to the place the container sits in
    pub signature_items: &'a [&'static str],
    /// Named tables with a 40% chance each of contributing an item
    pub tables: &'a [&'static str],
    pub trap_chance: f64,
}

impl LootContainer {
    pub fn roll<R: Rng>(id: LootId, name: impl Into<String>, roll: LootRoll<'_>, rng: &mut R) -> Self {
        let level = roll.level.clamp(1, MAX_LEVEL);
        let rarity = roll_rarity(level, roll.bias, rng);
        let max_items = rng.gen_range(1..=5usize);

        let mut items: Vec<String> = BASE_ITEMS
            .choose_multiple(rng, 2)
            .map(|s| s.to_string())
            .collect();
        if let Some(item) = roll.signature_items.choose(rng) {
            items.insert(0, item.to_string());
        }
        if let Some(item) = rarity.item_pool().choose(rng) {
            items.push(item.to_string());
        }
        for table in roll.tables {
            if rng.gen_bool(0.4) {
                if let Some(item) = loot_table(table).choose(rng) {
                    items.push(item.to_string());
                }
            }
        }
        items.truncate(max_items);

        Self {
            id,
            name: name.into(),
            rarity,
            items,
            currency: rng.gen_range(10..=100u32).saturating_mul(level),
            experience: rng.gen_range(5..=25u32).saturating_mul(level),
            locked: rng.gen_bool(0.3),
            trapped: rng.gen_bool(roll.trap_chance.clamp(0.0, 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    fn share(weights: [f64; 5], idx: usize) -> f64 {
        weights[idx] / weights.iter().sum::<f64>()
    }

    #[test]
    fn test_rarity_skews_with_level() {
        let low = rarity_weights(10, RarityBias::Standard);
        let mid = rarity_weights(40, RarityBias::Standard);
        let high = rarity_weights(60, RarityBias::Standard);
        assert!(share(mid, 2) > share(low, 2));
        assert!(share(high, 4) > share(low, 4));
        assert!(share(high, 3) > share(mid, 3));
    }

    #[test]
    fn test_boss_bias_raises_top_tiers() {
        let standard = rarity_weights(10, RarityBias::Standard);
        let boss = rarity_weights(10, RarityBias::Boss);
        assert!(share(boss, 4) > share(standard, 4));
        assert!(share(boss, 0) < share(standard, 0));
    }

    #[test]
    fn test_huge_level_is_capped() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let roll = LootRoll {
            level: u32::MAX,
            bias: RarityBias::Boss,
            signature_items: &[],
            tables: &[],
            trap_chance: 0.0,
        };
        let c = LootContainer::roll(LootId(0), "hoard", roll, &mut rng);
        assert!(c.currency <= 100 * MAX_LEVEL);
        assert!(c.experience <= 25 * MAX_LEVEL);
    }

    #[test]
    fn test_container_roll_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for i in 0..50 {
            let roll = LootRoll {
                level: 20,
                bias: RarityBias::Standard,
                signature_items: &["gold_chest"],
                tables: &["dungeon_loot"],
                trap_chance: 0.2,
            };
            let c = LootContainer::roll(LootId(i), "chest", roll, &mut rng);
            assert!((1..=5).contains(&c.items.len()));
            assert!((200..=2000).contains(&c.currency));
            assert!((100..=500).contains(&c.experience));
        }
    }
}
