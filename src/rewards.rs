// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Weighted reward engine.
//!
//! A container (loot box / egg) is an ordered set of weighted item entries.
//! A draw scales each base weight by the player's luck factor, then samples
//! the adjusted distribution with an inverse-CDF walk over the container's
//! stored entry order, so identical weights and roll always select the same
//! entry.
//!
//! The engine is stateless apart from its configured tables; draws take the
//! RNG as a parameter so callers control seeding.

use crate::base::{ContainerId, CurrencyId, ItemId};
use crate::error::{CatalogError, EconomyError};
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Rarity tier of a reward item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl std::fmt::Display for Rarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        };
        f.write_str(label)
    }
}

impl Rarity {
    /// Per-tier luck multiplier.
    ///
    /// Monotonically increasing with rarity: higher tiers gain
    /// proportionally more weight from the same luck amount, commons gain
    /// nothing.
    pub fn luck_boost(self) -> f64 {
        match self {
            Rarity::Common => 0.0,
            Rarity::Uncommon => 0.5,
            Rarity::Rare => 1.0,
            Rarity::Epic => 2.0,
            Rarity::Legendary => 4.0,
        }
    }
}

/// Static definition of a reward item.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDefinition {
    pub id: ItemId,
    pub name: String,
    pub rarity: Rarity,
    /// Gameplay stat block, opaque to the engine.
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
}

/// One weighted entry inside a container.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardEntry {
    pub item: ItemId,
    pub weight: f64,
}

/// Cost of opening a container.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerPrice {
    pub currency: CurrencyId,
    pub amount: f64,
}

/// A configured loot container.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardContainer {
    pub id: ContainerId,
    pub name: String,
    pub price: ContainerPrice,
    /// Entry order is the draw's enumeration order and must stay stable.
    pub entries: Vec<RewardEntry>,
}

/// One entry's share of a container at a given luck amount.
#[derive(Debug, Clone)]
pub struct EntryChance {
    pub item: ItemId,
    pub rarity: Rarity,
    pub adjusted_weight: f64,
    /// Normalized probability in percent; all entries of a container sum
    /// to 100.
    pub chance: f64,
}

/// Display summary of a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub price_currency: CurrencyId,
    pub price_amount: f64,
    pub entry_count: usize,
}

/// On-disk catalog file layout (TOML).
#[derive(Debug, Deserialize)]
pub struct RewardConfig {
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    #[serde(default)]
    pub containers: Vec<RewardContainer>,
}

/// Validated reward tables: items plus containers referencing them.
#[derive(Debug)]
pub struct RewardCatalog {
    containers: HashMap<ContainerId, RewardContainer>,
    order: Vec<ContainerId>,
    items: HashMap<ItemId, ItemDefinition>,
}

impl RewardCatalog {
    /// Builds and validates the catalog.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidWeight`] - negative or non-finite entry weight.
    /// - [`CatalogError::UnknownItem`] - entry references a missing item.
    /// - [`CatalogError::DuplicateId`] - duplicate item or container id.
    pub fn new(
        items: Vec<ItemDefinition>,
        containers: Vec<RewardContainer>,
    ) -> Result<Self, CatalogError> {
        let mut item_map = HashMap::with_capacity(items.len());
        for item in items {
            let id = item.id.clone();
            if item_map.insert(id.clone(), item).is_some() {
                return Err(CatalogError::DuplicateId(id.0));
            }
        }

        let mut container_map = HashMap::with_capacity(containers.len());
        let mut order = Vec::with_capacity(containers.len());
        for container in containers {
            for entry in &container.entries {
                if !entry.weight.is_finite() || entry.weight < 0.0 {
                    return Err(CatalogError::InvalidWeight(container.id.0.clone()));
                }
                if !item_map.contains_key(&entry.item) {
                    return Err(CatalogError::UnknownItem(
                        container.id.0.clone(),
                        entry.item.0.clone(),
                    ));
                }
            }
            order.push(container.id.clone());
            if container_map
                .insert(container.id.clone(), container)
                .is_some()
            {
                let id = order.pop().expect("order tracks insertions");
                return Err(CatalogError::DuplicateId(id.0));
            }
        }

        Ok(Self {
            containers: container_map,
            order,
            items: item_map,
        })
    }

    /// Loads a catalog from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let config: RewardConfig = toml::from_str(source)?;
        Self::new(config.items, config.containers)
    }

    /// Loads a catalog from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn container(&self, id: &ContainerId) -> Option<&RewardContainer> {
        self.containers.get(id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&ItemDefinition> {
        self.items.get(id)
    }

    /// Container summaries in declaration order.
    pub fn summaries(&self) -> Vec<ContainerSummary> {
        self.order
            .iter()
            .map(|id| {
                let container = &self.containers[id];
                ContainerSummary {
                    id: container.id.clone(),
                    name: container.name.clone(),
                    price_currency: container.price.currency.clone(),
                    price_amount: container.price.amount,
                    entry_count: container.entries.len(),
                }
            })
            .collect()
    }

    /// Luck-adjusted weight of one entry.
    ///
    /// `base * (1 + boost(rarity) * luck / 100)`; luck below zero or
    /// non-finite is treated as zero.
    pub fn adjusted_weight(&self, entry: &RewardEntry, luck: f64) -> f64 {
        let luck = sanitize_luck(luck);
        let boost = self
            .items
            .get(&entry.item)
            .map(|item| item.rarity.luck_boost())
            .unwrap_or(0.0);
        entry.weight * (1.0 + boost * luck / 100.0)
    }

    /// Draws a single item from a container.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::UnknownContainer`] - no such container.
    /// - [`EconomyError::EmptyDistribution`] - total adjusted weight is
    ///   zero (empty container or all-zero weights).
    pub fn draw<R: Rng + ?Sized>(
        &self,
        container_id: &ContainerId,
        luck: f64,
        rng: &mut R,
    ) -> Result<ItemId, EconomyError> {
        let container = self
            .containers
            .get(container_id)
            .ok_or(EconomyError::UnknownContainer)?;

        let weights: Vec<f64> = container
            .entries
            .iter()
            .map(|entry| self.adjusted_weight(entry, luck))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(EconomyError::EmptyDistribution);
        }

        let roll = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for (entry, weight) in container.entries.iter().zip(&weights) {
            cumulative += weight;
            if roll < cumulative {
                return Ok(entry.item.clone());
            }
        }

        // Floating-point rounding can leave the walk one ulp short of the
        // roll; fall back to a uniform pick rather than failing the draw.
        let index = rng.gen_range(0..container.entries.len());
        Ok(container.entries[index].item.clone())
    }

    /// `count` independent draws (with replacement).
    pub fn draw_many<R: Rng + ?Sized>(
        &self,
        container_id: &ContainerId,
        count: usize,
        luck: f64,
        rng: &mut R,
    ) -> Result<Vec<ItemId>, EconomyError> {
        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            results.push(self.draw(container_id, luck, rng)?);
        }
        Ok(results)
    }

    /// Normalized probability table for a container at a given luck amount.
    ///
    /// Uses the same adjusted weights as [`RewardCatalog::draw`], so the
    /// displayed table matches the live distribution exactly.
    pub fn contents_preview(
        &self,
        container_id: &ContainerId,
        luck: f64,
    ) -> Result<Vec<EntryChance>, EconomyError> {
        let container = self
            .containers
            .get(container_id)
            .ok_or(EconomyError::UnknownContainer)?;

        let weights: Vec<f64> = container
            .entries
            .iter()
            .map(|entry| self.adjusted_weight(entry, luck))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(EconomyError::EmptyDistribution);
        }

        Ok(container
            .entries
            .iter()
            .zip(&weights)
            .map(|(entry, weight)| EntryChance {
                item: entry.item.clone(),
                rarity: self.items[&entry.item].rarity,
                adjusted_weight: *weight,
                chance: weight / total * 100.0,
            })
            .collect())
    }

    /// Probability tables across a set of luck values. Tuning/diagnostic
    /// surface backing the CLI.
    pub fn simulate(
        &self,
        container_id: &ContainerId,
        luck_values: &[f64],
    ) -> Result<Vec<(f64, Vec<EntryChance>)>, EconomyError> {
        luck_values
            .iter()
            .map(|&luck| Ok((luck, self.contents_preview(container_id, luck)?)))
            .collect()
    }
}

fn sanitize_luck(luck: f64) -> f64 {
    if luck.is_finite() { luck.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn item(id: &str, rarity: Rarity) -> ItemDefinition {
        ItemDefinition {
            id: id.into(),
            name: id.to_uppercase(),
            rarity,
            stats: BTreeMap::new(),
        }
    }

    fn catalog() -> RewardCatalog {
        RewardCatalog::new(
            vec![
                item("dog", Rarity::Common),
                item("cat", Rarity::Rare),
                item("dragon", Rarity::Legendary),
            ],
            vec![RewardContainer {
                id: "basic-egg".into(),
                name: "Basic Egg".into(),
                price: ContainerPrice {
                    currency: "coins".into(),
                    amount: 100.0,
                },
                entries: vec![
                    RewardEntry {
                        item: "dog".into(),
                        weight: 90.0,
                    },
                    RewardEntry {
                        item: "cat".into(),
                        weight: 9.0,
                    },
                    RewardEntry {
                        item: "dragon".into(),
                        weight: 1.0,
                    },
                ],
            }],
        )
        .unwrap()
    }

    #[test]
    fn luck_boost_is_monotonic() {
        let tiers = [
            Rarity::Common,
            Rarity::Uncommon,
            Rarity::Rare,
            Rarity::Epic,
            Rarity::Legendary,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].luck_boost() < pair[1].luck_boost());
        }
    }

    #[test]
    fn negative_weight_rejected() {
        let err = RewardCatalog::new(
            vec![item("dog", Rarity::Common)],
            vec![RewardContainer {
                id: "egg".into(),
                name: "Egg".into(),
                price: ContainerPrice {
                    currency: "coins".into(),
                    amount: 1.0,
                },
                entries: vec![RewardEntry {
                    item: "dog".into(),
                    weight: -1.0,
                }],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidWeight(_)));
    }

    #[test]
    fn unknown_item_reference_rejected() {
        let err = RewardCatalog::new(
            vec![],
            vec![RewardContainer {
                id: "egg".into(),
                name: "Egg".into(),
                price: ContainerPrice {
                    currency: "coins".into(),
                    amount: 1.0,
                },
                entries: vec![RewardEntry {
                    item: "ghost".into(),
                    weight: 1.0,
                }],
            }],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownItem(_, _)));
    }

    #[test]
    fn zero_luck_leaves_weights_unchanged() {
        let catalog = catalog();
        let container = catalog.container(&"basic-egg".into()).unwrap();
        for entry in &container.entries {
            assert_eq!(catalog.adjusted_weight(entry, 0.0), entry.weight);
        }
    }

    #[test]
    fn luck_favors_higher_rarities() {
        let catalog = catalog();
        let base = catalog.contents_preview(&"basic-egg".into(), 0.0).unwrap();
        let lucky = catalog.contents_preview(&"basic-egg".into(), 50.0).unwrap();

        // dragon (legendary) gains share, dog (common) loses share.
        assert!(lucky[2].chance > base[2].chance);
        assert!(lucky[0].chance < base[0].chance);
    }

    #[test]
    fn preview_chances_sum_to_hundred() {
        let catalog = catalog();
        for luck in [0.0, 1.0, 25.0, 100.0, 1000.0] {
            let preview = catalog.contents_preview(&"basic-egg".into(), luck).unwrap();
            let sum: f64 = preview.iter().map(|entry| entry.chance).sum();
            assert!((sum - 100.0).abs() < 1e-9, "luck {luck}: sum {sum}");
        }
    }

    #[test]
    fn negative_and_non_finite_luck_treated_as_zero() {
        let catalog = catalog();
        let base = catalog.contents_preview(&"basic-egg".into(), 0.0).unwrap();
        for luck in [-10.0, f64::NAN, f64::INFINITY] {
            let preview = catalog.contents_preview(&"basic-egg".into(), luck).unwrap();
            for (a, b) in base.iter().zip(&preview) {
                assert_eq!(a.chance, b.chance);
            }
        }
    }

    #[test]
    fn draw_returns_configured_items_only() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let item = catalog.draw(&"basic-egg".into(), 10.0, &mut rng).unwrap();
            assert!(["dog", "cat", "dragon"].contains(&item.0.as_str()));
        }
    }

    #[test]
    fn zero_weight_entry_never_drawn() {
        let catalog = RewardCatalog::new(
            vec![item("dog", Rarity::Common), item("ghost", Rarity::Rare)],
            vec![RewardContainer {
                id: "egg".into(),
                name: "Egg".into(),
                price: ContainerPrice {
                    currency: "coins".into(),
                    amount: 1.0,
                },
                entries: vec![
                    RewardEntry {
                        item: "ghost".into(),
                        weight: 0.0,
                    },
                    RewardEntry {
                        item: "dog".into(),
                        weight: 1.0,
                    },
                ],
            }],
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let drawn = catalog.draw(&"egg".into(), 0.0, &mut rng).unwrap();
            assert_eq!(drawn.0, "dog");
        }
    }

    #[test]
    fn all_zero_weights_fail_cleanly() {
        let catalog = RewardCatalog::new(
            vec![item("dog", Rarity::Common)],
            vec![RewardContainer {
                id: "egg".into(),
                name: "Egg".into(),
                price: ContainerPrice {
                    currency: "coins".into(),
                    amount: 1.0,
                },
                entries: vec![RewardEntry {
                    item: "dog".into(),
                    weight: 0.0,
                }],
            }],
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            catalog.draw(&"egg".into(), 0.0, &mut rng).unwrap_err(),
            EconomyError::EmptyDistribution
        );
        assert_eq!(
            catalog.contents_preview(&"egg".into(), 0.0).unwrap_err(),
            EconomyError::EmptyDistribution
        );
    }

    #[test]
    fn unknown_container_rejected() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            catalog.draw(&"mystery".into(), 0.0, &mut rng).unwrap_err(),
            EconomyError::UnknownContainer
        );
    }

    #[test]
    fn draw_many_yields_requested_count() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(5);
        let drawn = catalog
            .draw_many(&"basic-egg".into(), 25, 0.0, &mut rng)
            .unwrap();
        assert_eq!(drawn.len(), 25);
    }

    #[test]
    fn catalog_loads_from_toml() {
        let source = r#"
            [[items]]
            id = "dog"
            name = "Dog"
            rarity = "common"

            [[items]]
            id = "dragon"
            name = "Dragon"
            rarity = "legendary"
            stats = { power = 50.0 }

            [[containers]]
            id = "basic-egg"
            name = "Basic Egg"
            price = { currency = "coins", amount = 100.0 }
            entries = [
                { item = "dog", weight = 95.0 },
                { item = "dragon", weight = 5.0 },
            ]
        "#;
        let catalog = RewardCatalog::from_toml_str(source).unwrap();
        assert_eq!(catalog.summaries().len(), 1);
        assert_eq!(catalog.summaries()[0].entry_count, 2);
        assert_eq!(
            catalog.item(&"dragon".into()).unwrap().stats["power"],
            50.0
        );
    }

    #[test]
    fn simulate_covers_all_luck_values() {
        let catalog = catalog();
        let rows = catalog
            .simulate(&"basic-egg".into(), &[0.0, 10.0, 50.0])
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].0, 10.0);
    }
}
