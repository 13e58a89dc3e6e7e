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

//! Currency catalog.
//!
//! Currency definitions are immutable configuration loaded at startup. The
//! catalog validates clamp bounds once at construction so the ledger can
//! trust them on every operation.

use crate::base::{CurrencyId, ProductId};
use crate::error::CatalogError;
use serde::Deserialize;
use std::collections::HashMap;

/// One purchasable quantity of a currency and the platform product it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PurchaseOption {
    /// Amount of currency granted when the product is purchased.
    pub quantity: f64,
    /// Platform product identifier.
    pub product: ProductId,
}

/// Static definition of a single currency.
///
/// # Invariants
///
/// - `min_value <= default_value <= max_value`, all finite.
/// - Checked by [`CurrencyCatalog::new`]; a definition never enters the
///   catalog in a violating state.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyDefinition {
    pub id: CurrencyId,
    /// Display name shown in client UI.
    pub name: String,
    /// Whether the currency can be bought with real money.
    #[serde(default)]
    pub purchasable: bool,
    /// Whether the currency can be earned through gameplay.
    #[serde(default = "default_true")]
    pub earnable: bool,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    /// Purchasable quantities, each mapped to a platform product.
    #[serde(default)]
    pub products: Vec<PurchaseOption>,
}

fn default_true() -> bool {
    true
}

impl CurrencyDefinition {
    /// Constrains `value` to this currency's `[min_value, max_value]` range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_value, self.max_value)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let finite = self.min_value.is_finite()
            && self.max_value.is_finite()
            && self.default_value.is_finite();
        if !finite || self.min_value > self.max_value {
            return Err(CatalogError::InvalidBounds(self.id.0.clone()));
        }
        if self.default_value < self.min_value || self.default_value > self.max_value {
            return Err(CatalogError::DefaultOutOfRange(self.id.0.clone()));
        }
        Ok(())
    }
}

/// Validated, immutable collection of currency definitions.
///
/// Also owns the reverse index from platform product id to the
/// `(currency, quantity)` grant it resolves to, used by the receipt
/// reconciler.
#[derive(Debug)]
pub struct CurrencyCatalog {
    definitions: HashMap<CurrencyId, CurrencyDefinition>,
    /// Stable declaration order, for deterministic query output.
    order: Vec<CurrencyId>,
    product_index: HashMap<ProductId, (CurrencyId, f64)>,
}

impl CurrencyCatalog {
    /// Builds a catalog from definitions, validating each one.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidBounds`] - clamp bounds inverted or non-finite.
    /// - [`CatalogError::DefaultOutOfRange`] - default outside `[min, max]`.
    /// - [`CatalogError::DuplicateId`] - two definitions (or two purchase
    ///   options) share an id.
    pub fn new(definitions: Vec<CurrencyDefinition>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        let mut product_index = HashMap::new();

        for def in definitions {
            def.validate()?;
            for option in &def.products {
                if !option.quantity.is_finite() || option.quantity <= 0.0 {
                    return Err(CatalogError::InvalidBounds(def.id.0.clone()));
                }
                if product_index
                    .insert(option.product, (def.id.clone(), option.quantity))
                    .is_some()
                {
                    return Err(CatalogError::DuplicateId(option.product.to_string()));
                }
            }
            order.push(def.id.clone());
            if map.insert(def.id.clone(), def).is_some() {
                let id = order.pop().expect("order tracks insertions");
                return Err(CatalogError::DuplicateId(id.0));
            }
        }

        Ok(Self {
            definitions: map,
            order,
            product_index,
        })
    }

    /// Looks up a single currency definition.
    pub fn get(&self, id: &CurrencyId) -> Option<&CurrencyDefinition> {
        self.definitions.get(id)
    }

    /// All definitions in declaration order.
    pub fn definitions(&self) -> impl Iterator<Item = &CurrencyDefinition> {
        self.order
            .iter()
            .map(|id| &self.definitions[id])
    }

    /// Purchase options for a currency, sorted ascending by quantity.
    pub fn purchase_options(&self, id: &CurrencyId) -> Option<Vec<PurchaseOption>> {
        let def = self.definitions.get(id)?;
        let mut options = def.products.clone();
        options.sort_by(|a, b| a.quantity.total_cmp(&b.quantity));
        Some(options)
    }

    /// Resolves a platform product id to the currency grant it represents.
    pub fn product_grant(&self, product: ProductId) -> Option<(&CurrencyId, f64)> {
        self.product_index
            .get(&product)
            .map(|(id, quantity)| (id, *quantity))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
