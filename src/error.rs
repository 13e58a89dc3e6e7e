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

//! Error types for currency operations, catalog loading, and the profile
//! store boundary.

use thiserror::Error;

/// Currency and reward operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// Target value is NaN or infinite
    #[error("invalid value (must be finite)")]
    InvalidValue,

    /// Amount is NaN, infinite, or negative where a non-negative amount is required
    #[error("invalid amount")]
    InvalidAmount,

    /// Player's document is not loaded in this process
    #[error("player profile is not loaded")]
    ProfileUnavailable,

    /// Spend or transfer would take the balance below the currency floor
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Operation is structurally invalid (self-transfer, credit above the cap)
    #[error("invalid operation")]
    InvalidOperation,

    /// Currency id is not present in the catalog
    #[error("unknown currency")]
    UnknownCurrency,

    /// Container id is not present in the reward catalog
    #[error("unknown reward container")]
    UnknownContainer,

    /// Reward draw over a distribution with zero total weight
    #[error("reward distribution is empty")]
    EmptyDistribution,

    /// Could not acquire the player mutation lock within the configured wait
    #[error("timed out waiting for player lock")]
    LockTimeout,

    /// Unexpected fault inside a locked critical section
    #[error("internal error")]
    InternalError,
}

/// Catalog construction and load failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A currency definition violates `min <= default <= max`
    #[error("currency '{0}': default value outside [min, max]")]
    DefaultOutOfRange(String),

    /// Clamp bounds are inverted or non-finite
    #[error("currency '{0}': invalid clamp bounds")]
    InvalidBounds(String),

    /// Two definitions share an id
    #[error("duplicate definition '{0}'")]
    DuplicateId(String),

    /// A container entry carries a negative or non-finite weight
    #[error("container '{0}': invalid entry weight")]
    InvalidWeight(String),

    /// A container entry references an item missing from the item table
    #[error("container '{0}': unknown item '{1}'")]
    UnknownItem(String, String),

    /// Catalog file could not be parsed
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Catalog file could not be read
    #[error("catalog read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile store adapter failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another process currently owns this player's document
    #[error("document is locked by another session")]
    Locked,

    /// Backend failure (network, quota, serialization)
    #[error("store backend error: {0}")]
    Backend(String),
}
