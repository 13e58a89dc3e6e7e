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

//! # Coinvault
//!
//! This library provides the virtual-currency and reward engine for a live
//! multiplayer game server: per-player balances with clamping and
//! self-healing reads, serialized mutations and transfers with rollback,
//! idempotent purchase-receipt grants, and weighted loot-container draws.
//!
//! ## Core Components
//!
//! - [`Economy`]: process-scoped engine facade the host wires to its
//!   session lifecycle and purchase front-end
//! - [`Ledger`]: in-memory balance mirror with validation and clamping
//! - [`LockTable`]: per-player mutual exclusion with bounded waits
//! - [`ReceiptReconciler`]: at-most-once currency grants per purchase
//! - [`RewardCatalog`]: luck-adjusted weighted draws and probability tables
//! - [`ProfileStore`]: boundary trait for the durable document store
//!
//! ## Example
//!
//! ```
//! use coinvault_rs::{
//!     CurrencyCatalog, CurrencyDefinition, Economy, EconomyConfig, InMemoryStore,
//!     PlayerId, RewardCatalog,
//! };
//! use std::sync::Arc;
//!
//! let catalog = CurrencyCatalog::new(vec![CurrencyDefinition {
//!     id: "coins".into(),
//!     name: "Coins".into(),
//!     purchasable: false,
//!     earnable: true,
//!     min_value: 0.0,
//!     max_value: 1000.0,
//!     default_value: 0.0,
//!     products: vec![],
//! }])
//! .unwrap();
//! let rewards = RewardCatalog::new(vec![], vec![]).unwrap();
//!
//! let economy = Economy::open(
//!     catalog,
//!     rewards,
//!     Arc::new(InMemoryStore::new()),
//!     EconomyConfig::default(),
//! );
//!
//! economy.handle_player_join(PlayerId(1)).unwrap();
//! economy
//!     .increment_value(PlayerId(1), &"coins".into(), 50.0, "quest reward")
//!     .unwrap();
//! assert_eq!(economy.get_value(PlayerId(1), &"coins".into()).unwrap(), 50.0);
//! ```
//!
//! ## Thread Safety
//!
//! The engine serializes mutations per player while allowing concurrent
//! operations across different players. Reads never wait on a player's
//! mutation lock.

pub mod base;
pub mod catalog;
mod coordinator;
pub mod document;
mod engine;
pub mod error;
mod ledger;
mod receipts;
pub mod rewards;
pub mod store;
pub mod telemetry;

pub use base::{ContainerId, CurrencyId, ItemId, PlayerId, ProductId, ReceiptId, RecordId};
pub use catalog::{CurrencyCatalog, CurrencyDefinition, PurchaseOption};
pub use coordinator::{LockTable, PlayerGuard};
pub use document::PlayerBalanceDocument;
pub use engine::{Economy, EconomyConfig};
pub use error::{CatalogError, EconomyError, StoreError};
pub use ledger::Ledger;
pub use receipts::{ReceiptOutcome, ReceiptReconciler};
pub use rewards::{
    ContainerPrice, ContainerSummary, EntryChance, ItemDefinition, Rarity, RewardCatalog,
    RewardContainer, RewardEntry,
};
pub use store::{InMemoryStore, ProfileStore};
pub use telemetry::{AuditSink, TelemetrySink, TransactionKind, TransactionRecord};
