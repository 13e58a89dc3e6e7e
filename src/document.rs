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

//! The durable per-player document.
//!
//! One document per player, owned exclusively by whichever server process
//! holds the session for that player. The store adapter enforces the
//! single-owner guarantee; this module only defines the record and its
//! maintenance passes.

use crate::base::{CurrencyId, ReceiptId};
use crate::catalog::CurrencyCatalog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Receipt sweep runs at most once per real-world day per document.
pub const CLEANUP_INTERVAL_SECS: u64 = 86_400;

/// Per-player balances plus processed-receipt history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerBalanceDocument {
    /// Current value per currency. Missing entries mean "never touched";
    /// reads fall back to the currency default.
    #[serde(default)]
    pub balances: HashMap<CurrencyId, f64>,

    /// Processed purchase receipts, receipt id to unix seconds of the grant.
    #[serde(default)]
    pub receipts: HashMap<ReceiptId, u64>,

    /// Unix seconds of the last receipt sweep.
    #[serde(default)]
    pub last_cleanup: u64,
}

impl PlayerBalanceDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heals stored balances against the catalog.
    ///
    /// Non-finite values (a corrupted save, or a bug in an older server
    /// build) are replaced by the currency default; finite values are
    /// re-clamped into the current bounds. Entries for currencies no longer
    /// in the catalog are left untouched so a config rollback does not
    /// destroy data. Returns the number of healed entries.
    pub fn reconcile(&mut self, catalog: &CurrencyCatalog) -> usize {
        let mut healed = 0;
        for (id, value) in self.balances.iter_mut() {
            let Some(def) = catalog.get(id) else { continue };
            let repaired = if value.is_finite() {
                def.clamp(*value)
            } else {
                def.default_value
            };
            if repaired != *value {
                *value = repaired;
                healed += 1;
            }
        }
        healed
    }

    /// Whether a purchase receipt has already been granted.
    pub fn has_receipt(&self, receipt: &ReceiptId) -> bool {
        self.receipts.contains_key(receipt)
    }

    /// Records a granted receipt with its grant timestamp.
    pub fn mark_receipt(&mut self, receipt: ReceiptId, now_secs: u64) {
        self.receipts.insert(receipt, now_secs);
    }

    /// Purges receipt entries older than `retention_secs`.
    ///
    /// Gated by `last_cleanup` so the sweep runs at most once per day no
    /// matter how often it is invoked. Returns the number of purged entries.
    pub fn sweep_receipts(&mut self, now_secs: u64, retention_secs: u64) -> usize {
        if now_secs.saturating_sub(self.last_cleanup) < CLEANUP_INTERVAL_SECS {
            return 0;
        }
        self.last_cleanup = now_secs;

        let before = self.receipts.len();
        self.receipts
            .retain(|_, granted| now_secs.saturating_sub(*granted) < retention_secs);
        before - self.receipts.len()
    }
}
