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

//! Purchase receipt reconciliation.
//!
//! Maps platform purchase notifications to currency grants, exactly once
//! per receipt id. The processed mark lives in the player's durable
//! document; the in-flight set guarding duplicate concurrent delivery is
//! process-local.
//!
//! Per-receipt state machine: `Unseen -> Processing -> Granted` (terminal)
//! or `Unseen -> Processing -> Retryable` (safe to resubmit). The grant and
//! its durable mark are not atomic: a persistence failure after a grant
//! returns `Retryable` and the platform redelivers, which the mark check
//! then settles without re-crediting. The one crash window between grant
//! and mark is an accepted at-least-once risk.

use crate::base::{PlayerId, ProductId, ReceiptId};
use crate::catalog::CurrencyCatalog;
use crate::coordinator::LockTable;
use crate::error::EconomyError;
use crate::ledger::Ledger;
use crate::store::ProfileStore;
use crate::telemetry::{self, TransactionKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Durable outcome reported to the purchase front-end.
///
/// `Granted` tells the platform to mark the purchase fulfilled;
/// `Retryable` tells it to redeliver the notification later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Granted,
    Retryable,
}

/// Idempotent purchase-to-grant reconciler.
pub struct ReceiptReconciler {
    catalog: Arc<CurrencyCatalog>,
    ledger: Arc<Ledger>,
    store: Arc<dyn ProfileStore>,
    locks: Arc<LockTable>,
    in_flight: DashMap<ReceiptId, ()>,
    retention_secs: u64,
}

/// Removes the in-flight marker on every exit path.
struct InFlightGuard<'a> {
    set: &'a DashMap<ReceiptId, ()>,
    receipt: ReceiptId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.receipt);
    }
}

impl ReceiptReconciler {
    pub fn new(
        catalog: Arc<CurrencyCatalog>,
        ledger: Arc<Ledger>,
        store: Arc<dyn ProfileStore>,
        locks: Arc<LockTable>,
        retention_secs: u64,
    ) -> Self {
        Self {
            catalog,
            ledger,
            store,
            locks,
            in_flight: DashMap::new(),
            retention_secs,
        }
    }

    /// Processes one purchase notification.
    ///
    /// Safe to call any number of times with the same receipt id: currency
    /// is granted at most once.
    pub fn process(
        &self,
        product: ProductId,
        player: PlayerId,
        receipt: &ReceiptId,
    ) -> ReceiptOutcome {
        if !self.ledger.is_loaded(player) {
            tracing::warn!(%player, %receipt, "purchase for unloaded player, deferring");
            return ReceiptOutcome::Retryable;
        }

        // Already settled in the durable document.
        match self.ledger.with_document(player, |doc| doc.has_receipt(receipt)) {
            Ok(true) => return ReceiptOutcome::Granted,
            Ok(false) => {}
            Err(_) => return ReceiptOutcome::Retryable,
        }

        // Duplicate concurrent delivery of the same notification.
        let _guard = match self.in_flight.entry(receipt.clone()) {
            Entry::Occupied(_) => return ReceiptOutcome::Retryable,
            Entry::Vacant(entry) => {
                entry.insert(());
                InFlightGuard {
                    set: &self.in_flight,
                    receipt: receipt.clone(),
                }
            }
        };

        let Some((currency, quantity)) = self.catalog.product_grant(product) else {
            // Unknown product: settle rather than bouncing the purchaser
            // through endless retries. Loud, because it means either a
            // catalog gap or a spoofed product id.
            tracing::error!(
                %player,
                %product,
                %receipt,
                "no grant mapping for purchased product, settling without credit"
            );
            return self.mark_and_persist(player, receipt);
        };
        let currency = currency.clone();

        let locked = match self.locks.acquire(player) {
            Ok(guard) => guard,
            Err(error) => {
                tracing::warn!(%player, %receipt, %error, "purchase grant could not lock player");
                return ReceiptOutcome::Retryable;
            }
        };

        let reason = format!("purchase:{product}");
        if let Err(error) =
            self.ledger
                .increment(player, &currency, quantity, &reason, TransactionKind::Purchase)
        {
            tracing::warn!(%player, %receipt, %error, "purchase grant failed");
            return ReceiptOutcome::Retryable;
        }
        drop(locked);

        self.mark_and_persist(player, receipt)
    }

    /// Purges expired receipt entries from a loaded player's document.
    ///
    /// The document's own daily gate bounds how often the purge really
    /// runs. Returns the number of purged entries.
    pub fn sweep(&self, player: PlayerId) -> Result<usize, EconomyError> {
        let now = telemetry::unix_now();
        let retention = self.retention_secs;
        let purged = self
            .ledger
            .with_document(player, |doc| doc.sweep_receipts(now, retention))?;
        if purged > 0 {
            tracing::debug!(%player, purged, "purged expired purchase receipts");
            self.ledger.mark_dirty(player);
        }
        Ok(purged)
    }

    /// Records the receipt in the durable document and persists it.
    fn mark_and_persist(&self, player: PlayerId, receipt: &ReceiptId) -> ReceiptOutcome {
        let now = telemetry::unix_now();
        let marked = self.ledger.with_document(player, |doc| {
            doc.mark_receipt(receipt.clone(), now);
            doc.clone()
        });
        let doc = match marked {
            Ok(doc) => doc,
            Err(_) => return ReceiptOutcome::Retryable,
        };
        self.ledger.mark_dirty(player);

        match self.store.save(player, &doc) {
            Ok(()) => ReceiptOutcome::Granted,
            Err(error) => {
                // The grant is applied but the mark is not durable yet; the
                // caller resubmits and the in-memory mark settles it unless
                // the process dies first.
                tracing::error!(%player, %receipt, %error, "receipt mark not persisted");
                ReceiptOutcome::Retryable
            }
        }
    }
}
