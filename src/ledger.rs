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

//! Balance ledger.
//!
//! Owns the in-memory mirror of every loaded player document and applies all
//! value mutations: validation, clamping into the currency's `[min, max]`
//! range, and emission of one [`TransactionRecord`] per applied change.
//!
//! The ledger itself only takes the short per-document mutex. Serialization
//! of whole logical operations (a spend, both legs of a transfer) is the
//! coordinator's job; callers hold the player's mutation lock around any
//! mutating call here.

use crate::base::{CurrencyId, PlayerId};
use crate::catalog::{CurrencyCatalog, CurrencyDefinition};
use crate::document::PlayerBalanceDocument;
use crate::error::EconomyError;
use crate::telemetry::{self, TelemetrySink, TransactionKind, TransactionRecord};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One loaded player: the document mirror plus a dirty flag for the
/// periodic flush.
#[derive(Debug)]
struct PlayerProfile {
    doc: Mutex<PlayerBalanceDocument>,
    dirty: AtomicBool,
}

impl PlayerProfile {
    fn new(doc: PlayerBalanceDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
            dirty: AtomicBool::new(false),
        }
    }
}

/// In-memory currency ledger over all loaded players.
pub struct Ledger {
    profiles: DashMap<PlayerId, Arc<PlayerProfile>>,
    catalog: Arc<CurrencyCatalog>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Ledger {
    pub fn new(catalog: Arc<CurrencyCatalog>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            profiles: DashMap::new(),
            catalog,
            telemetry,
        }
    }

    // === Document lifecycle ===

    /// Mounts a loaded document. Replaces any previous mirror for the player.
    pub fn attach(&self, player: PlayerId, doc: PlayerBalanceDocument) {
        self.profiles.insert(player, Arc::new(PlayerProfile::new(doc)));
    }

    /// Unmounts a player and returns the final document state, if loaded.
    pub fn detach(&self, player: PlayerId) -> Option<PlayerBalanceDocument> {
        self.profiles
            .remove(&player)
            .map(|(_, profile)| profile.doc.lock().clone())
    }

    pub fn is_loaded(&self, player: PlayerId) -> bool {
        self.profiles.contains_key(&player)
    }

    /// Players currently loaded in this process.
    pub fn players(&self) -> Vec<PlayerId> {
        self.profiles.iter().map(|entry| *entry.key()).collect()
    }

    /// Clones the current document state.
    pub fn snapshot(&self, player: PlayerId) -> Result<PlayerBalanceDocument, EconomyError> {
        let profile = self.profile(player)?;
        Ok(profile.doc.lock().clone())
    }

    /// Clones the document and clears the dirty flag when there are unsaved
    /// changes; `None` when the mirror is clean.
    pub fn snapshot_if_dirty(&self, player: PlayerId) -> Option<PlayerBalanceDocument> {
        let profile = self.profiles.get(&player)?;
        if profile.dirty.swap(false, Ordering::AcqRel) {
            Some(profile.doc.lock().clone())
        } else {
            None
        }
    }

    /// Re-flags unsaved changes after a failed save so the next flush
    /// retries.
    pub fn mark_dirty(&self, player: PlayerId) {
        if let Some(profile) = self.profiles.get(&player) {
            profile.dirty.store(true, Ordering::Release);
        }
    }

    /// Runs `f` against the live document under its mutex.
    ///
    /// Used by the reconciler for receipt bookkeeping. Does not touch the
    /// dirty flag; callers that changed the document follow up with
    /// [`Ledger::mark_dirty`].
    pub fn with_document<R>(
        &self,
        player: PlayerId,
        f: impl FnOnce(&mut PlayerBalanceDocument) -> R,
    ) -> Result<R, EconomyError> {
        let profile = self.profile(player)?;
        let result = f(&mut profile.doc.lock());
        Ok(result)
    }

    // === Reads ===

    /// Current value for `(player, currency)`.
    ///
    /// Initializes an absent entry to the currency default, replaces a
    /// non-finite stored value with the default, and re-clamps into
    /// `[min, max]` before returning. These self-healing writes mark the
    /// document dirty but do not take the player mutation lock and emit no
    /// record.
    pub fn value(&self, player: PlayerId, currency: &CurrencyId) -> Result<f64, EconomyError> {
        let def = self.definition(currency)?;
        let profile = self.profile(player)?;

        let mut doc = profile.doc.lock();
        let healed = Self::healed_value(def, &mut doc, currency);
        if healed.repaired {
            profile.dirty.store(true, Ordering::Release);
        }
        Ok(healed.value)
    }

    // === Mutations (caller holds the player mutation lock) ===

    /// Writes an absolute value, clamped into range.
    ///
    /// The emitted record is categorized by the direction of the resulting
    /// change: `Earn` for a raise, `Spend` for a cut.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidValue`] - `target` is NaN or infinite.
    pub fn set_value(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        target: f64,
        reason: &str,
    ) -> Result<f64, EconomyError> {
        if !target.is_finite() {
            return Err(EconomyError::InvalidValue);
        }
        self.apply(player, currency, reason, |def, previous| {
            let new_value = def.clamp(target);
            let kind = if new_value >= previous {
                TransactionKind::Earn
            } else {
                TransactionKind::Spend
            };
            Ok((new_value, kind))
        })
    }

    /// Adds `amount` (may be negative), clamping the result at both bounds.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidAmount`] - `amount` is NaN or infinite.
    pub fn increment(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
        kind: TransactionKind,
    ) -> Result<f64, EconomyError> {
        if !amount.is_finite() {
            return Err(EconomyError::InvalidAmount);
        }
        self.apply(player, currency, reason, |def, previous| {
            Ok((def.clamp(previous + amount), kind))
        })
    }

    /// Subtracts a non-negative `amount`, refusing to cross the floor.
    ///
    /// A spend is never silently shrunk by the clamp: if the full amount is
    /// not available the operation fails and the balance is untouched.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidAmount`] - `amount` is negative, NaN, or
    ///   infinite.
    /// - [`EconomyError::InsufficientFunds`] - result would fall below the
    ///   currency floor.
    pub fn decrement(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
        kind: TransactionKind,
    ) -> Result<f64, EconomyError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EconomyError::InvalidAmount);
        }
        self.apply(player, currency, reason, |def, previous| {
            let new_value = previous - amount;
            if new_value < def.min_value {
                return Err(EconomyError::InsufficientFunds);
            }
            Ok((new_value, kind))
        })
    }

    /// Credit leg of a transfer: applies the full `amount` or fails.
    ///
    /// Clamping here would destroy conservation (the debited amount must
    /// land in full), so a credit that would cross the cap is refused and
    /// the caller rolls the debit back.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidAmount`] - `amount` is negative, NaN, or
    ///   infinite.
    /// - [`EconomyError::InvalidOperation`] - result would exceed the
    ///   currency cap.
    pub fn credit_exact(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
        kind: TransactionKind,
    ) -> Result<f64, EconomyError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EconomyError::InvalidAmount);
        }
        self.apply(player, currency, reason, |def, previous| {
            let new_value = previous + amount;
            if new_value > def.max_value {
                return Err(EconomyError::InvalidOperation);
            }
            Ok((new_value, kind))
        })
    }

    // === Internals ===

    fn definition(&self, currency: &CurrencyId) -> Result<&CurrencyDefinition, EconomyError> {
        self.catalog.get(currency).ok_or(EconomyError::UnknownCurrency)
    }

    fn profile(&self, player: PlayerId) -> Result<Arc<PlayerProfile>, EconomyError> {
        self.profiles
            .get(&player)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EconomyError::ProfileUnavailable)
    }

    /// Core mutation path: heal the stored value, compute the new value,
    /// write it, emit one record with the post-clamp delta.
    fn apply(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        reason: &str,
        op: impl FnOnce(&CurrencyDefinition, f64) -> Result<(f64, TransactionKind), EconomyError>,
    ) -> Result<f64, EconomyError> {
        let def = self.definition(currency)?;
        let profile = self.profile(player)?;

        let record = {
            let mut doc = profile.doc.lock();
            let previous = Self::healed_value(def, &mut doc, currency).value;
            let (new_value, kind) = op(def, previous)?;

            doc.balances.insert(currency.clone(), new_value);
            profile.dirty.store(true, Ordering::Release);

            TransactionRecord {
                id: telemetry::next_record_id(),
                timestamp: telemetry::unix_now(),
                player,
                currency: currency.clone(),
                previous,
                new_value,
                delta: new_value - previous,
                reason: reason.to_owned(),
                kind,
            }
        };

        let new_value = record.new_value;
        // Delivery is fire-and-forget; the mutation has already applied.
        self.telemetry.record(record);
        Ok(new_value)
    }

    fn healed_value(
        def: &CurrencyDefinition,
        doc: &mut PlayerBalanceDocument,
        currency: &CurrencyId,
    ) -> HealedValue {
        match doc.balances.get(currency).copied() {
            Some(stored) => {
                let value = if stored.is_finite() {
                    def.clamp(stored)
                } else {
                    def.default_value
                };
                // NaN compares unequal to itself, so a NaN store always
                // counts as repaired.
                let repaired = value != stored;
                if repaired {
                    doc.balances.insert(currency.clone(), value);
                }
                HealedValue { value, repaired }
            }
            None => {
                doc.balances.insert(currency.clone(), def.default_value);
                HealedValue {
                    value: def.default_value,
                    repaired: true,
                }
            }
        }
    }
}

struct HealedValue {
    value: f64,
    repaired: bool,
}
