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

//! The economy engine.
//!
//! [`Economy`] is the process-scoped coordinator that owns the loaded
//! documents, the lock table, the reconciler, and the reward tables. The
//! host wires it to its session lifecycle (join/leave callbacks), its
//! purchase front-end, and a periodic flush tick.
//!
//! # Locking
//!
//! Every mutating balance operation holds the player's mutation lock for
//! its full duration; reads do not. Transfers hold both participants'
//! locks, acquired in a global order, before touching either balance.

use crate::base::{ContainerId, CurrencyId, ItemId, PlayerId, ProductId, ReceiptId};
use crate::catalog::{CurrencyCatalog, CurrencyDefinition, PurchaseOption};
use crate::coordinator::LockTable;
use crate::error::EconomyError;
use crate::ledger::Ledger;
use crate::receipts::{ReceiptOutcome, ReceiptReconciler};
use crate::rewards::{ContainerSummary, EntryChance, RewardCatalog};
use crate::store::ProfileStore;
use crate::telemetry::{AuditSink, TelemetrySink, TransactionKind, TransactionRecord};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the engine. All fields have serviceable defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Maximum wait for a player's mutation lock, in seconds.
    pub lock_timeout_secs: u64,
    /// How long processed receipt ids are retained, in days.
    pub receipt_retention_days: u64,
    /// Capacity of the in-memory audit buffer.
    pub telemetry_capacity: usize,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 5,
            receipt_retention_days: 30,
            telemetry_capacity: AuditSink::DEFAULT_CAPACITY,
        }
    }
}

impl EconomyConfig {
    fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    fn receipt_retention_secs(&self) -> u64 {
        self.receipt_retention_days * 86_400
    }
}

/// Process-scoped economy engine.
pub struct Economy {
    catalog: Arc<CurrencyCatalog>,
    rewards: Arc<RewardCatalog>,
    ledger: Arc<Ledger>,
    locks: Arc<LockTable>,
    store: Arc<dyn ProfileStore>,
    reconciler: ReceiptReconciler,
    audit: Arc<AuditSink>,
    rng: Mutex<StdRng>,
}

impl Economy {
    /// Opens the engine over a profile store.
    pub fn open(
        catalog: CurrencyCatalog,
        rewards: RewardCatalog,
        store: Arc<dyn ProfileStore>,
        config: EconomyConfig,
    ) -> Self {
        Self::build(catalog, rewards, store, config, StdRng::from_entropy())
    }

    /// Like [`Economy::open`] with a seeded RNG for reproducible draws.
    pub fn open_seeded(
        catalog: CurrencyCatalog,
        rewards: RewardCatalog,
        store: Arc<dyn ProfileStore>,
        config: EconomyConfig,
        seed: u64,
    ) -> Self {
        Self::build(catalog, rewards, store, config, StdRng::seed_from_u64(seed))
    }

    fn build(
        catalog: CurrencyCatalog,
        rewards: RewardCatalog,
        store: Arc<dyn ProfileStore>,
        config: EconomyConfig,
        rng: StdRng,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let audit = Arc::new(AuditSink::new(config.telemetry_capacity));
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&catalog),
            Arc::clone(&audit) as Arc<dyn TelemetrySink>,
        ));
        let locks = Arc::new(LockTable::new(config.lock_timeout()));
        let reconciler = ReceiptReconciler::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&store),
            Arc::clone(&locks),
            config.receipt_retention_secs(),
        );

        Self {
            catalog,
            rewards: Arc::new(rewards),
            ledger,
            locks,
            store,
            reconciler,
            audit,
            rng: Mutex::new(rng),
        }
    }

    /// Flushes and releases every loaded player. The engine is reusable
    /// afterwards; new joins simply reload.
    pub fn close(&self) {
        for player in self.ledger.players() {
            self.handle_player_leave(player);
        }
    }

    // === Session lifecycle ===

    /// Loads a joining player's document and mounts it.
    ///
    /// Idempotent for an already-loaded player.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::ProfileUnavailable`] - the store reports the
    ///   document locked by another session, or the backend failed.
    pub fn handle_player_join(&self, player: PlayerId) -> Result<(), EconomyError> {
        if self.ledger.is_loaded(player) {
            return Ok(());
        }

        let mut doc = match self.store.load(player) {
            Ok(Some(doc)) => doc,
            Ok(None) => Default::default(),
            Err(error) => {
                tracing::warn!(%player, %error, "profile load failed");
                return Err(EconomyError::ProfileUnavailable);
            }
        };

        let healed = doc.reconcile(&self.catalog);
        self.ledger.attach(player, doc);
        if healed > 0 {
            tracing::warn!(%player, healed, "healed corrupted balances on load");
            self.ledger.mark_dirty(player);
        }

        // Receipt history maintenance; the document's daily gate makes
        // repeated joins cheap.
        let _ = self.reconciler.sweep(player);
        Ok(())
    }

    /// Best-effort save-then-release for a departing player.
    ///
    /// Always evicts the in-memory mirror and the player's lock entry,
    /// even when the save fails (the store still owns the last durable
    /// version).
    pub fn handle_player_leave(&self, player: PlayerId) {
        // Let an in-flight mutation finish; on timeout we evict anyway
        // rather than leak the session.
        let guard = self.locks.acquire(player);
        if guard.is_err() {
            tracing::warn!(%player, "departing player still holds mutation lock");
        }

        if let Some(doc) = self.ledger.detach(player) {
            if let Err(error) = self.store.save(player, &doc) {
                tracing::error!(%player, %error, "final save failed, last durable version stands");
            }
            self.store.release(player);
        }

        drop(guard);
        self.locks.forget(player);
    }

    /// Evicts a player whose document ownership was seized by another
    /// process. No save: this process no longer owns the document.
    pub fn handle_force_release(&self, player: PlayerId) {
        tracing::warn!(%player, "document ownership seized, dropping local state");
        self.ledger.detach(player);
        self.locks.forget(player);
    }

    /// Persists one player's document when it has unsaved changes.
    /// Returns whether a save happened.
    pub fn flush(&self, player: PlayerId) -> bool {
        let Some(doc) = self.ledger.snapshot_if_dirty(player) else {
            return false;
        };
        match self.store.save(player, &doc) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%player, %error, "periodic save failed, will retry");
                self.ledger.mark_dirty(player);
                false
            }
        }
    }

    /// Periodic tick: receipt sweep plus save for every dirty document.
    /// Returns the number of documents saved.
    pub fn flush_all(&self) -> usize {
        let mut saved = 0;
        for player in self.ledger.players() {
            let _ = self.reconciler.sweep(player);
            if self.flush(player) {
                saved += 1;
            }
        }
        saved
    }

    // === Balance operations ===

    /// Current value for `(player, currency)`.
    ///
    /// Read-only snapshot: does not wait on the mutation lock, so a value
    /// about to be overwritten by an in-flight mutation may be observed.
    pub fn get_value(&self, player: PlayerId, currency: &CurrencyId) -> Result<f64, EconomyError> {
        self.ledger.value(player, currency)
    }

    /// Writes an absolute value, clamped into the currency range.
    pub fn set_value(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        value: f64,
        reason: &str,
    ) -> Result<f64, EconomyError> {
        let _guard = self.locks.acquire(player)?;
        self.ledger.set_value(player, currency, value, reason)
    }

    /// Adds `amount` (may be negative), clamped at both bounds.
    pub fn increment_value(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
    ) -> Result<f64, EconomyError> {
        let _guard = self.locks.acquire(player)?;
        self.ledger
            .increment(player, currency, amount, reason, TransactionKind::Earn)
    }

    /// Spends a non-negative `amount`; fails rather than clamping when the
    /// full amount is not available.
    pub fn decrement_value(
        &self,
        player: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
    ) -> Result<f64, EconomyError> {
        let _guard = self.locks.acquire(player)?;
        self.ledger
            .decrement(player, currency, amount, reason, TransactionKind::Spend)
    }

    /// Moves `amount` from one player to another.
    ///
    /// Both participants' balances change exactly by `amount` on success.
    /// On any failure both balances are left as they were: a debit whose
    /// credit leg fails is compensated by a rollback credit to the sender.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidAmount`] - negative or non-finite amount.
    /// - [`EconomyError::InvalidOperation`] - self-transfer, or the credit
    ///   would push the receiver past the currency cap.
    /// - [`EconomyError::InsufficientFunds`] - sender cannot cover the
    ///   amount (checked optimistically before locking and again inside
    ///   the critical section).
    /// - [`EconomyError::ProfileUnavailable`] - either participant is not
    ///   loaded.
    /// - [`EconomyError::LockTimeout`] - participant locks unavailable.
    /// - [`EconomyError::InternalError`] - the rollback credit itself
    ///   failed; balances may need operator attention.
    pub fn transfer_value(
        &self,
        from: PlayerId,
        to: PlayerId,
        currency: &CurrencyId,
        amount: f64,
        reason: &str,
    ) -> Result<(), EconomyError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EconomyError::InvalidAmount);
        }
        if from == to {
            return Err(EconomyError::InvalidOperation);
        }
        if !self.ledger.is_loaded(from) || !self.ledger.is_loaded(to) {
            return Err(EconomyError::ProfileUnavailable);
        }

        // Optimistic pre-check before any lock. The authoritative check
        // re-runs inside the critical section.
        let def = self
            .catalog
            .get(currency)
            .ok_or(EconomyError::UnknownCurrency)?;
        if self.ledger.value(from, currency)? - amount < def.min_value {
            return Err(EconomyError::InsufficientFunds);
        }

        let pair = self.locks.acquire_pair(from, to)?;

        self.ledger
            .decrement(from, currency, amount, reason, TransactionKind::Trade)?;

        let credit = self
            .ledger
            .credit_exact(to, currency, amount, reason, TransactionKind::Trade);
        let Err(error) = credit else {
            return Ok(());
        };

        // Credit leg failed after a successful debit: release both locks,
        // then restore the sender so a failed transfer never leaves them
        // short.
        drop(pair);
        let rollback_reason = format!("rollback:{reason}");
        // Re-lock the sender if possible; restoring funds outranks lock
        // discipline when the lock cannot be had.
        let _rollback_guard = self.locks.acquire(from).ok();
        let restore = self.ledger.increment(
            from,
            currency,
            amount,
            &rollback_reason,
            TransactionKind::Rollback,
        );
        if let Err(rollback_error) = restore {
            tracing::error!(
                %from,
                %to,
                %currency,
                amount,
                %rollback_error,
                "transfer rollback failed, sender balance inconsistent"
            );
            return Err(EconomyError::InternalError);
        }
        Err(error)
    }

    // === Purchases ===

    /// Entry point for the purchase front-end.
    pub fn process_receipt(
        &self,
        product: ProductId,
        player: PlayerId,
        receipt: &ReceiptId,
    ) -> ReceiptOutcome {
        self.reconciler.process(product, player, receipt)
    }

    // === Rewards ===

    /// Draws one item from a container.
    pub fn draw_reward(
        &self,
        container: &ContainerId,
        luck: f64,
    ) -> Result<ItemId, EconomyError> {
        let mut rng = self.rng.lock();
        self.rewards.draw(container, luck, &mut *rng)
    }

    /// `count` independent draws from a container.
    pub fn draw_rewards(
        &self,
        container: &ContainerId,
        count: usize,
        luck: f64,
    ) -> Result<Vec<ItemId>, EconomyError> {
        let mut rng = self.rng.lock();
        self.rewards.draw_many(container, count, luck, &mut *rng)
    }

    /// Charges a player the container's price and draws one item.
    ///
    /// The spend and the draw are one logical operation: a failed draw
    /// refunds the price (rollback), so the player never pays for nothing.
    pub fn open_container(
        &self,
        player: PlayerId,
        container: &ContainerId,
        luck: f64,
    ) -> Result<ItemId, EconomyError> {
        let price = {
            let definition = self
                .rewards
                .container(container)
                .ok_or(EconomyError::UnknownContainer)?;
            (definition.price.currency.clone(), definition.price.amount)
        };

        let _guard = self.locks.acquire(player)?;
        let reason = format!("container:{container}");
        self.ledger
            .decrement(player, &price.0, price.1, &reason, TransactionKind::Spend)?;

        let drawn = {
            let mut rng = self.rng.lock();
            self.rewards.draw(container, luck, &mut *rng)
        };
        match drawn {
            Ok(item) => Ok(item),
            Err(error) => {
                let refund_reason = format!("rollback:{reason}");
                if self
                    .ledger
                    .increment(
                        player,
                        &price.0,
                        price.1,
                        &refund_reason,
                        TransactionKind::Rollback,
                    )
                    .is_err()
                {
                    tracing::error!(%player, %container, "container refund failed");
                    return Err(EconomyError::InternalError);
                }
                Err(error)
            }
        }
    }

    // === Query surface ===

    pub fn currency_definition(&self, currency: &CurrencyId) -> Option<&CurrencyDefinition> {
        self.catalog.get(currency)
    }

    pub fn currency_definitions(&self) -> Vec<&CurrencyDefinition> {
        self.catalog.definitions().collect()
    }

    /// All catalog currencies with the player's current (healed) values.
    pub fn balances_snapshot(
        &self,
        player: PlayerId,
    ) -> Result<HashMap<CurrencyId, f64>, EconomyError> {
        let mut snapshot = HashMap::new();
        for def in self.catalog.definitions() {
            let value = self.ledger.value(player, &def.id)?;
            snapshot.insert(def.id.clone(), value);
        }
        Ok(snapshot)
    }

    /// Purchasable quantities for a currency, ascending by quantity.
    pub fn purchase_options(&self, currency: &CurrencyId) -> Option<Vec<PurchaseOption>> {
        self.catalog.purchase_options(currency)
    }

    pub fn container_summaries(&self) -> Vec<ContainerSummary> {
        self.rewards.summaries()
    }

    /// Probability table for a container at a given luck amount.
    pub fn container_contents(
        &self,
        container: &ContainerId,
        luck: f64,
    ) -> Result<Vec<EntryChance>, EconomyError> {
        self.rewards.contents_preview(container, luck)
    }

    /// Probability tables across several luck values (tuning tool).
    pub fn simulate_luck(
        &self,
        container: &ContainerId,
        luck_values: &[f64],
    ) -> Result<Vec<(f64, Vec<EntryChance>)>, EconomyError> {
        self.rewards.simulate(container, luck_values)
    }

    // === Telemetry ===

    /// Drains the buffered audit records for the analytics pipeline.
    pub fn drain_audit(&self) -> Vec<TransactionRecord> {
        self.audit.drain()
    }
}
