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

//! Per-player mutual exclusion.
//!
//! A player has at most one in-flight balance mutation at a time, across all
//! currencies. The table hands out owned guards; dropping the guard releases
//! the lock, so every exit path of a critical section releases it.
//!
//! Waits are bounded: a contended acquire that cannot proceed within the
//! configured timeout fails with [`EconomyError::LockTimeout`] instead of
//! queueing forever.

use crate::base::PlayerId;
use crate::error::EconomyError;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;
use std::time::Duration;

/// Exclusive hold on one player's mutation lock. Releases on drop.
pub struct PlayerGuard {
    player: PlayerId,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for PlayerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerGuard")
            .field("player", &self.player)
            .finish_non_exhaustive()
    }
}

impl PlayerGuard {
    pub fn player(&self) -> PlayerId {
        self.player
    }
}

/// Table of per-player mutation locks.
#[derive(Debug)]
pub struct LockTable {
    locks: DashMap<PlayerId, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    fn lock_for(&self, player: PlayerId) -> Arc<Mutex<()>> {
        self.locks
            .entry(player)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the mutation lock for one player.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::LockTimeout`] - lock not available within the
    ///   configured wait.
    pub fn acquire(&self, player: PlayerId) -> Result<PlayerGuard, EconomyError> {
        let lock = self.lock_for(player);
        let guard = lock
            .try_lock_arc_for(self.timeout)
            .ok_or(EconomyError::LockTimeout)?;
        Ok(PlayerGuard {
            player,
            _guard: guard,
        })
    }

    /// Acquires both participants' locks for a transfer.
    ///
    /// Locks are taken in ascending player-id order regardless of transfer
    /// direction, so two opposite-direction transfers between the same pair
    /// cannot deadlock. Both guards are held before the caller touches
    /// either balance.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidOperation`] - `a == b` (self-transfer);
    ///   rejected before any lock is taken.
    /// - [`EconomyError::LockTimeout`] - either lock unavailable in time;
    ///   a partially acquired lock is released before returning.
    pub fn acquire_pair(
        &self,
        a: PlayerId,
        b: PlayerId,
    ) -> Result<(PlayerGuard, PlayerGuard), EconomyError> {
        if a == b {
            return Err(EconomyError::InvalidOperation);
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let low_guard = self.acquire(low)?;
        let high_guard = self.acquire(high)?;

        if a < b {
            Ok((low_guard, high_guard))
        } else {
            Ok((high_guard, low_guard))
        }
    }

    /// Drops a departed player's lock entry.
    ///
    /// The entry is only removed when no guard is outstanding; an in-flight
    /// holder keeps its mutex alive through the `Arc`.
    pub fn forget(&self, player: PlayerId) {
        self.locks
            .remove_if(&player, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn contains(&self, player: PlayerId) -> bool {
        self.locks.contains_key(&player)
    }
}
