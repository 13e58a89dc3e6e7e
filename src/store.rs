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

//! Profile store boundary.
//!
//! The durable document store is an external collaborator. It must provide
//! atomic load/save and a per-key single-owner guarantee across the server
//! fleet; this module only defines the contract and ships an in-process
//! implementation for tests and tooling.

use crate::base::PlayerId;
use crate::document::PlayerBalanceDocument;
use crate::error::StoreError;
use dashmap::DashMap;

/// Durable per-player document store.
///
/// Implementations must guarantee that between a successful `load` and the
/// matching `release`, no other process can load the same player's document.
pub trait ProfileStore: Send + Sync {
    /// Loads a player's document, taking session ownership.
    ///
    /// `Ok(None)` means no document exists yet (first join).
    ///
    /// # Errors
    ///
    /// - [`StoreError::Locked`] - another session owns the document.
    /// - [`StoreError::Backend`] - the backend failed.
    fn load(&self, player: PlayerId) -> Result<Option<PlayerBalanceDocument>, StoreError>;

    /// Persists the document. Ownership is retained.
    fn save(&self, player: PlayerId, doc: &PlayerBalanceDocument) -> Result<(), StoreError>;

    /// Returns session ownership to the store.
    fn release(&self, player: PlayerId);
}

/// In-process [`ProfileStore`] with the same ownership semantics as a real
/// backend. Used by tests and the diagnostic CLI.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: DashMap<PlayerId, PlayerBalanceDocument>,
    owned: DashMap<PlayerId, ()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read of a stored document, bypassing ownership. Test helper.
    pub fn peek(&self, player: PlayerId) -> Option<PlayerBalanceDocument> {
        self.documents.get(&player).map(|doc| doc.value().clone())
    }
}

impl ProfileStore for InMemoryStore {
    fn load(&self, player: PlayerId) -> Result<Option<PlayerBalanceDocument>, StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.owned.entry(player) {
            Entry::Occupied(_) => return Err(StoreError::Locked),
            Entry::Vacant(entry) => {
                entry.insert(());
            }
        }
        Ok(self.documents.get(&player).map(|doc| doc.value().clone()))
    }

    fn save(&self, player: PlayerId, doc: &PlayerBalanceDocument) -> Result<(), StoreError> {
        self.documents.insert(player, doc.clone());
        Ok(())
    }

    fn release(&self, player: PlayerId) {
        self.owned.remove(&player);
    }
}
