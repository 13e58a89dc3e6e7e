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

//! Purchase reconciliation integration tests: idempotence and failure
//! outcomes against the durable store.

use coinvault_rs::{
    CurrencyCatalog, CurrencyDefinition, CurrencyId, Economy, EconomyConfig, InMemoryStore,
    PlayerBalanceDocument, PlayerId, ProductId, ProfileStore, PurchaseOption, ReceiptId,
    ReceiptOutcome, RewardCatalog, StoreError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Store wrapper that fails saves on demand.
struct FlakyStore {
    inner: InMemoryStore,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_saves: AtomicBool::new(false),
        }
    }

    fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl ProfileStore for FlakyStore {
    fn load(&self, player: PlayerId) -> Result<Option<PlayerBalanceDocument>, StoreError> {
        self.inner.load(player)
    }

    fn save(&self, player: PlayerId, doc: &PlayerBalanceDocument) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected save failure".into()));
        }
        self.inner.save(player, doc)
    }

    fn release(&self, player: PlayerId) {
        self.inner.release(player);
    }
}

fn gems() -> CurrencyDefinition {
    CurrencyDefinition {
        id: "gems".into(),
        name: "Gems".into(),
        purchasable: true,
        earnable: false,
        min_value: 0.0,
        max_value: 1_000_000.0,
        default_value: 0.0,
        products: vec![PurchaseOption {
            quantity: 100.0,
            product: ProductId(501),
        }],
    }
}

fn engine_with_store(store: Arc<dyn ProfileStore>) -> Economy {
    Economy::open_seeded(
        CurrencyCatalog::new(vec![gems()]).unwrap(),
        RewardCatalog::new(vec![], vec![]).unwrap(),
        store,
        EconomyConfig::default(),
        42,
    )
}

const GEMS: fn() -> CurrencyId = || CurrencyId::from("gems");

#[test]
fn receipt_grants_currency_once() {
    let economy = engine_with_store(Arc::new(InMemoryStore::new()));
    economy.handle_player_join(PlayerId(1)).unwrap();

    let receipt = ReceiptId::from("r-1001");
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &receipt),
        ReceiptOutcome::Granted
    );
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 100.0);

    // Duplicate delivery settles without a second credit.
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &receipt),
        ReceiptOutcome::Granted
    );
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 100.0);
}

#[test]
fn distinct_receipts_each_grant() {
    let economy = engine_with_store(Arc::new(InMemoryStore::new()));
    economy.handle_player_join(PlayerId(1)).unwrap();

    economy.process_receipt(ProductId(501), PlayerId(1), &"r-1".into());
    economy.process_receipt(ProductId(501), PlayerId(1), &"r-2".into());
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 200.0);
}

#[test]
fn unloaded_player_defers() {
    let economy = engine_with_store(Arc::new(InMemoryStore::new()));
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &"r-1".into()),
        ReceiptOutcome::Retryable
    );
}

#[test]
fn unknown_product_settles_without_credit() {
    let economy = engine_with_store(Arc::new(InMemoryStore::new()));
    economy.handle_player_join(PlayerId(1)).unwrap();

    assert_eq!(
        economy.process_receipt(ProductId(999), PlayerId(1), &"r-1".into()),
        ReceiptOutcome::Granted
    );
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 0.0);

    // Settled for good: redelivery is still Granted.
    assert_eq!(
        economy.process_receipt(ProductId(999), PlayerId(1), &"r-1".into()),
        ReceiptOutcome::Granted
    );
}

#[test]
fn persistence_failure_is_retryable_without_double_credit() {
    let store = Arc::new(FlakyStore::new());
    let economy = engine_with_store(Arc::clone(&store) as Arc<dyn ProfileStore>);
    economy.handle_player_join(PlayerId(1)).unwrap();

    let receipt = ReceiptId::from("r-2001");
    store.set_fail_saves(true);
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &receipt),
        ReceiptOutcome::Retryable
    );
    // The grant itself went through; only the durable mark is missing.
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 100.0);

    // The platform resubmits once the backend recovers; the in-memory
    // mark settles it without crediting again.
    store.set_fail_saves(false);
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &receipt),
        ReceiptOutcome::Granted
    );
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 100.0);
}

#[test]
fn granted_mark_survives_session_cycle() {
    let store = Arc::new(InMemoryStore::new());
    let economy = engine_with_store(Arc::clone(&store) as Arc<dyn ProfileStore>);
    economy.handle_player_join(PlayerId(1)).unwrap();

    let receipt = ReceiptId::from("r-3001");
    economy.process_receipt(ProductId(501), PlayerId(1), &receipt);
    economy.handle_player_leave(PlayerId(1));

    // Fresh session, same receipt: the durable mark blocks a re-grant.
    economy.handle_player_join(PlayerId(1)).unwrap();
    assert_eq!(
        economy.process_receipt(ProductId(501), PlayerId(1), &receipt),
        ReceiptOutcome::Granted
    );
    assert_eq!(economy.get_value(PlayerId(1), &GEMS()).unwrap(), 100.0);
}
