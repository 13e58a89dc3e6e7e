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

//! Benchmarks for the economy engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded balance mutations and reads
//! - Multi-threaded contended mutations
//! - Transfers between player pairs
//! - Weighted reward draws

use coinvault_rs::{
    ContainerPrice, CurrencyCatalog, CurrencyDefinition, CurrencyId, Economy, EconomyConfig,
    InMemoryStore, ItemDefinition, PlayerId, ProfileStore, Rarity, RewardCatalog,
    RewardContainer, RewardEntry,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn coins() -> CurrencyDefinition {
    CurrencyDefinition {
        id: "coins".into(),
        name: "Coins".into(),
        purchasable: false,
        earnable: true,
        min_value: 0.0,
        max_value: 1_000_000_000.0,
        default_value: 0.0,
        products: vec![],
    }
}

fn rewards() -> RewardCatalog {
    let items: Vec<ItemDefinition> = (0..20)
        .map(|i| ItemDefinition {
            id: format!("item-{i}").as_str().into(),
            name: format!("Item {i}"),
            rarity: match i % 5 {
                0 => Rarity::Common,
                1 => Rarity::Uncommon,
                2 => Rarity::Rare,
                3 => Rarity::Epic,
                _ => Rarity::Legendary,
            },
            stats: BTreeMap::new(),
        })
        .collect();
    let entries: Vec<RewardEntry> = (0..20)
        .map(|i| RewardEntry {
            item: format!("item-{i}").as_str().into(),
            weight: (20 - i) as f64,
        })
        .collect();

    RewardCatalog::new(
        items,
        vec![RewardContainer {
            id: "egg".into(),
            name: "Egg".into(),
            price: ContainerPrice {
                currency: "coins".into(),
                amount: 1.0,
            },
            entries,
        }],
    )
    .unwrap()
}

fn engine_with_players(count: u64) -> Arc<Economy> {
    let economy = Arc::new(Economy::open_seeded(
        CurrencyCatalog::new(vec![coins()]).unwrap(),
        rewards(),
        Arc::new(InMemoryStore::new()) as Arc<dyn ProfileStore>,
        EconomyConfig::default(),
        42,
    ));
    for id in 0..count {
        economy.handle_player_join(PlayerId(id)).unwrap();
        economy
            .set_value(PlayerId(id), &CurrencyId::from("coins"), 1_000_000.0, "seed")
            .unwrap();
    }
    economy
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_increment(c: &mut Criterion) {
    let economy = engine_with_players(1);
    let currency = CurrencyId::from("coins");

    c.bench_function("increment_single", |b| {
        b.iter(|| {
            economy
                .increment_value(PlayerId(0), black_box(&currency), 1.0, "bench")
                .unwrap()
        })
    });
}

fn bench_get_value(c: &mut Criterion) {
    let economy = engine_with_players(1);
    let currency = CurrencyId::from("coins");

    c.bench_function("get_value", |b| {
        b.iter(|| economy.get_value(PlayerId(0), black_box(&currency)).unwrap())
    });
}

fn bench_transfer(c: &mut Criterion) {
    let economy = engine_with_players(2);
    let currency = CurrencyId::from("coins");

    c.bench_function("transfer_pair", |b| {
        let mut forward = true;
        b.iter(|| {
            let (from, to) = if forward {
                (PlayerId(0), PlayerId(1))
            } else {
                (PlayerId(1), PlayerId(0))
            };
            forward = !forward;
            economy
                .transfer_value(from, to, black_box(&currency), 1.0, "bench")
                .unwrap()
        })
    });
}

fn bench_draw(c: &mut Criterion) {
    let economy = engine_with_players(1);
    let container = "egg".into();

    let mut group = c.benchmark_group("reward_draw");
    for luck in [0.0, 100.0] {
        group.bench_with_input(BenchmarkId::from_parameter(luck), &luck, |b, &luck| {
            b.iter(|| economy.draw_reward(black_box(&container), luck).unwrap())
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_contended_increments(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_increments");

    for num_players in [1u64, 8, 64] {
        let economy = engine_with_players(num_players);
        let currency = CurrencyId::from("coins");
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_players),
            &num_players,
            |b, &num_players| {
                b.iter(|| {
                    (0..1_000u64).into_par_iter().for_each(|i| {
                        let player = PlayerId(i % num_players);
                        economy
                            .increment_value(player, &currency, 1.0, "bench")
                            .unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_increment,
    bench_get_value,
    bench_transfer,
    bench_draw,
    bench_contended_increments
);
criterion_main!(benches);
