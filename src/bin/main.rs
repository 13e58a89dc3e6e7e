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

use clap::Parser;
use coinvault_rs::{ContainerId, ItemId, RewardCatalog};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process;

/// Reward Table Tuner - probability tables for loot containers
///
/// Loads a reward catalog TOML file and prints each container's
/// probability table across a set of luck values as CSV. Optionally runs
/// seeded empirical draws next to the analytic table to sanity-check a
/// tuning change.
#[derive(Parser, Debug)]
#[command(name = "coinvault-rs")]
#[command(about = "Inspect and tune loot-container probability tables", long_about = None)]
struct Args {
    /// Path to the reward catalog TOML file
    ///
    /// Expected layout: [[items]] with id/name/rarity, [[containers]] with
    /// id/name/price/entries.
    #[arg(value_name = "CATALOG")]
    catalog: PathBuf,

    /// Luck values to tabulate
    #[arg(long, value_delimiter = ',', default_value = "0,25,50,100")]
    luck: Vec<f64>,

    /// Restrict output to one container id
    #[arg(long)]
    container: Option<String>,

    /// Empirical draws per luck value (0 = analytic table only)
    #[arg(long, default_value_t = 0)]
    draws: usize,

    /// RNG seed for empirical draws
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() {
    init_tracing();

    let args = Args::parse();

    let catalog = match RewardCatalog::from_path(&args.catalog) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error loading catalog '{}': {}", args.catalog.display(), e);
            process::exit(1);
        }
    };

    let containers: Vec<ContainerId> = match &args.container {
        Some(id) => vec![ContainerId(id.clone())],
        None => catalog
            .summaries()
            .into_iter()
            .map(|summary| summary.id)
            .collect(),
    };

    if let Err(e) = write_tables(
        &catalog,
        &containers,
        &args.luck,
        args.draws,
        args.seed,
        std::io::stdout(),
    ) {
        eprintln!("Error writing tables: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    // Reconciler/audit logs go to stderr; CSV stays clean on stdout.
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Writes probability tables for the given containers and luck values.
///
/// Columns: `container, luck, item, rarity, adjusted_weight, chance_pct,
/// observed_pct`. The observed column is empty unless `draws > 0`.
fn write_tables<W: Write>(
    catalog: &RewardCatalog,
    containers: &[ContainerId],
    luck_values: &[f64],
    draws: usize,
    seed: u64,
    writer: W,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "container",
        "luck",
        "item",
        "rarity",
        "adjusted_weight",
        "chance_pct",
        "observed_pct",
    ])?;

    for container in containers {
        for row in catalog.simulate(container, luck_values)? {
            let (luck, preview) = row;
            let observed = if draws > 0 {
                Some(observed_shares(catalog, container, luck, draws, seed)?)
            } else {
                None
            };

            for entry in preview {
                let observed_pct = observed
                    .as_ref()
                    .map(|shares| {
                        format!("{:.4}", shares.get(&entry.item).copied().unwrap_or(0.0))
                    })
                    .unwrap_or_default();
                let luck_field = luck.to_string();
                let rarity_field = entry.rarity.to_string();
                let weight_field = format!("{:.4}", entry.adjusted_weight);
                let chance_field = format!("{:.4}", entry.chance);
                wtr.write_record([
                    container.0.as_str(),
                    luck_field.as_str(),
                    entry.item.0.as_str(),
                    rarity_field.as_str(),
                    weight_field.as_str(),
                    chance_field.as_str(),
                    observed_pct.as_str(),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Empirical per-item share in percent over `draws` seeded draws.
fn observed_shares(
    catalog: &RewardCatalog,
    container: &ContainerId,
    luck: f64,
    draws: usize,
    seed: u64,
) -> Result<HashMap<ItemId, f64>, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts: HashMap<ItemId, usize> = HashMap::new();
    for item in catalog.draw_many(container, draws, luck, &mut rng)? {
        *counts.entry(item).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .map(|(item, count)| (item, count as f64 / draws as f64 * 100.0))
        .collect())
}
