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

//! Transaction records and the telemetry sink.
//!
//! Records are ephemeral audit data: they exist for analytics and operator
//! visibility, never for persistence. Delivery is fire-and-forget; a sink
//! failure must never fail the balance operation that produced the record.

use crate::base::{CurrencyId, PlayerId, RecordId};
use crossbeam::queue::SegQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Category of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
    Trade,
    Purchase,
    Rollback,
}

/// One applied balance mutation.
///
/// # Invariants
///
/// - `new_value - previous == delta` (post-clamp actual change; the
///   requested amount is not recorded when the clamp shortened it).
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: RecordId,
    /// Unix seconds at which the mutation applied.
    pub timestamp: u64,
    pub player: PlayerId,
    pub currency: CurrencyId,
    pub previous: f64,
    pub new_value: f64,
    pub delta: f64,
    pub reason: String,
    pub kind: TransactionKind,
}

static RECORD_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocates the next process-unique record id.
pub fn next_record_id() -> RecordId {
    RecordId(RECORD_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Current wall clock as unix seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Receiver for transaction records.
///
/// Implementations must not panic and should not block; the ledger calls
/// `record` while holding a document mutex.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: TransactionRecord);
}

/// Default sink: logs each record through `tracing` and keeps a bounded
/// in-memory buffer for the analytics drain.
///
/// The buffer drops its oldest entries once `capacity` is exceeded, so a
/// stalled drain degrades analytics, never gameplay.
#[derive(Debug)]
pub struct AuditSink {
    buffer: SegQueue<TransactionRecord>,
    capacity: usize,
}

impl AuditSink {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: SegQueue::new(),
            capacity,
        }
    }

    /// Removes and returns all buffered records, oldest first.
    pub fn drain(&self) -> Vec<TransactionRecord> {
        let mut records = Vec::with_capacity(self.buffer.len());
        while let Some(record) = self.buffer.pop() {
            records.push(record);
        }
        records
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl TelemetrySink for AuditSink {
    fn record(&self, record: TransactionRecord) {
        tracing::info!(
            target: "coinvault::audit",
            id = record.id.0,
            player = %record.player,
            currency = %record.currency,
            previous = record.previous,
            new_value = record.new_value,
            delta = record.delta,
            kind = ?record.kind,
            reason = %record.reason,
            "balance change"
        );

        while self.buffer.len() >= self.capacity {
            self.buffer.pop();
        }
        self.buffer.push(record);
    }
}
