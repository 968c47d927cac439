//! Batch processing with user-group partitioning for async replay
//!
//! This module provides the `BatchProcessor` struct, which runs a batch of
//! records concurrently while producing exactly the balances a sequential
//! replay of the same batch would.
//!
//! # Design
//!
//! Records are grouped by the users they touch. A transfer touches two users,
//! so it joins the sender's and recipient's groups into one. Groups are
//! therefore disjoint sets of users: records in different groups never read
//! or write the same wallet and can run in any order, while records inside a
//! group run one after another in input order.
//!
//! ```text
//! batch ──> union-find over handles ──> group A ──> spawn_blocking ──┐
//!                                   ├─> group B ──> spawn_blocking ──┼─> results (input order)
//!                                   └─> group C ──> spawn_blocking ──┘
//! ```
//!
//! Wallet operations may block (rate refresh over HTTP, argon2 hashing), so
//! each group runs on tokio's blocking pool rather than on a worker thread.

use std::collections::HashMap;

use super::engine::{ProcessingResult, ReplayEngine};
use crate::types::{OperationRecord, User, WalletError};

/// Batch processor with user-group partitioning
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: ReplayEngine,
}

impl BatchProcessor {
    pub fn new(engine: ReplayEngine) -> Self {
        Self { engine }
    }

    /// Partition a batch into groups of records whose users are connected
    ///
    /// # Guarantees
    ///
    /// - Each record appears in exactly one group
    /// - Records inside a group keep their input order
    /// - Two records sharing a handle (case-insensitively) share a group
    /// - Groups are returned in order of their first record
    pub fn partition_by_users(&self, batch: Vec<OperationRecord>) -> Vec<Vec<OperationRecord>> {
        let mut sets = DisjointSets::default();
        let keys: Vec<Vec<usize>> = batch
            .iter()
            .map(|record| {
                record
                    .handles()
                    .map(|handle| sets.key(User::normalize_handle(handle)))
                    .collect()
            })
            .collect();

        for handles in &keys {
            if let Some((&first, rest)) = handles.split_first() {
                for &other in rest {
                    sets.union(first, other);
                }
            }
        }

        let mut group_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<OperationRecord>> = Vec::new();
        for (record, handles) in batch.into_iter().zip(keys) {
            let root = sets.find(handles[0]);
            let index = *group_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[index].push(record);
        }

        groups
    }

    /// Process one group sequentially, in order
    pub fn process_group(&self, records: Vec<OperationRecord>) -> Vec<ProcessingResult> {
        records
            .into_iter()
            .map(|record| self.engine.process_record(record))
            .collect()
    }

    /// Process a batch with one blocking task per user group
    ///
    /// Results come back sorted by input line. Failed operations are
    /// captured in the results and never stop the batch.
    pub async fn process_batch(&self, batch: Vec<OperationRecord>) -> Vec<ProcessingResult> {
        let groups = self.partition_by_users(batch);
        tracing::debug!(groups = groups.len(), "processing batch");

        let mut tasks = Vec::with_capacity(groups.len());
        for group in groups {
            let processor = self.clone();
            let records = group.clone();
            tasks.push((
                records,
                tokio::task::spawn_blocking(move || processor.process_group(group)),
            ));
        }

        let mut results = Vec::new();
        for (records, task) in tasks {
            match task.await {
                Ok(group_results) => results.extend(group_results),
                Err(e) => {
                    tracing::error!(error = %e, records = records.len(), "replay task panicked");
                    let error = WalletError::aborted(format!("replay task failed: {}", e));
                    results.extend(records.into_iter().map(|record| ProcessingResult {
                        record,
                        result: Err(error.clone()),
                    }));
                }
            }
        }

        results.sort_by_key(|result| result.record.line);
        results
    }
}

/// Union-find over interned handles
#[derive(Debug, Default)]
struct DisjointSets {
    ids: HashMap<String, usize>,
    parent: Vec<usize>,
}

impl DisjointSets {
    fn key(&mut self, handle: String) -> usize {
        let next = self.parent.len();
        let id = *self.ids.entry(handle).or_insert(next);
        if id == next {
            self.parent.push(next);
        }
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}
