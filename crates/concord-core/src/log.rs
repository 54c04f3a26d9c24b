//! Append-only action log owned by one engine instance.
//!
//! Records of bursts that are still running are kept per burst so the
//! matcher can scan them newest-first. Every record is also pushed onto a
//! bounded history window for inspection; evicting from the window never
//! touches an active burst's records.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::record::{ActionRecord, ActionRef, BurstId, Dict};

/// Fields of a record before the log assigns its sequence number.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub burst: BurstId,
    pub depth: u32,
    pub action: ActionRef,
    pub input: Dict,
    pub output: Dict,
    pub synced_by: Option<String>,
}

#[derive(Debug)]
pub struct ActionLog {
    next_seq: u64,
    active: HashMap<BurstId, Vec<Arc<ActionRecord>>>,
    history: VecDeque<Arc<ActionRecord>>,
    history_capacity: usize,
}

impl ActionLog {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            next_seq: 1,
            active: HashMap::new(),
            history: VecDeque::new(),
            history_capacity,
        }
    }

    /// Append a record, assigning it the next sequence number.
    pub fn append(&mut self, new: NewRecord) -> Arc<ActionRecord> {
        let record = Arc::new(ActionRecord {
            seq: self.next_seq,
            burst: new.burst,
            depth: new.depth,
            action: new.action,
            input: new.input,
            output: new.output,
            synced_by: new.synced_by,
            at: Utc::now(),
        });
        self.next_seq += 1;

        self.active
            .entry(record.burst)
            .or_default()
            .push(Arc::clone(&record));

        self.history.push_back(Arc::clone(&record));
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
        record
    }

    /// Records of a running burst in append order.
    pub fn burst_records(&self, burst: BurstId) -> &[Arc<ActionRecord>] {
        self.active.get(&burst).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stop tracking a finished burst and hand back its records.
    pub fn close_burst(&mut self, burst: BurstId) -> Vec<Arc<ActionRecord>> {
        self.active.remove(&burst).unwrap_or_default()
    }

    pub fn active_bursts(&self) -> usize {
        self.active.len()
    }

    /// The most recent `limit` records across all bursts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<ActionRecord>> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    /// Total number of records ever appended.
    pub fn appended(&self) -> u64 {
        self.next_seq - 1
    }
}
