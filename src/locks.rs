//! UTXO lock table
//!
//! Tracks which outpoints are currently reserved by in-flight actions. An
//! outpoint's presence means "reserved, not currently spendable". The table
//! holds no persistence logic of its own; snapshots treat it as a plain
//! sequence of outpoint strings.

use std::collections::HashSet;

use crate::action::outpoint;
use crate::error::{LedgerError, LedgerResult};

/// Set of locked outpoints
#[derive(Clone, Debug, Default)]
pub struct UtxoLockTable {
    locked: HashSet<String>,
}

impl UtxoLockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a snapshot sequence
    pub fn from_outpoints(outpoints: Vec<String>) -> Self {
        Self {
            locked: outpoints.into_iter().collect(),
        }
    }

    /// Fail on the first outpoint that is already locked
    ///
    /// Collisions are not aggregated; the table is left unmodified.
    pub fn check_inputs_not_locked(&self, outpoints: &[String]) -> LedgerResult<()> {
        for outpoint in outpoints {
            if self.locked.contains(outpoint) {
                return Err(LedgerError::LockConflict {
                    outpoint: outpoint.clone(),
                });
            }
        }
        Ok(())
    }

    /// Lock an explicit list of outpoints
    pub fn lock_inputs(&mut self, outpoints: &[String]) {
        for outpoint in outpoints {
            self.locked.insert(outpoint.clone());
        }
    }

    /// Unlock an explicit list of outpoints
    pub fn unlock_inputs(&mut self, outpoints: &[String]) {
        for outpoint in outpoints {
            self.locked.remove(outpoint);
        }
    }

    /// Lock the implied `txid.0..txid.N-1` output range
    pub fn lock_outputs(&mut self, txid: &str, count: usize) {
        for index in 0..count {
            self.locked.insert(outpoint(txid, index as u32));
        }
    }

    /// Unlock the implied `txid.0..txid.N-1` output range
    pub fn unlock_outputs(&mut self, txid: &str, count: usize) {
        for index in 0..count {
            self.locked.remove(&outpoint(txid, index as u32));
        }
    }

    /// Bulk-unlock an arbitrary list of outpoints
    pub fn unlock_outpoints(&mut self, outpoints: &[String]) {
        for outpoint in outpoints {
            self.locked.remove(outpoint);
        }
    }

    /// Check whether an outpoint is reserved
    pub fn is_locked(&self, outpoint: &str) -> bool {
        self.locked.contains(outpoint)
    }

    /// Number of locked outpoints
    pub fn len(&self) -> usize {
        self.locked.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }

    /// Snapshot as a sorted sequence
    pub fn to_outpoints(&self) -> Vec<String> {
        let mut outpoints: Vec<String> = self.locked.iter().cloned().collect();
        outpoints.sort();
        outpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(txid_char: char, index: u32) -> String {
        outpoint(&txid_char.to_string().repeat(64), index)
    }

    #[test]
    fn test_check_fails_fast_on_first_collision() {
        let mut table = UtxoLockTable::new();
        table.lock_inputs(&[op('a', 0), op('a', 1)]);

        let err = table
            .check_inputs_not_locked(&[op('b', 0), op('a', 0), op('a', 1)])
            .unwrap_err();
        match err {
            LedgerError::LockConflict { outpoint } => assert_eq!(outpoint, op('a', 0)),
            other => panic!("unexpected error: {other}"),
        }
        // nothing new was locked by the failed check
        assert!(!table.is_locked(&op('b', 0)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lock_and_unlock_explicit_lists() {
        let mut table = UtxoLockTable::new();
        table.lock_inputs(&[op('a', 0), op('b', 1)]);
        assert!(table.is_locked(&op('a', 0)));
        assert!(table.is_locked(&op('b', 1)));

        table.unlock_inputs(&[op('a', 0)]);
        assert!(!table.is_locked(&op('a', 0)));
        assert!(table.is_locked(&op('b', 1)));
    }

    #[test]
    fn test_output_range_derivation() {
        let mut table = UtxoLockTable::new();
        let txid = "c".repeat(64);
        table.lock_outputs(&txid, 3);

        assert!(table.is_locked(&outpoint(&txid, 0)));
        assert!(table.is_locked(&outpoint(&txid, 1)));
        assert!(table.is_locked(&outpoint(&txid, 2)));
        assert!(!table.is_locked(&outpoint(&txid, 3)));

        table.unlock_outputs(&txid, 3);
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut table = UtxoLockTable::new();
        table.lock_inputs(&[op('a', 0), op('b', 0), op('c', 5)]);

        let snapshot = table.to_outpoints();
        let restored = UtxoLockTable::from_outpoints(snapshot.clone());
        assert_eq!(restored.to_outpoints(), snapshot);
        assert_eq!(restored.len(), 3);
    }
}
