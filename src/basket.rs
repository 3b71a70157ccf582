//! Basket registry
//!
//! Baskets are named logical groupings of UTXOs under wallet control, the
//! source of truth for wallet holdings. Lookup is a linear scan across
//! baskets, which is acceptable at wallet scale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{outpoint, ActionOutput};
use crate::locks::UtxoLockTable;

/// A spendable output tracked in a basket
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtxoRecord {
    /// Outpoint, `txid.index`
    pub outpoint: String,
    /// Value in satoshis
    pub satoshis: u64,
    /// Locking script
    pub locking_script: String,
    /// Tags for filtered listing
    pub tags: Vec<String>,
    /// Opaque per-UTXO metadata
    pub custom: Option<serde_json::Value>,
}

/// A named grouping of UTXOs
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    /// Ordered UTXO records
    pub utxos: Vec<UtxoRecord>,
}

/// Tag and label match mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Match any of the given values
    #[default]
    Any,
    /// Match all of the given values
    All,
}

/// Filter for output listing
#[derive(Clone, Debug, Default)]
pub struct OutputFilter {
    /// Restrict to one basket
    pub basket: Option<String>,
    /// Restrict by tags
    pub tags: Vec<String>,
    /// How the tags combine
    pub tag_mode: FilterMode,
    /// Include outpoints currently reserved in the lock table
    pub include_locked: bool,
}

/// Named groupings of spendable outputs
#[derive(Clone, Debug, Default)]
pub struct BasketRegistry {
    baskets: BTreeMap<String, Basket>,
}

impl BasketRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a snapshot map
    pub fn from_baskets(baskets: BTreeMap<String, Basket>) -> Self {
        Self { baskets }
    }

    /// Snapshot the basket map
    pub fn to_baskets(&self) -> BTreeMap<String, Basket> {
        self.baskets.clone()
    }

    /// Assign a UTXO into a basket
    pub fn assign_to_basket(&mut self, basket: &str, record: UtxoRecord) {
        debug!(basket, outpoint = %record.outpoint, satoshis = record.satoshis, "assigning output");
        self.baskets
            .entry(basket.to_string())
            .or_default()
            .utxos
            .push(record);
    }

    /// Find a UTXO by outpoint across all baskets
    pub fn find_utxo(&self, outpoint: &str) -> Option<(&str, &UtxoRecord)> {
        for (name, basket) in &self.baskets {
            if let Some(record) = basket.utxos.iter().find(|u| u.outpoint == outpoint) {
                return Some((name.as_str(), record));
            }
        }
        None
    }

    /// Remove spent UTXOs from every basket
    pub fn cleanup_spent_utxos(&mut self, outpoints: &[String]) {
        for basket in self.baskets.values_mut() {
            basket
                .utxos
                .retain(|u| !outpoints.contains(&u.outpoint));
        }
        debug!(count = outpoints.len(), "cleaned up spent outputs");
    }

    /// Remove a UTXO from one basket, or from all when no basket is given
    ///
    /// Returns whether anything was removed.
    pub fn relinquish_output(&mut self, outpoint: &str, basket: Option<&str>) -> bool {
        let mut removed = false;
        match basket {
            Some(name) => {
                if let Some(basket) = self.baskets.get_mut(name) {
                    let before = basket.utxos.len();
                    basket.utxos.retain(|u| u.outpoint != outpoint);
                    removed = basket.utxos.len() != before;
                }
            }
            None => {
                for basket in self.baskets.values_mut() {
                    let before = basket.utxos.len();
                    basket.utxos.retain(|u| u.outpoint != outpoint);
                    removed |= basket.utxos.len() != before;
                }
            }
        }
        removed
    }

    /// List outputs matching a filter
    ///
    /// Locked outpoints are excluded unless the filter asks for them.
    pub fn list_outputs(&self, filter: &OutputFilter, locks: &UtxoLockTable) -> Vec<UtxoRecord> {
        self.baskets
            .iter()
            .filter(|(name, _)| match &filter.basket {
                Some(wanted) => *name == wanted,
                None => true,
            })
            .flat_map(|(_, basket)| basket.utxos.iter())
            .filter(|record| filter.include_locked || !locks.is_locked(&record.outpoint))
            .filter(|record| matches_tags(&record.tags, &filter.tags, filter.tag_mode))
            .cloned()
            .collect()
    }

    /// Sum of unlocked satoshis in a basket
    pub fn total_satoshis(&self, basket: &str, locks: &UtxoLockTable) -> u64 {
        self.baskets
            .get(basket)
            .map(|b| {
                b.utxos
                    .iter()
                    .filter(|u| !locks.is_locked(&u.outpoint))
                    .map(|u| u.satoshis)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Assign a transaction's new outputs into their destination baskets
    ///
    /// The whole `txid.0..txid.N-1` range is locked, then unlocked again
    /// when the broadcast destination signaled zero-confirmation acceptance.
    pub fn assign_outputs_to_baskets(
        &mut self,
        locks: &mut UtxoLockTable,
        txid: &str,
        outputs: &[ActionOutput],
        zero_conf_accepted: bool,
    ) {
        for (index, output) in outputs.iter().enumerate() {
            if let Some(basket) = &output.basket {
                self.assign_to_basket(
                    basket,
                    UtxoRecord {
                        outpoint: outpoint(txid, index as u32),
                        satoshis: output.satoshis,
                        locking_script: output.locking_script.clone(),
                        tags: output.tags.clone(),
                        custom: output.custom.clone(),
                    },
                );
            }
        }
        locks.lock_outputs(txid, outputs.len());
        if zero_conf_accepted {
            locks.unlock_outputs(txid, outputs.len());
        }
    }
}

fn matches_tags(tags: &[String], wanted: &[String], mode: FilterMode) -> bool {
    if wanted.is_empty() {
        return true;
    }
    match mode {
        FilterMode::Any => wanted.iter().any(|w| tags.contains(w)),
        FilterMode::All => wanted.iter().all(|w| tags.contains(w)),
    }
}
