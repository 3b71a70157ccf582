//! Aggregate wallet state
//!
//! All mutable collections of the ledger (actions, baskets, locks, pending
//! reference index) live in one aggregate owned exclusively by a single
//! `ActionLedger` instance. No shared or static state.

use std::collections::HashMap;

use crate::action::Action;
use crate::basket::BasketRegistry;
use crate::collaborators::BuiltTransaction;
use crate::locks::UtxoLockTable;

/// The wallet aggregate
#[derive(Debug, Default)]
pub struct WalletState {
    /// Every action this wallet has tracked; never deleted
    pub actions: Vec<Action>,
    /// Basket registry
    pub baskets: BasketRegistry,
    /// Lock table
    pub locks: UtxoLockTable,
    /// Reference token → action id, for actions awaiting signing
    pub pending_references: HashMap<String, String>,
}

impl WalletState {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Find an action by id
    pub fn action_by_id(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Find an action by id, mutably
    pub fn action_by_id_mut(&mut self, id: &str) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    /// Find an action by its reference token, regardless of status
    pub fn action_by_reference(&self, reference: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.reference.as_deref() == Some(reference))
    }

    /// Find an action by the transaction id it resolved to
    pub fn action_by_txid(&self, txid: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.txid.as_deref() == Some(txid))
    }

    /// Transaction previously built by this wallet, for ancestry walks
    pub fn source_transaction(&self, txid: &str) -> Option<&BuiltTransaction> {
        self.actions
            .iter()
            .filter_map(|a| a.transaction.as_ref())
            .find(|tx| tx.txid == txid)
    }
}
