//! State persistence
//!
//! Serializes the wallet aggregate to a single durable blob and restores it
//! on startup. Persistence is not transactional: in-memory mutation always
//! precedes the durable write, so a crash between the two leaves durable
//! state one step stale. Save failures degrade durability only; in-memory
//! state stays authoritative for the rest of the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::action::{Action, SerializedAction};
use crate::basket::{Basket, BasketRegistry};
use crate::collaborators::DurableStore;
use crate::error::LedgerResult;
use crate::locks::UtxoLockTable;
use crate::state::WalletState;

/// Persisted snapshot of the wallet aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletSnapshot {
    /// All tracked actions in persisted form
    pub actions: Vec<SerializedAction>,
    /// Basket name → UTXO records
    pub baskets: BTreeMap<String, Basket>,
    /// Locked outpoints
    pub locked_utxos: Vec<String>,
    /// Pending reference token → action id pairs
    pub pending_references: Vec<(String, String)>,
}

/// Saves and restores the aggregate through the durable store
pub struct StatePersistence {
    store: Arc<dyn DurableStore>,
    key: String,
}

impl StatePersistence {
    /// Create a persistence layer over one store key
    pub fn new(store: Arc<dyn DurableStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Snapshot an aggregate
    pub fn snapshot(state: &WalletState) -> LedgerResult<WalletSnapshot> {
        let mut actions = Vec::with_capacity(state.actions.len());
        for action in &state.actions {
            actions.push(action.to_serialized()?);
        }
        let mut pending_references: Vec<(String, String)> = state
            .pending_references
            .iter()
            .map(|(token, id)| (token.clone(), id.clone()))
            .collect();
        pending_references.sort();
        Ok(WalletSnapshot {
            actions,
            baskets: state.baskets.to_baskets(),
            locked_utxos: state.locks.to_outpoints(),
            pending_references,
        })
    }

    /// Rebuild an aggregate from a snapshot
    pub fn restore(snapshot: &WalletSnapshot) -> LedgerResult<WalletState> {
        let mut actions = Vec::with_capacity(snapshot.actions.len());
        for serialized in &snapshot.actions {
            actions.push(Action::from_serialized(serialized)?);
        }
        Ok(WalletState {
            actions,
            baskets: BasketRegistry::from_baskets(snapshot.baskets.clone()),
            locks: UtxoLockTable::from_outpoints(snapshot.locked_utxos.clone()),
            pending_references: snapshot.pending_references.iter().cloned().collect(),
        })
    }

    /// Write the aggregate to the durable store
    pub async fn save(&self, state: &WalletState) -> LedgerResult<()> {
        let snapshot = Self::snapshot(state)?;
        let blob = serde_json::to_vec(&snapshot)?;
        self.store.set(&self.key, blob).await?;
        debug!(key = %self.key, actions = snapshot.actions.len(), "saved wallet state");
        Ok(())
    }

    /// Write the aggregate, logging failures instead of propagating them
    pub async fn save_logged(&self, state: &WalletState) {
        if let Err(e) = self.save(state).await {
            error!(key = %self.key, error = %e, "failed to persist wallet state, continuing with in-memory state");
        }
    }

    /// Load the aggregate, `None` when nothing was persisted yet
    pub async fn load(&self) -> LedgerResult<Option<WalletState>> {
        let Some(blob) = self.store.get(&self.key).await? else {
            return Ok(None);
        };
        let snapshot: WalletSnapshot = serde_json::from_slice(&blob)?;
        Ok(Some(Self::restore(&snapshot)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{new_action, ActionParams, ActionStatus};
    use crate::basket::UtxoRecord;
    use crate::collaborators::{BuiltTransaction, MemoryStore};

    fn sample_state() -> WalletState {
        let mut state = WalletState::new();

        let mut pending = new_action(
            &ActionParams {
                description: "pay the invoice".into(),
                labels: vec!["billing".into()],
                ..Default::default()
            },
            Some("ref-1".into()),
        );
        pending.transaction = Some(BuiltTransaction {
            txid: "a".repeat(64),
            version: 1,
            lock_time: 0,
            inputs: vec![],
            outputs: vec![],
        });
        state
            .pending_references
            .insert("ref-1".into(), pending.id.clone());
        state.actions.push(pending);

        let mut done = new_action(
            &ActionParams {
                description: "settled payment".into(),
                ..Default::default()
            },
            None,
        );
        done.status = ActionStatus::Completed;
        done.txid = Some("b".repeat(64));
        state.actions.push(done);

        state.baskets.assign_to_basket(
            "default",
            UtxoRecord {
                outpoint: format!("{}.0", "b".repeat(64)),
                satoshis: 1000,
                locking_script: "76a914aa88ac".into(),
                tags: vec!["change".into()],
                custom: None,
            },
        );
        state.locks.lock_inputs(&[format!("{}.0", "a".repeat(64))]);
        state
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let persistence = StatePersistence::new(store.clone(), "wallet-test");
        let state = sample_state();

        persistence.save(&state).await.unwrap();
        let restored = persistence.load().await.unwrap().unwrap();

        assert_eq!(restored.actions.len(), state.actions.len());
        assert_eq!(restored.actions[0].status, ActionStatus::Pending);
        assert_eq!(
            restored.actions[0].transaction,
            state.actions[0].transaction
        );
        assert_eq!(restored.pending_references, state.pending_references);
        assert_eq!(
            restored.locks.to_outpoints(),
            state.locks.to_outpoints()
        );
        assert_eq!(
            restored.baskets.to_baskets(),
            state.baskets.to_baskets()
        );
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let persistence = StatePersistence::new(Arc::new(MemoryStore::new()), "wallet-test");
        assert!(persistence.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_logged_swallows_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true).await;
        let persistence = StatePersistence::new(store.clone(), "wallet-test");

        // must not panic or propagate
        persistence.save_logged(&sample_state()).await;
        assert!(store.raw("wallet-test").await.is_none());
    }
}
