//! Action ledger
//!
//! Orchestrates the full action lifecycle:
//! 1. Create - validate intent, lock inputs, build the transaction
//! 2. Sign - resolve keys and templates, sign via the builder
//! 3. Broadcast - submit once per distinct destination
//! 4. Confirm - track settlement depth, release locks, complete
//!
//! The ledger is the only component callers interact with directly. All
//! mutable state lives in one `WalletState` aggregate owned exclusively by
//! one ledger instance.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::action::{
    generate_reference, new_action, validate_action_params, Action, ActionOutput, ActionParams,
    ActionStatus, CreateActionOptions, SignActionOptions,
};
use crate::basket::{FilterMode, OutputFilter, UtxoRecord};
use crate::collaborators::{
    BroadcastResponse, BroadcastService, ChainTracker, DurableStore, KeyService,
    ProofBundleService, ScriptTemplate, SigningKey, TransactionBuilder, WireInput, WireOutput,
};
use crate::error::{LedgerError, LedgerResult};
use crate::keys::{SigningKeyResolver, TemplateRegistry};
use crate::monitor::{ConfirmationMonitor, ConfirmationSink, MonitorConfig};
use crate::persistence::StatePersistence;
use crate::state::WalletState;

/// Ledger configuration
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Durable store key for this wallet instance
    pub storage_key: String,
    /// Depth at which an action counts as settled
    pub confirmation_threshold: u32,
    /// Confirmation poll interval
    pub poll_interval: Duration,
    /// Confirmation attempt cap
    pub max_poll_attempts: u32,
    /// Destination for outputs without a basket assignment
    pub default_destination: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage_key: "wallet-ledger".into(),
            confirmation_threshold: 6,
            poll_interval: Duration::from_secs(60),
            max_poll_attempts: 2880,
            default_destination: "mainnet".into(),
        }
    }
}

/// Callbacks for ledger state changes
#[async_trait::async_trait]
pub trait LedgerListener: Send + Sync {
    /// Called when an action is created
    async fn on_created(&self, action_id: &str);
    /// Called when an action is signed but withheld from broadcast
    async fn on_signed(&self, action_id: &str, txid: &str);
    /// Called when an action is broadcast
    async fn on_broadcast(&self, action_id: &str, txid: &str);
    /// Called when an action is aborted
    async fn on_aborted(&self, action_id: &str);
    /// Called when an action settles at the confirmation threshold
    async fn on_completed(&self, action_id: &str, txid: &str);
    /// Called when an external transaction is internalized
    async fn on_internalized(&self, txid: &str);
}

/// Default no-op listener
pub struct NoOpListener;

#[async_trait::async_trait]
impl LedgerListener for NoOpListener {
    async fn on_created(&self, _action_id: &str) {}
    async fn on_signed(&self, _action_id: &str, _txid: &str) {}
    async fn on_broadcast(&self, _action_id: &str, _txid: &str) {}
    async fn on_aborted(&self, _action_id: &str) {}
    async fn on_completed(&self, _action_id: &str, _txid: &str) {}
    async fn on_internalized(&self, _txid: &str) {}
}

/// External collaborators consumed by the ledger
#[derive(Clone)]
pub struct LedgerServices {
    /// Transaction construction and signing
    pub builder: Arc<dyn TransactionBuilder>,
    /// Proof bundle generation and parsing
    pub proofs: Arc<dyn ProofBundleService>,
    /// Transaction broadcast
    pub broadcaster: Arc<dyn BroadcastService>,
    /// Per-payment key derivation
    pub keys: Arc<dyn KeyService>,
    /// Chain state queries
    pub chain: Arc<dyn ChainTracker>,
    /// Durable blob store
    pub store: Arc<dyn DurableStore>,
}

/// A created-but-unsigned action awaiting its signing call
#[derive(Clone, Debug)]
pub struct SignableTransaction {
    /// Proof bundle of the unsigned transaction
    pub proof_bundle: Vec<u8>,
    /// Reference token for the later `sign_action` call
    pub reference: String,
}

/// Result of action creation
#[derive(Clone, Debug)]
pub enum CreateActionResult {
    /// Signing and processing continued immediately
    Processed(SignActionResult),
    /// Signing deferred; continue with `sign_action`
    Signable(SignableTransaction),
}

/// Result of the signing step
#[derive(Clone, Debug)]
pub struct SignActionResult {
    /// Canonical transaction id, absent when broadcast was withheld
    pub txid: Option<String>,
    /// Proof bundle of the transaction
    pub proof_bundle: Vec<u8>,
}

/// Result of internalizing an external transaction
#[derive(Clone, Debug)]
pub struct InternalizeResult {
    /// Whether the transaction was accepted
    pub accepted: bool,
    /// Transaction id
    pub txid: String,
}

/// How one output of an external transaction is internalized
#[derive(Clone, Debug)]
pub enum InternalizeProtocol {
    /// Insert the output into a named basket
    BasketInsertion {
        /// Destination basket
        basket: String,
        /// Tags applied to the resulting UTXO
        tags: Vec<String>,
        /// Opaque per-UTXO metadata
        custom: Option<serde_json::Value>,
    },
    /// Wallet payment; not implemented, logged and skipped
    WalletPayment,
}

/// One output of an external transaction to internalize
#[derive(Clone, Debug)]
pub struct InternalizeOutputSpec {
    /// Output index in the transaction
    pub vout: u32,
    /// Internalization protocol
    pub protocol: InternalizeProtocol,
}

/// Filter for action listing
#[derive(Clone, Debug, Default)]
pub struct ActionFilter {
    /// Restrict by labels
    pub labels: Vec<String>,
    /// How the labels combine
    pub label_mode: FilterMode,
    /// Restrict to one status
    pub status: Option<ActionStatus>,
}

/// The wallet action ledger
pub struct ActionLedger {
    config: LedgerConfig,
    state: Arc<RwLock<WalletState>>,
    persistence: StatePersistence,
    builder: Arc<dyn TransactionBuilder>,
    proofs: Arc<dyn ProofBundleService>,
    broadcaster: Arc<dyn BroadcastService>,
    key_resolver: SigningKeyResolver,
    templates: TemplateRegistry,
    monitor: ConfirmationMonitor,
    listener: Arc<dyn LedgerListener>,
}

impl ActionLedger {
    /// Create a ledger over its collaborators
    pub fn new(config: LedgerConfig, master_key: SigningKey, services: LedgerServices) -> Self {
        let monitor = ConfirmationMonitor::new(
            services.chain.clone(),
            MonitorConfig {
                poll_interval: config.poll_interval,
                max_attempts: config.max_poll_attempts,
                confirmation_threshold: config.confirmation_threshold,
            },
        );
        let persistence = StatePersistence::new(services.store.clone(), config.storage_key.clone());
        let key_resolver = SigningKeyResolver::new(master_key, services.keys.clone());
        Self {
            config,
            state: Arc::new(RwLock::new(WalletState::new())),
            persistence,
            builder: services.builder,
            proofs: services.proofs,
            broadcaster: services.broadcaster,
            key_resolver,
            templates: TemplateRegistry::standard(),
            monitor,
            listener: Arc::new(NoOpListener),
        }
    }

    /// Set the state-change listener
    pub fn with_listener(mut self, listener: Arc<dyn LedgerListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Override the unlocking-script template registry
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Restore persisted state, bind confirmation delivery, resume tracking
    pub async fn start(self) -> LedgerResult<Arc<Self>> {
        if let Some(state) = self.persistence.load().await? {
            info!(actions = state.actions.len(), "restored wallet state");
            *self.state.write().await = state;
        }

        let ledger = Arc::new(self);
        let ledger_dyn: Arc<dyn ConfirmationSink> = ledger.clone();
        let sink: Weak<dyn ConfirmationSink> = Arc::downgrade(&ledger_dyn);
        ledger.monitor.bind(sink).await;

        let tracked: Vec<String> = ledger
            .state
            .read()
            .await
            .actions
            .iter()
            .filter(|a| a.status == ActionStatus::Broadcast)
            .filter_map(|a| a.txid.clone())
            .collect();
        for txid in tracked {
            ledger.monitor.track(&txid).await;
        }

        Ok(ledger)
    }

    /// Stop confirmation tracking; safe for teardown
    pub async fn shutdown(&self) {
        self.monitor.stop_all().await;
        info!("action ledger stopped");
    }

    /// Create an action from a caller's transaction intent
    ///
    /// Inputs must be explicit; automatic selection from baskets is not
    /// supported. All inputs are locked before the first suspension point,
    /// which is the system's sole double-spend guard.
    pub async fn create_action(
        &self,
        params: ActionParams,
        options: CreateActionOptions,
    ) -> LedgerResult<CreateActionResult> {
        validate_action_params(&params)?;
        if params.inputs.is_empty() {
            return Err(LedgerError::Validation(
                "explicit inputs are required; automatic selection is not supported".into(),
            ));
        }

        let input_outpoints: Vec<String> =
            params.inputs.iter().map(|i| i.outpoint.clone()).collect();

        // Check-then-lock stays inside one guard scope with no awaits, so
        // no other operation can reserve the same outpoints in between.
        let wire_inputs = {
            let mut state = self.state.write().await;
            state.locks.check_inputs_not_locked(&input_outpoints)?;

            let mut wire_inputs = Vec::with_capacity(params.inputs.len());
            for (index, input) in params.inputs.iter().enumerate() {
                let Some((_, record)) = state.baskets.find_utxo(&input.outpoint) else {
                    return Err(LedgerError::MissingUtxo {
                        outpoint: input.outpoint.clone(),
                        index,
                    });
                };
                let source_locking_script = Some(record.locking_script.clone());
                let source_satoshis = Some(record.satoshis);
                let (source_txid, _) = crate::action::parse_outpoint(&input.outpoint)?;
                let source = state.source_transaction(source_txid).cloned().map(Box::new);
                wire_inputs.push(WireInput {
                    outpoint: input.outpoint.clone(),
                    unlocking_script: input.unlocking_script.clone(),
                    sequence: input.sequence.unwrap_or(0xFFFF_FFFF),
                    source_locking_script,
                    source_satoshis,
                    source_transaction: source,
                });
            }
            state.locks.lock_inputs(&input_outpoints);
            wire_inputs
        };

        let wire_outputs: Vec<WireOutput> = params
            .outputs
            .iter()
            .map(|o| WireOutput {
                locking_script: o.locking_script.clone(),
                satoshis: o.satoshis,
            })
            .collect();

        let tx = match self
            .builder
            .build(&wire_inputs, &wire_outputs, params.lock_time, params.version)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                // no action exists yet to abort, release the reservation
                self.state.write().await.locks.unlock_inputs(&input_outpoints);
                return Err(e);
            }
        };
        let proof_bundle = match self.proofs.generate(&tx).await {
            Ok(bundle) => bundle,
            Err(e) => {
                self.state.write().await.locks.unlock_inputs(&input_outpoints);
                return Err(e);
            }
        };

        let reference = generate_reference();
        let mut action = new_action(&params, Some(reference.clone()));
        action.transaction = Some(tx);
        let action_id = action.id.clone();

        {
            let mut state = self.state.write().await;
            state
                .pending_references
                .insert(reference.clone(), action_id.clone());
            state.actions.push(action);
        }
        self.persist().await;
        self.listener.on_created(&action_id).await;
        info!(action = %action_id, reference = %reference, "created action");

        if options.sign_and_process {
            let result = self
                .sign_action(
                    &reference,
                    SignActionOptions {
                        no_send: options.no_send,
                    },
                )
                .await?;
            return Ok(CreateActionResult::Processed(result));
        }

        Ok(CreateActionResult::Signable(SignableTransaction {
            proof_bundle,
            reference,
        }))
    }

    /// Sign a pending action and, unless withheld, broadcast it
    pub async fn sign_action(
        &self,
        reference: &str,
        options: SignActionOptions,
    ) -> LedgerResult<SignActionResult> {
        let (action_id, tx, inputs, outputs) = {
            let state = self.state.read().await;
            let action = state
                .action_by_reference(reference)
                .ok_or_else(|| LedgerError::MissingReference(reference.to_string()))?;
            if action.status != ActionStatus::Pending {
                return Err(LedgerError::InvalidState {
                    reference: reference.to_string(),
                    status: action.status.to_string(),
                });
            }
            let tx = action
                .transaction
                .clone()
                .ok_or_else(|| LedgerError::MissingTransaction(action.id.clone()))?;
            (
                action.id.clone(),
                tx,
                action.inputs.clone(),
                action.outputs.clone(),
            )
        };

        let gathered = {
            let state = self.state.read().await;
            self.key_resolver.gather(&inputs, &state.baskets)?
        };
        let resolved = self.key_resolver.resolve_keys(gathered).await?;
        let templates: Vec<ScriptTemplate> = resolved
            .origins
            .iter()
            .map(|origin| self.templates.resolve(origin))
            .collect();

        let encoded = self
            .builder
            .sign(
                &tx,
                &resolved.keys,
                &resolved.locking_scripts,
                &resolved.satoshis,
                &templates,
            )
            .await?;
        let proof_bundle = self.proofs.generate(&tx).await?;

        let mut canonical: Option<BroadcastResponse> = None;
        if !options.no_send {
            let destinations = self.broadcast_destinations(&outputs);
            for destination in &destinations {
                match self.broadcaster.broadcast(destination, &encoded).await {
                    Ok(response) => {
                        debug!(
                            destination = %destination,
                            txid = %response.txid,
                            success = response.success,
                            "broadcast response"
                        );
                        if canonical.is_none() {
                            canonical = Some(response);
                        }
                    }
                    Err(e) => {
                        if canonical.is_none() {
                            self.settle_failed_broadcast(&action_id, reference).await;
                            return Err(LedgerError::Broadcast(e.to_string()));
                        }
                        warn!(destination = %destination, error = %e, "secondary broadcast failed");
                    }
                }
            }
            if let Some(response) = &canonical {
                if !response.success {
                    self.settle_failed_broadcast(&action_id, reference).await;
                    return Err(LedgerError::Broadcast(format!(
                        "destination rejected transaction {}",
                        response.txid
                    )));
                }
            }
        }

        let broadcast_txid = canonical.as_ref().map(|r| r.txid.clone());
        let resolved_txid = broadcast_txid.clone().unwrap_or_else(|| tx.txid.clone());
        let zero_conf = canonical
            .as_ref()
            .map(|r| r.zero_conf_accepted)
            .unwrap_or(false);
        let status = if options.no_send {
            ActionStatus::Signed
        } else {
            ActionStatus::Broadcast
        };

        {
            let mut state = self.state.write().await;
            {
                let WalletState { baskets, locks, .. } = &mut *state;
                baskets.assign_outputs_to_baskets(locks, &resolved_txid, &outputs, zero_conf);
            }
            if let Some(action) = state.action_by_id_mut(&action_id) {
                action.txid = Some(resolved_txid.clone());
                action.status = status;
                action.updated_at = Utc::now();
            }
            state.pending_references.remove(reference);
        }
        self.persist().await;

        if options.no_send {
            self.listener.on_signed(&action_id, &resolved_txid).await;
            info!(action = %action_id, txid = %resolved_txid, "action signed, broadcast withheld");
        } else {
            self.monitor.track(&resolved_txid).await;
            self.listener.on_broadcast(&action_id, &resolved_txid).await;
            info!(action = %action_id, txid = %resolved_txid, "action broadcast");
        }

        Ok(SignActionResult {
            txid: broadcast_txid,
            proof_bundle,
        })
    }

    /// Abort a pending action, releasing its input locks
    pub async fn abort_action(&self, reference: &str) -> LedgerResult<()> {
        let action_id = {
            let mut state = self.state.write().await;
            let (action_id, status, input_outpoints) = match state.action_by_reference(reference) {
                None => return Err(LedgerError::MissingReference(reference.to_string())),
                Some(action) => (
                    action.id.clone(),
                    action.status.clone(),
                    action
                        .inputs
                        .iter()
                        .map(|i| i.outpoint.clone())
                        .collect::<Vec<_>>(),
                ),
            };
            if status != ActionStatus::Pending {
                return Err(LedgerError::InvalidState {
                    reference: reference.to_string(),
                    status: status.to_string(),
                });
            }
            if let Some(action) = state.action_by_id_mut(&action_id) {
                action.status = ActionStatus::Aborted;
                action.updated_at = Utc::now();
            }
            state.locks.unlock_inputs(&input_outpoints);
            state.pending_references.remove(reference);
            action_id
        };
        self.persist().await;
        self.listener.on_aborted(&action_id).await;
        info!(action = %action_id, "aborted action");
        Ok(())
    }

    /// Internalize an externally received transaction
    ///
    /// Basket-insertion outputs are assigned into their baskets; wallet
    /// payments are not implemented and are skipped with a warning. A
    /// completed action is always recorded for bookkeeping.
    pub async fn internalize_action(
        &self,
        encoded_tx: &[u8],
        output_specs: &[InternalizeOutputSpec],
        description: &str,
        labels: &[String],
    ) -> LedgerResult<InternalizeResult> {
        let tx = self.proofs.parse(encoded_tx).await?;
        let txid = tx.txid.clone();

        {
            let mut state = self.state.write().await;
            for spec in output_specs {
                match &spec.protocol {
                    InternalizeProtocol::BasketInsertion {
                        basket,
                        tags,
                        custom,
                    } => {
                        let Some(output) = tx.outputs.get(spec.vout as usize) else {
                            return Err(LedgerError::Validation(format!(
                                "output {} not present in transaction {txid}",
                                spec.vout
                            )));
                        };
                        state.baskets.assign_to_basket(
                            basket,
                            UtxoRecord {
                                outpoint: crate::action::outpoint(&txid, spec.vout),
                                satoshis: output.satoshis,
                                locking_script: output.locking_script.clone(),
                                tags: tags.clone(),
                                custom: custom.clone(),
                            },
                        );
                    }
                    InternalizeProtocol::WalletPayment => {
                        warn!(txid = %txid, vout = spec.vout, "wallet payment internalization is not implemented, skipping output");
                    }
                }
            }

            let mut action = new_action(
                &ActionParams {
                    description: description.to_string(),
                    labels: labels.to_vec(),
                    ..Default::default()
                },
                None,
            );
            action.status = ActionStatus::Completed;
            action.txid = Some(txid.clone());
            action.transaction = Some(tx);
            state.actions.push(action);
        }
        self.persist().await;
        self.listener.on_internalized(&txid).await;
        info!(txid = %txid, outputs = output_specs.len(), "internalized transaction");

        Ok(InternalizeResult {
            accepted: true,
            txid,
        })
    }

    /// List actions matching a filter
    pub async fn list_actions(&self, filter: &ActionFilter) -> Vec<Action> {
        self.state
            .read()
            .await
            .actions
            .iter()
            .filter(|action| matches_action(action, filter))
            .cloned()
            .collect()
    }

    /// List outputs matching a filter
    ///
    /// Locked outpoints are excluded unless the filter asks for them.
    pub async fn list_outputs(&self, filter: &OutputFilter) -> Vec<UtxoRecord> {
        let state = self.state.read().await;
        state.baskets.list_outputs(filter, &state.locks)
    }

    /// Remove a UTXO from one basket, or from all when no basket is given
    pub async fn relinquish_output(
        &self,
        outpoint: &str,
        basket: Option<&str>,
    ) -> LedgerResult<bool> {
        let removed = {
            self.state
                .write()
                .await
                .baskets
                .relinquish_output(outpoint, basket)
        };
        if removed {
            self.persist().await;
        }
        Ok(removed)
    }

    /// Sum of unlocked satoshis in a basket
    pub async fn balance(&self, basket: &str) -> u64 {
        let state = self.state.read().await;
        state.baskets.total_satoshis(basket, &state.locks)
    }

    /// Fetch an action by id
    pub async fn action(&self, id: &str) -> Option<Action> {
        self.state.read().await.action_by_id(id).cloned()
    }

    /// Fetch an action by its reference token
    pub async fn action_by_reference(&self, reference: &str) -> Option<Action> {
        self.state.read().await.action_by_reference(reference).cloned()
    }

    /// Reference tokens currently awaiting a signing step
    pub async fn pending_references(&self) -> Vec<String> {
        let mut references: Vec<String> = self
            .state
            .read()
            .await
            .pending_references
            .keys()
            .cloned()
            .collect();
        references.sort();
        references
    }

    /// Locked outpoints, sorted
    pub async fn locked_outpoints(&self) -> Vec<String> {
        self.state.read().await.locks.to_outpoints()
    }

    /// Apply a confirmation update for a tracked transaction
    ///
    /// At one confirmation the output range unlocks, enabling spending
    /// before full settlement. At the threshold the action completes, its
    /// spent inputs leave every basket, and their locks release.
    pub async fn on_confirmation_update(&self, txid: &str, confirmations: u32, block_height: u64) {
        let mut completed_action: Option<String> = None;
        {
            let mut state = self.state.write().await;
            let Some(action) = state.action_by_txid(txid) else {
                debug!(txid, "confirmation update for unknown transaction");
                return;
            };
            let action_id = action.id.clone();
            let status = action.status.clone();
            let output_count = action.outputs.len();
            let input_outpoints: Vec<String> =
                action.inputs.iter().map(|i| i.outpoint.clone()).collect();
            let cached_height = action.block_height;

            if cached_height != Some(block_height) {
                if let Some(action) = state.action_by_id_mut(&action_id) {
                    action.block_height = Some(block_height);
                    action.updated_at = Utc::now();
                }
            }
            if confirmations >= 1 {
                state.locks.unlock_outputs(txid, output_count);
            }
            if confirmations >= self.config.confirmation_threshold
                && status == ActionStatus::Broadcast
            {
                if let Some(action) = state.action_by_id_mut(&action_id) {
                    action.status = ActionStatus::Completed;
                    action.updated_at = Utc::now();
                }
                state.baskets.cleanup_spent_utxos(&input_outpoints);
                state.locks.unlock_outpoints(&input_outpoints);
                completed_action = Some(action_id);
            }
        }
        self.persist().await;

        if let Some(action_id) = completed_action {
            self.listener.on_completed(&action_id, txid).await;
            info!(action = %action_id, txid, confirmations, "action completed");
        }
    }

    /// Push notification of a new block
    ///
    /// Re-checks every tracked transaction immediately; a latency layer on
    /// top of the periodic poll, not a replacement for it.
    pub async fn on_new_block(&self, height: u64) {
        debug!(height, "new block notification");
        self.monitor.check_all().await;
    }

    /// Whether a transaction's confirmations are being tracked
    pub async fn is_tracking(&self, txid: &str) -> bool {
        self.monitor.is_tracking(txid).await
    }

    fn broadcast_destinations(&self, outputs: &[ActionOutput]) -> Vec<String> {
        let mut destinations: Vec<String> = Vec::new();
        for output in outputs {
            let destination = output
                .basket
                .clone()
                .unwrap_or_else(|| self.config.default_destination.clone());
            if !destinations.contains(&destination) {
                destinations.push(destination);
            }
        }
        if destinations.is_empty() {
            destinations.push(self.config.default_destination.clone());
        }
        destinations
    }

    async fn settle_failed_broadcast(&self, action_id: &str, reference: &str) {
        {
            let mut state = self.state.write().await;
            if let Some(action) = state.action_by_id_mut(action_id) {
                action.status = ActionStatus::Signed;
                action.updated_at = Utc::now();
            }
            state.pending_references.remove(reference);
        }
        self.persist().await;
        warn!(action = %action_id, "broadcast failed, action stays signed with inputs locked");
    }

    async fn persist(&self) {
        let state = self.state.read().await;
        self.persistence.save_logged(&state).await;
    }
}

#[async_trait::async_trait]
impl ConfirmationSink for ActionLedger {
    async fn on_confirmation_update(&self, txid: &str, confirmations: u32, block_height: u64) {
        ActionLedger::on_confirmation_update(self, txid, confirmations, block_height).await;
    }
}

fn matches_action(action: &Action, filter: &ActionFilter) -> bool {
    if let Some(status) = &filter.status {
        if action.status != *status {
            return false;
        }
    }
    if filter.labels.is_empty() {
        return true;
    }
    match filter.label_mode {
        FilterMode::Any => filter.labels.iter().any(|l| action.labels.contains(l)),
        FilterMode::All => filter.labels.iter().all(|l| action.labels.contains(l)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MemoryBroadcaster, MemoryBuilder, MemoryChainTracker, MemoryKeyService,
        MemoryProofService, MemoryStore,
    };

    fn services() -> LedgerServices {
        LedgerServices {
            builder: Arc::new(MemoryBuilder),
            proofs: Arc::new(MemoryProofService),
            broadcaster: Arc::new(MemoryBroadcaster::new()),
            keys: Arc::new(MemoryKeyService),
            chain: Arc::new(MemoryChainTracker::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn ledger() -> ActionLedger {
        ActionLedger::new(
            LedgerConfig::default(),
            SigningKey::new("master"),
            services(),
        )
    }

    #[test]
    fn test_broadcast_destinations_deduplicate() {
        let ledger = ledger();
        let output = |basket: Option<&str>| ActionOutput {
            locking_script: "script".into(),
            satoshis: 100,
            description: "some output".into(),
            basket: basket.map(|b| b.to_string()),
            tags: vec![],
            custom: None,
        };

        let destinations = ledger.broadcast_destinations(&[
            output(Some("default")),
            output(Some("overlay")),
            output(Some("default")),
            output(None),
        ]);
        assert_eq!(destinations, vec!["default", "overlay", "mainnet"]);

        assert_eq!(ledger.broadcast_destinations(&[]), vec!["mainnet"]);
    }

    #[tokio::test]
    async fn test_sign_action_unknown_reference() {
        let ledger = ledger().start().await.unwrap();
        let result = ledger
            .sign_action("no-such-reference", SignActionOptions::default())
            .await;
        assert!(matches!(result, Err(LedgerError::MissingReference(_))));
    }

    #[tokio::test]
    async fn test_create_action_requires_explicit_inputs() {
        let ledger = ledger().start().await.unwrap();
        let params = ActionParams {
            description: "outputs only action".into(),
            outputs: vec![ActionOutput {
                locking_script: "script".into(),
                satoshis: 100,
                description: "payment output".into(),
                basket: None,
                tags: vec![],
                custom: None,
            }],
            ..Default::default()
        };
        let result = ledger
            .create_action(params, CreateActionOptions::default())
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        ledger.shutdown().await;
    }
}
