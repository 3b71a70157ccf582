//! External collaborator contracts
//!
//! The ledger consumes transaction construction, proof bundling, broadcast,
//! key derivation, chain tracking, and durable storage through the narrow
//! interfaces defined here. In-memory implementations suitable for tests
//! live at the bottom of the module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};

/// Input of a wire transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireInput {
    /// Outpoint being spent, `txid.index`
    pub outpoint: String,
    /// Unlocking script, present once signed
    pub unlocking_script: Option<String>,
    /// Sequence number
    pub sequence: u32,
    /// Locking script of the spent output
    pub source_locking_script: Option<String>,
    /// Value of the spent output in satoshis
    pub source_satoshis: Option<u64>,
    /// Source transaction, attached when this wallet built the ancestor
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_transaction: Option<Box<BuiltTransaction>>,
}

/// Output of a wire transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireOutput {
    /// Locking script
    pub locking_script: String,
    /// Value in satoshis
    pub satoshis: u64,
}

/// A transaction produced by the builder collaborator
///
/// Held on a pending action so signing can continue later, and walked via
/// `source_transaction` links when generating proof bundles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuiltTransaction {
    /// Transaction id assigned by the builder
    pub txid: String,
    /// Transaction version
    pub version: u32,
    /// Lock time
    pub lock_time: u32,
    /// Inputs
    pub inputs: Vec<WireInput>,
    /// Outputs
    pub outputs: Vec<WireOutput>,
}

impl BuiltTransaction {
    /// Encode to the hex form used in persisted snapshots
    pub fn encode_hex(&self) -> LedgerResult<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    /// Decode from the persisted hex form
    pub fn decode_hex(encoded: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| LedgerError::Persistence(format!("bad transaction hex: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Opaque signing key handle in the external signer's encoding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKey {
    /// Key material
    pub material: String,
}

impl SigningKey {
    /// Wrap key material
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
        }
    }
}

/// Unlocking-script template selected per input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptTemplate {
    /// Standard pay-to-key-hash
    PayToKeyHash,
    /// Pay-to-key-hash over a per-payment derived key
    PayToDerivedKeyHash,
}

/// Response from a broadcast destination
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastResponse {
    /// Canonical transaction id assigned by the destination
    pub txid: String,
    /// Whether the destination accepted the transaction
    pub success: bool,
    /// Destination accepts the outputs as spendable before confirmation
    pub zero_conf_accepted: bool,
}

/// Merkle inclusion proof for a mined transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Height of the including block
    pub block_height: u64,
}

/// Transaction construction and signing
#[async_trait::async_trait]
pub trait TransactionBuilder: Send + Sync {
    /// Build an unsigned transaction from resolved inputs and outputs
    async fn build(
        &self,
        inputs: &[WireInput],
        outputs: &[WireOutput],
        lock_time: Option<u32>,
        version: Option<u32>,
    ) -> LedgerResult<BuiltTransaction>;

    /// Sign a built transaction; the key, script, satoshi, and template
    /// sequences are parallel, one entry per input
    async fn sign(
        &self,
        tx: &BuiltTransaction,
        keys: &[SigningKey],
        locking_scripts: &[String],
        satoshis: &[u64],
        templates: &[ScriptTemplate],
    ) -> LedgerResult<Vec<u8>>;
}

/// Proof bundle generation and parsing
#[async_trait::async_trait]
pub trait ProofBundleService: Send + Sync {
    /// Generate a self-contained proof bundle for a transaction
    async fn generate(&self, tx: &BuiltTransaction) -> LedgerResult<Vec<u8>>;

    /// Parse an encoded bundle back into a transaction
    async fn parse(&self, bundle: &[u8]) -> LedgerResult<BuiltTransaction>;
}

/// Transaction broadcast
#[async_trait::async_trait]
pub trait BroadcastService: Send + Sync {
    /// Submit an encoded transaction to one destination
    async fn broadcast(&self, destination: &str, encoded_tx: &[u8])
        -> LedgerResult<BroadcastResponse>;
}

/// Per-payment key derivation
#[async_trait::async_trait]
pub trait KeyService: Send + Sync {
    /// Derive the signing key for one payment
    async fn derive_key(
        &self,
        master: &SigningKey,
        counterparty_key: &str,
        invoice_id: &str,
    ) -> LedgerResult<SigningKey>;
}

/// Chain state queries
#[async_trait::async_trait]
pub trait ChainTracker: Send + Sync {
    /// Current chain tip height
    async fn current_height(&self) -> LedgerResult<u64>;

    /// Inclusion proof for a transaction, `None` while unmined
    async fn merkle_proof(&self, txid: &str) -> LedgerResult<Option<MerkleProof>>;
}

/// Durable blob store, one key per wallet instance, last-write-wins
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a blob
    async fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Write a blob
    async fn set(&self, key: &str, blob: Vec<u8>) -> LedgerResult<()>;

    /// Delete a blob
    async fn delete(&self, key: &str) -> LedgerResult<()>;
}

fn pseudo_txid(seed: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    format!("{:016x}", hasher.finish()).repeat(4)
}

/// Simple in-memory builder for testing
#[derive(Default)]
pub struct MemoryBuilder;

#[async_trait::async_trait]
impl TransactionBuilder for MemoryBuilder {
    async fn build(
        &self,
        inputs: &[WireInput],
        outputs: &[WireOutput],
        lock_time: Option<u32>,
        version: Option<u32>,
    ) -> LedgerResult<BuiltTransaction> {
        let mut tx = BuiltTransaction {
            txid: String::new(),
            version: version.unwrap_or(1),
            lock_time: lock_time.unwrap_or(0),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        };
        tx.txid = pseudo_txid(&serde_json::to_vec(&tx)?);
        Ok(tx)
    }

    async fn sign(
        &self,
        tx: &BuiltTransaction,
        keys: &[SigningKey],
        locking_scripts: &[String],
        satoshis: &[u64],
        templates: &[ScriptTemplate],
    ) -> LedgerResult<Vec<u8>> {
        let n = tx.inputs.len();
        if keys.len() != n || locking_scripts.len() != n || satoshis.len() != n || templates.len() != n
        {
            return Err(LedgerError::Signing(format!(
                "expected {n} entries per signing sequence, got {}/{}/{}/{}",
                keys.len(),
                locking_scripts.len(),
                satoshis.len(),
                templates.len()
            )));
        }
        let mut signed = tx.clone();
        for (input, key) in signed.inputs.iter_mut().zip(keys) {
            input.unlocking_script = Some(format!("sig({})", key.material));
        }
        Ok(serde_json::to_vec(&signed)?)
    }
}

/// Simple in-memory proof-bundle service for testing
#[derive(Default)]
pub struct MemoryProofService;

#[async_trait::async_trait]
impl ProofBundleService for MemoryProofService {
    async fn generate(&self, tx: &BuiltTransaction) -> LedgerResult<Vec<u8>> {
        Ok(serde_json::to_vec(tx)?)
    }

    async fn parse(&self, bundle: &[u8]) -> LedgerResult<BuiltTransaction> {
        Ok(serde_json::from_slice(bundle)?)
    }
}

/// Simple in-memory broadcaster for testing
#[derive(Default)]
pub struct MemoryBroadcaster {
    response: RwLock<Option<BroadcastResponse>>,
    failure: RwLock<Option<String>>,
    sent: RwLock<Vec<(String, Vec<u8>)>>,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the response returned to every broadcast
    pub async fn set_response(&self, response: BroadcastResponse) {
        *self.response.write().await = Some(response);
    }

    /// Make every broadcast fail with the given message
    pub async fn set_failure(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }

    /// Destinations and payloads broadcast so far
    pub async fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.read().await.clone()
    }
}

#[async_trait::async_trait]
impl BroadcastService for MemoryBroadcaster {
    async fn broadcast(
        &self,
        destination: &str,
        encoded_tx: &[u8],
    ) -> LedgerResult<BroadcastResponse> {
        if let Some(message) = self.failure.read().await.clone() {
            return Err(LedgerError::Broadcast(message));
        }
        self.sent
            .write()
            .await
            .push((destination.to_string(), encoded_tx.to_vec()));
        if let Some(response) = self.response.read().await.clone() {
            return Ok(response);
        }
        Ok(BroadcastResponse {
            txid: pseudo_txid(encoded_tx),
            success: true,
            zero_conf_accepted: false,
        })
    }
}

/// Simple in-memory key service for testing
#[derive(Default)]
pub struct MemoryKeyService;

#[async_trait::async_trait]
impl KeyService for MemoryKeyService {
    async fn derive_key(
        &self,
        master: &SigningKey,
        counterparty_key: &str,
        invoice_id: &str,
    ) -> LedgerResult<SigningKey> {
        Ok(SigningKey::new(format!(
            "{}/{}/{}",
            master.material, counterparty_key, invoice_id
        )))
    }
}

/// Simple in-memory chain tracker for testing
#[derive(Default)]
pub struct MemoryChainTracker {
    height: RwLock<u64>,
    proofs: RwLock<HashMap<String, u64>>,
    failing: RwLock<bool>,
}

impl MemoryChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the chain tip
    pub async fn set_height(&self, height: u64) {
        *self.height.write().await = height;
    }

    /// Record a transaction as mined at the given height
    pub async fn confirm(&self, txid: &str, block_height: u64) {
        self.proofs
            .write()
            .await
            .insert(txid.to_string(), block_height);
    }

    /// Make every query fail
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait::async_trait]
impl ChainTracker for MemoryChainTracker {
    async fn current_height(&self) -> LedgerResult<u64> {
        if *self.failing.read().await {
            return Err(LedgerError::Collaborator("chain tracker offline".into()));
        }
        Ok(*self.height.read().await)
    }

    async fn merkle_proof(&self, txid: &str) -> LedgerResult<Option<MerkleProof>> {
        if *self.failing.read().await {
            return Err(LedgerError::Collaborator("chain tracker offline".into()));
        }
        Ok(self
            .proofs
            .read()
            .await
            .get(txid)
            .map(|&block_height| MerkleProof { block_height }))
    }
}

/// Simple in-memory durable store for testing
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    failing: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail, simulating quota exhaustion
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    /// Raw blob accessor
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: Vec<u8>) -> LedgerResult<()> {
        if *self.failing.read().await {
            return Err(LedgerError::Persistence("store quota exceeded".into()));
        }
        self.blobs.write().await.insert(key.to_string(), blob);
        Ok(())
    }

    async fn delete(&self, key: &str) -> LedgerResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
