//! Wallet Action Ledger
//!
//! Turns a caller's transaction intent into a signed, broadcast, and
//! eventually settled on-chain transaction:
//! - Action lifecycle management (create, sign, abort, internalize)
//! - Double-spend protection via outpoint locking
//! - Basket-based UTXO tracking with tag filtering
//! - Per-input signing key resolution (master and per-payment derived keys)
//! - Confirmation tracking via polling with a push-notification fast path
//! - Durable state snapshots surviving process restarts
//!
//! Transaction construction, signing math, broadcast transport, proof-bundle
//! encoding, key derivation, and the persistence engine are external
//! collaborators consumed through the contracts in [`collaborators`].

pub mod action;
pub mod basket;
pub mod collaborators;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod locks;
pub mod monitor;
pub mod persistence;
pub mod state;

pub use action::{
    generate_id, generate_reference, new_action, outpoint, parse_outpoint,
    validate_action_params, Action, ActionInput, ActionOutput, ActionParams, ActionStatus,
    CreateActionOptions, SerializedAction, SignActionOptions, MAX_DESCRIPTION_LEN,
    MIN_DESCRIPTION_LEN,
};
pub use basket::{Basket, BasketRegistry, FilterMode, OutputFilter, UtxoRecord};
pub use collaborators::{
    BroadcastResponse, BroadcastService, BuiltTransaction, ChainTracker, DurableStore,
    KeyService, MemoryBroadcaster, MemoryBuilder, MemoryChainTracker, MemoryKeyService,
    MemoryProofService, MemoryStore, MerkleProof, ProofBundleService, ScriptTemplate,
    SigningKey, TransactionBuilder, WireInput, WireOutput,
};
pub use error::{LedgerError, LedgerResult};
pub use keys::{GatheredInputs, ResolvedInputs, SigningKeyResolver, TemplateRegistry, UtxoOrigin};
pub use ledger::{
    ActionFilter, ActionLedger, CreateActionResult, InternalizeOutputSpec, InternalizeProtocol,
    InternalizeResult, LedgerConfig, LedgerListener, LedgerServices, NoOpListener,
    SignActionResult, SignableTransaction,
};
pub use locks::UtxoLockTable;
pub use monitor::{ConfirmationMonitor, ConfirmationSink, MonitorConfig};
pub use persistence::{StatePersistence, WalletSnapshot};
pub use state::WalletState;
