//! Action model, validation, and canonical stamping
//!
//! An action is a tracked transaction intent progressing from creation to
//! settlement. This module owns the record types, the caller-input
//! validator, and the factory that stamps canonical records with generated
//! ids and reference tokens.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::collaborators::BuiltTransaction;
use crate::error::{LedgerError, LedgerResult};

/// Minimum description length accepted by the validator
pub const MIN_DESCRIPTION_LEN: usize = 5;
/// Maximum description length accepted by the validator
pub const MAX_DESCRIPTION_LEN: usize = 50;

/// Action status in the lifecycle
///
/// Transitions run pending → {signed | broadcast} → completed, or
/// pending → aborted. Completed and aborted are terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Created, not yet signed
    Pending,
    /// Signed but withheld from broadcast
    Signed,
    /// Handed to at least one broadcast destination
    Broadcast,
    /// Settled at the confirmation threshold
    Completed,
    /// Abandoned before signing
    Aborted,
}

impl ActionStatus {
    /// Check whether the status admits no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Completed | ActionStatus::Aborted)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Signed => "signed",
            ActionStatus::Broadcast => "broadcast",
            ActionStatus::Completed => "completed",
            ActionStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One input of an action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    /// Outpoint being spent, `txid.index`
    pub outpoint: String,
    /// What this input is for
    pub description: String,
    /// Caller-supplied unlocking script, if pre-signed
    pub unlocking_script: Option<String>,
    /// Sequence number override
    pub sequence: Option<u32>,
}

/// One output of an action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Locking script
    pub locking_script: String,
    /// Value in satoshis
    pub satoshis: u64,
    /// What this output is for
    pub description: String,
    /// Destination basket, if the output stays under wallet control
    pub basket: Option<String>,
    /// Tags applied to the resulting UTXO
    pub tags: Vec<String>,
    /// Opaque per-UTXO metadata
    pub custom: Option<serde_json::Value>,
}

/// A tracked transaction intent
#[derive(Clone, Debug)]
pub struct Action {
    /// Generated id
    pub id: String,
    /// Transaction id, set once resolved
    pub txid: Option<String>,
    /// Current status
    pub status: ActionStatus,
    /// Caller description
    pub description: String,
    /// Caller labels
    pub labels: Vec<String>,
    /// Inputs
    pub inputs: Vec<ActionInput>,
    /// Outputs
    pub outputs: Vec<ActionOutput>,
    /// Held transaction, kept so signing can continue later
    pub transaction: Option<BuiltTransaction>,
    /// Reference token correlating creation with the signing call
    pub reference: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last status update
    pub updated_at: DateTime<Utc>,
    /// Height of the including block, cached from confirmation updates
    pub block_height: Option<u64>,
}

/// Persisted form of an action
///
/// The held transaction is replaced with its encoded hex form and the
/// timestamps with RFC 3339 strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializedAction {
    pub id: String,
    pub txid: Option<String>,
    pub status: ActionStatus,
    pub description: String,
    pub labels: Vec<String>,
    pub inputs: Vec<ActionInput>,
    pub outputs: Vec<ActionOutput>,
    pub transaction: Option<String>,
    pub reference: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub block_height: Option<u64>,
}

impl Action {
    /// Convert to the persisted form
    pub fn to_serialized(&self) -> LedgerResult<SerializedAction> {
        let transaction = match &self.transaction {
            Some(tx) => Some(tx.encode_hex()?),
            None => None,
        };
        Ok(SerializedAction {
            id: self.id.clone(),
            txid: self.txid.clone(),
            status: self.status.clone(),
            description: self.description.clone(),
            labels: self.labels.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            transaction,
            reference: self.reference.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
            block_height: self.block_height,
        })
    }

    /// Restore from the persisted form
    pub fn from_serialized(serialized: &SerializedAction) -> LedgerResult<Self> {
        let transaction = match &serialized.transaction {
            Some(encoded) => Some(BuiltTransaction::decode_hex(encoded)?),
            None => None,
        };
        Ok(Self {
            id: serialized.id.clone(),
            txid: serialized.txid.clone(),
            status: serialized.status.clone(),
            description: serialized.description.clone(),
            labels: serialized.labels.clone(),
            inputs: serialized.inputs.clone(),
            outputs: serialized.outputs.clone(),
            transaction,
            reference: serialized.reference.clone(),
            created_at: parse_timestamp(&serialized.created_at)?,
            updated_at: parse_timestamp(&serialized.updated_at)?,
            block_height: serialized.block_height,
        })
    }
}

fn parse_timestamp(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::Persistence(format!("bad timestamp {raw}: {e}")))
}

/// Caller input to action creation
#[derive(Clone, Debug, Default)]
pub struct ActionParams {
    /// What the action is for
    pub description: String,
    /// Labels for later listing
    pub labels: Vec<String>,
    /// Explicit inputs to spend
    pub inputs: Vec<ActionInput>,
    /// Outputs to create
    pub outputs: Vec<ActionOutput>,
    /// Lock time override
    pub lock_time: Option<u32>,
    /// Version override
    pub version: Option<u32>,
}

/// Options for action creation
#[derive(Clone, Debug)]
pub struct CreateActionOptions {
    /// Continue straight into signing and processing
    pub sign_and_process: bool,
    /// Withhold the signed transaction from broadcast
    pub no_send: bool,
}

impl Default for CreateActionOptions {
    fn default() -> Self {
        Self {
            sign_and_process: true,
            no_send: false,
        }
    }
}

/// Options for the signing step
#[derive(Clone, Debug, Default)]
pub struct SignActionOptions {
    /// Withhold the signed transaction from broadcast
    pub no_send: bool,
}

/// Validate caller input for action creation
///
/// At least one input or output is required, every description is bounded
/// 5–50 characters, and every output value must be strictly positive.
pub fn validate_action_params(params: &ActionParams) -> LedgerResult<()> {
    if params.inputs.is_empty() && params.outputs.is_empty() {
        return Err(LedgerError::Validation(
            "at least one input or output is required".into(),
        ));
    }
    check_description(&params.description, "description")?;
    for (i, input) in params.inputs.iter().enumerate() {
        check_description(&input.description, &format!("input {i} description"))?;
        parse_outpoint(&input.outpoint)?;
    }
    for (i, output) in params.outputs.iter().enumerate() {
        check_description(&output.description, &format!("output {i} description"))?;
        if output.satoshis == 0 {
            return Err(LedgerError::Validation(format!(
                "output {i} value must be a positive integer"
            )));
        }
    }
    Ok(())
}

fn check_description(description: &str, field: &str) -> LedgerResult<()> {
    let len = description.chars().count();
    if !(MIN_DESCRIPTION_LEN..=MAX_DESCRIPTION_LEN).contains(&len) {
        return Err(LedgerError::Validation(format!(
            "{field} must be {MIN_DESCRIPTION_LEN}-{MAX_DESCRIPTION_LEN} characters, got {len}"
        )));
    }
    Ok(())
}

/// Stamp a canonical action from validated params
pub fn new_action(params: &ActionParams, reference: Option<String>) -> Action {
    let now = Utc::now();
    Action {
        id: generate_id(),
        txid: None,
        status: ActionStatus::Pending,
        description: params.description.clone(),
        labels: params.labels.clone(),
        inputs: params.inputs.clone(),
        outputs: params.outputs.clone(),
        transaction: None,
        reference,
        created_at: now,
        updated_at: now,
        block_height: None,
    }
}

/// Generate an action id
pub fn generate_id() -> String {
    format!("act-{}-{}", Utc::now().timestamp_millis(), random_suffix(8))
}

/// Generate a reference token
///
/// Timestamp plus random alphanumeric suffix; not cryptographically unique.
pub fn generate_reference() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), random_suffix(10))
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Render an outpoint from its parts
pub fn outpoint(txid: &str, index: u32) -> String {
    format!("{txid}.{index}")
}

/// Split an outpoint into txid and output index
pub fn parse_outpoint(outpoint: &str) -> LedgerResult<(&str, u32)> {
    let (txid, index) = outpoint.rsplit_once('.').ok_or_else(|| {
        LedgerError::Validation(format!("malformed outpoint: {outpoint}"))
    })?;
    let index = index
        .parse::<u32>()
        .map_err(|_| LedgerError::Validation(format!("malformed outpoint: {outpoint}")))?;
    Ok((txid, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> ActionParams {
        ActionParams {
            description: "pay the invoice".into(),
            labels: vec!["billing".into()],
            inputs: vec![ActionInput {
                outpoint: format!("{}.0", "a".repeat(64)),
                description: "funding input".into(),
                unlocking_script: None,
                sequence: None,
            }],
            outputs: vec![ActionOutput {
                locking_script: "76a914aa88ac".into(),
                satoshis: 50_000,
                description: "payment output".into(),
                basket: Some("default".into()),
                tags: vec![],
                custom: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(validate_action_params(&sample_params()).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_params() {
        let params = ActionParams {
            description: "pay the invoice".into(),
            ..Default::default()
        };
        assert!(matches!(
            validate_action_params(&params),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_description_bounds() {
        let mut params = sample_params();
        params.description = "pay".into();
        assert!(validate_action_params(&params).is_err());

        params.description = "x".repeat(51);
        assert!(validate_action_params(&params).is_err());

        params.description = "x".repeat(50);
        assert!(validate_action_params(&params).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_value_output() {
        let mut params = sample_params();
        params.outputs[0].satoshis = 0;
        assert!(matches!(
            validate_action_params(&params),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_factory_stamps_pending_action() {
        let reference = generate_reference();
        let action = new_action(&sample_params(), Some(reference.clone()));

        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.reference.as_deref(), Some(reference.as_str()));
        assert!(action.txid.is_none());
        assert!(action.id.starts_with("act-"));
    }

    #[test]
    fn test_references_are_distinct() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);
    }

    #[test]
    fn test_outpoint_round_trip() {
        let rendered = outpoint(&"b".repeat(64), 3);
        let (txid, index) = parse_outpoint(&rendered).unwrap();
        assert_eq!(txid, "b".repeat(64));
        assert_eq!(index, 3);

        assert!(parse_outpoint("missing-separator").is_err());
        assert!(parse_outpoint("abc.notanumber").is_err());
    }

    #[test]
    fn test_serialized_action_round_trip() {
        let mut action = new_action(&sample_params(), Some("ref-1".into()));
        action.transaction = Some(BuiltTransaction {
            txid: "c".repeat(64),
            version: 1,
            lock_time: 0,
            inputs: vec![],
            outputs: vec![],
        });

        let serialized = action.to_serialized().unwrap();
        assert!(serialized.transaction.is_some());

        let restored = Action::from_serialized(&serialized).unwrap();
        assert_eq!(restored.id, action.id);
        assert_eq!(restored.status, action.status);
        assert_eq!(restored.transaction, action.transaction);
        assert_eq!(restored.created_at, action.created_at);
    }

    #[test]
    fn test_status_terminality() {
        assert!(ActionStatus::Completed.is_terminal());
        assert!(ActionStatus::Aborted.is_terminal());
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Broadcast.is_terminal());
    }
}
