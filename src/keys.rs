//! Per-input signing key resolution
//!
//! Each input's per-UTXO metadata is decoded once at the boundary into a
//! tagged variant: standard inputs sign with the account master key, derived
//! inputs resolve a per-payment key through the key-derivation collaborator.
//! Gathering UTXO data is synchronous so callers can run it under a state
//! guard; key derivation happens afterwards, outside any guard.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::action::ActionInput;
use crate::basket::BasketRegistry;
use crate::collaborators::{KeyService, ScriptTemplate, SigningKey};
use crate::error::{LedgerError, LedgerResult};

/// Decoded per-UTXO metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UtxoOrigin {
    /// Spendable with the account master key
    Standard,
    /// Spendable with a per-payment derived key
    Derived {
        /// Invoice id the key was derived for
        invoice_id: String,
        /// Counterparty public key
        counterparty_key: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivedMeta {
    invoice_id: String,
    counterparty_key: String,
}

impl UtxoOrigin {
    /// Decode a UTXO's opaque metadata
    ///
    /// Presence of derivation fields makes the UTXO derived; anything else
    /// is standard. Partial derivation fields are a validation error.
    pub fn decode(custom: Option<&serde_json::Value>) -> LedgerResult<Self> {
        let Some(value) = custom else {
            return Ok(UtxoOrigin::Standard);
        };
        let has_derivation = value
            .as_object()
            .map(|o| o.contains_key("invoiceId") || o.contains_key("counterpartyKey"))
            .unwrap_or(false);
        if !has_derivation {
            return Ok(UtxoOrigin::Standard);
        }
        let meta: DerivedMeta = serde_json::from_value(value.clone()).map_err(|e| {
            LedgerError::Validation(format!("incomplete derivation metadata: {e}"))
        })?;
        Ok(UtxoOrigin::Derived {
            invoice_id: meta.invoice_id,
            counterparty_key: meta.counterparty_key,
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            UtxoOrigin::Standard => "standard",
            UtxoOrigin::Derived { .. } => "derived",
        }
    }
}

/// Registry of unlocking-script templates keyed by UTXO metadata kind
#[derive(Clone, Debug)]
pub struct TemplateRegistry {
    templates: HashMap<String, ScriptTemplate>,
}

impl TemplateRegistry {
    /// Registry with the standard pay-to-key-hash mappings
    pub fn standard() -> Self {
        let mut templates = HashMap::new();
        templates.insert("standard".to_string(), ScriptTemplate::PayToKeyHash);
        templates.insert("derived".to_string(), ScriptTemplate::PayToDerivedKeyHash);
        Self { templates }
    }

    /// Override the template for a metadata kind
    pub fn register(&mut self, kind: &str, template: ScriptTemplate) {
        self.templates.insert(kind.to_string(), template);
    }

    /// Template for an input's decoded origin, pay-to-key-hash by default
    pub fn resolve(&self, origin: &UtxoOrigin) -> ScriptTemplate {
        self.templates
            .get(origin.kind())
            .copied()
            .unwrap_or(ScriptTemplate::PayToKeyHash)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// UTXO data gathered per input, before key derivation
#[derive(Clone, Debug)]
pub struct GatheredInputs {
    /// Locking scripts, one per input
    pub locking_scripts: Vec<String>,
    /// Satoshi values, one per input
    pub satoshis: Vec<u64>,
    /// Decoded origins, one per input
    pub origins: Vec<UtxoOrigin>,
}

/// Fully resolved signing data, parallel sequences one entry per input
#[derive(Clone, Debug)]
pub struct ResolvedInputs {
    /// Locking scripts
    pub locking_scripts: Vec<String>,
    /// Satoshi values
    pub satoshis: Vec<u64>,
    /// Resolved signing keys
    pub keys: Vec<SigningKey>,
    /// Decoded origins, kept for template selection
    pub origins: Vec<UtxoOrigin>,
}

/// Picks the correct signing key per input
pub struct SigningKeyResolver {
    master_key: SigningKey,
    key_service: Arc<dyn KeyService>,
}

impl SigningKeyResolver {
    /// Create a resolver over the account master key
    pub fn new(master_key: SigningKey, key_service: Arc<dyn KeyService>) -> Self {
        Self {
            master_key,
            key_service,
        }
    }

    /// Gather each input's UTXO record and decode its metadata
    ///
    /// Fails with the offending index when a referenced outpoint cannot be
    /// found in any basket.
    pub fn gather(
        &self,
        inputs: &[ActionInput],
        baskets: &BasketRegistry,
    ) -> LedgerResult<GatheredInputs> {
        let mut locking_scripts = Vec::with_capacity(inputs.len());
        let mut satoshis = Vec::with_capacity(inputs.len());
        let mut origins = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let (_, record) =
                baskets
                    .find_utxo(&input.outpoint)
                    .ok_or_else(|| LedgerError::MissingUtxo {
                        outpoint: input.outpoint.clone(),
                        index,
                    })?;
            locking_scripts.push(record.locking_script.clone());
            satoshis.push(record.satoshis);
            origins.push(UtxoOrigin::decode(record.custom.as_ref())?);
        }

        Ok(GatheredInputs {
            locking_scripts,
            satoshis,
            origins,
        })
    }

    /// Resolve the signing key for each gathered input
    pub async fn resolve_keys(&self, gathered: GatheredInputs) -> LedgerResult<ResolvedInputs> {
        let mut keys = Vec::with_capacity(gathered.origins.len());
        for origin in &gathered.origins {
            let key = match origin {
                UtxoOrigin::Standard => self.master_key.clone(),
                UtxoOrigin::Derived {
                    invoice_id,
                    counterparty_key,
                } => {
                    self.key_service
                        .derive_key(&self.master_key, counterparty_key, invoice_id)
                        .await?
                }
            };
            keys.push(key);
        }

        Ok(ResolvedInputs {
            locking_scripts: gathered.locking_scripts,
            satoshis: gathered.satoshis,
            keys,
            origins: gathered.origins,
        })
    }
}
