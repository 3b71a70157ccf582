//! Property-based tests for the validator and the lock table
//!
//! Uses proptest to generate random inputs and verify the invariants hold.

use proptest::prelude::*;

use wallet_ledger::{
    outpoint, validate_action_params, ActionInput, ActionOutput, ActionParams, UtxoLockTable,
    MAX_DESCRIPTION_LEN, MIN_DESCRIPTION_LEN,
};

// =============================================================================
// PROPTEST STRATEGIES
// =============================================================================

/// Strategy for 64-character lowercase hex transaction ids
fn txid() -> impl Strategy<Value = String> {
    any::<[u8; 32]>().prop_map(hex::encode)
}

/// Strategy for outpoint strings
fn outpoint_string() -> impl Strategy<Value = String> {
    (txid(), 0u32..16).prop_map(|(txid, index)| outpoint(&txid, index))
}

/// Strategy for descriptions of a given character length
fn description(len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::char::range('a', 'z'), len)
        .prop_map(|chars| chars.into_iter().collect())
}

fn params_with(description: String, satoshis: u64) -> ActionParams {
    ActionParams {
        description,
        outputs: vec![ActionOutput {
            locking_script: "76a914aa88ac".into(),
            satoshis,
            description: "payment output".into(),
            basket: None,
            tags: vec![],
            custom: None,
        }],
        ..Default::default()
    }
}

// =============================================================================
// VALIDATOR PROPERTIES
// =============================================================================

proptest! {
    /// Property: any description within the bounds validates
    #[test]
    fn validator_accepts_in_bounds_descriptions(
        len in MIN_DESCRIPTION_LEN..=MAX_DESCRIPTION_LEN,
        satoshis in 1u64..1_000_000_000,
    ) {
        let description = "d".repeat(len);
        prop_assert!(validate_action_params(&params_with(description, satoshis)).is_ok());
    }

    /// Property: descriptions outside the bounds are rejected
    #[test]
    fn validator_rejects_out_of_bounds_descriptions(len in prop_oneof![
        0usize..MIN_DESCRIPTION_LEN,
        (MAX_DESCRIPTION_LEN + 1)..200,
    ]) {
        let description = "d".repeat(len);
        prop_assert!(validate_action_params(&params_with(description, 1000)).is_err());
    }

    /// Property: zero-valued outputs never validate
    #[test]
    fn validator_rejects_zero_outputs(desc in description(20)) {
        prop_assert!(validate_action_params(&params_with(desc, 0)).is_err());
    }

    /// Property: input descriptions are bounded like the top-level one
    #[test]
    fn validator_bounds_input_descriptions(
        op in outpoint_string(),
        len in prop_oneof![0usize..MIN_DESCRIPTION_LEN, (MAX_DESCRIPTION_LEN + 1)..200],
    ) {
        let params = ActionParams {
            description: "pay the merchant".into(),
            inputs: vec![ActionInput {
                outpoint: op,
                description: "d".repeat(len),
                unlocking_script: None,
                sequence: None,
            }],
            ..Default::default()
        };
        prop_assert!(validate_action_params(&params).is_err());
    }
}

// =============================================================================
// LOCK TABLE PROPERTIES
// =============================================================================

proptest! {
    /// Property: locking then unlocking an output range leaves no residue
    #[test]
    fn lock_range_is_symmetric(txid in txid(), count in 0usize..50) {
        let mut table = UtxoLockTable::new();
        table.lock_outputs(&txid, count);
        prop_assert_eq!(table.len(), count);
        for index in 0..count {
            prop_assert!(table.is_locked(&outpoint(&txid, index as u32)));
        }
        table.unlock_outputs(&txid, count);
        prop_assert!(table.is_empty());
    }

    /// Property: a failed conflict check never mutates the table
    #[test]
    fn conflict_check_is_read_only(
        locked in prop::collection::vec(outpoint_string(), 1..10),
        probe in prop::collection::vec(outpoint_string(), 1..10),
    ) {
        let mut table = UtxoLockTable::new();
        table.lock_inputs(&locked);
        let before = table.to_outpoints();

        let mut request = probe;
        request.push(locked[0].clone()); // guarantee a collision
        prop_assert!(table.check_inputs_not_locked(&request).is_err());
        prop_assert_eq!(table.to_outpoints(), before);
    }

    /// Property: snapshot round-trip preserves the locked set
    #[test]
    fn snapshot_round_trip(outpoints in prop::collection::vec(outpoint_string(), 0..20)) {
        let mut table = UtxoLockTable::new();
        table.lock_inputs(&outpoints);
        let restored = UtxoLockTable::from_outpoints(table.to_outpoints());
        prop_assert_eq!(restored.to_outpoints(), table.to_outpoints());
    }
}
