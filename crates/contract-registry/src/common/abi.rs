//! Structural ABI parsing: splits a contract ABI into per-method and
//! per-event fragments keyed the way the resolution indices need them.
//!
//! Fragments are re-serialized from the parsed ABI rather than sliced out of
//! the submitted JSON, so two registrations of the same method always
//! produce byte-identical fragments and default-bucket dedup can compare
//! bytes directly.

use alloy::primitives::{B256, Bytes, Selector};
use alloy_json_abi::{Event, JsonAbi};

/// A single callable method extracted from a contract ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFragment {
    /// Canonical signature, e.g. `transfer(address,uint256)`.
    pub signature: String,
    /// First 4 bytes of `keccak256(signature)`.
    pub selector: Selector,
    /// Canonical JSON of the method's ABI entry.
    pub abi: Bytes,
}

/// A single emittable event extracted from a contract ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFragment {
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    /// `keccak256(signature)`, the event's first log topic.
    pub sig_hash: B256,
    /// Number of inputs flagged `indexed`. Part of the event index key:
    /// the same signature can be declared with different indexed layouts.
    pub indexed_input_count: usize,
    /// Canonical JSON of the event's ABI entry.
    pub abi: Bytes,
}

/// Method and event fragments of one contract ABI.
#[derive(Debug, Clone, Default)]
pub struct ContractFragments {
    pub methods: Vec<MethodFragment>,
    pub events: Vec<EventFragment>,
}

/// Parse raw ABI JSON into registerable fragments.
///
/// Only structural validity is checked; an empty ABI array yields an empty
/// fragment set and is not an error.
pub fn parse_fragments(raw: &[u8]) -> Result<ContractFragments, serde_json::Error> {
    let abi: JsonAbi = serde_json::from_slice(raw)?;

    let mut methods = Vec::new();
    for function in abi.functions() {
        methods.push(MethodFragment {
            signature: function.signature(),
            selector: function.selector(),
            abi: Bytes::from(serde_json::to_vec(function)?),
        });
    }

    let mut events = Vec::new();
    for event in abi.events() {
        events.push(EventFragment {
            signature: event.signature(),
            sig_hash: event.selector(),
            indexed_input_count: indexed_input_count(event),
            abi: Bytes::from(serde_json::to_vec(event)?),
        });
    }

    Ok(ContractFragments { methods, events })
}

/// Count of an event's inputs flagged as indexed.
pub fn indexed_input_count(event: &Event) -> usize {
    event.inputs.iter().filter(|input| input.indexed).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    const SAMPLE_ABI: &str = r#"[
        {
            "type": "function",
            "name": "transfer",
            "inputs": [
                {"name": "to", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ],
            "outputs": [{"name": "", "type": "bool"}],
            "stateMutability": "nonpayable"
        },
        {
            "anonymous": false,
            "type": "event",
            "name": "Transfer",
            "inputs": [
                {"indexed": true, "name": "from", "type": "address"},
                {"indexed": true, "name": "to", "type": "address"},
                {"indexed": false, "name": "value", "type": "uint256"}
            ]
        }
    ]"#;

    #[test]
    fn test_method_selector_matches_signature_hash() {
        let fragments = parse_fragments(SAMPLE_ABI.as_bytes()).unwrap();
        assert_eq!(fragments.methods.len(), 1);

        let method = &fragments.methods[0];
        assert_eq!(method.signature, "transfer(address,uint256)");

        let expected = keccak256(method.signature.as_bytes());
        assert_eq!(method.selector.as_slice(), &expected[..4]);
    }

    #[test]
    fn test_event_sig_hash_and_indexed_count() {
        let fragments = parse_fragments(SAMPLE_ABI.as_bytes()).unwrap();
        assert_eq!(fragments.events.len(), 1);

        let event = &fragments.events[0];
        assert_eq!(event.signature, "Transfer(address,address,uint256)");
        assert_eq!(event.sig_hash, keccak256(event.signature.as_bytes()));
        assert_eq!(event.indexed_input_count, 2);
    }

    #[test]
    fn test_fragments_are_canonical() {
        // Same ABI parsed twice yields byte-identical fragments, regardless
        // of insignificant whitespace in the input.
        let spaced = SAMPLE_ABI.replace('\n', "\n  ");
        let a = parse_fragments(SAMPLE_ABI.as_bytes()).unwrap();
        let b = parse_fragments(spaced.as_bytes()).unwrap();
        assert_eq!(a.methods[0].abi, b.methods[0].abi);
        assert_eq!(a.events[0].abi, b.events[0].abi);
    }

    #[test]
    fn test_empty_abi_is_valid() {
        let fragments = parse_fragments(b"[]").unwrap();
        assert!(fragments.methods.is_empty());
        assert!(fragments.events.is_empty());
    }

    #[test]
    fn test_malformed_abi_is_rejected() {
        assert!(parse_fragments(b"{not json").is_err());
    }
}
