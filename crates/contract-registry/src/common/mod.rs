//! Core data model shared by every backend: contract identifiers, artifact
//! records and contract instance coordinates.

pub mod abi;
pub mod error;

use alloy::primitives::{Address, B256, Bytes, keccak256};
use error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};

/// Tag substituted when a registration or lookup leaves the tag empty.
/// Every registration also repoints this tag at the new artifact.
pub const DEFAULT_TAG: &str = "latest";

/// Reserved codehash under which the default (fallback) selector and event
/// buckets are stored. No real deployed bytecode hashes to zero.
pub const DEFAULT_CODE_HASH: B256 = B256::ZERO;

/// External handle for a registered artifact: a human-readable name plus a
/// version tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId {
    pub name: String,
    pub tag: String,
}

impl ContractId {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Identifier pointing at the most recently registered artifact for a
    /// name.
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_TAG)
    }

    /// Validate and normalize the identifier: the name must be non-empty,
    /// an empty tag defaults to [`DEFAULT_TAG`]. Pure, no side effects.
    pub fn normalized(&self) -> RegistryResult<Self> {
        if self.name.is_empty() {
            return Err(RegistryError::invalid_argument(
                "contract id has an empty name",
            ));
        }
        let tag = if self.tag.is_empty() {
            DEFAULT_TAG.to_string()
        } else {
            self.tag.clone()
        };
        Ok(Self {
            name: self.name.clone(),
            tag,
        })
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.name, self.tag)
    }
}

/// Immutable compilation output stored content-addressed by
/// `keccak256(bytecode)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Raw ABI JSON, stored byte-for-byte as registered.
    pub abi: Bytes,
    /// Creation bytecode.
    pub bytecode: Bytes,
    /// Runtime bytecode; its keccak hash identifies deployed behavior.
    pub deployed_bytecode: Bytes,
}

impl Artifact {
    /// Content address of this artifact.
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }

    /// Hash of the runtime bytecode, `None` when no deployed bytecode was
    /// supplied.
    pub fn code_hash(&self) -> Option<B256> {
        if self.deployed_bytecode.is_empty() {
            None
        } else {
            Some(keccak256(&self.deployed_bytecode))
        }
    }
}

/// A contract as submitted to / returned from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub abi: Bytes,
    pub bytecode: Bytes,
    pub deployed_bytecode: Bytes,
}

impl Contract {
    pub fn new(id: ContractId, abi: Bytes, bytecode: Bytes, deployed_bytecode: Bytes) -> Self {
        Self {
            id,
            abi,
            bytecode,
            deployed_bytecode,
        }
    }

    /// The storable portion of the contract, without its identifier.
    pub fn artifact(&self) -> Artifact {
        Artifact {
            abi: self.abi.clone(),
            bytecode: self.bytecode.clone(),
            deployed_bytecode: self.deployed_bytecode.clone(),
        }
    }

    pub fn from_artifact(id: ContractId, artifact: Artifact) -> Self {
        Self {
            id,
            abi: artifact.abi,
            bytecode: artifact.bytecode,
            deployed_bytecode: artifact.deployed_bytecode,
        }
    }
}

/// Coordinates of a deployed contract instance on a specific chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountInstance {
    pub chain_id: u64,
    pub address: Address,
}

impl AccountInstance {
    pub fn new(chain_id: u64, address: Address) -> Self {
        Self { chain_id, address }
    }
}

impl std::fmt::Display for AccountInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.address, self.chain_id)
    }
}

/// A registration payload validated once, shared by all backends.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub id: ContractId,
    pub artifact: Artifact,
    pub bytecode_hash: B256,
    /// `None` when the contract was registered without deployed bytecode;
    /// specific-codehash index entries are skipped in that case.
    pub code_hash: Option<B256>,
    pub fragments: abi::ContractFragments,
}

/// Validate a registration request and precompute everything the backends
/// need to write: normalized id, content address, codehash and the per
/// method/event fragments.
pub(crate) fn prepare_registration(contract: &Contract) -> RegistryResult<Registration> {
    let id = contract.id.normalized()?;

    if contract.bytecode.is_empty() {
        return Err(RegistryError::invalid_argument(format!(
            "registration of {id} carries no bytecode"
        )));
    }

    // An absent ABI is allowed (the artifact is still stored and taggable);
    // a present but malformed one is the caller's mistake.
    let fragments = if contract.abi.is_empty() {
        abi::ContractFragments::default()
    } else {
        abi::parse_fragments(&contract.abi).map_err(|e| {
            RegistryError::invalid_argument(format!("ABI of {id} failed to parse: {e}"))
        })?
    };

    let artifact = contract.artifact();
    Ok(Registration {
        bytecode_hash: artifact.bytecode_hash(),
        code_hash: artifact.code_hash(),
        id,
        artifact,
        fragments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_id_normalization() {
        let id = ContractId::new("ERC20", "v1.0.0").normalized().unwrap();
        assert_eq!(id.name, "ERC20");
        assert_eq!(id.tag, "v1.0.0");

        let id = ContractId::new("ERC20", "").normalized().unwrap();
        assert_eq!(id.tag, DEFAULT_TAG);

        let err = ContractId::new("", "v1.0.0").normalized().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }

    #[test]
    fn test_contract_id_display() {
        let id = ContractId::latest("ERC20");
        assert_eq!(id.to_string(), "ERC20[latest]");
    }

    #[test]
    fn test_artifact_hashes() {
        let artifact = Artifact {
            abi: Bytes::from_static(b"[]"),
            bytecode: Bytes::from_static(&[0x60, 0x80]),
            deployed_bytecode: Bytes::from_static(&[0x60, 0x40]),
        };
        assert_eq!(artifact.bytecode_hash(), keccak256([0x60, 0x80]));
        assert_eq!(artifact.code_hash(), Some(keccak256([0x60, 0x40])));

        let bare = Artifact {
            deployed_bytecode: Bytes::new(),
            ..artifact
        };
        assert_eq!(bare.code_hash(), None);
    }

    #[test]
    fn test_account_instance_display() {
        let instance = AccountInstance::new(3, Address::repeat_byte(0xba));
        assert!(instance.to_string().ends_with("@3"));
    }
}
