//! EIP-2612 permit messages and the permit relay wire format

use crate::constants::{max_permit_deadline, PERMIT_DOMAIN_VERSION};
use alloy::primitives::{Address, Bytes, Signature, TxHash, B256, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

sol! {
    /// EIP-712 `Permit` struct, field order matches the token's verifier
    #[derive(Debug, PartialEq, Eq)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// A permit about to be signed. Built, signed, forwarded and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitMessage {
    pub token: Address,
    pub token_name: String,
    pub chain_id: u64,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    /// Owner's on-chain permit nonce, read right before signing
    pub nonce: U256,
    /// Unix seconds
    pub deadline: u64,
}

impl PermitMessage {
    /// `{name, version: "1", chainId, verifyingContract: token}`
    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Owned(self.token_name.clone())),
            Some(Cow::Borrowed(PERMIT_DOMAIN_VERSION)),
            Some(U256::from(self.chain_id)),
            Some(self.token),
            None,
        )
    }

    pub fn to_struct(&self) -> Permit {
        Permit {
            owner: self.owner,
            spender: self.spender,
            value: self.value,
            nonce: self.nonce,
            deadline: U256::from(self.deadline),
        }
    }

    /// Digest the wallet signs
    pub fn signing_hash(&self) -> B256 {
        self.to_struct().eip712_signing_hash(&self.domain())
    }

    /// Whether the relay would still accept this deadline at time `now`
    pub fn deadline_ok_at(&self, now: u64) -> bool {
        self.deadline <= max_permit_deadline(now)
    }
}

/// `(v, r, s)` as `permit()` takes them, with `v` in `{27, 28}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl From<&Signature> for SplitSignature {
    fn from(signature: &Signature) -> Self {
        Self {
            v: 27 + u8::from(signature.v()),
            r: B256::from(signature.r().to_be_bytes::<32>()),
            s: B256::from(signature.s().to_be_bytes::<32>()),
        }
    }
}

impl SplitSignature {
    /// Split a 65-byte `r || s || v` signature
    pub fn from_bytes(bytes: &[u8]) -> eyre::Result<Self> {
        let signature = Signature::try_from(bytes)
            .map_err(|e| eyre::eyre!("Invalid signature encoding: {}", e))?;
        Ok(Self::from(&signature))
    }
}

/// Body of `POST /approve-gasless`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRelayRequest {
    pub token_address: Address,
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub deadline: u64,
    /// 65-byte `r || s || v` signature
    pub signature: Bytes,
}

impl PermitRelayRequest {
    pub fn new(message: &PermitMessage, signature: &Signature) -> Self {
        Self {
            token_address: message.token,
            owner: message.owner,
            spender: message.spender,
            value: message.value,
            deadline: message.deadline,
            signature: Bytes::from(signature.as_bytes().to_vec()),
        }
    }
}

/// `200 {txHash}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRelayResponse {
    pub tx_hash: TxHash,
}

/// `500 {error, reason?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitRelayRejection {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermitRelayRejection {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl std::fmt::Display for PermitRelayRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.error, reason),
            None => f.write_str(&self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256};
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn test_signer() -> PrivateKeySigner {
        TEST_KEY.parse().unwrap()
    }

    fn message(nonce: u64) -> PermitMessage {
        PermitMessage {
            token: address!("0x1111111111111111111111111111111111111111"),
            token_name: "Token".to_string(),
            chain_id: 5,
            owner: address!("0x2222222222222222222222222222222222222222"),
            spender: address!("0x3333333333333333333333333333333333333333"),
            value: U256::from(1_000u64),
            nonce: U256::from(nonce),
            deadline: 1_700_000_600,
        }
    }

    #[test]
    fn test_domain_fields() {
        let domain = message(0).domain();
        assert_eq!(domain.name.as_deref(), Some("Token"));
        assert_eq!(domain.version.as_deref(), Some("1"));
        assert_eq!(domain.chain_id, Some(U256::from(5u64)));
        assert_eq!(domain.verifying_contract, Some(message(0).token));
        assert!(domain.salt.is_none());
    }

    #[test]
    fn test_permit_type_string() {
        let type_hash = keccak256(
            "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)",
        );
        assert_eq!(message(0).to_struct().eip712_type_hash(), type_hash);
    }

    #[test]
    fn test_signing_hash_depends_on_nonce() {
        assert_ne!(message(0).signing_hash(), message(1).signing_hash());
        assert_eq!(message(3).signing_hash(), message(3).signing_hash());
    }

    #[test]
    fn test_deadline_window() {
        let msg = message(0);
        assert!(msg.deadline_ok_at(1_700_000_000));
        assert!(!msg.deadline_ok_at(1_699_999_999));
    }

    #[test]
    fn test_split_signature_round_trip() {
        let signer = test_signer();
        let msg = message(0);
        let signature = signer.sign_hash_sync(&msg.signing_hash()).unwrap();

        let split = SplitSignature::from(&signature);
        assert!(split.v == 27 || split.v == 28);

        let from_bytes = SplitSignature::from_bytes(&signature.as_bytes()).unwrap();
        assert_eq!(split, from_bytes);

        let recovered = signature.recover_address_from_prehash(&msg.signing_hash()).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_relay_request_wire_format() {
        let signer = test_signer();
        let msg = message(0);
        let signature = signer.sign_hash_sync(&msg.signing_hash()).unwrap();
        let request = PermitRelayRequest::new(&msg, &signature);

        let json = serde_json::to_value(&request).unwrap();
        for key in ["tokenAddress", "owner", "spender", "value", "deadline", "signature"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(request.signature.len(), 65);
    }

    #[test]
    fn test_rejection_omits_empty_reason() {
        let json = serde_json::to_string(&PermitRelayRejection::new("nope")).unwrap();
        assert_eq!(json, r#"{"error":"nope"}"#);
    }
}
