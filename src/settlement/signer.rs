//! Attestation Signer
//!
//! Holds the referee's secp256k1 key and produces recoverable ECDSA
//! signatures over the settlement encoding. The key is loaded once at
//! startup; a missing or malformed key is fatal.

use std::fmt;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::address::PlayerAddress;
use crate::core::match_id::MatchId;
use crate::settlement::encoding::{
    address_from_public_key, attestation_digest, eth_signed_message_hash, hex_array, Hash32,
};

/// Environment variable holding the hex-encoded signing key.
pub const SIGNING_KEY_ENV: &str = "REFEREE_SIGNING_KEY";

/// Length of an `r ‖ s ‖ v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Offset Ethereum adds to the recovery id.
const V_OFFSET: u8 = 27;

/// Signed statement that `winner` won `match_id` on `chain_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Chain the settlement contract lives on.
    pub chain_id: u64,
    /// Match identifier.
    pub match_id: MatchId,
    /// Winning account.
    pub winner: PlayerAddress,
    /// Referee address that signed.
    pub signer: PlayerAddress,
    /// `keccak256(abi.encodePacked(chainId, matchId, winner))`.
    #[serde(with = "hex_array")]
    pub digest: Hash32,
    /// 65-byte `r ‖ s ‖ v` signature over the EIP-191 hash of `digest`.
    #[serde(with = "hex_array")]
    pub signature: [u8; SIGNATURE_LEN],
}

impl Attestation {
    /// Check this attestation against its own fields and an expected signer.
    pub fn verify(&self, expected_signer: &PlayerAddress) -> bool {
        verify_attestation(
            self.chain_id,
            &self.match_id,
            &self.winner,
            &self.signature,
            expected_signer,
        )
    }
}

/// Transient signing failures. Retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// The crypto backend rejected the request.
    #[error("signing backend error: {0}")]
    Backend(String),
    /// Signer temporarily unavailable.
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Key loading failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key not configured.
    #[error("signing key not set (expected REFEREE_SIGNING_KEY)")]
    Missing,
    /// Not valid hex.
    #[error("signing key is not valid hex")]
    InvalidHex,
    /// Wrong length.
    #[error("signing key must be 32 bytes, got {0}")]
    InvalidLength(usize),
    /// Out of curve range (zero or >= group order).
    #[error("signing key rejected: {0}")]
    Invalid(#[from] secp256k1::Error),
}

/// Produces settlement attestations.
pub trait AttestationSigner: Send + Sync {
    /// Address the contract should expect to recover.
    fn address(&self) -> PlayerAddress;

    /// Sign `(chain_id, match_id, winner)`.
    fn sign(
        &self,
        chain_id: u64,
        match_id: &MatchId,
        winner: &PlayerAddress,
    ) -> Result<Attestation, SigningError>;
}

/// secp256k1 recoverable-ECDSA signer.
pub struct EcdsaSigner {
    secp: Secp256k1<All>,
    secret: SecretKey,
    address: PlayerAddress,
}

impl EcdsaSigner {
    /// Build from raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        let address = address_from_public_key(&public);

        Ok(Self { secp, secret, address })
    }

    /// Build from a hex string (optional `0x`).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| KeyError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }

    /// Load from `REFEREE_SIGNING_KEY`.
    pub fn from_env() -> Result<Self, KeyError> {
        match std::env::var(SIGNING_KEY_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::from_hex(&value),
            _ => Err(KeyError::Missing),
        }
    }
}

impl fmt::Debug for EcdsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AttestationSigner for EcdsaSigner {
    fn address(&self) -> PlayerAddress {
        self.address
    }

    fn sign(
        &self,
        chain_id: u64,
        match_id: &MatchId,
        winner: &PlayerAddress,
    ) -> Result<Attestation, SigningError> {
        let digest = attestation_digest(chain_id, match_id, winner);
        let hash = eth_signed_message_hash(&digest);
        let message = Message::from_digest_slice(&hash)
            .map_err(|e| SigningError::Backend(e.to_string()))?;

        let (recovery_id, compact) = self
            .secp
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..64].copy_from_slice(&compact);
        signature[64] = V_OFFSET + recovery_id.to_i32() as u8;

        debug!("Signed attestation for match {} winner {}", match_id, winner.short());

        Ok(Attestation {
            chain_id,
            match_id: *match_id,
            winner: *winner,
            signer: self.address,
            digest,
            signature,
        })
    }
}

/// Recover the address that signed `(chain_id, match_id, winner)`.
pub fn recover_signer(
    chain_id: u64,
    match_id: &MatchId,
    winner: &PlayerAddress,
    signature: &[u8; SIGNATURE_LEN],
) -> Result<PlayerAddress, SigningError> {
    let v = signature[64];
    let recovery = if v >= V_OFFSET { v - V_OFFSET } else { v };
    let recovery_id = RecoveryId::from_i32(i32::from(recovery))
        .map_err(|e| SigningError::Backend(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| SigningError::Backend(e.to_string()))?;

    let hash = eth_signed_message_hash(&attestation_digest(chain_id, match_id, winner));
    let message = Message::from_digest_slice(&hash)
        .map_err(|e| SigningError::Backend(e.to_string()))?;

    let public = Secp256k1::verification_only()
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| SigningError::Backend(e.to_string()))?;

    Ok(address_from_public_key(&public))
}

/// Contract-side check: does `signature` over the triple recover to
/// `expected_signer`?
pub fn verify_attestation(
    chain_id: u64,
    match_id: &MatchId,
    winner: &PlayerAddress,
    signature: &[u8; SIGNATURE_LEN],
    expected_signer: &PlayerAddress,
) -> bool {
    matches!(
        recover_signer(chain_id, match_id, winner, signature),
        Ok(addr) if addr == *expected_signer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn signer() -> EcdsaSigner {
        EcdsaSigner::from_hex(KEY_ONE).unwrap()
    }

    fn winner() -> PlayerAddress {
        PlayerAddress::new([0x42; 20])
    }

    fn match_id() -> MatchId {
        MatchId::new(555_123).unwrap()
    }

    #[test]
    fn test_signer_address() {
        assert_eq!(
            signer().address().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let s = signer();
        let att = s.sign(31337, &match_id(), &winner()).unwrap();

        assert!(att.signature[64] == 27 || att.signature[64] == 28);
        assert_eq!(att.signer, s.address());
        assert!(att.verify(&s.address()));
    }

    #[test]
    fn test_altered_fields_fail_verification() {
        let s = signer();
        let att = s.sign(1, &match_id(), &winner()).unwrap();
        let signer_addr = s.address();

        assert!(!verify_attestation(2, &att.match_id, &att.winner, &att.signature, &signer_addr));
        assert!(!verify_attestation(
            1,
            &MatchId::new(555_124).unwrap(),
            &att.winner,
            &att.signature,
            &signer_addr
        ));
        assert!(!verify_attestation(
            1,
            &att.match_id,
            &PlayerAddress::new([0x43; 20]),
            &att.signature,
            &signer_addr
        ));
    }

    #[test]
    fn test_wrong_signer_fails_verification() {
        let att = signer().sign(1, &match_id(), &winner()).unwrap();
        let other = EcdsaSigner::from_hex(&"02".repeat(32)).unwrap();
        assert!(!att.verify(&other.address()));
    }

    #[test]
    fn test_repeat_signing_verifies() {
        let s = signer();
        let a = s.sign(5, &match_id(), &winner()).unwrap();
        let b = s.sign(5, &match_id(), &winner()).unwrap();

        assert_eq!(a.digest, b.digest);
        assert!(a.verify(&s.address()));
        assert!(b.verify(&s.address()));
    }

    #[test]
    fn test_malformed_keys_rejected() {
        assert!(matches!(EcdsaSigner::from_hex("zz"), Err(KeyError::InvalidHex)));
        assert!(matches!(EcdsaSigner::from_hex("0x0102"), Err(KeyError::InvalidLength(2))));
        assert!(matches!(EcdsaSigner::from_hex(&"00".repeat(32)), Err(KeyError::Invalid(_))));
    }

    #[test]
    fn test_attestation_json_hex() {
        let att = signer().sign(1, &match_id(), &winner()).unwrap();
        let json = serde_json::to_string(&att).unwrap();

        assert!(json.contains("\"match_id\":\"555123\""));
        let parsed: Attestation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, att);
    }

    #[test]
    fn test_debug_hides_secret() {
        let dbg = format!("{:?}", signer());
        assert!(dbg.contains("address"));
        assert!(!dbg.contains("secret"));
    }
}
