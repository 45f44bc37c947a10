//! Attestation Encoding
//!
//! The one bit-exact boundary with the settlement contract. The contract
//! rebuilds the same bytes with
//!
//! ```text
//! keccak256(abi.encodePacked(uint256 chainId, string matchId, address winner))
//! ```
//!
//! wraps it in the EIP-191 personal-message prefix and `ecrecover`s the
//! referee address. Any change to field order, widths or the chain id breaks
//! settlement, so every byte decision lives in this file.

use secp256k1::PublicKey;
use sha3::{Digest, Keccak256};

use crate::core::address::{PlayerAddress, ADDRESS_LEN};
use crate::core::match_id::MatchId;

/// Hash output type (256 bits / 32 bytes).
pub type Hash32 = [u8; 32];

/// EIP-191 prefix for a 32-byte personal message.
pub const ETH_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Width of a Solidity `uint256`.
const UINT256_LEN: usize = 32;

/// Keccak-256 (the pre-standard variant Ethereum uses, not SHA3-256).
pub fn keccak256(data: &[u8]) -> Hash32 {
    Keccak256::digest(data).into()
}

/// `abi.encodePacked(uint256 chainId, string matchId, address winner)`.
pub fn attestation_payload(chain_id: u64, match_id: &MatchId, winner: &PlayerAddress) -> Vec<u8> {
    let match_id = match_id.to_string();
    let mut payload = Vec::with_capacity(UINT256_LEN + match_id.len() + ADDRESS_LEN);

    // uint256: left-padded big-endian
    payload.extend_from_slice(&[0u8; UINT256_LEN - 8]);
    payload.extend_from_slice(&chain_id.to_be_bytes());

    // string: raw UTF-8, no length prefix when packed
    payload.extend_from_slice(match_id.as_bytes());

    // address: 20 raw bytes
    payload.extend_from_slice(winner.as_bytes());

    payload
}

/// Message digest the contract reconstructs.
pub fn attestation_digest(chain_id: u64, match_id: &MatchId, winner: &PlayerAddress) -> Hash32 {
    keccak256(&attestation_payload(chain_id, match_id, winner))
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ‖ digest)`.
pub fn eth_signed_message_hash(digest: &Hash32) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(ETH_SIGNED_MESSAGE_PREFIX);
    hasher.update(digest);
    hasher.finalize().into()
}

/// The 32 bytes that actually get signed.
pub fn signing_hash(chain_id: u64, match_id: &MatchId, winner: &PlayerAddress) -> Hash32 {
    eth_signed_message_hash(&attestation_digest(chain_id, match_id, winner))
}

/// Account address of a public key: last 20 bytes of
/// `keccak256(uncompressed_key[1..])`.
pub fn address_from_public_key(public_key: &PublicKey) -> PlayerAddress {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);

    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&hash[32 - ADDRESS_LEN..]);
    PlayerAddress::new(bytes)
}

/// Serde helper: fixed byte arrays as `0x`-prefixed hex strings.
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as `0x…`.
    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    /// Deserialize from hex, with or without `0x`.
    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(digits).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|v: Vec<u8>| {
            serde::de::Error::custom(format!("expected {} bytes, got {}", N, v.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winner() -> PlayerAddress {
        "0x00000000000000000000000000000000000000aa".parse().unwrap()
    }

    #[test]
    fn test_keccak_is_not_sha3() {
        // keccak256("") differs from sha3_256("")
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_payload_layout() {
        let match_id = MatchId::new(482_913).unwrap();
        let payload = attestation_payload(1, &match_id, &winner());

        assert_eq!(payload.len(), 32 + 6 + 20);
        assert!(payload[..31].iter().all(|b| *b == 0));
        assert_eq!(payload[31], 1);
        assert_eq!(&payload[32..38], b"482913");
        assert_eq!(payload[57], 0xaa);
    }

    #[test]
    fn test_chain_id_big_endian() {
        let match_id = MatchId::new(100_000).unwrap();
        let payload = attestation_payload(0x0102, &match_id, &winner());
        assert_eq!(&payload[30..32], &[0x01, 0x02]);
    }

    #[test]
    fn test_every_field_changes_digest() {
        let id = MatchId::new(111_111).unwrap();
        let base = attestation_digest(1, &id, &winner());

        assert_ne!(base, attestation_digest(2, &id, &winner()));
        assert_ne!(base, attestation_digest(1, &MatchId::new(111_112).unwrap(), &winner()));
        assert_ne!(base, attestation_digest(1, &id, &PlayerAddress::new([0xbb; 20])));
        assert_eq!(base, attestation_digest(1, &id, &winner()));
    }

    #[test]
    fn test_signed_message_hash_wraps_digest() {
        let digest = [7u8; 32];
        let mut manual = ETH_SIGNED_MESSAGE_PREFIX.to_vec();
        manual.extend_from_slice(&digest);

        assert_eq!(eth_signed_message_hash(&digest), keccak256(&manual));
        assert_ne!(eth_signed_message_hash(&digest), digest);
    }

    #[test]
    fn test_known_address_for_key_one() {
        let secp = secp256k1::Secp256k1::new();
        let mut key = [0u8; 32];
        key[31] = 1;
        let secret = secp256k1::SecretKey::from_slice(&key).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);

        assert_eq!(
            address_from_public_key(&public).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
