//! Settlement Attestations
//!
//! Everything the on-chain contract needs to pay a winner without trusting
//! either player:
//!
//! - `encoding`: bit-exact payload and digest the contract reconstructs
//! - `signer`: referee key, recoverable ECDSA signing and verification

pub mod encoding;
pub mod signer;

pub use encoding::{attestation_digest, attestation_payload, signing_hash};
pub use signer::{
    recover_signer, verify_attestation, Attestation, AttestationSigner, EcdsaSigner, KeyError,
    SigningError,
};
