//! Signature schemes.
//!
//! Each scheme implements [`Signer`]. Instances built from a public key alone
//! are verification-only and refuse to sign. [`verifier_for`] resolves a scheme
//! id from the wire to such a verifier, which is all a decoder ever needs.

mod arweave;
mod ed25519;
mod ethereum;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SignerError;

pub use arweave::ArweaveSigner;
pub use ed25519::Ed25519Signer;
pub use ethereum::EthereumSigner;

/// Scheme identifier carried in the first two bytes of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum SignatureType {
    /// RSA-PSS over SHA-256 with a 4096-bit modulus.
    Arweave = 1,
    /// Ed25519.
    Ed25519 = 2,
    /// secp256k1 ECDSA over the EIP-191 personal message hash.
    Ethereum = 3,
}

impl SignatureType {
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(id: u16) -> Result<Self, SignerError> {
        match id {
            1 => Ok(SignatureType::Arweave),
            2 => Ok(SignatureType::Ed25519),
            3 => Ok(SignatureType::Ethereum),
            other => Err(SignerError::UnsupportedScheme(other)),
        }
    }

    pub const fn signature_length(self) -> usize {
        match self {
            SignatureType::Arweave => 512,
            SignatureType::Ed25519 => 64,
            SignatureType::Ethereum => 65,
        }
    }

    pub const fn owner_length(self) -> usize {
        match self {
            SignatureType::Arweave => 512,
            SignatureType::Ed25519 => 32,
            SignatureType::Ethereum => 65,
        }
    }

    /// The scheme id as ASCII decimal, the form it takes in the signing payload.
    pub fn decimal_bytes(self) -> Vec<u8> {
        self.to_u16().to_string().into_bytes()
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureType::Arweave => f.write_str("arweave"),
            SignatureType::Ed25519 => f.write_str("ed25519"),
            SignatureType::Ethereum => f.write_str("ethereum"),
        }
    }
}

/// Capability set of a signature scheme.
///
/// `message` is always the 32-byte deep hash of the item being signed; each
/// scheme applies its own pre-hashing on top of it.
pub trait Signer: Send + Sync {
    fn signature_type(&self) -> SignatureType;

    /// Public key bytes, exactly [`Signer::owner_length`] long.
    fn owner(&self) -> &[u8];

    /// Sign `message`. Fails with `NotSigningCapable` on verification-only instances.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Check `signature` over `message` against [`Signer::owner`].
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignerError>;

    /// Whether this instance holds a private key.
    fn can_sign(&self) -> bool;

    fn signature_length(&self) -> usize {
        self.signature_type().signature_length()
    }

    fn owner_length(&self) -> usize {
        self.signature_type().owner_length()
    }
}

/// Build a verification-only instance for `scheme_id` from raw owner bytes.
pub fn verifier_for(scheme_id: u16, owner: &[u8]) -> Result<Box<dyn Signer>, SignerError> {
    match SignatureType::from_u16(scheme_id)? {
        SignatureType::Arweave => Ok(Box::new(ArweaveSigner::from_owner(owner)?)),
        SignatureType::Ed25519 => Ok(Box::new(Ed25519Signer::from_owner(owner)?)),
        SignatureType::Ethereum => Ok(Box::new(EthereumSigner::from_owner(owner)?)),
    }
}

fn check_owner_length(kind: SignatureType, owner: &[u8]) -> Result<(), SignerError> {
    if owner.len() != kind.owner_length() {
        return Err(SignerError::InvalidKey(format!(
            "{} owner must be {} bytes, got {}",
            kind,
            kind.owner_length(),
            owner.len()
        )));
    }
    Ok(())
}

fn check_signature_length(kind: SignatureType, signature: &[u8]) -> Result<(), SignerError> {
    if signature.len() != kind.signature_length() {
        return Err(SignerError::InvalidSignature(format!(
            "{} signature must be {} bytes, got {}",
            kind,
            kind.signature_length(),
            signature.len()
        )));
    }
    Ok(())
}
