use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use super::{check_owner_length, check_signature_length, SignatureType, Signer};
use crate::error::SignerError;

const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// secp256k1 scheme as used by Ethereum wallets.
///
/// The deep hash is wrapped as an EIP-191 personal message and hashed with
/// Keccak-256. Signatures are `r || s || v` with `v = 27 + recovery id`;
/// the owner is the 65-byte uncompressed public key.
#[derive(Clone)]
pub struct EthereumSigner {
    signing_key: Option<SigningKey>,
    verifying_key: VerifyingKey,
    owner: Vec<u8>,
}

impl EthereumSigner {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from a 32-byte private scalar.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Create from a hex private key, with or without a `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        let trimmed = secret.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        Self {
            owner: verifying_key.to_encoded_point(false).as_bytes().to_vec(),
            verifying_key,
            signing_key: Some(signing_key),
        }
    }

    /// Verification-only instance from an uncompressed SEC1 public key.
    pub fn from_owner(owner: &[u8]) -> Result<Self, SignerError> {
        check_owner_length(SignatureType::Ethereum, owner)?;
        let verifying_key = VerifyingKey::from_sec1_bytes(owner)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signing_key: None,
            verifying_key,
            owner: owner.to_vec(),
        })
    }

    /// The `0x`-prefixed account address of this key.
    pub fn address(&self) -> String {
        let hash = Keccak256::digest(&self.owner[1..]);
        format!("0x{}", hex::encode(&hash[12..]))
    }
}

/// Keccak-256 of the EIP-191 personal message wrapping `message`.
fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

impl Signer for EthereumSigner {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Ethereum
    }

    fn owner(&self) -> &[u8] {
        &self.owner
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(SignerError::NotSigningCapable(SignatureType::Ethereum))?;

        let hash = personal_message_hash(message);
        let (sig, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&sig.to_bytes());
        out.push(27 + recovery_id.to_byte());
        Ok(out)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignerError> {
        check_signature_length(SignatureType::Ethereum, signature)?;
        let sig = Signature::from_slice(&signature[..64])
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
        let sig = sig.normalize_s().unwrap_or(sig);

        let hash = personal_message_hash(message);
        self.verifying_key
            .verify_prehash(&hash, &sig)
            .map_err(|_| SignerError::SignatureMismatch)
    }

    fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }
}
