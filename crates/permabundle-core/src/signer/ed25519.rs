use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
// Imported anonymously: the trait names clash with our own `Signer`.
use ed25519_dalek::{Signer as _, Verifier as _};
use rand::rngs::OsRng;

use super::{check_owner_length, check_signature_length, SignatureType, Signer};
use crate::error::SignerError;

/// Ed25519 scheme. Signs the deep hash directly.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: Option<SigningKey>,
    verifying_key: VerifyingKey,
    owner: [u8; 32],
}

impl Ed25519Signer {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create from a 32-byte secret seed.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(secret))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            owner: verifying_key.to_bytes(),
            verifying_key,
            signing_key: Some(signing_key),
        }
    }

    /// Verification-only instance from a 32-byte public key.
    pub fn from_owner(owner: &[u8]) -> Result<Self, SignerError> {
        check_owner_length(SignatureType::Ed25519, owner)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(owner);
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signing_key: None,
            verifying_key,
            owner: bytes,
        })
    }
}

impl Signer for Ed25519Signer {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Ed25519
    }

    fn owner(&self) -> &[u8] {
        &self.owner
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(SignerError::NotSigningCapable(SignatureType::Ed25519))?;
        Ok(key.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignerError> {
        check_signature_length(SignatureType::Ed25519, signature)?;
        let sig = Signature::from_slice(signature)
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
        self.verifying_key
            .verify(message, &sig)
            .map_err(|_| SignerError::SignatureMismatch)
    }

    fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }
}
