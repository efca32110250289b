use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pss, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{check_owner_length, check_signature_length, SignatureType, Signer};
use crate::error::SignerError;

const MODULUS_BITS: usize = 4096;
const PUBLIC_EXPONENT: u64 = 65_537;

/// RSA-PSS (SHA-256, 32-byte salt) over a 4096-bit modulus.
///
/// The owner is the big-endian modulus, left-padded to 512 bytes.
#[derive(Clone)]
pub struct ArweaveSigner {
    private_key: Option<RsaPrivateKey>,
    public_key: RsaPublicKey,
    owner: Vec<u8>,
}

/// The private fields of an RSA JSON Web Key.
#[derive(Deserialize)]
struct Jwk {
    kty: String,
    n: String,
    e: String,
    d: String,
    p: String,
    q: String,
}

impl ArweaveSigner {
    /// Generate a fresh 4096-bit key. Slow in unoptimized builds.
    pub fn generate() -> Result<Self, SignerError> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), MODULUS_BITS)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_private_key(key)
    }

    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, SignerError> {
        let public_key = private_key.to_public_key();
        let owner = modulus_bytes(&public_key)?;
        Ok(Self {
            private_key: Some(private_key),
            public_key,
            owner,
        })
    }

    /// Load a wallet key file (an RSA JWK).
    pub fn from_jwk(json: &str) -> Result<Self, SignerError> {
        let jwk: Jwk =
            serde_json::from_str(json).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        if jwk.kty != "RSA" {
            return Err(SignerError::InvalidKey(format!(
                "expected an RSA key, got kty {}",
                jwk.kty
            )));
        }

        let key = RsaPrivateKey::from_components(
            jwk_uint(&jwk.n)?,
            jwk_uint(&jwk.e)?,
            jwk_uint(&jwk.d)?,
            vec![jwk_uint(&jwk.p)?, jwk_uint(&jwk.q)?],
        )
        .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_private_key(key)
    }

    /// Verification-only instance from a 512-byte modulus.
    pub fn from_owner(owner: &[u8]) -> Result<Self, SignerError> {
        check_owner_length(SignatureType::Arweave, owner)?;
        let public_key = RsaPublicKey::new(
            BigUint::from_bytes_be(owner),
            BigUint::from(PUBLIC_EXPONENT),
        )
        .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self {
            private_key: None,
            public_key,
            owner: owner.to_vec(),
        })
    }
}

fn jwk_uint(field: &str) -> Result<BigUint, SignerError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(field.trim_end_matches('='))
        .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn modulus_bytes(key: &RsaPublicKey) -> Result<Vec<u8>, SignerError> {
    let owner_len = SignatureType::Arweave.owner_length();
    let raw = key.n().to_bytes_be();
    if raw.len() > owner_len || key.size() != owner_len {
        return Err(SignerError::InvalidKey(format!(
            "modulus must be {} bits, got {}",
            MODULUS_BITS,
            key.n().bits()
        )));
    }
    let mut owner = vec![0u8; owner_len - raw.len()];
    owner.extend_from_slice(&raw);
    Ok(owner)
}

impl Signer for ArweaveSigner {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Arweave
    }

    fn owner(&self) -> &[u8] {
        &self.owner
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let key = self
            .private_key
            .as_ref()
            .ok_or(SignerError::NotSigningCapable(SignatureType::Arweave))?;
        let digest = Sha256::digest(message);
        key.sign_with_rng(&mut rand::thread_rng(), Pss::new::<Sha256>(), &digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignerError> {
        check_signature_length(SignatureType::Arweave, signature)?;
        let digest = Sha256::digest(message);
        self.public_key
            .verify(Pss::new::<Sha256>(), &digest, signature)
            .map_err(|_| SignerError::SignatureMismatch)
    }

    fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }
}
