//! RSA signing identity for remote writes

use std::fmt;
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// RSA key pair used to sign payloads sent to the sync server
///
/// The server trusts the first public key it sees, so every later write must
/// come from the same pair. A pair is either derived deterministically from
/// the remote address and the master password, or generated once and carried
/// inside the encrypted store (see [`KeyExchange`](super::KeyExchange)).
#[derive(Clone)]
pub struct SigningIdentity {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    /// Fresh random key pair
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("key generation failed: {}", e)))?;
        Ok(Self::from_private(private))
    }

    /// Key pair determined entirely by `(address, password)`
    ///
    /// Never stored anywhere; every login recomputes it.
    pub fn derive(address: &str, password: &str, bits: usize) -> Result<Self> {
        let mut hasher = Sha256::new();
        for part in [address.as_bytes(), password.as_bytes()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        let seed: [u8; 32] = hasher.finalize().into();
        let mut rng = ChaCha20Rng::from_seed(seed);
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(Self::from_private(private))
    }

    /// Rebuild from PKCS#1 DER encodings, checking that the halves belong together
    pub fn from_der(private_der: &[u8], public_der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(private_der)
            .map_err(|e| Error::Decode(format!("invalid private key: {}", e)))?;
        let public = decode_public_key(public_der)?;
        if private.to_public_key() != public {
            return Err(Error::Decode(
                "bundled public key does not match private key".to_string(),
            ));
        }
        Ok(Self { private, public })
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { private, public }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .private
            .to_pkcs1_der()
            .map_err(|e| Error::Crypto(format!("private key encoding: {}", e)))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    pub fn public_der(&self) -> Result<Vec<u8>> {
        encode_public_key(&self.public)
    }

    /// RSASSA-PKCS1-v1_5 signature with SHA-512 over `message`
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha512::digest(message);
        self.private
            .sign(Pkcs1v15Sign::new::<Sha512>(), &digest)
            .map_err(|e| Error::Crypto(format!("signing failed: {}", e)))
    }
}

pub fn encode_public_key(key: &RsaPublicKey) -> Result<Vec<u8>> {
    let doc = key
        .to_pkcs1_der()
        .map_err(|e| Error::Crypto(format!("public key encoding: {}", e)))?;
    Ok(doc.as_bytes().to_vec())
}

pub fn decode_public_key(der: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_pkcs1_der(der).map_err(|e| Error::Decode(format!("invalid public key: {}", e)))
}

/// Check a signature produced by [`SigningIdentity::sign`]
pub fn verify_signature(key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let digest = Sha512::digest(message);
    key.verify(Pkcs1v15Sign::new::<Sha512>(), &digest, signature)
        .map_err(|_| Error::Crypto("signature verification failed".to_string()))
}

/// Identity shared between the key-exchange stage and the remote provider
///
/// Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct KeySlot {
    inner: Arc<Mutex<Option<SigningIdentity>>>,
}

impl KeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: SigningIdentity) -> Self {
        let slot = Self::new();
        slot.set(identity);
        slot
    }

    pub fn get(&self) -> Option<SigningIdentity> {
        self.lock().clone()
    }

    pub fn set(&self, identity: SigningIdentity) {
        *self.lock() = Some(identity);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SigningIdentity>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BITS: usize = 1024;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = SigningIdentity::derive("http://sync.local", "hunter2", TEST_BITS).unwrap();
        let b = SigningIdentity::derive("http://sync.local", "hunter2", TEST_BITS).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_derivation_depends_on_both_inputs() {
        let base = SigningIdentity::derive("http://a", "pw", TEST_BITS).unwrap();
        let other_pw = SigningIdentity::derive("http://a", "pw2", TEST_BITS).unwrap();
        let other_addr = SigningIdentity::derive("http://b", "pw", TEST_BITS).unwrap();
        assert_ne!(base.public_key(), other_pw.public_key());
        assert_ne!(base.public_key(), other_addr.public_key());
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let a = SigningIdentity::derive("ab", "c", TEST_BITS).unwrap();
        let b = SigningIdentity::derive("a", "bc", TEST_BITS).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = SigningIdentity::generate(TEST_BITS).unwrap();
        let signature = identity.sign(b"payload").unwrap();
        verify_signature(identity.public_key(), b"payload", &signature).unwrap();
        assert!(verify_signature(identity.public_key(), b"payloaf", &signature).is_err());
    }

    #[test]
    fn test_der_roundtrip_and_mismatch() {
        let a = SigningIdentity::generate(TEST_BITS).unwrap();
        let b = SigningIdentity::generate(TEST_BITS).unwrap();

        let restored = SigningIdentity::from_der(&a.private_der().unwrap(), &a.public_der().unwrap())
            .unwrap();
        assert_eq!(restored.public_key(), a.public_key());

        let err = SigningIdentity::from_der(&a.private_der().unwrap(), &b.public_der().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_key_slot_shared_between_clones() {
        let slot = KeySlot::new();
        let other = slot.clone();
        assert!(other.is_empty());
        slot.set(SigningIdentity::generate(TEST_BITS).unwrap());
        assert!(!other.is_empty());
    }
}
