// ============================================================================
// Post-Quantum Crypto Provider
// ============================================================================
//
// ML-KEM-768 (FIPS 203) for key encapsulation and ML-DSA-65 (FIPS 204) for
// signatures, compiled in with `--features post-quantum`.
//
// Encryption is KEM-DEM: encapsulate to our own ML-KEM public key, then seal
// the payload with ChaCha20-Poly1305 under the shared secret.
//
// Wire format for ciphertext:
//   ml_kem_ciphertext (1088 bytes) || nonce (12 bytes) || aead_box
//
// ============================================================================

use super::{CryptoAlgorithm, CryptoProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ml_dsa::signature::{Signer, Verifier};
use ml_dsa::{KeyGen, KeyPair, MlDsa65, Signature};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;

/// Expected sizes for ML-KEM-768 / ML-DSA-65 material (FIPS 203/204)
pub mod key_sizes {
    /// ML-KEM-768 public (encapsulation) key size
    pub const ML_KEM_768_PUBLIC_KEY: usize = 1184;

    /// ML-KEM-768 ciphertext size
    pub const ML_KEM_768_CIPHERTEXT: usize = 1088;

    /// ML-DSA-65 public (verifying) key size
    pub const ML_DSA_65_PUBLIC_KEY: usize = 1952;

    /// ML-DSA-65 signature size
    pub const ML_DSA_65_SIGNATURE: usize = 3293;
}

const NONCE_LEN: usize = 12;

pub struct MlKemProvider {
    decapsulation_key: <MlKem768 as KemCore>::DecapsulationKey,
    encapsulation_key: <MlKem768 as KemCore>::EncapsulationKey,
    signature_keypair: KeyPair<MlDsa65>,
}

impl MlKemProvider {
    /// Creates a provider with freshly generated ML-KEM and ML-DSA keys.
    pub fn generate() -> Self {
        let (decapsulation_key, encapsulation_key) = MlKem768::generate(&mut OsRng);
        let signature_keypair = MlDsa65::key_gen(&mut OsRng);
        Self {
            decapsulation_key,
            encapsulation_key,
            signature_keypair,
        }
    }
}

#[async_trait]
impl CryptoProvider for MlKemProvider {
    fn algorithm(&self) -> CryptoAlgorithm {
        CryptoAlgorithm::PostQuantum
    }

    /// Exports the public bundle of a fresh keypair:
    /// ml_kem_public (1184) || ml_dsa_public (1952)
    async fn generate_keys(&self) -> ProviderResult<Vec<u8>> {
        let (_, encapsulation_key) = MlKem768::generate(&mut OsRng);
        let signature_keypair = MlDsa65::key_gen(&mut OsRng);

        let mut bundle = encapsulation_key.as_bytes().to_vec();
        bundle.extend_from_slice(signature_keypair.verifying_key().encode().as_slice());
        if bundle.len() != key_sizes::ML_KEM_768_PUBLIC_KEY + key_sizes::ML_DSA_65_PUBLIC_KEY {
            return Err(ProviderError::OperationFailed(format!(
                "unexpected public bundle size {}",
                bundle.len()
            )));
        }
        Ok(bundle)
    }

    async fn encrypt(&self, plaintext: &[u8]) -> ProviderResult<Vec<u8>> {
        let (kem_ciphertext, shared_secret) = self
            .encapsulation_key
            .encapsulate(&mut OsRng)
            .map_err(|_| ProviderError::OperationFailed("encapsulation failed".to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(shared_secret.as_slice()));
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ProviderError::OperationFailed(format!("encryption failed: {:?}", e)))?;

        // [ml_kem_ct (1088) | nonce (12) | aead_box]
        let mut result = kem_ciphertext.to_vec();
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&sealed);
        Ok(result)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> ProviderResult<Vec<u8>> {
        if ciphertext.len() < key_sizes::ML_KEM_768_CIPHERTEXT + NONCE_LEN {
            return Err(ProviderError::OperationFailed(
                "ciphertext too short".to_string(),
            ));
        }

        let kem_ciphertext = Ciphertext::<MlKem768>::try_from(
            &ciphertext[..key_sizes::ML_KEM_768_CIPHERTEXT],
        )
        .map_err(|_| ProviderError::OperationFailed("malformed KEM ciphertext".to_string()))?;

        let shared_secret = self
            .decapsulation_key
            .decapsulate(&kem_ciphertext)
            .map_err(|_| ProviderError::OperationFailed("decapsulation failed".to_string()))?;

        let nonce_bytes = &ciphertext
            [key_sizes::ML_KEM_768_CIPHERTEXT..key_sizes::ML_KEM_768_CIPHERTEXT + NONCE_LEN];
        let sealed = &ciphertext[key_sizes::ML_KEM_768_CIPHERTEXT + NONCE_LEN..];

        let cipher = ChaCha20Poly1305::new(Key::from_slice(shared_secret.as_slice()));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| ProviderError::OperationFailed(format!("decryption failed: {:?}", e)))?;
        Ok(plaintext)
    }

    async fn sign(&self, message: &[u8]) -> ProviderResult<Vec<u8>> {
        let signature = self.signature_keypair.signing_key().sign(message);
        Ok(signature.encode().to_vec())
    }

    async fn verify(&self, message: &[u8], signature: &[u8]) -> ProviderResult<bool> {
        if signature.len() != key_sizes::ML_DSA_65_SIGNATURE {
            return Err(ProviderError::OperationFailed(format!(
                "signature must be {} bytes (got {})",
                key_sizes::ML_DSA_65_SIGNATURE,
                signature.len()
            )));
        }
        let encoded = signature
            .try_into()
            .map_err(|_| ProviderError::OperationFailed("malformed signature".to_string()))?;
        let signature = Signature::<MlDsa65>::decode(&encoded).ok_or_else(|| {
            ProviderError::OperationFailed("malformed signature".to_string())
        })?;
        Ok(self
            .signature_keypair
            .verifying_key()
            .verify(message, &signature)
            .is_ok())
    }
}
