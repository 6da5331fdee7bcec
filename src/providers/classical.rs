// ============================================================================
// Classical Crypto Provider
// ============================================================================
//
// Independently implemented classical primitives, used as the fallback arm
// of the hybrid gateway:
// - Encryption: ephemeral-static X25519 + ChaCha20-Poly1305
// - Signatures: Ed25519
//
// Wire format for ciphertext:
//   ephemeral_public (32 bytes) || nonce (12 bytes) || aead_box
//
// This provider must always succeed on well-formed input; it is the safety
// net the hybrid_mode invariant guarantees.
//
// ============================================================================

use super::{CryptoAlgorithm, CryptoProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};

const X25519_PUBLIC_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const ED25519_SIGNATURE_LEN: usize = 64;

pub struct ClassicalProvider {
    kem_secret: StaticSecret,
    kem_public: X25519PublicKey,
    signing_key: SigningKey,
}

impl ClassicalProvider {
    /// Creates a provider with freshly generated long-lived keys.
    pub fn generate() -> Self {
        let kem_secret = StaticSecret::random_from_rng(OsRng);
        let kem_public = X25519PublicKey::from(&kem_secret);
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            kem_secret,
            kem_public,
            signing_key,
        }
    }

}

#[async_trait]
impl CryptoProvider for ClassicalProvider {
    fn algorithm(&self) -> CryptoAlgorithm {
        CryptoAlgorithm::Classical
    }

    /// Exports the public bundle of a fresh keypair:
    /// x25519_public (32) || ed25519_public (32)
    async fn generate_keys(&self) -> ProviderResult<Vec<u8>> {
        let kem_secret = StaticSecret::random_from_rng(OsRng);
        let kem_public = X25519PublicKey::from(&kem_secret);
        let signing_key = SigningKey::generate(&mut OsRng);

        let mut bundle = kem_public.as_bytes().to_vec();
        bundle.extend_from_slice(signing_key.verifying_key().as_bytes());
        Ok(bundle)
    }

    async fn encrypt(&self, plaintext: &[u8]) -> ProviderResult<Vec<u8>> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

        let shared_secret = ephemeral_secret.diffie_hellman(&self.kem_public);

        let cipher = ChaCha20Poly1305::new(shared_secret.as_bytes().into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ProviderError::OperationFailed(format!("encryption failed: {:?}", e)))?;

        // [ephemeral_public (32) | nonce (12) | ciphertext]
        let mut result = ephemeral_public.as_bytes().to_vec();
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> ProviderResult<Vec<u8>> {
        if ciphertext.len() < X25519_PUBLIC_KEY_LEN + NONCE_LEN {
            return Err(ProviderError::OperationFailed(
                "ciphertext too short".to_string(),
            ));
        }

        let ephemeral_bytes: [u8; 32] = ciphertext[..X25519_PUBLIC_KEY_LEN]
            .try_into()
            .map_err(|_| ProviderError::OperationFailed("malformed ephemeral key".to_string()))?;
        let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);

        let nonce_bytes = &ciphertext[X25519_PUBLIC_KEY_LEN..X25519_PUBLIC_KEY_LEN + NONCE_LEN];
        let sealed = &ciphertext[X25519_PUBLIC_KEY_LEN + NONCE_LEN..];

        let shared_secret = self.kem_secret.diffie_hellman(&ephemeral_public);

        let cipher = ChaCha20Poly1305::new(shared_secret.as_bytes().into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|e| ProviderError::OperationFailed(format!("decryption failed: {:?}", e)))?;
        Ok(plaintext)
    }

    async fn sign(&self, message: &[u8]) -> ProviderResult<Vec<u8>> {
        let signature = self.signing_key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    async fn verify(&self, message: &[u8], signature: &[u8]) -> ProviderResult<bool> {
        if signature.len() != ED25519_SIGNATURE_LEN {
            return Err(ProviderError::OperationFailed(format!(
                "signature must be {} bytes (got {})",
                ED25519_SIGNATURE_LEN,
                signature.len()
            )));
        }
        let signature = Signature::from_slice(signature)
            .map_err(|e| ProviderError::OperationFailed(format!("malformed signature: {}", e)))?;
        Ok(self
            .signing_key
            .verifying_key()
            .verify(message, &signature)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip() {
        let provider = ClassicalProvider::generate();
        let plaintext = b"attack at dawn";

        let ciphertext = provider.encrypt(plaintext).await.unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = provider.decrypt(&ciphertext).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn test_decrypt_rejects_truncated_input() {
        let provider = ClassicalProvider::generate();
        let result = provider.decrypt(&[0u8; 10]).await;
        assert!(matches!(result, Err(ProviderError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_decrypt_rejects_tampered_ciphertext() {
        let provider = ClassicalProvider::generate();
        let mut ciphertext = provider.encrypt(b"payload").await.unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        assert!(provider.decrypt(&ciphertext).await.is_err());
    }

    #[tokio::test]
    async fn test_sign_verify_round_trip() {
        let provider = ClassicalProvider::generate();
        let message = b"key bundle v1";

        let signature = provider.sign(message).await.unwrap();
        assert_eq!(signature.len(), ED25519_SIGNATURE_LEN);
        assert!(provider.verify(message, &signature).await.unwrap());
        assert!(!provider.verify(b"different message", &signature).await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_keys_exports_public_bundle() {
        let provider = ClassicalProvider::generate();
        let bundle = provider.generate_keys().await.unwrap();
        assert_eq!(bundle.len(), 64);

        // Fresh keys each time
        let second = provider.generate_keys().await.unwrap();
        assert_ne!(bundle, second);
    }
}
