use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use hkdf::Hkdf;
use rand::RngCore;
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use crate::models::tenant::{EncryptedBlob, RelaySettings};

/// Derives the tenant-specific key from the master key.
pub fn derive_tenant_key(master_key: &[u8], tenant: &str) -> Result<[u8; 32]> {
    if master_key.len() != 32 {
        anyhow::bail!("Master key must be exactly 32 bytes");
    }

    let hk = Hkdf::<Sha256>::new(None, master_key);
    let info = format!("leadflow-tenant-{}", tenant);
    let mut tenant_key = [0u8; 32];
    hk.expand(info.as_bytes(), &mut tenant_key)
        .map_err(|_| anyhow::anyhow!("Failed to derive tenant key"))?;

    Ok(tenant_key)
}

/// AES-256-GCM encryption.
///
/// Returns `(ciphertext, iv, tag)`; the tag is split off the end of the aead output.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;

    // 96-bit random nonce
    let mut iv = vec![0u8; 12];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    let tag_start = ciphertext.len().saturating_sub(16);
    let encrypted_data = ciphertext[..tag_start].to_vec();
    let tag = ciphertext[tag_start..].to_vec();

    Ok((encrypted_data, iv, tag))
}

pub fn decrypt(ciphertext: &[u8], iv: &[u8], tag: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    if iv.len() != 12 {
        anyhow::bail!("IV must be exactly 12 bytes");
    }
    if tag.len() != 16 {
        anyhow::bail!("Authentication tag must be exactly 16 bytes");
    }

    let cipher = Aes256Gcm::new_from_slice(key).context("Failed to create cipher")?;
    let nonce = Nonce::from_slice(iv);

    let mut combined = ciphertext.to_vec();
    combined.extend_from_slice(tag);

    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|e| anyhow::anyhow!("Decryption failed (data may be corrupted or tampered): {}", e))
}

/// Seals and opens tenant relay settings with per-tenant derived keys.
#[derive(Clone)]
pub struct CredentialCipher {
    master_key: [u8; 32],
}

impl CredentialCipher {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    pub fn from_hex(master_key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(master_key_hex.trim()).context("Master key is not valid hex")?;
        let master_key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Master key must be exactly 32 bytes"))?;
        Ok(Self { master_key })
    }

    fn tenant_key(&self, tenant_id: Uuid) -> Result<[u8; 32]> {
        derive_tenant_key(&self.master_key, &tenant_id.to_string())
    }

    pub fn encrypt_settings(&self, tenant_id: Uuid, settings: &RelaySettings) -> Result<EncryptedBlob> {
        let key = self.tenant_key(tenant_id)?;
        let plaintext = serde_json::to_vec(settings)?;
        let (ciphertext, iv, tag) = encrypt(&plaintext, &key)?;
        Ok(EncryptedBlob {
            ciphertext: hex::encode(ciphertext),
            iv: hex::encode(iv),
            tag: hex::encode(tag),
        })
    }

    /// Opens the stored blob. Any failure (shape, hex, tag, JSON) is one error.
    pub fn decrypt_settings(&self, tenant_id: Uuid, stored: &Value) -> Result<RelaySettings> {
        let blob: EncryptedBlob =
            serde_json::from_value(stored.clone()).context("Malformed credential blob")?;
        let key = self.tenant_key(tenant_id)?;
        let plaintext = decrypt(
            &hex::decode(&blob.ciphertext).context("Invalid ciphertext hex")?,
            &hex::decode(&blob.iv).context("Invalid iv hex")?,
            &hex::decode(&blob.tag).context("Invalid tag hex")?,
            &key,
        )?;
        serde_json::from_slice(&plaintext).context("Decrypted settings are not valid JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RelaySettings {
        RelaySettings {
            host: "smtp.example.com".into(),
            port: Some(465),
            username: "mailer".into(),
            password: "s3cret".into(),
            from_email: "quotes@example.com".into(),
            from_name: Some("Example Heating".into()),
        }
    }

    #[test]
    fn derived_keys_are_deterministic_and_tenant_specific() {
        let master_key = [0u8; 32];
        let key1 = derive_tenant_key(&master_key, "tenant1").unwrap();
        let key2 = derive_tenant_key(&master_key, "tenant2").unwrap();
        assert_eq!(key1, derive_tenant_key(&master_key, "tenant1").unwrap());
        assert_ne!(key1, key2);
    }

    #[test]
    fn short_master_key_is_rejected() {
        assert!(derive_tenant_key(&[1u8; 16], "t").is_err());
        assert!(CredentialCipher::from_hex("abcd").is_err());
        assert!(CredentialCipher::from_hex("not hex at all").is_err());
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let (ciphertext, iv, tag) = encrypt(b"Secret message", &[42u8; 32]).unwrap();
        assert!(decrypt(&ciphertext, &iv, &tag, &[99u8; 32]).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = [42u8; 32];
        let (mut ciphertext, iv, tag) = encrypt(b"Original data", &key).unwrap();
        ciphertext[0] ^= 1;
        assert!(decrypt(&ciphertext, &iv, &tag, &key).is_err());
    }

    #[test]
    fn relay_settings_survive_sealing() {
        let cipher = CredentialCipher::from_hex(&"11".repeat(32)).unwrap();
        let tenant = Uuid::new_v4();
        let blob = cipher.encrypt_settings(tenant, &settings()).unwrap();
        let stored = serde_json::to_value(&blob).unwrap();

        let opened = cipher.decrypt_settings(tenant, &stored).unwrap();
        assert_eq!(opened.host, "smtp.example.com");
        assert_eq!(opened.password, "s3cret");
        assert_eq!(opened.port, Some(465));
    }

    #[test]
    fn blob_sealed_for_another_tenant_is_unusable() {
        let cipher = CredentialCipher::new([7u8; 32]);
        let blob = cipher.encrypt_settings(Uuid::new_v4(), &settings()).unwrap();
        let stored = serde_json::to_value(&blob).unwrap();
        assert!(cipher.decrypt_settings(Uuid::new_v4(), &stored).is_err());
        assert!(cipher
            .decrypt_settings(Uuid::new_v4(), &serde_json::json!({"iv": "00"}))
            .is_err());
    }
}
