// prose-core-client/prose-omemo-core
//
// Copyright: 2023, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! AES-128-GCM payload encryption (§4.7 steps 3-5, §4.8 step 7). The legacy OMEMO wire format
//! keeps the ciphertext and the authentication tag in different places: the tag travels inside
//! the Signal-encrypted key-material, appended to the content key, while the ciphertext alone sits
//! in the stanza's `payload` element. Grounded in the reference client's `EncryptionDomainService`,
//! which names the same split `dek_and_mac`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use anyhow::Context;
use rand::RngCore;

use crate::error::OmemoError;
use crate::rng::RngProvider;

pub const KEY_SIZE: usize = 16;
pub const MAC_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;

/// A freshly generated content key and nonce (§4.7 step 3).
pub struct ContentKeyMaterial {
    pub key: [u8; KEY_SIZE],
    pub nonce: [u8; NONCE_SIZE],
}

pub fn generate_content_key_material(rng: &dyn RngProvider) -> ContentKeyMaterial {
    let mut csprng = rng.rng();
    let mut key = [0u8; KEY_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    csprng.fill_bytes(&mut key);
    csprng.fill_bytes(&mut nonce);
    ContentKeyMaterial { key, nonce }
}

/// Encrypts `plaintext`, returning the ciphertext and the 16-byte tag separately (§4.7 step 4).
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
) -> Result<(Vec<u8>, [u8; MAC_SIZE]), OmemoError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let mut combined = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| OmemoError::AesFailure)?;
    let tag_at = combined.len() - MAC_SIZE;
    let tag_bytes = combined.split_off(tag_at);
    let mut tag = [0u8; MAC_SIZE];
    tag.copy_from_slice(&tag_bytes);
    Ok((combined, tag))
}

/// Reassembles `ciphertext || tag` and decrypts it (§4.8 step 7), failing with
/// [`OmemoError::AesFailure`] on an authentication mismatch.
pub fn decrypt(
    ciphertext: &[u8],
    tag: &[u8; MAC_SIZE],
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, OmemoError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let mut combined = Vec::with_capacity(ciphertext.len() + MAC_SIZE);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(Nonce::from_slice(nonce), combined.as_ref())
        .map_err(|_| OmemoError::AesFailure)
}

/// Packs a content key and its tag into the 32-byte key-material handed to the Signal engine
/// (§4.7 step 5).
pub fn pack_key_material(key: &[u8; KEY_SIZE], tag: &[u8; MAC_SIZE]) -> Box<[u8]> {
    let mut material = Vec::with_capacity(KEY_SIZE + MAC_SIZE);
    material.extend_from_slice(key);
    material.extend_from_slice(tag);
    material.into_boxed_slice()
}

/// The inverse of [`pack_key_material`] (§4.8 step 7): splits Signal-decrypted material back
/// into a content key and a tag, failing if it isn't exactly 32 bytes.
pub fn unpack_key_material(
    material: &[u8],
) -> anyhow::Result<([u8; KEY_SIZE], [u8; MAC_SIZE])> {
    if material.len() != KEY_SIZE + MAC_SIZE {
        anyhow::bail!(
            "Expected {} bytes of key-material, got {}",
            KEY_SIZE + MAC_SIZE,
            material.len()
        );
    }
    let mut key = [0u8; KEY_SIZE];
    let mut tag = [0u8; MAC_SIZE];
    key.copy_from_slice(&material[..KEY_SIZE]);
    tag.copy_from_slice(&material[KEY_SIZE..]);
    Ok((key, tag))
}

pub fn nonce_from_slice(bytes: &[u8]) -> anyhow::Result<[u8; NONCE_SIZE]> {
    let nonce: [u8; NONCE_SIZE] = bytes
        .try_into()
        .context("OMEMO iv must be exactly 12 bytes")?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::mocks::StepRngProvider;

    #[test]
    fn round_trips_through_encrypt_and_decrypt() {
        let material = generate_content_key_material(&StepRngProvider::default());
        let plaintext = b"a message that needs protecting";

        let (ciphertext, tag) = encrypt(plaintext, &material.key, &material.nonce).unwrap();
        let decrypted = decrypt(&ciphertext, &tag, &material.key, &material.nonce).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let material = generate_content_key_material(&StepRngProvider::default());
        let (mut ciphertext, tag) = encrypt(b"hello", &material.key, &material.nonce).unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(matches!(
            decrypt(&ciphertext, &tag, &material.key, &material.nonce),
            Err(OmemoError::AesFailure)
        ));
    }

    #[test]
    fn packs_and_unpacks_key_material() {
        let key = [7u8; KEY_SIZE];
        let tag = [9u8; MAC_SIZE];
        let packed = pack_key_material(&key, &tag);
        assert_eq!(packed.len(), KEY_SIZE + MAC_SIZE);

        let (unpacked_key, unpacked_tag) = unpack_key_material(&packed).unwrap();
        assert_eq!(unpacked_key, key);
        assert_eq!(unpacked_tag, tag);
    }

    #[test]
    fn rejects_key_material_of_the_wrong_length() {
        assert!(unpack_key_material(&[0u8; 10]).is_err());
    }
}
