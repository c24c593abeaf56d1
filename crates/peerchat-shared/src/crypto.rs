use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{
    KDF_CONTEXT_PASSWORD, KDF_CONTEXT_ROOM_KEY, KDF_CONTEXT_ROOM_TOPIC, NONCE_SIZE,
    SYMMETRIC_KEY_SIZE,
};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn derive(context: &str, parts: &[&[u8]]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        // length prefix keeps ("ab", "c") and ("a", "bc") apart
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize()
}

/// Symmetric key protecting every frame of one room.
pub fn derive_room_key(app_scope: &str, secret: &str, topic: &str) -> SymmetricKey {
    let hash = derive(
        KDF_CONTEXT_ROOM_KEY,
        &[app_scope.as_bytes(), secret.as_bytes(), topic.as_bytes()],
    );
    *hash.as_bytes()
}

/// Public rendezvous name of a room. Peers that disagree on scope, secret or
/// topic end up on different names and never see each other.
pub fn derive_room_topic(app_scope: &str, secret: &str, topic: &str) -> String {
    let hash = derive(
        KDF_CONTEXT_ROOM_TOPIC,
        &[app_scope.as_bytes(), secret.as_bytes(), topic.as_bytes()],
    );
    format!("peerchat/{}", hash.to_hex())
}

/// Hex digest of a room password; this is the shared secret peers join with.
pub fn hash_password(password: &str) -> String {
    derive(KDF_CONTEXT_PASSWORD, &[password.as_bytes()])
        .to_hex()
        .to_string()
}
