//! Salted password hashing for the handshake.
//!
//! The client never sends its password. It sends
//! `SHA-256(interleave(SHA-256(password), salt))`, where the salt is a
//! random `i32` the server picked for this connection:
//!
//! ```text
//! hash:  h0 h1 h2 h3 h4 …
//! salt:  s0 s1 s2 s3          (little-endian bytes of the i32)
//! mixed: h0 s0 h1 s1 h2 s2 h3 s3 h4 s0 …
//! ```
//!
//! A captured response is useless against another connection's salt.
//! Nothing here protects against an attacker who can see the salt and
//! brute-force the password offline; the transport is not assumed to be
//! encrypted.

use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 password bytes.
pub fn hash_password(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Mixes the salt into a password hash and hashes the result again.
pub fn salt_password(hash: &[u8], salt: i32) -> Vec<u8> {
    let salt_bytes = salt.to_le_bytes();
    let mut mixed = Vec::with_capacity(hash.len() * 2);
    for (i, &byte) in hash.iter().enumerate() {
        mixed.push(byte);
        mixed.push(salt_bytes[i % 4]);
    }
    Sha256::digest(&mixed).to_vec()
}

/// What the client sends for `password` under `salt`.
pub fn salted_password_hash(password: &str, salt: i32) -> Vec<u8> {
    salt_password(&hash_password(password), salt)
}

/// The server's copy of its password. Only the unsalted hash is kept.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerPassword {
    hash: [u8; 32],
}

impl ServerPassword {
    pub fn new(password: &str) -> Self {
        Self {
            hash: hash_password(password),
        }
    }

    /// Whether `salted_hash` is this password salted with `salt`.
    pub fn verify(&self, salted_hash: &[u8], salt: i32) -> bool {
        salt_password(&self.hash, salt) == salted_hash
    }
}

impl std::fmt::Debug for ServerPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerPassword(..)")
    }
}
