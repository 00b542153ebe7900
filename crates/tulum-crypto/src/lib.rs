//! tulum-crypto: symmetric file encryption with verify-before-use staging
//!
//! Architecture: Encrypt-then-MAC with AES-256-CTR and HMAC-SHA256
//!
//! Pipeline (encrypt): plaintext → AES-256-CTR → staging file (+ HMAC) → envelope
//! Pipeline (decrypt): envelope → staging file (+ HMAC) → verify → AES-256-CTR → plaintext
//!
//! The MAC covers `IV || ciphertext`; plaintext is never MACed.
//!
//! Key hierarchy:
//! ```text
//! Source Key (256-bit random, persisted base64 in the key file)
//!   └── HKDF-SHA256 (no salt, empty info) → 512 bits
//!       ├── Encryption Key (first 256 bits, AES-256-CTR)
//!       └── MAC Key (last 256 bits, HMAC-SHA256)
//! ```
//!
//! Envelope format (little-endian):
//! ```text
//! [i64 header_size][header: u32 iv_len | iv | u32 mac_len | mac | i64 ct_size][ciphertext]
//! ```

pub mod cipher;
pub mod envelope;
pub mod janitor;
pub mod keys;
pub mod keystore;
pub mod mac;
pub mod pipeline;
pub mod staging;
pub mod stream;

pub use cipher::{CipherStream, DecryptingReader, EncryptingWriter};
pub use envelope::{read_header, write_envelope, EnvelopeHeader};
pub use janitor::{Janitor, RemovalGuard, Reservation};
pub use keys::{derive_keys, DerivedKeys, SourceKey};
pub use keystore::KeyStore;
pub use mac::{verify, AuthenticatedWriter, Authenticator};
pub use pipeline::{decrypt, encrypt, EngineContext};
pub use staging::StagingArea;
pub use tulum_core::{TulumError, TulumResult};

/// Size of the persisted source key in bytes (256-bit)
pub const SOURCE_KEY_SIZE: usize = 32;

/// Size of the AES-256 encryption subkey
pub const ENC_KEY_SIZE: usize = 32;

/// Size of the HMAC-SHA256 subkey
pub const MAC_KEY_SIZE: usize = 32;

/// Size of the AES-CTR initial counter block
pub const IV_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag
pub const MAC_SIZE: usize = 32;
