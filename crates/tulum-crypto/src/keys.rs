//! Key material: the persisted source key and the subkeys split from it

use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use tulum_core::{TulumError, TulumResult};

use crate::{ENC_KEY_SIZE, MAC_KEY_SIZE, SOURCE_KEY_SIZE};

/// The 256-bit secret stored in the key file. Zeroized on drop.
pub struct SourceKey {
    bytes: [u8; SOURCE_KEY_SIZE],
}

impl SourceKey {
    pub fn from_bytes(bytes: [u8; SOURCE_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Draw a fresh source key from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SOURCE_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SOURCE_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SourceKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encryption and MAC subkeys. The two halves never share bytes.
#[derive(Clone)]
pub struct DerivedKeys {
    enc_key: [u8; ENC_KEY_SIZE],
    mac_key: [u8; MAC_KEY_SIZE],
}

impl DerivedKeys {
    pub fn enc_key(&self) -> &[u8; ENC_KEY_SIZE] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.mac_key
    }
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("enc_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

/// Split a source key into encryption and MAC subkeys via HKDF-SHA256.
///
/// No salt and an empty info string. One 64-byte expansion is cut in half:
/// the first 32 bytes key AES, the last 32 key HMAC.
pub fn derive_keys(source: &SourceKey) -> TulumResult<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, source.as_bytes());
    let mut okm = [0u8; ENC_KEY_SIZE + MAC_KEY_SIZE];
    hkdf.expand(&[], &mut okm)
        .map_err(|e| TulumError::InvalidKey(format!("HKDF expand failed: {e}")))?;

    let mut keys = DerivedKeys {
        enc_key: [0u8; ENC_KEY_SIZE],
        mac_key: [0u8; MAC_KEY_SIZE],
    };
    keys.enc_key.copy_from_slice(&okm[..ENC_KEY_SIZE]);
    keys.mac_key.copy_from_slice(&okm[ENC_KEY_SIZE..]);
    okm.zeroize();

    Ok(keys)
}
