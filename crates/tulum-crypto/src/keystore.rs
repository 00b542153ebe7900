//! Key file persistence: generate-and-store on encrypt, load-and-derive on decrypt
//!
//! Key file format: standard base64 of the 32-byte source key, wrapped at
//! 76 characters per line, every line newline-terminated. The file is
//! created exclusively (never overwritten) and is readable by its owner only.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use tulum_core::{TulumError, TulumResult};

use crate::keys::{derive_keys, DerivedKeys, SourceKey};
use crate::SOURCE_KEY_SIZE;

/// Line width of the base64 key encoding
pub const KEY_LINE_WIDTH: usize = 76;

/// A key file location.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Draw a fresh source key, persist it, and return its derived subkeys.
    ///
    /// Fails with `KeyConflict` if anything already exists at the path; the
    /// existing file is left untouched.
    pub fn generate<R: RngCore + CryptoRng>(&self, rng: &mut R) -> TulumResult<DerivedKeys> {
        let source = SourceKey::generate(rng);
        let keys = derive_keys(&source)?;

        let mut file = create_exclusive(&self.path)?;
        let encoded = encode_wrapped(source.as_bytes());
        if let Err(e) = file.write_all(encoded.as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            // The file is ours (exclusive create), so a half-written key is removed.
            let _ = fs::remove_file(&self.path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "wrote new key file");
        Ok(keys)
    }

    /// Read the key file and re-derive its subkeys.
    pub fn load(&self) -> TulumResult<DerivedKeys> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(s) => Zeroizing::new(s),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TulumError::KeyNotFound(self.path.clone()))
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(TulumError::KeyFormat("key file is not UTF-8 text".into()))
            }
            Err(e) => return Err(e.into()),
        };

        let source = decode_wrapped(&contents)?;
        debug!(path = %self.path.display(), "loaded key file");
        derive_keys(&source)
    }
}

#[cfg(unix)]
fn create_exclusive(path: &Path) -> TulumResult<File> {
    use std::os::unix::fs::OpenOptionsExt;

    // Owner read-only from the moment the inode exists; the descriptor
    // returned here is still writable.
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o400)
        .open(path)
        .map_err(|e| map_create_error(path, e))
}

#[cfg(not(unix))]
fn create_exclusive(path: &Path) -> TulumResult<File> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| map_create_error(path, e))?;
    let mut perms = file.metadata()?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)?;
    Ok(file)
}

fn map_create_error(path: &Path, e: std::io::Error) -> TulumError {
    if e.kind() == ErrorKind::AlreadyExists {
        TulumError::KeyConflict(path.to_path_buf())
    } else {
        TulumError::Io(e)
    }
}

/// Base64-encode `bytes` with fixed-width line wrapping.
pub fn encode_wrapped(bytes: &[u8]) -> Zeroizing<String> {
    let mut flat = STANDARD.encode(bytes);
    let mut out = String::with_capacity(flat.len() + flat.len() / KEY_LINE_WIDTH + 1);
    // base64 output is ASCII, so every byte offset is a char boundary
    for start in (0..flat.len()).step_by(KEY_LINE_WIDTH) {
        let end = (start + KEY_LINE_WIDTH).min(flat.len());
        out.push_str(&flat[start..end]);
        out.push('\n');
    }
    if out.is_empty() {
        out.push('\n');
    }
    flat.zeroize();
    Zeroizing::new(out)
}

/// Decode a wrapped base64 key file body into a source key.
pub fn decode_wrapped(text: &str) -> TulumResult<SourceKey> {
    let flat: Zeroizing<String> =
        Zeroizing::new(text.chars().filter(|c| !c.is_ascii_whitespace()).collect());

    let mut raw = STANDARD
        .decode(flat.as_bytes())
        .map_err(|e| TulumError::KeyFormat(format!("base64 decode: {e}")))?;

    if raw.len() != SOURCE_KEY_SIZE {
        let len = raw.len();
        raw.zeroize();
        return Err(TulumError::KeyFormat(format!(
            "decoded key has wrong size: {len} bytes (expected {SOURCE_KEY_SIZE})"
        )));
    }

    let mut bytes = [0u8; SOURCE_KEY_SIZE];
    bytes.copy_from_slice(&raw);
    raw.zeroize();
    Ok(SourceKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_load() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path().join("key.asc"));

        let generated = store.generate(&mut StdRng::seed_from_u64(1)).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(generated.enc_key(), loaded.enc_key());
        assert_eq!(generated.mac_key(), loaded.mac_key());
    }

    #[test]
    fn test_key_file_is_wrapped_base64() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path().join("key.asc"));
        store.generate(&mut StdRng::seed_from_u64(2)).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.ends_with('\n'));
        // 32 bytes -> 44 base64 chars, one line
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text.trim_end().len(), 44);
    }

    #[test]
    fn test_generate_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.asc");
        fs::write(&path, "do not touch\n").unwrap();

        let store = KeyStore::new(&path);
        let err = store.generate(&mut StdRng::seed_from_u64(3)).unwrap_err();

        assert!(matches!(err, TulumError::KeyConflict(p) if p == path));
        assert_eq!(fs::read_to_string(&path).unwrap(), "do not touch\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path().join("key.asc"));
        store.generate(&mut StdRng::seed_from_u64(4)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.asc");
        let err = KeyStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TulumError::KeyNotFound(p) if p == path));
    }

    #[test]
    fn test_load_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.asc");
        fs::write(&path, "!!! not base64 !!!\n").unwrap();

        let err = KeyStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TulumError::KeyFormat(_)));
    }

    #[test]
    fn test_load_wrong_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.asc");
        fs::write(&path, encode_wrapped(&[5u8; 16]).as_bytes()).unwrap();

        let err = KeyStore::new(&path).load().unwrap_err();
        assert!(matches!(err, TulumError::KeyFormat(_)));
    }

    #[test]
    fn test_encode_wraps_at_line_width() {
        let encoded = encode_wrapped(&[0xFFu8; 100]);
        let lines: Vec<&str> = encoded.lines().collect();

        // 100 bytes -> 136 chars -> 76 + 60
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), KEY_LINE_WIDTH);
        assert_eq!(lines[1].len(), 60);
    }

    #[test]
    fn test_decode_accepts_wrapped_and_crlf() {
        let key = [0x3Cu8; SOURCE_KEY_SIZE];
        let encoded = encode_wrapped(&key);
        let crlf = encoded.replace('\n', "\r\n");

        assert_eq!(decode_wrapped(&encoded).unwrap().as_bytes(), &key);
        assert_eq!(decode_wrapped(&crlf).unwrap().as_bytes(), &key);
    }
}
