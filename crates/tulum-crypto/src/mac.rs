//! Streaming HMAC-SHA256 over the ciphertext

use std::io::{self, Write};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use tulum_core::{TulumError, TulumResult};

use crate::{MAC_KEY_SIZE, MAC_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Accumulating MAC. Bytes must be fed in the order they were produced.
#[derive(Clone)]
pub struct Authenticator {
    mac: HmacSha256,
}

impl Authenticator {
    pub fn new(mac_key: &[u8]) -> TulumResult<Self> {
        if mac_key.len() != MAC_KEY_SIZE {
            return Err(TulumError::InvalidKey(format!(
                "MAC key is {} bytes (expected {MAC_KEY_SIZE})",
                mac_key.len()
            )));
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
            .map_err(|e| TulumError::InvalidKey(format!("HMAC init: {e}")))?;
        Ok(Self { mac })
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.mac.update(bytes);
    }

    pub fn finalize(self) -> [u8; MAC_SIZE] {
        let tag = self.mac.finalize().into_bytes();
        let mut out = [0u8; MAC_SIZE];
        out.copy_from_slice(&tag);
        out
    }
}

impl Write for Authenticator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Constant-time tag comparison. Tags of different lengths never match.
pub fn verify(expected: &[u8], computed: &[u8]) -> bool {
    expected.ct_eq(computed).into()
}

/// Tee: forwards bytes to `inner` and MACs exactly the bytes it accepted.
pub struct AuthenticatedWriter<'a, W: Write> {
    inner: W,
    mac: &'a mut Authenticator,
}

impl<'a, W: Write> AuthenticatedWriter<'a, W> {
    pub fn new(inner: W, mac: &'a mut Authenticator) -> Self {
        Self { inner, mac }
    }
}

impl<W: Write> Write for AuthenticatedWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.mac.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_matches_one_shot() {
        let key = [9u8; MAC_KEY_SIZE];
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut one = Authenticator::new(&key).unwrap();
        one.update(data);

        let mut many = Authenticator::new(&key).unwrap();
        for piece in data.chunks(5) {
            many.update(piece);
        }

        assert_eq!(one.finalize(), many.finalize());
    }

    #[test]
    fn test_key_changes_tag() {
        let mac = Authenticator::new(&[0u8; MAC_KEY_SIZE]).unwrap().finalize();
        let mut other = Authenticator::new(&[1u8; MAC_KEY_SIZE]).unwrap();
        other.update(b"");
        assert_ne!(mac, other.finalize(), "key must affect the tag");
    }

    #[test]
    fn test_verify() {
        let a = [3u8; MAC_SIZE];
        let mut b = a;
        assert!(verify(&a, &b));

        b[MAC_SIZE - 1] ^= 0x01;
        assert!(!verify(&a, &b));
        assert!(!verify(&a, &a[..MAC_SIZE - 1]), "length mismatch must not match");
        assert!(!verify(&a, &[]));
    }

    #[test]
    fn test_invalid_mac_key_size() {
        assert!(matches!(
            Authenticator::new(&[0u8; 8]),
            Err(TulumError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_authenticated_writer_tees() {
        let key = [4u8; MAC_KEY_SIZE];
        let mut mac = Authenticator::new(&key).unwrap();
        let mut sink = Vec::new();
        {
            let mut w = AuthenticatedWriter::new(&mut sink, &mut mac);
            w.write_all(b"abc").unwrap();
            w.write_all(b"def").unwrap();
        }
        assert_eq!(sink, b"abcdef");

        let mut direct = Authenticator::new(&key).unwrap();
        direct.update(b"abcdef");
        assert_eq!(mac.finalize(), direct.finalize());
    }
}
