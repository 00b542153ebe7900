//! Streaming AES-256-CTR
//!
//! Counter mode turns AES into a keystream; encryption and decryption are the
//! same XOR. The counter is the full 128-bit block, big-endian, starting at
//! the IV. The keystream position advances with every byte processed, so a
//! stream must see its bytes exactly once and in order.

use std::io::{self, Read, Write};

use ctr::cipher::{KeyIvInit, StreamCipher};

use tulum_core::{TulumError, TulumResult};

use crate::{ENC_KEY_SIZE, IV_SIZE};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// A positioned AES-256-CTR keystream.
pub struct CipherStream {
    cipher: Aes256Ctr,
}

impl CipherStream {
    /// Key the stream. `enc_key` must be 32 bytes and `iv` 16 bytes.
    pub fn new(enc_key: &[u8], iv: &[u8]) -> TulumResult<Self> {
        if enc_key.len() != ENC_KEY_SIZE {
            return Err(TulumError::InvalidKey(format!(
                "encryption key is {} bytes (expected {ENC_KEY_SIZE})",
                enc_key.len()
            )));
        }
        if iv.len() != IV_SIZE {
            return Err(TulumError::InvalidKey(format!(
                "IV is {} bytes (expected {IV_SIZE})",
                iv.len()
            )));
        }
        let cipher = Aes256Ctr::new_from_slices(enc_key, iv)
            .map_err(|e| TulumError::InvalidKey(format!("AES-256-CTR init: {e}")))?;
        Ok(Self { cipher })
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
    }

    /// Wrap a writer: plaintext written in comes out as ciphertext.
    pub fn encrypting_writer<W: Write>(self, inner: W) -> EncryptingWriter<W> {
        EncryptingWriter {
            stream: self,
            inner,
            scratch: Vec::new(),
        }
    }

    /// Wrap a reader: ciphertext read through comes out as plaintext.
    pub fn decrypting_reader<R: Read>(self, inner: R) -> DecryptingReader<R> {
        DecryptingReader {
            stream: self,
            inner,
        }
    }
}

/// Write-side transform. Each `write` consumes the whole buffer or fails.
pub struct EncryptingWriter<W: Write> {
    stream: CipherStream,
    inner: W,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The keystream has already advanced once applied, so a partial inner
        // write cannot be reported back; write_all or fail.
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.stream.apply(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read-side transform.
pub struct DecryptingReader<R: Read> {
    stream: CipherStream,
    inner: R,
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.stream.apply(&mut buf[..n]);
        Ok(n)
    }
}
