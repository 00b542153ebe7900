//! Ciphertext envelope framing
//!
//! Wire format (all integers little-endian):
//! ```text
//! [8 bytes: i64 header_size][header_size bytes: header][ct_size bytes: ciphertext]
//!
//! header = [u32 iv_len][iv][u32 mac_len][mac][i64 ct_size]
//! ```
//!
//! The length prefix lets a reader isolate the header before touching any
//! ciphertext. `ct_size` delimits the ciphertext exactly.

use std::io::{self, ErrorKind, Read, Write};

use tulum_core::{TulumError, TulumResult};

use crate::stream::copy_chunked;
use crate::{IV_SIZE, MAC_SIZE};

/// Upper bound on the encoded header. A real header is 64 bytes.
pub const MAX_HEADER_SIZE: usize = 4096;

/// Encoded size of a header carrying a 16-byte IV and 32-byte MAC.
pub const HEADER_SIZE: usize = 4 + IV_SIZE + 4 + MAC_SIZE + 8;

/// Per-envelope metadata written ahead of the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub iv: [u8; IV_SIZE],
    pub mac: [u8; MAC_SIZE],
    pub ct_size: u64,
}

impl EnvelopeHeader {
    /// Encode into the fixed header layout.
    pub fn to_bytes(&self) -> TulumResult<Vec<u8>> {
        let ct_size = i64::try_from(self.ct_size)
            .map_err(|_| TulumError::Format(format!("ciphertext too large: {}", self.ct_size)))?;

        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&(IV_SIZE as u32).to_le_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&(MAC_SIZE as u32).to_le_bytes());
        out.extend_from_slice(&self.mac);
        out.extend_from_slice(&ct_size.to_le_bytes());
        Ok(out)
    }

    /// Decode a header block. The block must be consumed exactly.
    pub fn from_bytes(data: &[u8]) -> TulumResult<Self> {
        let mut cur = Cursor { data, pos: 0 };

        let iv_len = cur.u32("iv length")? as usize;
        if iv_len != IV_SIZE {
            return Err(TulumError::Format(format!(
                "IV length {iv_len} (expected {IV_SIZE})"
            )));
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(cur.take(IV_SIZE, "iv")?);

        let mac_len = cur.u32("mac length")? as usize;
        if mac_len != MAC_SIZE {
            return Err(TulumError::Format(format!(
                "MAC length {mac_len} (expected {MAC_SIZE})"
            )));
        }
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(cur.take(MAC_SIZE, "mac")?);

        let ct_size = cur.i64("ciphertext size")?;
        let ct_size = u64::try_from(ct_size)
            .map_err(|_| TulumError::Format(format!("negative ciphertext size {ct_size}")))?;

        if cur.pos != data.len() {
            return Err(TulumError::Format(format!(
                "{} trailing bytes in header",
                data.len() - cur.pos
            )));
        }

        Ok(Self { iv, mac, ct_size })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, field: &str) -> TulumResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(TulumError::Format(format!("header truncated in {field}")));
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self, field: &str) -> TulumResult<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4, field)?);
        Ok(u32::from_le_bytes(b))
    }

    fn i64(&mut self, field: &str) -> TulumResult<i64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8, field)?);
        Ok(i64::from_le_bytes(b))
    }
}

/// Write the length prefix, the header, then exactly `header.ct_size` bytes
/// of ciphertext from `ciphertext`. Returns the total bytes written.
pub fn write_envelope<W, R>(
    output: &mut W,
    header: &EnvelopeHeader,
    ciphertext: &mut R,
    chunk_size: usize,
) -> TulumResult<u64>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    let block = header.to_bytes()?;
    output.write_all(&(block.len() as i64).to_le_bytes())?;
    output.write_all(&block)?;

    let copied = copy_chunked(&mut ciphertext.take(header.ct_size), output, chunk_size)?;
    if copied != header.ct_size {
        return Err(TulumError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!(
                "ciphertext source ended after {copied} of {} bytes",
                header.ct_size
            ),
        )));
    }

    Ok(8 + block.len() as u64 + copied)
}

/// Read the length prefix and header. The ciphertext is left in `input`.
pub fn read_header<R: Read + ?Sized>(input: &mut R) -> TulumResult<EnvelopeHeader> {
    let mut prefix = [0u8; 8];
    read_exact_or_format(input, &mut prefix, "length prefix")?;

    let size = i64::from_le_bytes(prefix);
    if size <= 0 || size as u64 > MAX_HEADER_SIZE as u64 {
        return Err(TulumError::Format(format!(
            "header size {size} outside 1..={MAX_HEADER_SIZE}"
        )));
    }

    let mut block = vec![0u8; size as usize];
    read_exact_or_format(input, &mut block, "header")?;
    EnvelopeHeader::from_bytes(&block)
}

fn read_exact_or_format<R: Read + ?Sized>(
    input: &mut R,
    buf: &mut [u8],
    what: &str,
) -> TulumResult<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TulumError::Format(format!("input ended inside {what}"))
        } else {
            TulumError::Io(e)
        }
    })
}
