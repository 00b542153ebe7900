//! Chunked stream copying with a zeroized buffer

use std::io::{self, ErrorKind, Read, Write};

use zeroize::Zeroizing;

/// Copy `reader` to `writer` through a `chunk_size` buffer until EOF.
///
/// Plaintext passes through the buffer on both sides of the pipeline, so it
/// is wiped when the copy ends. Returns the number of bytes copied.
pub fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = Zeroizing::new(vec![0u8; chunk_size.max(1)]);
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}
