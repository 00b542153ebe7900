//! Temp-file staging for ciphertext
//!
//! The MAC has to cover the whole ciphertext before any of it is released
//! (encrypt) or decrypted (decrypt), and an input stream can only be read
//! once, so ciphertext is parked in a scratch file and re-read from the start.
//!
//! Two paths can remove a staging file: dropping the `StagingArea` (normal
//! and error returns) and the janitor (signal-driven interruption). Both go
//! through one `RemovalGuard`, so whichever runs second does nothing.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use tulum_core::{TulumError, TulumResult};

use crate::janitor::{Janitor, RemovalGuard};

/// An exclusively-owned scratch file: write, `rewind`, read, drop.
#[derive(Debug)]
pub struct StagingArea {
    file: File,
    // Declared after `file` so the handle is closed before the path is unlinked.
    guard: RemovalGuard,
}

impl StagingArea {
    /// Create a uniquely-named staging file in `scratch_dir` and register its
    /// removal with `janitor`. Fails once the janitor has been closed.
    pub fn acquire(scratch_dir: &Path, prefix: &str, janitor: &Janitor) -> TulumResult<Self> {
        let reservation = janitor
            .reserve()
            .ok_or_else(|| TulumError::Resource("shutting down, staging refused".into()))?;

        let named = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(scratch_dir)
            .map_err(|e| {
                TulumError::Resource(format!(
                    "creating staging file in {}: {e}",
                    scratch_dir.display()
                ))
            })?;

        // Take over deletion from tempfile so both cleanup paths share one flag.
        let (file, path) = named
            .keep()
            .map_err(|e| TulumError::Resource(format!("detaching staging file: {}", e.error)))?;

        let guard = RemovalGuard::new(path, reservation);
        debug!(path = %guard.path().display(), "acquired staging file");
        Ok(Self { file, guard })
    }

    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    /// Seek back to the start for the consuming pass.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Delete the staging file now rather than at drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Write for StagingArea {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Read for StagingArea {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
