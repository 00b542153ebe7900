//! The two entry points: `encrypt` and `decrypt`
//!
//! Both run the same sequence of stages and never branch except to fail:
//!
//! ```text
//! key resolution → staging → transform + authenticate → [verify] → emit → cleanup
//! ```
//!
//! Cleanup always runs. On decrypt, nothing reaches the output until the
//! MAC over the staged ciphertext has been verified.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use tulum_core::config::TulumConfig;
use tulum_core::{TulumError, TulumResult};

use crate::cipher::CipherStream;
use crate::envelope::{read_header, write_envelope, EnvelopeHeader};
use crate::janitor::{Janitor, RemovalGuard};
use crate::keystore::KeyStore;
use crate::mac::{verify, AuthenticatedWriter, Authenticator};
use crate::staging::StagingArea;
use crate::stream::copy_chunked;
use crate::IV_SIZE;

/// Everything an operation needs besides its streams and key path.
///
/// Each operation drains the janitor when it finishes, so operations that
/// share a context (and therefore a janitor) must not overlap.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub scratch_dir: PathBuf,
    pub staging_prefix: String,
    pub chunk_size: usize,
    pub janitor: Janitor,
}

impl EngineContext {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            staging_prefix: "tulum-".into(),
            chunk_size: 64 * 1024,
            janitor: Janitor::new(),
        }
    }

    /// Build from validated config, sharing `janitor` with the caller.
    pub fn from_config(config: &TulumConfig, janitor: Janitor) -> TulumResult<Self> {
        config.validate()?;
        Ok(Self {
            scratch_dir: config.staging.resolved_scratch_dir(),
            staging_prefix: config.staging.prefix.clone(),
            chunk_size: config.staging.chunk_size,
            janitor,
        })
    }

    fn stage(&self) -> TulumResult<StagingArea> {
        StagingArea::acquire(&self.scratch_dir, &self.staging_prefix, &self.janitor)
    }

    /// Cleanup stage: runs whatever the operation left registered.
    fn finish<T>(&self, result: TulumResult<T>) -> TulumResult<T> {
        let cleaned = self.janitor.run_all();
        match &result {
            Ok(_) => debug!(cleaned, "operation complete"),
            Err(e) => debug!(cleaned, error = %e, "operation failed"),
        }
        result
    }
}

/// Encrypt `input` to `output`, writing a freshly generated key to `key_path`.
///
/// The key file is created exclusively; an existing file at `key_path` fails
/// the operation with `KeyConflict` before any input is read. If any later
/// stage fails the new key file is removed again, so the call can be retried.
pub fn encrypt<R, W, G>(
    ctx: &EngineContext,
    mut input: R,
    mut output: W,
    rng: &mut G,
    key_path: &Path,
) -> TulumResult<()>
where
    R: Read,
    W: Write,
    G: RngCore + CryptoRng,
{
    let result = encrypt_staged(ctx, &mut input, &mut output, rng, key_path);
    ctx.finish(result)
}

/// Decrypt `input` to `output` with the key stored at `key_path`.
///
/// Fails with `Authentication` and writes nothing if the ciphertext, IV or
/// MAC was altered.
pub fn decrypt<R, W>(
    ctx: &EngineContext,
    mut input: R,
    mut output: W,
    key_path: &Path,
) -> TulumResult<()>
where
    R: Read,
    W: Write,
{
    let result = decrypt_staged(ctx, &mut input, &mut output, key_path);
    ctx.finish(result)
}

fn encrypt_staged<G: RngCore + CryptoRng>(
    ctx: &EngineContext,
    input: &mut dyn Read,
    output: &mut dyn Write,
    rng: &mut G,
    key_path: &Path,
) -> TulumResult<()> {
    let reservation = ctx
        .janitor
        .reserve()
        .ok_or_else(|| TulumError::Resource("shutting down, key generation refused".into()))?;
    let keys = KeyStore::new(key_path).generate(rng)?;
    // Provisional until the envelope has been emitted in full.
    let key_file = RemovalGuard::new(key_path, reservation);

    let mut iv = [0u8; IV_SIZE];
    rng.fill_bytes(&mut iv);

    let mut staging = ctx.stage()?;
    let mut mac = Authenticator::new(keys.mac_key())?;
    mac.update(&iv);

    let ct_size = {
        let sink = AuthenticatedWriter::new(&mut staging, &mut mac);
        let mut encryptor = CipherStream::new(keys.enc_key(), &iv)?.encrypting_writer(sink);
        let n = copy_chunked(input, &mut encryptor, ctx.chunk_size)?;
        encryptor.flush()?;
        n
    };
    drop(keys);
    debug!(ct_size, "plaintext encrypted to staging");

    staging.rewind()?;
    let header = EnvelopeHeader {
        iv,
        mac: mac.finalize(),
        ct_size,
    };
    let written = write_envelope(output, &header, &mut staging, ctx.chunk_size)?;
    output.flush()?;
    key_file.disarm();

    info!(ct_size, written, key = %key_path.display(), "encrypted");
    Ok(())
}

fn decrypt_staged(
    ctx: &EngineContext,
    input: &mut dyn Read,
    output: &mut dyn Write,
    key_path: &Path,
) -> TulumResult<()> {
    let keys = KeyStore::new(key_path).load()?;
    let header = read_header(input)?;

    let mut staging = ctx.stage()?;
    let mut mac = Authenticator::new(keys.mac_key())?;
    mac.update(&header.iv);

    let copied = {
        let mut sink = AuthenticatedWriter::new(&mut staging, &mut mac);
        let mut ciphertext = (&mut *input).take(header.ct_size);
        let n = copy_chunked(&mut ciphertext, &mut sink, ctx.chunk_size)?;
        sink.flush()?;
        n
    };
    if copied != header.ct_size {
        return Err(TulumError::Format(format!(
            "ciphertext truncated: {copied} of {} bytes",
            header.ct_size
        )));
    }

    if !verify(&header.mac, &mac.finalize()) {
        return Err(TulumError::Authentication);
    }
    debug!(ct_size = header.ct_size, "MAC verified");

    staging.rewind()?;
    let mut plaintext =
        CipherStream::new(keys.enc_key(), &header.iv)?.decrypting_reader(&mut staging);
    let written = copy_chunked(&mut plaintext, output, ctx.chunk_size)?;
    output.flush()?;

    info!(written, key = %key_path.display(), "decrypted");
    Ok(())
}
