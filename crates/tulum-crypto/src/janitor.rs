//! Registry of pending cleanups shared between the pipeline and the
//! interrupt handler
//!
//! The pipeline drains the registry when an operation ends; the CLI's signal
//! listener closes it when the process is asked to terminate. Either may run
//! first, so every registered cleanup must tolerate its resource already
//! being gone.
//!
//! Files that must not outlive a failed or interrupted operation are created
//! under a `Reservation`, which holds the registry lock from creation until
//! the cleanup is queued. `close` takes the same lock, so a file is either
//! refused or cleaned up; it cannot slip in between.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Registry {
    cleanups: Vec<Cleanup>,
    closed: bool,
}

impl Registry {
    fn drain(&mut self) -> usize {
        let count = self.cleanups.len();
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
        count
    }
}

/// Cloneable handle; all clones share one registry.
#[derive(Clone, Default)]
pub struct Janitor {
    registry: Arc<Mutex<Registry>>,
}

impl Janitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a cleanup to run on the next `run_all`. Once the janitor is
    /// closed the cleanup runs immediately instead.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut registry = self.lock();
        if registry.closed {
            drop(registry);
            cleanup();
            return;
        }
        registry.cleanups.push(Box::new(cleanup));
    }

    /// Lock the registry so a resource can be created and registered in one
    /// step. `None` once the janitor is closed.
    pub fn reserve(&self) -> Option<Reservation<'_>> {
        let registry = self.lock();
        if registry.closed {
            return None;
        }
        Some(Reservation { registry })
    }

    /// Run every queued cleanup exactly once and empty the registry.
    ///
    /// The lock is held for the whole drain, so a concurrent caller waits and
    /// then finds nothing left to do. Returns how many cleanups ran.
    pub fn run_all(&self) -> usize {
        let count = self.lock().drain();
        if count > 0 {
            debug!(count, "janitor ran cleanups");
        }
        count
    }

    /// Drain the registry and refuse all later reservations. Used on the way
    /// out of the process.
    pub fn close(&self) -> usize {
        let mut registry = self.lock();
        registry.closed = true;
        let count = registry.drain();
        debug!(count, "janitor closed");
        count
    }

    /// Number of cleanups waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().cleanups.len()
    }

    // A cleanup that panicked must not wedge the interrupt path.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Janitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("Janitor")
            .field("pending", &registry.cleanups.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

/// Exclusive hold on an open registry. Dropping it without registering
/// anything releases the lock.
pub struct Reservation<'a> {
    registry: MutexGuard<'a, Registry>,
}

impl Reservation<'_> {
    pub fn register<F>(mut self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry.cleanups.push(Box::new(cleanup));
    }
}

/// Idempotent removal of one file.
#[derive(Debug)]
struct Removal {
    path: PathBuf,
    done: AtomicBool,
}

impl Removal {
    fn remove(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove file: {e}"),
        }
    }
}

/// Removes its file on drop unless disarmed. The janitor holds a second
/// handle to the same removal, so whichever runs second does nothing.
#[derive(Debug)]
pub struct RemovalGuard(Arc<Removal>);

impl RemovalGuard {
    /// Take responsibility for `path`, queueing its removal on `reservation`.
    pub fn new(path: impl Into<PathBuf>, reservation: Reservation<'_>) -> Self {
        let removal = Arc::new(Removal {
            path: path.into(),
            done: AtomicBool::new(false),
        });
        let for_janitor = removal.clone();
        reservation.register(move || for_janitor.remove());
        Self(removal)
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Keep the file: neither the drop nor the janitor will remove it.
    pub fn disarm(self) {
        self.0.done.store(true, Ordering::Release);
    }
}

impl Drop for RemovalGuard {
    fn drop(&mut self) {
        self.0.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[test]
    fn test_run_all_runs_each_once() {
        let janitor = Janitor::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            janitor.register(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(janitor.pending(), 3);

        assert_eq!(janitor.run_all(), 3);
        assert_eq!(janitor.run_all(), 0, "second drain must find nothing");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(janitor.pending(), 0);
    }

    #[test]
    fn test_empty_run_all_is_noop() {
        let janitor = Janitor::new();
        assert_eq!(janitor.run_all(), 0);
        assert_eq!(janitor.run_all(), 0);
    }

    #[test]
    fn test_clones_share_registry() {
        let janitor = Janitor::new();
        let other = janitor.clone();
        janitor.register(|| {});
        assert_eq!(other.pending(), 1);
        assert_eq!(other.run_all(), 1);
        assert_eq!(janitor.pending(), 0);
    }

    #[test]
    fn test_concurrent_drains_run_each_once() {
        let janitor = Janitor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let hits = hits.clone();
            janitor.register(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let janitor = janitor.clone();
                std::thread::spawn(move || janitor.run_all())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 100);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_survives_panicking_cleanup() {
        let janitor = Janitor::new();
        janitor.register(|| panic!("cleanup blew up"));

        let j = janitor.clone();
        let result = std::thread::spawn(move || j.run_all()).join();
        assert!(result.is_err());

        janitor.register(|| {});
        assert_eq!(janitor.run_all(), 1);
    }

    #[test]
    fn test_close_refuses_reservations() {
        let janitor = Janitor::new();
        janitor.register(|| {});
        assert!(janitor.reserve().is_some());

        assert_eq!(janitor.close(), 1);
        assert!(janitor.reserve().is_none());
    }

    #[test]
    fn test_register_after_close_runs_immediately() {
        let janitor = Janitor::new();
        janitor.close();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        janitor.register(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(janitor.pending(), 0);
    }

    #[test]
    fn test_close_waits_for_reservation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("held.bin");
        let janitor = Janitor::new();

        let reservation = janitor.reserve().unwrap();
        let closer = {
            let janitor = janitor.clone();
            std::thread::spawn(move || janitor.close())
        };
        // The closer blocks on the lock until the file is registered.
        fs::write(&path, b"x").unwrap();
        let guard = RemovalGuard::new(&path, reservation);

        assert_eq!(closer.join().unwrap(), 1);
        assert!(!path.exists());
        drop(guard);
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scratch.bin");
        fs::write(&path, b"x").unwrap();
        let janitor = Janitor::new();

        let guard = RemovalGuard::new(&path, janitor.reserve().unwrap());
        assert_eq!(guard.path(), path);
        drop(guard);

        assert!(!path.exists());
        assert_eq!(janitor.run_all(), 1, "janitor entry is now a no-op");
    }

    #[test]
    fn test_disarmed_guard_keeps_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keep.bin");
        fs::write(&path, b"x").unwrap();
        let janitor = Janitor::new();

        RemovalGuard::new(&path, janitor.reserve().unwrap()).disarm();
        janitor.run_all();

        assert!(path.exists());
    }
}
