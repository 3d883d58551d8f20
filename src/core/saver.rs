//! Purpose: Persist handler mappings to disk with atomic replacement and a debounced timer.
//! Exports: `HandlerMap`, `Saver`, `dump_handlers`, `load_handlers`.
//! Role: Durable backing for next-step/reply handlers across process restarts.
//! Invariants: The file at the final path is always a complete snapshot (temp write, then rename).
//! Invariants: At most one flush timer is pending per saver; re-arming while pending is a no-op.
//! Invariants: Dropping a saver wakes a pending timer and waits for its write.
//! Invariants: A load merges nothing and deletes nothing unless decoding fully succeeded.
//! Notes: Concurrent `flush` calls on one saver are not ordered; callers serialize them.
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::handler::Handler;

/// Handlers keyed by chat id (next-step) or message id (reply).
pub type HandlerMap = BTreeMap<i64, Vec<Handler>>;

pub struct Saver {
    handlers: Arc<Mutex<HandlerMap>>,
    path: PathBuf,
    delay: Duration,
    armed: Arc<AtomicBool>,
    flushes: Arc<AtomicU64>,
    timer: Mutex<Option<Timer>>,
}

struct Timer {
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

impl Saver {
    pub fn new(handlers: Arc<Mutex<HandlerMap>>, path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            handlers,
            path: path.into(),
            delay,
            armed: Arc::new(AtomicBool::new(false)),
            flushes: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of flushes that completed successfully.
    pub fn completed_flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Arm the debounce timer. A zero delay flushes on the calling thread instead.
    pub fn schedule_flush(&self) -> Result<(), Error> {
        if self.delay.is_zero() {
            return self.flush();
        }

        let mut timer = lock(&self.timer);
        if self.armed.swap(true, Ordering::SeqCst) {
            debug!(path = %self.path.display(), "flush already scheduled");
            return Ok(());
        }
        // The previous timer has disarmed; wait for its write so flushes stay ordered.
        if let Some(previous) = timer.take() {
            let _ = previous.handle.join();
        }

        let (wake, woken) = mpsc::channel::<()>();
        let handlers = Arc::clone(&self.handlers);
        let flushes = Arc::clone(&self.flushes);
        let armed = Arc::clone(&self.armed);
        let path = self.path.clone();
        let delay = self.delay;
        let spawned = thread::Builder::new()
            .name("tambot-handler-saver".to_string())
            .spawn(move || {
                // Returns early when the saver is dropped.
                let _ = woken.recv_timeout(delay);
                armed.store(false, Ordering::SeqCst);
                match flush_snapshot(&handlers, &path) {
                    Ok(()) => {
                        flushes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => error!(path = %path.display(), error = %err, "handler save failed"),
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.armed.store(false, Ordering::SeqCst);
                return Err(Error::new(ErrorKind::Persistence)
                    .with_message("failed to start handler save timer")
                    .with_path(&self.path)
                    .with_source(err));
            }
        };
        *timer = Some(Timer { wake, handle });
        debug!(path = %self.path.display(), delay_ms = delay.as_millis() as u64, "flush scheduled");
        Ok(())
    }

    /// Write the current mapping to the saver's path right away.
    pub fn flush(&self) -> Result<(), Error> {
        flush_snapshot(&self.handlers, &self.path)?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A pending flush is written before the saver goes away.
impl Drop for Saver {
    fn drop(&mut self) {
        let timer = self
            .timer
            .get_mut()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        if let Some(timer) = timer {
            if self.armed.load(Ordering::SeqCst) {
                debug!(path = %self.path.display(), "flushing pending handler save on drop");
            }
            let _ = timer.wake.send(());
            if timer.handle.join().is_err() {
                error!(path = %self.path.display(), "handler save timer panicked");
            }
        }
    }
}

fn flush_snapshot(handlers: &Mutex<HandlerMap>, path: &Path) -> Result<(), Error> {
    let snapshot = lock(handlers).clone();
    dump_handlers(&snapshot, path)
}

/// Atomically replace `path` with the JSON image of `handlers`.
pub fn dump_handlers(handlers: &HandlerMap, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            Error::new(ErrorKind::Persistence)
                .with_message("failed to create handler save directory")
                .with_path(parent)
                .with_source(err)
        })?;
    }
    let tmp = write_temp(handlers, path)?;
    replace_with_temp(&tmp, path)?;
    debug!(path = %path.display(), keys = handlers.len(), "handlers saved");
    Ok(())
}

/// Read a persisted mapping. Returns `None` when nothing exists at `path`, or when it is not a
/// non-empty regular file; any other metadata failure is an error.
pub fn load_handlers(path: &Path, delete_after: bool) -> Result<Option<HandlerMap>, Error> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(Error::new(ErrorKind::Persistence)
                .with_message("failed to inspect saved handlers")
                .with_path(path)
                .with_source(err));
        }
    };
    if !meta.is_file() || meta.len() == 0 {
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to read saved handlers")
            .with_path(path)
            .with_source(err)
    })?;
    let handlers: HandlerMap = serde_json::from_slice(&bytes).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to decode saved handlers")
            .with_path(path)
            .with_source(err)
    })?;

    if delete_after {
        fs::remove_file(path).map_err(|err| {
            Error::new(ErrorKind::Persistence)
                .with_message("failed to delete saved handlers after loading")
                .with_path(path)
                .with_source(err)
        })?;
    }
    info!(path = %path.display(), keys = handlers.len(), deleted = delete_after, "handlers loaded");
    Ok(Some(handlers))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_temp(handlers: &HandlerMap, path: &Path) -> Result<PathBuf, Error> {
    let encoded = serde_json::to_vec(handlers).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to encode handlers")
            .with_source(err)
    })?;
    let tmp = temp_path(path);
    fs::write(&tmp, encoded).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to write temporary handler save")
            .with_path(&tmp)
            .with_source(err)
    })?;
    Ok(tmp)
}

fn replace_with_temp(tmp: &Path, path: &Path) -> Result<(), Error> {
    clear_destination(path)?;
    fs::rename(tmp, path).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to move handler save into place")
            .with_path(path)
            .with_source(err)
    })
}

// Windows rename refuses to overwrite an existing file; elsewhere rename replaces atomically.
#[cfg(windows)]
fn clear_destination(path: &Path) -> Result<(), Error> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(path).map_err(|err| {
        Error::new(ErrorKind::Persistence)
            .with_message("failed to remove previous handler save")
            .with_path(path)
            .with_source(err)
    })
}

#[cfg(not(windows))]
fn clear_destination(_path: &Path) -> Result<(), Error> {
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
