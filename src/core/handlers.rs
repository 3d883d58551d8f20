//! Purpose: Next-step and reply handler sets with optional on-disk persistence.
//! Exports: `HandlerSet`, `DEFAULT_SAVE_DELAY`, `STEP_SAVE_PATH`, `REPLY_SAVE_PATH`.
//! Role: Owns a handler mapping, schedules saves on mutation, dispatches via `CallbackRegistry`.
//! Invariants: Every mutation schedules a flush when saving is enabled; reads never do.
//! Invariants: Handlers are removed before they are invoked, so a callback may re-register.
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::handler::{CallbackRegistry, Handler};
use crate::core::saver::{HandlerMap, Saver, load_handlers};

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(120);
pub const STEP_SAVE_PATH: &str = "./.handler-saves/step.save";
pub const REPLY_SAVE_PATH: &str = "./.handler-saves/reply.save";

pub struct HandlerSet {
    label: &'static str,
    default_save_path: &'static str,
    handlers: Arc<Mutex<HandlerMap>>,
    saver: Option<Saver>,
}

impl HandlerSet {
    /// Handlers keyed by chat id, fired by the next message in that chat.
    pub fn next_step() -> Self {
        Self::with_label("next_step", STEP_SAVE_PATH)
    }

    /// Handlers keyed by message id, fired by a reply to that message.
    pub fn reply() -> Self {
        Self::with_label("reply", REPLY_SAVE_PATH)
    }

    fn with_label(label: &'static str, default_save_path: &'static str) -> Self {
        Self {
            label,
            default_save_path,
            handlers: Arc::new(Mutex::new(HandlerMap::new())),
            saver: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn default_save_path(&self) -> PathBuf {
        PathBuf::from(self.default_save_path)
    }

    pub fn saver(&self) -> Option<&Saver> {
        self.saver.as_ref()
    }

    pub fn enable_save(&mut self, path: impl Into<PathBuf>, delay: Duration) {
        let saver = Saver::new(Arc::clone(&self.handlers), path, delay);
        debug!(set = self.label, path = %saver.path().display(), "handler saving enabled");
        self.saver = Some(saver);
    }

    pub fn enable_default_save(&mut self) {
        self.enable_save(self.default_save_path(), DEFAULT_SAVE_DELAY);
    }

    /// Detach the saver. A flush already scheduled is written before this returns.
    pub fn disable_save(&mut self) {
        self.saver = None;
    }

    pub fn register(&self, key: i64, handler: Handler) -> Result<(), Error> {
        self.lock().entry(key).or_default().push(handler);
        self.schedule_save()
    }

    pub fn clear(&self, key: i64) -> Result<bool, Error> {
        let removed = self.lock().remove(&key).is_some();
        if removed {
            self.schedule_save()?;
        }
        Ok(removed)
    }

    pub fn take(&self, key: i64) -> Result<Vec<Handler>, Error> {
        let taken = self.lock().remove(&key).unwrap_or_default();
        if !taken.is_empty() {
            self.schedule_save()?;
        }
        Ok(taken)
    }

    pub fn get(&self, key: i64) -> Vec<Handler> {
        self.lock().get(&key).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> HandlerMap {
        self.lock().clone()
    }

    /// Run and drop every handler registered under `key` for `message`.
    ///
    /// Handlers whose callback name is unknown are skipped; after the others ran, the
    /// first such failure is returned. Returns how many callbacks ran.
    pub fn notify(
        &self,
        key: i64,
        message: &Value,
        callbacks: &CallbackRegistry,
    ) -> Result<usize, Error> {
        let handlers = self.take(key)?;
        let mut invoked = 0;
        let mut first_err = None;
        for handler in &handlers {
            match callbacks.invoke(handler, message) {
                Ok(()) => invoked += 1,
                Err(err) => {
                    warn!(set = self.label, key, callback = handler.callback(), "unknown callback");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(invoked),
        }
    }

    /// Merge a persisted mapping into this set. Returns how many keys were loaded.
    pub fn load(&self, path: impl Into<PathBuf>, delete_after: bool) -> Result<usize, Error> {
        let path = path.into();
        let Some(loaded) = load_handlers(&path, delete_after)? else {
            return Ok(0);
        };
        let count = loaded.len();
        self.lock().extend(loaded);
        Ok(count)
    }

    pub fn load_default(&self, delete_after: bool) -> Result<usize, Error> {
        self.load(self.default_save_path(), delete_after)
    }

    /// Flush now, bypassing the debounce timer.
    pub fn save_now(&self) -> Result<(), Error> {
        match &self.saver {
            Some(saver) => saver.flush(),
            None => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("saving is not enabled for {} handlers", self.label))),
        }
    }

    fn schedule_save(&self) -> Result<(), Error> {
        match &self.saver {
            Some(saver) => saver.schedule_flush(),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandlerMap> {
        self.handlers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("label", &self.label)
            .field("keys", &self.len())
            .field("saving", &self.saver.as_ref().map(|saver| saver.path().to_path_buf()))
            .finish()
    }
}
