//! Purpose: TamTam Bot API client library used by the `tambot` CLI and tests.
//! Exports: `api` (bot client, endpoints, models), `core` (errors, handlers, persistence), `logging`.
//! Role: Blocking client with per-thread HTTP sessions and persisted callback handlers.
//! Invariants: Library code never prints; it emits `tracing` events and returns `core::error::Error`.
pub mod api;
pub mod core;
pub mod logging;

pub use crate::api::{Bot, BotConfig};
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::handler::{CallbackRegistry, Handler, HandlerField};
pub use crate::core::handlers::HandlerSet;
