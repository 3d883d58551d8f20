// Core modules: error model, per-thread cache, handler records and their persistence.
pub mod error;
pub mod handler;
pub mod handlers;
pub mod per_thread;
pub mod saver;
