// TamTam Bot API surface: client, typed endpoints, wire models.
pub mod client;
mod methods;
pub mod types;

pub use client::{API_URL_ENV, ApiResult, Bot, BotConfig, DEFAULT_API_URL, TOKEN_ENV, Verb};
