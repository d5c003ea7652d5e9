//! HTTP utility toolkit: proxy-aware origin resolution, signed cookies,
//! multipart uploads and file streaming on top of Axum.

pub mod config;
pub mod cookies;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::KitConfig;
pub use error::{CookieError, HttpError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
