//! `fetchx` is an HTTP request orchestration layer: layered defaults, request/response
//! hooks, per-call timeouts and retry with backoff around a pluggable transport.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use fetchx::prelude::{Client, Config, RequestOptions, RetryDelay, RetryPolicy};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .config(
//!             Config::new()
//!                 .try_base_url("https://api.example.com/v1/")?
//!                 .try_header("accept", "application/json")?
//!                 .with_timeout(Duration::from_secs(3))
//!                 .with_retry(RetryPolicy::new(2).delay(RetryDelay::exponential(
//!                     Duration::from_millis(100),
//!                     Duration::from_millis(800),
//!                 ))),
//!         )
//!         .try_build()?;
//!
//!     let item: Item = client
//!         .post("items", RequestOptions::new().json(&serde_json::json!({ "name": "demo" }))?)
//!         .await?
//!         .json()?;
//!
//!     println!("created id={}", item.id);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! - A [`Defaults`] snapshot is never mutated; [`Client::set_defaults`] publishes a new one.
//! - Relative URLs resolve against the base URL with standard URL joining, so keep a
//!   trailing `/` on base paths.
//! - Header and query overrides replace every earlier value for the same name.

mod abort;
mod body;
mod client;
mod core;
mod defaults;
mod execution;
mod hooks;
#[cfg(feature = "tls-rustls-ring")]
mod hyper_transport;
mod request;
mod response;
mod search_params;
mod transport;

pub(crate) use self::core::{config, error, merge, retry, util};

pub use crate::abort::{AbortController, AbortReason, AbortSignal};
pub use crate::body::{Body, BodyStream, ByteStream, MultipartForm, Part};
pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{Config, ResponseErrorPredicate, Timeout};
pub use crate::defaults::{Defaults, DefaultsUpdate, Subscription};
pub use crate::error::{BoxError, Error, ErrorCode, TransportError, TransportErrorKind};
pub use crate::hooks::{AfterResponseFn, BeforeRequestFn, Hook, HookKind, HookRemover};
#[cfg(feature = "tls-rustls-ring")]
pub use crate::hyper_transport::{HyperTransport, HyperTransportBuilder};
pub use crate::merge::{
    HeaderMergeFn, SearchParamsMergeFn, Strategy, UrlResolverFn, merge_headers,
    merge_search_params, resolve_url,
};
pub use crate::request::{Request, RequestOptions, RequestUrl};
pub use crate::response::Response;
pub use crate::retry::{RetryDelay, RetryDelayFn, RetryPolicy, RetryPredicate};
pub use crate::search_params::SearchParams;
pub use crate::transport::{Transport, TransportFuture};

pub type FetchResult<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AbortController, AbortReason, AbortSignal, Body, Client, ClientBuilder, Config, Defaults,
        Error, ErrorCode, FetchResult, Hook, HookKind, RequestOptions, Request, Response,
        RetryDelay, RetryPolicy, SearchParams, Strategy, Timeout, Transport, TransportError,
    };
}
