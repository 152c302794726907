//! # sonos-gena-server
//!
//! HTTP notification server for the UPnP GENA eventing channel.
//!
//! A UPnP device pushes events by sending HTTP NOTIFY requests to a callback
//! URL the subscriber advertised. This crate provides:
//!
//! - [`EventServer`]: a warp-based listener exposing a single endpoint on
//!   every path. NOTIFY bodies are parsed with `gena_parser`, wrapped into an
//!   [`Event`] carrying the request's `SID` and `SEQ` headers, and fanned out
//!   to registered callbacks. Other methods get a 204, so stray traffic on
//!   the callback port is tolerated.
//! - [`CallbackRegistry`]: maps subscription ids to [`EventCallback`]
//!   handles. Subscriptions register themselves here after a successful
//!   SUBSCRIBE.
//!
//! Delivery is fire-and-forget: the HTTP response never waits for callbacks.
//! Each registered callback drains its own ordered queue, so a
//! subscription's events reach it in NOTIFY arrival order, and a failing or
//! panicking callback is logged and isolated from its siblings.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gena_server::{EventCallback, EventServer, ServerConfig};
//! # use gena_parser::{DidlDecoder, DidlDecodeError, DidlObject};
//! # struct MyDecoder;
//! # impl DidlDecoder for MyDecoder {
//! #     fn decode(&self, d: &str) -> Result<Vec<DidlObject>, DidlDecodeError> {
//! #         Err(DidlDecodeError::Malformed(d.to_string()))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = EventServer::new(ServerConfig::default(), Arc::new(MyDecoder));
//!     server.start().await?;
//!
//!     let callback = EventCallback::new(|event| async move {
//!         println!("event {} for {}", event.seq, event.sid);
//!         Ok(())
//!     });
//!     server.registry().register("uuid:sub-1", callback).await;
//!
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod event;
pub mod logging;
pub mod registry;
mod server;

pub use config::ServerConfig;
pub use event::Event;
pub use logging::{init_logging, LoggingError, LoggingMode};
pub use registry::{CallbackError, CallbackRegistry, EventCallback, RegistryError};
pub use server::{EventServer, ServerError};
