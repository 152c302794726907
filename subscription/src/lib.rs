//! # sonos-gena-subscription
//!
//! Subscription lifecycle for the UPnP GENA eventing channel.
//!
//! A [`Subscription`] issues SUBSCRIBE/UNSUBSCRIBE requests against a
//! device's eventing endpoint, registers its callback with a
//! `gena_server::EventServer` under the device-assigned subscription id, and
//! optionally renews itself on a timer at 75% of the granted timeout.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gena_server::{EventCallback, EventServer, ServerConfig};
//! use gena_subscription::Subscription;
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
//!     let server = Arc::new(EventServer::new(ServerConfig::default(), Arc::new(MyDecoder)));
//!     server.start().await?;
//!
//!     let callback = EventCallback::new(|event| async move {
//!         println!("event {} for {}", event.seq, event.sid);
//!         Ok(())
//!     });
//!     let subscription = Subscription::new(
//!         server.clone(),
//!         "http://192.168.1.101:1400/MediaRenderer/AVTransport/Event",
//!         callback,
//!         Some(1800),
//!     );
//!     subscription.subscribe(true).await?;
//!
//!     // ... receive events ...
//!
//!     subscription.unsubscribe().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod subscription;

pub use error::{Result, SubscriptionError};
pub use subscription::Subscription;
