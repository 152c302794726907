//! # sonos-gena-parser
//!
//! XML parsers for the UPnP GENA eventing channel and for Sonos zone
//! topology documents.
//!
//! Two independent parsers live here:
//!
//! - [`event::parse_event_body`] decodes the body of a NOTIFY request into a
//!   flat map of variable names to [`EventValue`]s, including the nested
//!   `LastChange` sub-document and per-channel values.
//! - [`topology::parse_zone_group_state`] decodes a `ZoneGroupState`
//!   document into [`ZoneGroup`]s, resolving members through an injected
//!   [`DeviceRegistry`].
//!
//! Embedded DIDL-Lite content descriptors are delegated to an external
//! [`DidlDecoder`]; this crate never interprets them itself.

pub mod didl;
pub mod error;
pub mod event;
pub mod topology;

pub use didl::{DidlDecodeError, DidlDecoder, DidlObject};
pub use error::{ParseError, ParseResult};
pub use event::{camel_to_snake, parse_event_body, EventValue, EventVariables};
pub use topology::{
    parse_zone_group_state, DeviceRegistry, InMemoryRegistry, MemberHandle, ZoneGroup, ZoneMember,
};
