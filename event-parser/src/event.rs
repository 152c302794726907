//! Parser for UPnP GENA event bodies.
//!
//! A NOTIFY body is a `propertyset` in the `urn:schemas-upnp-org:event-1-0`
//! namespace. Most evented variables are plain text, but `LastChange` batches
//! many variable updates into a second, nested XML document (see the UPnP
//! AVTransport and RenderingControl service specifications). This module
//! flattens both shapes into a single map of snake_case variable names.

use std::collections::HashMap;

use xmltree::{Element, XMLNode};

use crate::didl::{DidlDecoder, DidlObject};
use crate::error::{ParseError, ParseResult};

const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

/// Namespaces an `InstanceID` element may live in inside a `LastChange`
/// document. The lookup order (AVT, then RCS, then Queue) is what Sonos
/// devices are known to answer with; downstream parsing assumes it.
const INSTANCE_ID_NAMESPACES: [&str; 3] = [
    "urn:schemas-upnp-org:metadata-1-0/AVT/",
    "urn:schemas-upnp-org:metadata-1-0/RCS/",
    "urn:schemas-sonos-com:metadata-1-0/Queue/",
];

/// A single decoded variable value.
///
/// Consumers pattern-match on this closed shape instead of poking at a
/// free-form attribute bag.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// Plain string value
    Text(String),
    /// Per-channel values, e.g. left/right volume
    Channels(HashMap<String, String>),
    /// A decoded DIDL-Lite content descriptor
    Object(DidlObject),
}

impl EventValue {
    /// The text value, if this is a plain string variable.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EventValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value for one channel, if this is a per-channel variable.
    pub fn channel(&self, channel: &str) -> Option<&str> {
        match self {
            EventValue::Channels(map) => map.get(channel).map(String::as_str),
            _ => None,
        }
    }
}

/// Decoded variables of one event, keyed by snake_case variable name.
pub type EventVariables = HashMap<String, EventValue>;

/// Convert a camel-case UPnP variable name to snake_case.
///
/// A word break falls after a lowercase letter or digit, and before an
/// uppercase letter that starts a new lowercase word, so trailing acronyms
/// stay intact: `TransportState` becomes `transport_state`,
/// `AVTransportURI` becomes `av_transport_uri`.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || next_is_lower {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Parse the body of a UPnP NOTIFY request into a variable map.
///
/// Every `property` element under the propertyset contributes one variable,
/// named by its single child element. `LastChange` is special-cased: its text
/// content is itself an XML document whose `InstanceID` children are the real
/// variables. Values beginning with `<DIDL-Lite` are handed to `decoder`; if
/// decoding fails the raw string is kept instead.
///
/// # Errors
///
/// Returns [`ParseError::InvalidXml`] when the outer body or a nested
/// `LastChange` document is not well-formed XML. A `LastChange` document
/// without a recognizable `InstanceID` degrades to an empty contribution
/// rather than failing the whole parse.
pub fn parse_event_body(
    xml: &str,
    decoder: &dyn DidlDecoder,
) -> ParseResult<EventVariables> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ParseError::InvalidXml(e.to_string()))?;

    let mut variables = EventVariables::new();
    let properties = root
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(|e| e.name == "property" && e.namespace.as_deref() == Some(EVENT_NS));

    for property in properties {
        for variable in property.children.iter().filter_map(XMLNode::as_element) {
            if variable.name == "LastChange" {
                let nested = variable.get_text().unwrap_or_default();
                parse_last_change(&nested, decoder, &mut variables)?;
            } else {
                let text = variable.get_text().unwrap_or_default().into_owned();
                variables.insert(camel_to_snake(&variable.name), EventValue::Text(text));
            }
        }
    }

    Ok(variables)
}

/// Decode the nested document carried by a `LastChange` variable into
/// `variables`.
fn parse_last_change(
    xml: &str,
    decoder: &dyn DidlDecoder,
    variables: &mut EventVariables,
) -> ParseResult<()> {
    let tree = Element::parse(xml.as_bytes())
        .map_err(|e| ParseError::InvalidXml(e.to_string()))?;

    let instance = INSTANCE_ID_NAMESPACES
        .iter()
        .find_map(|ns| find_child(&tree, "InstanceID", ns));
    let Some(instance) = instance else {
        // Unknown event shape. Contribute nothing rather than failing the
        // whole parse.
        tracing::warn!("LastChange document contains no recognizable InstanceID element");
        return Ok(());
    };

    for variable in instance.children.iter().filter_map(XMLNode::as_element) {
        // xmltree resolves namespaces for us, so `name` is already the bare
        // tag without any prefix.
        let name = camel_to_snake(&variable.name);

        // UPnP puts LastChange values in a 'val' attribute, but Sonos is
        // known to sometimes use text content instead.
        let raw = match variable.attributes.get("val") {
            Some(val) => val.clone(),
            None => variable.get_text().unwrap_or_default().into_owned(),
        };

        match variable.attributes.get("channel") {
            Some(channel) => {
                let entry = variables
                    .entry(name)
                    .or_insert_with(|| EventValue::Channels(HashMap::new()));
                if let EventValue::Channels(map) = entry {
                    map.insert(channel.clone(), raw);
                } else {
                    // The same variable appeared earlier without a channel;
                    // the channelled form wins.
                    *entry = EventValue::Channels(HashMap::from([(channel.clone(), raw)]));
                }
            }
            None => {
                variables.insert(name, decode_value(raw, decoder));
            }
        }
    }

    Ok(())
}

/// Turn a raw LastChange value into an [`EventValue`], delegating embedded
/// DIDL-Lite documents to the decoder.
fn decode_value(raw: String, decoder: &dyn DidlDecoder) -> EventValue {
    if !raw.starts_with("<DIDL-Lite") {
        return EventValue::Text(raw);
    }
    match decoder.decode(&raw) {
        Ok(items) => match items.into_iter().next() {
            Some(item) => EventValue::Object(item),
            None => EventValue::Text(raw),
        },
        Err(e) => {
            // Descriptor shapes we don't understand must never abort the
            // parse; keep the raw text so nothing is lost.
            tracing::debug!(error = %e, "keeping raw DIDL-Lite text after decode failure");
            EventValue::Text(raw)
        }
    }
}

/// Find a direct child by local name and namespace URI.
fn find_child<'a>(parent: &'a Element, name: &str, namespace: &str) -> Option<&'a Element> {
    parent
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .find(|e| e.name == name && e.namespace.as_deref() == Some(namespace))
}
