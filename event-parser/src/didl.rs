//! Seam to the external DIDL-Lite content descriptor decoder.
//!
//! The event parser does not understand DIDL-Lite itself. When a `LastChange`
//! variable carries an embedded `<DIDL-Lite ...>` document, the parser hands
//! the raw text to a [`DidlDecoder`] and substitutes the first item it
//! produces. The structured music-library object model lives outside this
//! workspace; [`DidlObject`] is only the carrier shape the decoder fills in.

use thiserror::Error;

/// Decoded representation of one DIDL-Lite item.
///
/// Field names follow the DIDL-Lite elements they come from; every field is
/// optional because real-world metadata is frequently incomplete.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DidlObject {
    /// Item ID from the `id` attribute
    pub id: Option<String>,
    /// Parent container ID
    pub parent_id: Option<String>,
    /// UPnP class (e.g. `object.item.audioItem.musicTrack`)
    pub class: Option<String>,
    /// Track title (`dc:title`)
    pub title: Option<String>,
    /// Artist (`dc:creator`)
    pub creator: Option<String>,
    /// Album name (`upnp:album`)
    pub album: Option<String>,
    /// Album art URI
    pub album_art_uri: Option<String>,
    /// Resource URI (`res` element text)
    pub uri: Option<String>,
}

/// Error raised by a [`DidlDecoder`] for input it cannot make sense of.
///
/// The event parser treats any decode failure as a "malformed descriptor"
/// condition and falls back to the raw string value, so unsupported
/// descriptor shapes never abort a parse.
#[derive(Error, Debug)]
pub enum DidlDecodeError {
    /// The descriptor document was malformed or of an unknown shape
    #[error("malformed DIDL-Lite descriptor: {0}")]
    Malformed(String),
}

/// External collaborator that decodes DIDL-Lite documents.
pub trait DidlDecoder: Send + Sync {
    /// Decode a DIDL-Lite document into its items.
    ///
    /// Returns all items found in document order; the event parser uses only
    /// the first one.
    fn decode(&self, didl: &str) -> Result<Vec<DidlObject>, DidlDecodeError>;
}
