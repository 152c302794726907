//! Error types for GENA XML parsing operations

use thiserror::Error;

/// Errors that can occur while parsing event bodies or topology documents
#[derive(Error, Debug)]
pub enum ParseError {
    /// The outer or nested XML document could not be parsed at all
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    /// An element is missing an attribute the document format requires
    #[error("element <{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Name of the element being parsed
        element: String,
        /// Name of the absent attribute
        attribute: String,
    },

    /// A member's Location URL could not be reduced to a host address
    #[error("cannot extract host from Location URL '{0}'")]
    InvalidLocation(String),

    /// A group declared a coordinator that is not among its members
    #[error("coordinator '{coordinator}' not found among members of group '{group}'")]
    CoordinatorNotFound {
        /// The group's declared coordinator id
        coordinator: String,
        /// The group id
        group: String,
    },
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;
