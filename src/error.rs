//! Error types shared by the parsers, the DOM and the serializer.

use std::fmt;
use thiserror::Error;

/// Position of a diagnostic within an input (1-based line and column).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(system_id: Option<String>, line: usize, column: usize) -> Self {
        Location {
            system_id,
            public_id: None,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.system_id.as_deref().unwrap_or("<input>");
        write!(f, "{}:{}:{}", name, self.line, self.column)
    }
}

/// Low-level well-formedness failure reported by the tokenizer.
///
/// Carries only a line/column pair; the engine adds the system and public
/// identifiers of the entity being read when it converts this into an
/// [`XmlError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        SyntaxError {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Feature and property negotiation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaxError {
    /// The key is not known at all.
    #[error("feature or property not recognized: {0}")]
    NotRecognized(String),
    /// The key is known but the requested value or operation is rejected.
    #[error("feature or property not supported: {0}")]
    NotSupported(String),
}

/// DOM tree errors, one per illegal operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomException {
    #[error("index or size is negative or greater than the allowed value")]
    IndexSize,
    #[error("node is inserted somewhere it doesn't belong")]
    HierarchyRequest,
    #[error("node is used in a different document than the one that created it")]
    WrongDocument,
    #[error("invalid character in name: {0}")]
    InvalidCharacter(String),
    #[error("attempt to modify an object where modifications are not allowed")]
    NoModificationAllowed,
    #[error("node not found")]
    NotFound,
    #[error("operation not supported")]
    NotSupported,
    #[error("attribute is already in use elsewhere")]
    InuseAttribute,
    #[error("object is not, or is no longer, usable")]
    InvalidState,
    #[error("namespace error: {0}")]
    Namespace(String),
}

impl DomException {
    /// W3C DOM exception code.
    pub fn code(&self) -> u16 {
        match self {
            DomException::IndexSize => 1,
            DomException::HierarchyRequest => 3,
            DomException::WrongDocument => 4,
            DomException::InvalidCharacter(_) => 5,
            DomException::NoModificationAllowed => 7,
            DomException::NotFound => 8,
            DomException::NotSupported => 9,
            DomException::InuseAttribute => 10,
            DomException::InvalidState => 11,
            DomException::Namespace(_) => 14,
        }
    }
}

/// The error family of the event engine, the SAX parser and the DOM parser.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("{message} at {location}")]
    Syntax { message: String, location: Location },

    #[error("entity error: {message} at {location}")]
    Entity { message: String, location: Location },

    #[error("encoding error: {message} at {location}")]
    Encoding { message: String, location: Location },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sax(#[from] SaxError),

    #[error("DOM exception: {0}")]
    Dom(#[from] DomException),
}

impl XmlError {
    /// Location of the failure, for parse-time errors.
    pub fn location(&self) -> Option<&Location> {
        match self {
            XmlError::Syntax { location, .. }
            | XmlError::Entity { location, .. }
            | XmlError::Encoding { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Human-readable message without the location suffix.
    pub fn message(&self) -> String {
        match self {
            XmlError::Syntax { message, .. }
            | XmlError::Entity { message, .. }
            | XmlError::Encoding { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Error raised by the pull parser.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{input_name}:{line}:{column}: error: {description}")]
    Parsing {
        input_name: String,
        line: u64,
        column: u64,
        description: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub fn description(&self) -> String {
        match self {
            StreamError::Parsing { description, .. } => description.clone(),
            StreamError::Io(e) => e.to_string(),
        }
    }
}

/// Error raised by the stream serializer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{output_name}: error: {description}")]
pub struct SerializerError {
    pub output_name: String,
    pub description: String,
}
