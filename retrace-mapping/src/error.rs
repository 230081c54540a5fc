use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Errors related to loading a yGuard mapping file.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// The mapping file is not well-formed XML.
    InvalidXml,

    /// The document root is not a `yguard` element.
    InvalidRoot,
}

impl fmt::Display for MappingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidXml => write!(f, "invalid xml"),
            Self::InvalidRoot => write!(f, "not a yguard mapping file"),
        }
    }
}

/// An error returned when loading a [`MappingTree`](crate::MappingTree).
///
/// Only structural problems with the document are reported. Individual entries that lack required
/// attributes are skipped during ingest.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct MappingError {
    kind: MappingErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl MappingError {
    /// Creates a new mapping error from a known kind of error as well as an arbitrary error
    /// payload.
    pub fn new<E>(kind: MappingErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`MappingErrorKind`] for this error.
    pub fn kind(&self) -> MappingErrorKind {
        self.kind
    }
}

impl From<MappingErrorKind> for MappingError {
    fn from(kind: MappingErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<elementtree::Error> for MappingError {
    fn from(source: elementtree::Error) -> Self {
        Self::new(MappingErrorKind::InvalidXml, source)
    }
}

/// An error returned when converting a malformed type or method descriptor.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor ended where a type was expected.
    #[error("unexpected end of descriptor")]
    UnexpectedEnd,

    /// The descriptor contains a character that does not start a type.
    #[error("malformed descriptor: unexpected {0:?}")]
    Malformed(char),

    /// An object type is missing its terminating `;`.
    #[error("unterminated object type in descriptor")]
    Unterminated,

    /// A method descriptor does not have a parenthesized argument list.
    #[error("missing argument list in method descriptor")]
    MissingArguments,
}
