use thiserror::Error;

use shapewire_buffers::BufferError;

/// Error type for every shapewire operation.
///
/// Schema errors surface at first use of a type; all other variants are
/// raised synchronously while encoding or decoding a stream. A reader that
/// returned an error holds a partially consumed stream and must be discarded
/// (after `clear_class_ids`) rather than resumed.
#[derive(Debug, Error)]
pub enum Error {
    /// The type model for a type could not be compiled.
    #[error("in type '{type_name}': {message}")]
    Schema { type_name: String, message: String },

    /// A Required member was absent on read.
    #[error("missing required field '{field}' for class '{class}'")]
    MissingRequiredField { field: String, class: String },

    /// The stream violates the wire format.
    #[error("malformed stream: {message}{}", position_suffix(.position))]
    MalformedStream {
        message: String,
        position: Option<u64>,
    },

    /// The wire named a class this process does not recognize, in a context
    /// that demanded a concrete type.
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    /// A field not present in the target shape, with unknown-field tolerance
    /// disabled.
    #[error("unknown field '{field}' for class '{class}'")]
    UnknownField { field: String, class: String },

    /// An encoded value does not fit the narrower type it is read into.
    #[error("value does not fit into {target}")]
    Overflow { target: &'static str },

    /// A dictionary key could not be rendered or parsed.
    #[error("bad dictionary key: {message}")]
    BadKey { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn position_suffix(position: &Option<u64>) -> String {
    match position {
        Some(p) => format!(" at byte {p}"),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn schema(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn stream(message: impl Into<String>) -> Self {
        Error::MalformedStream {
            message: message.into(),
            position: None,
        }
    }

    pub(crate) fn stream_at(message: impl Into<String>, position: u64) -> Self {
        Error::MalformedStream {
            message: message.into(),
            position: Some(position),
        }
    }

    pub(crate) fn missing(field: impl Into<String>, class: impl Into<String>) -> Self {
        Error::MissingRequiredField {
            field: field.into(),
            class: class.into(),
        }
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        let position = match e {
            BufferError::EndOfBuffer { at }
            | BufferError::InvalidUtf8 { at }
            | BufferError::BadLength { at, .. } => at as u64,
        };
        Error::MalformedStream {
            message: e.to_string(),
            position: Some(position),
        }
    }
}
