//! GraphQL result payloads and error documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, ProtocolError, Result};

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{}", name)?,
                    PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// A `next` payload, split into its two shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The payload carried `data` and no `errors`.
    Data(Value),
    /// The payload carried `errors`; any partial `data` is dropped.
    Errors(Vec<GraphQLError>),
}

impl Reply {
    /// Classify a result payload.
    ///
    /// A payload with a non-null `errors` field is an error reply.
    /// Otherwise a `data` field is required.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        if let Some(errors) = payload.get("errors").filter(|errors| !errors.is_null()) {
            let errors: Vec<GraphQLError> = serde_json::from_value(errors.clone())?;
            return Ok(Self::Errors(errors));
        }

        match payload.get("data") {
            Some(data) => Ok(Self::Data(data.clone())),
            None => Err(ProtocolError::missing_field("next", "data").into()),
        }
    }
}

/// Build the failure reported for an error list: the first error's message.
pub fn first_error(errors: &[GraphQLError]) -> Error {
    match errors.first() {
        Some(error) => Error::query(error.message.clone()),
        None => Error::query("Unknown GraphQL error"),
    }
}
