use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
pub use tower::BoxError;

use crate::json_ext::Path;
use crate::response::Error as GraphQLError;
use crate::response::Response;

/// Error types for delegation.
///
/// These are not returned to clients directly, but converted to the wire
/// [`GraphQLError`] shape with the variant recorded in `extensions`.
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[ignore_extra_doc_attributes]
pub enum FetchError {
    /// query references unknown subgraph '{subgraph}'
    ValidationUnknownSubgraph {
        /// The subgraph that was unknown.
        subgraph: String,
    },

    /// field '{field}' is not exposed by subgraph '{subgraph}'
    ValidationUnmappedField {
        /// The subgraph the field was resolved against.
        subgraph: String,

        /// The field that has no mapping entry.
        field: String,
    },

    /// subgraph '{subgraph}' returned a malformed response: {reason}
    SubrequestMalformedResponse {
        /// The subgraph that responded.
        subgraph: String,

        /// Why deserialization failed.
        reason: String,
    },

    /// request to subgraph '{subgraph}' failed: {reason}
    ///
    /// A transport-level failure, not a GraphQL error.
    SubrequestTransportError {
        /// The subgraph the request was sent to.
        subgraph: String,

        /// The transport's failure reason.
        reason: String,
    },

    /// subgraph '{subgraph}' does not support {kind} operations
    SubrequestUnsupportedOperation {
        /// The subgraph the operation targeted.
        subgraph: String,

        /// The operation kind that is unsupported.
        kind: String,
    },

    /// invalid content: {reason}
    ExecutionInvalidContent { reason: String },
}

impl FetchError {
    /// Convert the fetch error to a wire-level GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> GraphQLError {
        GraphQLError {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions: serde_json_bytes::to_value(self)
                .ok()
                .and_then(|value| value.as_object().cloned())
                .unwrap_or_default(),
        }
    }

    /// Convert the error to a response carrying it as the single root error.
    pub fn to_response(&self) -> Response {
        Response {
            data: None,
            errors: vec![self.to_graphql_error(None)],
            extensions: Default::default(),
        }
    }

    pub fn subgraph_name(&self) -> Option<&str> {
        match self {
            FetchError::ValidationUnknownSubgraph { subgraph }
            | FetchError::ValidationUnmappedField { subgraph, .. }
            | FetchError::SubrequestMalformedResponse { subgraph, .. }
            | FetchError::SubrequestTransportError { subgraph, .. }
            | FetchError::SubrequestUnsupportedOperation { subgraph, .. } => Some(subgraph),
            FetchError::ExecutionInvalidContent { .. } => None,
        }
    }
}

/// An error while processing JSON data.
#[derive(Debug, Error, Display)]
pub enum JsonExtError {
    /// could not find path in JSON
    PathNotFound,
}

/// Configuration errors, raised at schema-build time and never deferred to
/// request time.
#[derive(Debug, Error, Display)]
pub enum SchemaError {
    /// subgraph '{0}' exposes no root operation types
    NoRootTypes(String),

    /// root type '{type_name}' declares field '{field}' more than once
    DuplicateField { type_name: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_converts_to_graphql_error_with_tagged_extensions() {
        let error = FetchError::SubrequestTransportError {
            subgraph: "accounts".to_string(),
            reason: "connection reset".to_string(),
        };
        let graphql_error = error.to_graphql_error(Some(Path::from("me")));
        assert_eq!(
            graphql_error.message,
            "request to subgraph 'accounts' failed: connection reset"
        );
        assert_eq!(graphql_error.path, Some(Path::from("me")));
        assert_eq!(
            graphql_error.extensions.get("type").and_then(|v| v.as_str()),
            Some("SubrequestTransportError")
        );
    }

    #[test]
    fn fetch_error_to_response_is_a_root_error() {
        let response = FetchError::ValidationUnknownSubgraph {
            subgraph: "reviews".to_string(),
        }
        .to_response();
        assert!(response.data.is_none());
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].path, None);
    }
}
