use std::pin::Pin;

use bytes::Bytes;
use futures::prelude::*;
use serde::Deserialize;
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// A stream of responses, as produced by a delegated subscription.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Response> + Send>>;

/// A GraphQL response as returned by a subgraph.
///
/// `data: None` means the subgraph omitted the `data` member entirely, which
/// is distinct from an explicit `"data": null`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub data: Option<Value>,

    /// The errors encountered by the subgraph.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    #[builder(default)]
    pub errors: Vec<Error>,

    /// The optional response extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    #[builder(default)]
    pub extensions: Object,
}

impl Response {
    /// Parse a raw response body received from `subgraph_name`.
    ///
    /// Extraction is tolerant of extra members but strict about the shapes
    /// of `data`, `errors` and `extensions`.
    pub fn from_bytes(subgraph_name: &str, body: Bytes) -> Result<Response, FetchError> {
        let value =
            Value::from_bytes(body).map_err(|error| FetchError::SubrequestMalformedResponse {
                subgraph: subgraph_name.to_string(),
                reason: error.to_string(),
            })?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => {
                return Err(FetchError::SubrequestMalformedResponse {
                    subgraph: subgraph_name.to_string(),
                    reason: "expected a JSON object".to_string(),
                })
            }
        };

        // absent and null are not the same thing here
        let data = object.remove("data");

        let errors = match object.remove("errors") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries
                .into_iter()
                .map(|entry| Error::from_value(subgraph_name, entry))
                .collect::<Result<Vec<Error>, FetchError>>()?,
            Some(_) => {
                return Err(FetchError::SubrequestMalformedResponse {
                    subgraph: subgraph_name.to_string(),
                    reason: "expected `errors` to be an array".to_string(),
                })
            }
        };

        let extensions = match object.remove("extensions") {
            Some(Value::Object(extensions)) => extensions,
            _ => Object::new(),
        };

        Ok(Response {
            data,
            errors,
            extensions,
        })
    }
}

impl From<Response> for ResponseStream {
    fn from(response: Response) -> Self {
        stream::once(future::ready(response)).boxed()
    }
}

/// A wire-level GraphQL error, as found in the `errors` of a [`Response`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the originating request document.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// The path to the response node the error applies to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional error extensions.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

impl Error {
    pub(crate) fn from_value(subgraph_name: &str, value: Value) -> Result<Error, FetchError> {
        serde_json_bytes::from_value(value).map_err(|error| {
            FetchError::SubrequestMalformedResponse {
                subgraph: subgraph_name.to_string(),
                reason: format!("invalid error within `errors`: {error}"),
            }
        })
    }
}

/// A location in the request document that triggered an error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The line number.
    pub line: u32,

    /// The column number.
    pub column: u32,
}
