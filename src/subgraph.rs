//! Subgraph descriptors and the collaborator seams around them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::oneshot;
use tower::BoxError;

use crate::context::Context;
use crate::delegation::Normalized;
use crate::json_ext::Value;
use crate::mapping::OperationKind;
use crate::request::Request;
use crate::response::Response;
use crate::response::ResponseStream;

/// The identity of a subgraph, as recorded in the result envelope.
///
/// Two descriptors naming the same backend compare equal, which is what the
/// short-circuit check relies on.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SubgraphId(Arc<str>);

impl fmt::Display for SubgraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SubgraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubgraphId").field(&&*self.0).finish()
    }
}

impl SubgraphId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One outbound request to a subgraph.
#[derive(Clone)]
pub struct SubgraphRequest {
    /// The operation kind of the delegated field.
    pub kind: OperationKind,

    /// The executable request document plus variables.
    pub request: Request,

    /// The caller's execution context, passed through untouched.
    pub context: Context,
}

/// A push source of subscription events, as handed out by a transport.
///
/// Sending on (or dropping) `close_signal` tells the transport to terminate
/// the backend subscription; the transport must stop emitting afterwards.
pub struct EventSource {
    pub events: ResponseStream,
    pub close_signal: oneshot::Sender<()>,
}

/// The request transport collaborator.
///
/// Implementations own the wire protocol; the core depends only on this
/// contract. Retries and timeouts, if any, belong here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a query or mutation and return the raw response.
    async fn execute(&self, request: SubgraphRequest) -> Result<Response, BoxError>;

    /// Open a subscription and return its event source.
    async fn subscribe(&self, request: SubgraphRequest) -> Result<EventSource, BoxError> {
        let _ = request;
        Err("transport does not support subscriptions".into())
    }
}

/// One request-rewrite/response-rewrite pair of the transform pipeline.
///
/// `on_request` runs immediately before submission, `on_result` immediately
/// after normalization; both default to the identity. The core calls them in
/// pipeline order and does not interpret what they do.
pub trait Transform: Send + Sync {
    fn on_request(&self, request: SubgraphRequest) -> SubgraphRequest {
        request
    }

    fn on_result(&self, result: Normalized) -> Normalized {
        result
    }
}

/// The type-discriminator resolution collaborator: recovers the concrete
/// type name of an abstract-typed value.
pub trait TypeDiscriminator: Send + Sync {
    /// The concrete type name of `value`, if it can be determined.
    fn concrete_type<'a>(&self, value: &'a Value) -> Option<&'a str>;

    /// Whether `type_name` is an abstract (interface or union) type.
    fn is_abstract(&self, type_name: &str) -> bool;
}

/// Default discriminator: reads the `__typename` a delegated selection was
/// annotated with. Knows nothing about the schema, so every named type is
/// assumed concrete.
#[derive(Clone, Debug, Default)]
pub struct ByTypename;

impl TypeDiscriminator for ByTypename {
    fn concrete_type<'a>(&self, value: &'a Value) -> Option<&'a str> {
        value
            .as_object()
            .and_then(|object| object.get(crate::selection::TYPENAME))
            .and_then(Value::as_str)
    }

    fn is_abstract(&self, _type_name: &str) -> bool {
        false
    }
}

/// A backend execution target: the transport handle plus the ordered
/// transform pipeline applied around every delegated operation.
#[derive(Clone)]
pub struct Subgraph {
    name: Arc<str>,
    transport: Arc<dyn Transport>,
    transforms: Vec<Arc<dyn Transform>>,
}

impl Subgraph {
    pub fn new(name: impl AsRef<str>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            transport,
            transforms: Vec::new(),
        }
    }

    /// Appends a transform to the pipeline. Transforms run in insertion
    /// order.
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SubgraphId {
        SubgraphId(self.name.clone())
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }
}

impl fmt::Debug for Subgraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subgraph")
            .field("name", &&*self.name)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl PartialEq for Subgraph {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Subgraph {}

/// Name → subgraph table, read-only after construction.
#[derive(Clone, Debug, Default)]
pub struct SubgraphRegistry {
    subgraphs: IndexMap<String, Arc<Subgraph>>,
}

impl SubgraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subgraph: Subgraph) {
        self.subgraphs
            .insert(subgraph.name().to_string(), Arc::new(subgraph));
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<&Arc<Subgraph>> {
        self.subgraphs.get(name.as_ref())
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.subgraphs.contains_key(name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.subgraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }
}
