//! Building, submitting and normalizing delegated operations.

use std::iter;
use std::sync::Arc;

use itertools::Itertools;

use crate::context::Context;
use crate::envelope::ResultEnvelope;
use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::mapping::OperationKind;
use crate::request::Request;
use crate::response::Response;
use crate::selection::annotate_abstract_selections;
use crate::selection::print_fragment;
use crate::selection::print_selection_set;
use crate::selection::reachable_fragments;
use crate::selection::Field;
use crate::selection::Fragment;
use crate::selection::Fragments;
use crate::selection::Selection;
use crate::subgraph::ByTypename;
use crate::subgraph::Subgraph;
use crate::subgraph::SubgraphId;
use crate::subgraph::SubgraphRequest;
use crate::subgraph::TypeDiscriminator;
use crate::subscription::SubscriptionStream;

/// One outbound delegated operation: the minimal document for a single
/// field, built fresh per resolver invocation and not retained afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub operation_name: Option<String>,
    pub selections: Vec<Selection>,
    pub fragments: Vec<Fragment>,
    pub variables: Object,
}

impl PendingOperation {
    /// Build the operation for one delegated root field.
    ///
    /// The field's sub-selections are restricted to what the caller already
    /// requested; fragment definitions reachable from them are included by
    /// reference, each exactly once; abstract-type branch points are
    /// annotated with a type discriminator. Variable bindings are restricted
    /// to the names the operation uses.
    pub fn build(
        kind: OperationKind,
        operation_name: Option<String>,
        root: Field,
        fragments: &Fragments,
        variables: &Object,
        variable_usages: &[String],
    ) -> Self {
        let mut selections = vec![Selection::Field(root)];
        annotate_abstract_selections(&mut selections);

        let reached = reachable_fragments(&selections, fragments);
        let fragments = reached
            .iter()
            .filter_map(|name| fragments.get(name))
            .cloned()
            .map(|mut fragment| {
                annotate_abstract_selections(&mut fragment.selections);
                fragment
            })
            .collect();

        let variables = variable_usages
            .iter()
            .filter_map(|name| {
                variables
                    .get_key_value(name.as_str())
                    .map(|(key, value)| (key.clone(), value.clone()))
            })
            .collect();

        Self {
            kind,
            operation_name,
            selections,
            fragments,
            variables,
        }
    }

    /// Prints the minimal executable document: the operation followed by the
    /// referenced fragment definitions.
    pub fn to_document(&self) -> String {
        let operation = match &self.operation_name {
            Some(name) => format!(
                "{} {} {}",
                self.kind.as_str(),
                name,
                print_selection_set(&self.selections)
            ),
            None => format!(
                "{} {}",
                self.kind.as_str(),
                print_selection_set(&self.selections)
            ),
        };
        iter::once(operation)
            .chain(self.fragments.iter().map(print_fragment))
            .join("\n")
    }
}

/// A delegated result after normalization: the local value for the delegated
/// field plus the errors that apply to the whole of it.
///
/// `value: None` means the backend omitted the field, which is preserved as
/// absence and never coerced to null. Pathed errors are not here: they live
/// in the envelope, attached to the node their path names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub value: Option<Value>,
    pub root_errors: Vec<crate::response::Error>,
}

/// Submits pending operations and reconciles their raw responses into local
/// values plus envelope entries.
#[derive(Clone)]
pub struct DelegationExecutor {
    discriminator: Arc<dyn TypeDiscriminator>,
}

impl Default for DelegationExecutor {
    fn default() -> Self {
        Self {
            discriminator: Arc::new(ByTypename),
        }
    }
}

impl DelegationExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discriminator(discriminator: Arc<dyn TypeDiscriminator>) -> Self {
        Self { discriminator }
    }

    /// The concrete type of a delegated value, per the discriminator
    /// collaborator. Used by merge logic interpreting abstract-typed nodes.
    pub fn concrete_type_of<'a>(&self, value: &'a Value) -> Option<&'a str> {
        self.discriminator.concrete_type(value)
    }

    /// Submit `operation` to `subgraph` and normalize the response.
    ///
    /// `root_path` is the local path of the delegated data root (empty for a
    /// top-level field); `response_key` is the key the delegated field's
    /// value comes back under. Transport failures surface as a single
    /// [`FetchError`], to be reported as a root error for the delegated
    /// field; they are never retried here.
    pub async fn delegate(
        &self,
        subgraph: &Subgraph,
        operation: PendingOperation,
        context: &Context,
        response_key: &str,
        root_path: &Path,
        envelope: &mut ResultEnvelope,
    ) -> Result<Normalized, FetchError> {
        let kind = operation.kind;
        if kind == OperationKind::Subscription {
            return Err(FetchError::ExecutionInvalidContent {
                reason: "subscription operations must be delegated as a stream".to_string(),
            });
        }

        let mut request = SubgraphRequest {
            kind,
            request: Request::builder()
                .query(operation.to_document())
                .operation_name(operation.operation_name.clone())
                .variables(operation.variables.clone())
                .build(),
            context: context.clone(),
        };
        for transform in subgraph.transforms() {
            request = transform.on_request(request);
        }

        tracing::debug!(
            subgraph = subgraph.name(),
            kind = kind.as_str(),
            "delegating operation"
        );
        let response = subgraph.transport().execute(request).await.map_err(|error| {
            tracing::debug!(
                subgraph = subgraph.name(),
                %error,
                "subgraph transport failed"
            );
            FetchError::SubrequestTransportError {
                subgraph: subgraph.name().to_string(),
                reason: error.to_string(),
            }
        })?;

        let mut normalized =
            normalize_response(envelope, &subgraph.id(), root_path, response_key, response);
        for transform in subgraph.transforms() {
            normalized = transform.on_result(normalized);
        }
        Ok(normalized)
    }

    /// Open a delegated subscription on `subgraph` and adapt its push source
    /// into a pull-based stream of normalized events.
    pub async fn subscribe(
        &self,
        subgraph: &Subgraph,
        operation: PendingOperation,
        context: &Context,
        response_key: &str,
    ) -> Result<SubscriptionStream, FetchError> {
        if operation.kind != OperationKind::Subscription {
            return Err(FetchError::ExecutionInvalidContent {
                reason: format!(
                    "cannot open a stream for a {} operation",
                    operation.kind.as_str()
                ),
            });
        }

        let mut request = SubgraphRequest {
            kind: operation.kind,
            request: Request::builder()
                .query(operation.to_document())
                .operation_name(operation.operation_name.clone())
                .variables(operation.variables.clone())
                .build(),
            context: context.clone(),
        };
        for transform in subgraph.transforms() {
            request = transform.on_request(request);
        }

        tracing::debug!(subgraph = subgraph.name(), "delegating subscription");
        let source = subgraph.transport().subscribe(request).await.map_err(|error| {
            FetchError::SubrequestTransportError {
                subgraph: subgraph.name().to_string(),
                reason: error.to_string(),
            }
        })?;
        Ok(SubscriptionStream::new(
            source,
            subgraph.id(),
            response_key.to_string(),
        ))
    }
}

/// Reconcile a raw subgraph response into a local value plus envelope
/// entries.
///
/// Pathed errors attach to the node their path reaches in the returned data;
/// errors with no path become root errors for the caller to surface; errors
/// whose path matches no node are retained unattached. Every object-typed
/// node present in the data gets an origin entry, so a later resolver
/// re-entering the subtree can recognize it as already delegated.
pub(crate) fn normalize_response(
    envelope: &mut ResultEnvelope,
    origin: &SubgraphId,
    root_path: &Path,
    response_key: &str,
    response: Response,
) -> Normalized {
    let Response {
        data,
        errors,
        extensions: _,
    } = response;

    let mut root_errors = Vec::new();

    let data_root = match data {
        None | Some(Value::Null) => None,
        Some(Value::Object(object)) => Some(object),
        Some(other) => {
            root_errors.push(
                FetchError::SubrequestMalformedResponse {
                    subgraph: origin.to_string(),
                    reason: format!("expected response data to be an object, got {other:?}"),
                }
                .to_graphql_error(None),
            );
            None
        }
    };

    for error in errors {
        match &error.path {
            None => root_errors.push(error),
            Some(path) if path.is_empty() => root_errors.push(error),
            Some(path) => {
                // placement requires the node to exist in the returned data
                let reachable = data_root
                    .as_ref()
                    .map(|object| node_exists(object, path))
                    .unwrap_or(false);
                if reachable {
                    let mut absolute = root_path.clone();
                    absolute.0.extend(path.iter().cloned());
                    envelope.attach_error(absolute, error);
                } else {
                    tracing::debug!(path = %path, "retaining unattached subgraph error");
                    envelope.retain_unattached(error);
                }
            }
        }
    }

    let value = match data_root {
        Some(mut object) => {
            for (key, member) in &object {
                record_origins(envelope, origin, &root_path.join_key(key.as_str()), member);
            }
            // absent key stays absent; an explicit null is kept as a value
            object.remove(response_key)
        }
        None => None,
    };

    Normalized { value, root_errors }
}

fn node_exists(data_root: &Object, path: &Path) -> bool {
    match path.0.split_first() {
        None => true,
        Some((PathElement::Key(first), rest)) => data_root
            .get(first.as_str())
            .map(|member| member.get_path(&Path(rest.to_vec())).is_ok())
            .unwrap_or(false),
        Some((PathElement::Index(_), _)) => false,
    }
}

fn record_origins(envelope: &mut ResultEnvelope, origin: &SubgraphId, path: &Path, value: &Value) {
    match value {
        Value::Object(object) => {
            envelope.record_origin(path.clone(), origin.clone());
            for (key, member) in object {
                record_origins(envelope, origin, &path.join_key(key.as_str()), member);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                record_origins(envelope, origin, &path.join(PathElement::Index(index)), item);
            }
        }
        _ => {}
    }
}
