//! Synthesized resolvers that delegate field resolution to a subgraph.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::Context;
use crate::delegation::DelegationExecutor;
use crate::delegation::Normalized;
use crate::delegation::PendingOperation;
use crate::envelope::ResultEnvelope;
use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::mapping::FieldMapping;
use crate::mapping::MappedField;
use crate::mapping::OperationKind;
use crate::selection::Field;
use crate::selection::Fragments;
use crate::selection::Selection;
use crate::subgraph::Subgraph;
use crate::subscription::SubscriptionStream;

/// What the local resolution step knows about the field being resolved.
#[derive(Clone, Debug, Default)]
pub struct ResolveInfo {
    /// The local field name.
    pub field_name: String,

    /// The alias-aware key the field's value appears under.
    pub response_key: String,

    /// The path of this field's value in the local result tree.
    pub path: Path,

    /// The sub-selections requested under this field.
    pub selections: Vec<Selection>,

    /// The fragment definitions of the originating request.
    pub fragments: Fragments,

    /// The variable names the reachable selections use.
    pub variable_usages: Vec<String>,
}

/// A resolver generated for one mapped field: a value capturing the target
/// subgraph, the mapping entry and the executor.
///
/// Either reuses an already-delegated parent sub-value (when the envelope
/// shows the value already lives at this resolver's subgraph) or issues a
/// fresh delegated operation. Retries, if any, belong to the transport.
#[derive(Clone)]
pub struct DelegatingResolver {
    subgraph: Arc<Subgraph>,
    mapped: MappedField,
    executor: Arc<DelegationExecutor>,
}

impl fmt::Debug for DelegatingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingResolver")
            .field("subgraph", &self.subgraph)
            .field("mapped", &self.mapped)
            .finish_non_exhaustive()
    }
}

impl DelegatingResolver {
    pub fn new(
        subgraph: Arc<Subgraph>,
        mapped: MappedField,
        executor: Arc<DelegationExecutor>,
    ) -> Self {
        Self {
            subgraph,
            mapped,
            executor,
        }
    }

    pub fn subgraph(&self) -> &Arc<Subgraph> {
        &self.subgraph
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.mapped.kind
    }

    /// Resolve a query- or mutation-kind field.
    ///
    /// `variables` are the caller's bindings; only the names in
    /// `info.variable_usages` are forwarded. Envelope reads happen before
    /// any submission, envelope writes only inside normalization.
    pub async fn resolve(
        &self,
        parent: Option<&Value>,
        arguments: IndexMap<String, Value>,
        context: &Context,
        info: &ResolveInfo,
        variables: &Object,
        envelope: &mut ResultEnvelope,
    ) -> Result<Normalized, FetchError> {
        if self.mapped.kind == OperationKind::Subscription {
            return Err(FetchError::ExecutionInvalidContent {
                reason: format!(
                    "field '{}' is a subscription and resolves to a stream",
                    info.field_name
                ),
            });
        }

        if let Some(embedded) = self.reuse_delegated(parent, info, envelope) {
            return Ok(Normalized {
                value: embedded,
                root_errors: Vec::new(),
            });
        }

        let operation = self.operation(arguments, info, variables);
        let root_path = info.path.parent().unwrap_or_default();
        self.executor
            .delegate(
                &self.subgraph,
                operation,
                context,
                &info.response_key,
                &root_path,
                envelope,
            )
            .await
    }

    /// Resolve a subscription-kind field to a stream of normalized events.
    pub async fn resolve_subscription(
        &self,
        arguments: IndexMap<String, Value>,
        context: &Context,
        info: &ResolveInfo,
        variables: &Object,
    ) -> Result<SubscriptionStream, FetchError> {
        if self.mapped.kind != OperationKind::Subscription {
            return Err(FetchError::ExecutionInvalidContent {
                reason: format!(
                    "field '{}' is a {} and resolves to a single value",
                    info.field_name,
                    self.mapped.kind.as_str()
                ),
            });
        }
        let operation = self.operation(arguments, info, variables);
        self.executor
            .subscribe(&self.subgraph, operation, context, &info.response_key)
            .await
    }

    /// The short-circuit path: when the parent's envelope entry at this
    /// field's key names provenance (or errors) from this resolver's own
    /// subgraph, the value already came back embedded in the parent call and
    /// must not be re-fetched.
    ///
    /// Returns `Some(embedded sub-value)` on a hit; the inner `None` means
    /// the subgraph omitted the field.
    fn reuse_delegated(
        &self,
        parent: Option<&Value>,
        info: &ResolveInfo,
        envelope: &ResultEnvelope,
    ) -> Option<Option<Value>> {
        let parent = match parent {
            Some(parent) if !parent.is_null() => parent,
            _ => return None,
        };
        let entry = envelope.entry(&info.path)?;
        if entry.is_empty() || entry.origin.as_ref() != Some(&self.subgraph.id()) {
            return None;
        }

        let embedded = parent
            .as_object()
            .and_then(|object| object.get(info.response_key.as_str()))
            .cloned();
        tracing::debug!(
            subgraph = self.subgraph.name(),
            path = %info.path,
            concrete_type = embedded
                .as_ref()
                .and_then(|value| self.executor.concrete_type_of(value)),
            "reusing already-delegated value"
        );
        Some(embedded)
    }

    fn operation(
        &self,
        arguments: IndexMap<String, Value>,
        info: &ResolveInfo,
        variables: &Object,
    ) -> PendingOperation {
        let alias = (info.response_key != self.mapped.remote_name)
            .then(|| info.response_key.clone());
        let root = Field {
            alias,
            name: self.mapped.remote_name.clone(),
            arguments,
            selections: info.selections.clone(),
        };
        PendingOperation::build(
            self.mapped.kind,
            None,
            root,
            &info.fragments,
            variables,
            &info.variable_usages,
        )
    }
}

/// Synthesizes one [`DelegatingResolver`] per mapped field.
#[derive(Clone, Default)]
pub struct ResolverFactory {
    executor: Arc<DelegationExecutor>,
}

impl ResolverFactory {
    pub fn new(executor: DelegationExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// The resolver for one mapped field. An unmapped field is a
    /// configuration error, raised here at schema-build time.
    pub fn resolver(
        &self,
        subgraph: &Arc<Subgraph>,
        mapping: &FieldMapping,
        type_name: &str,
        field_name: &str,
    ) -> Result<DelegatingResolver, FetchError> {
        let mapped =
            mapping
                .get(type_name, field_name)
                .ok_or_else(|| FetchError::ValidationUnmappedField {
                    subgraph: subgraph.name().to_string(),
                    field: format!("{type_name}.{field_name}"),
                })?;
        Ok(DelegatingResolver::new(
            subgraph.clone(),
            mapped.clone(),
            self.executor.clone(),
        ))
    }

    /// One resolver per entry of `mapping`, in declaration order.
    pub fn resolvers(
        &self,
        subgraph: &Arc<Subgraph>,
        mapping: &FieldMapping,
    ) -> Vec<(String, String, DelegatingResolver)> {
        mapping
            .iter()
            .map(|(type_name, field_name, mapped)| {
                (
                    type_name.to_string(),
                    field_name.to_string(),
                    DelegatingResolver::new(
                        subgraph.clone(),
                        mapped.clone(),
                        self.executor.clone(),
                    ),
                )
            })
            .collect()
    }
}
