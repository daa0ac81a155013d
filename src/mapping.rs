//! Mapping from locally exposed fields to subgraph operations.

use std::fmt::Display;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SchemaError;

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    pub const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

/// One root operation type of a subgraph, with its declared fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootType {
    /// The type name as the subgraph spells it.
    pub name: String,

    /// Declared field names, in declaration order.
    pub fields: Vec<String>,
}

impl RootType {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// The root operation types a subgraph exposes, as supplied by the
/// introspection collaborator. Each root is optional, but a subgraph with no
/// root types at all is malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFields {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<RootType>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mutation: Option<RootType>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subscription: Option<RootType>,
}

impl RootFields {
    fn roots(&self) -> impl Iterator<Item = (OperationKind, &RootType)> {
        [
            (OperationKind::Query, self.query.as_ref()),
            (OperationKind::Mutation, self.mutation.as_ref()),
            (OperationKind::Subscription, self.subscription.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, root)| root.map(|root| (kind, root)))
    }
}

/// A single field-mapping entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedField {
    /// The field name the subgraph understands.
    pub remote_name: String,

    /// The operation kind of the root type the field belongs to.
    pub kind: OperationKind,
}

/// Per-subgraph table of (local type, local field) → subgraph operation.
///
/// Built once from a subgraph's root types and immutable thereafter. Fields
/// map 1:1 onto their remote names; renaming belongs to the transform
/// pipeline, not to this table.
#[derive(Clone, Debug, Default)]
pub struct FieldMapping {
    types: IndexMap<String, IndexMap<String, MappedField>>,
}

impl FieldMapping {
    /// Build the mapping for a subgraph from its root field inventory.
    ///
    /// Fails if the subgraph exposes no root types at all; a present root
    /// type with zero fields is allowed and contributes nothing.
    pub fn for_subgraph(
        subgraph_name: &str,
        root_fields: &RootFields,
    ) -> Result<Self, SchemaError> {
        if root_fields.query.is_none()
            && root_fields.mutation.is_none()
            && root_fields.subscription.is_none()
        {
            return Err(SchemaError::NoRootTypes(subgraph_name.to_string()));
        }

        let mut types = IndexMap::new();
        for (kind, root) in root_fields.roots() {
            let fields: &mut IndexMap<String, MappedField> =
                types.entry(root.name.clone()).or_default();
            for field in &root.fields {
                let previous = fields.insert(
                    field.clone(),
                    MappedField {
                        remote_name: field.clone(),
                        kind,
                    },
                );
                if previous.is_some() {
                    return Err(SchemaError::DuplicateField {
                        type_name: root.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }
        Ok(Self { types })
    }

    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&MappedField> {
        self.types.get(type_name)?.get(field_name)
    }

    /// All entries, in subgraph declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &MappedField)> {
        self.types.iter().flat_map(|(type_name, fields)| {
            fields
                .iter()
                .map(move |(field_name, mapped)| (type_name.as_str(), field_name.as_str(), mapped))
        })
    }

    pub fn len(&self) -> usize {
        self.types.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
