//! Selection sets and fragments for delegated operations.

use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;

pub(crate) const TYPENAME: &str = "__typename";

/// A selection that is part of a delegated operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),

    /// A named fragment spread.
    FragmentSpread(FragmentSpread),
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Selection::Field(Field {
            alias: None,
            name: name.into(),
            arguments: IndexMap::new(),
            selections: Vec::new(),
        })
    }
}

/// A field, possibly aliased, with literal arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    pub name: String,

    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub arguments: IndexMap<String, Value>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub selections: Vec<Selection>,
}

impl Field {
    /// The key the field's value appears under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// An inline fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_condition: Option<String>,

    pub selections: Vec<Selection>,
}

/// A named fragment spread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSpread {
    pub name: String,
}

/// A named fragment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub name: String,
    pub type_condition: String,
    pub selections: Vec<Selection>,
}

/// The fragment definitions of the originating request, by name.
pub type Fragments = IndexMap<String, Fragment>;

/// Collects the names of fragments transitively reachable from `selections`.
///
/// Each fragment is recorded once, in first-reference order, so definitions
/// are included in the delegated document by reference and never duplicated.
pub(crate) fn reachable_fragments(
    selections: &[Selection],
    fragments: &Fragments,
) -> IndexSet<String> {
    let mut reached = IndexSet::new();
    collect_reachable(selections, fragments, &mut reached);
    reached
}

fn collect_reachable(
    selections: &[Selection],
    fragments: &Fragments,
    reached: &mut IndexSet<String>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => collect_reachable(&field.selections, fragments, reached),
            Selection::InlineFragment(inline) => {
                collect_reachable(&inline.selections, fragments, reached)
            }
            Selection::FragmentSpread(spread) => {
                if reached.insert(spread.name.clone()) {
                    if let Some(fragment) = fragments.get(&spread.name) {
                        collect_reachable(&fragment.selections, fragments, reached);
                    }
                }
            }
        }
    }
}

/// Adds a `__typename` discriminator to every selection set that branches on
/// an abstract type, so the merge step can recover concrete types from the
/// delegated result.
///
/// A selection set branches on an abstract type when it holds an inline
/// fragment or a fragment spread; plain field selections need no
/// discriminator.
pub(crate) fn annotate_abstract_selections(selections: &mut Vec<Selection>) {
    let has_branches = selections
        .iter()
        .any(|selection| !matches!(selection, Selection::Field(_)));
    if has_branches && !selects_typename(selections) {
        selections.insert(0, Selection::field(TYPENAME));
    }
    for selection in selections {
        match selection {
            Selection::Field(field) => annotate_abstract_selections(&mut field.selections),
            Selection::InlineFragment(inline) => {
                annotate_abstract_selections(&mut inline.selections)
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

fn selects_typename(selections: &[Selection]) -> bool {
    selections.iter().any(|selection| {
        matches!(selection, Selection::Field(field) if field.name == TYPENAME && field.alias.is_none())
    })
}

/// Prints a selection set in compact document form, `{ ... }` included.
pub(crate) fn print_selection_set(selections: &[Selection]) -> String {
    format!(
        "{{ {} }}",
        selections.iter().map(print_selection).join(" ")
    )
}

fn print_selection(selection: &Selection) -> String {
    match selection {
        Selection::Field(field) => {
            let mut out = String::new();
            if let Some(alias) = &field.alias {
                out.push_str(alias);
                out.push_str(": ");
            }
            out.push_str(&field.name);
            if !field.arguments.is_empty() {
                out.push('(');
                out.push_str(
                    &field
                        .arguments
                        .iter()
                        .map(|(name, value)| format!("{name}: {}", print_value(value)))
                        .join(", "),
                );
                out.push(')');
            }
            if !field.selections.is_empty() {
                out.push(' ');
                out.push_str(&print_selection_set(&field.selections));
            }
            out
        }
        Selection::InlineFragment(inline) => match &inline.type_condition {
            Some(condition) => format!(
                "... on {condition} {}",
                print_selection_set(&inline.selections)
            ),
            None => format!("... {}", print_selection_set(&inline.selections)),
        },
        Selection::FragmentSpread(spread) => format!("...{}", spread.name),
    }
}

pub(crate) fn print_fragment(fragment: &Fragment) -> String {
    format!(
        "fragment {} on {} {}",
        fragment.name,
        fragment.type_condition,
        print_selection_set(&fragment.selections)
    )
}

/// Renders a JSON value as a GraphQL literal.
fn print_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // serde_json's string formatting matches GraphQL string literals
        Value::String(s) => serde_json::to_string(s.as_str()).unwrap_or_default(),
        Value::Array(values) => format!("[{}]", values.iter().map(print_value).join(", ")),
        Value::Object(object) => format!(
            "{{{}}}",
            object
                .iter()
                .map(|(key, value)| format!("{}: {}", key.as_str(), print_value(value)))
                .join(", ")
        ),
    }
}
