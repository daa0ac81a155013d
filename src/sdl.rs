//! Flattening of heterogeneous type-definition inputs into one SDL blob.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::ast::Document;
use indexmap::IndexSet;
use itertools::Itertools;

/// A zero-argument producer of further type definitions, used for forward
/// references and lazy composition.
pub type TypeDefsProducer = Arc<dyn Fn() -> Vec<TypeDefs> + Send + Sync>;

/// One entry of a type-definition list: literal SDL text, a pre-parsed
/// syntax node, or a producer of further entries.
///
/// A closed set by construction; there is no "unknown shape" case to reject
/// at runtime.
#[derive(Clone)]
pub enum TypeDefs {
    /// Literal SDL text.
    Text(String),

    /// A pre-structured document, printed through its `Display` impl.
    Node(Document),

    /// A producer invoked during flattening. Producers are invoked at most
    /// once, by reference identity, so self-referential producer graphs
    /// terminate. Termination requires the graph to be finite, which is the
    /// caller's responsibility.
    Lazy(TypeDefsProducer),
}

impl fmt::Debug for TypeDefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDefs::Text(text) => f.debug_tuple("Text").field(text).finish(),
            TypeDefs::Node(node) => f.debug_tuple("Node").field(node).finish(),
            TypeDefs::Lazy(producer) => f
                .debug_tuple("Lazy")
                .field(&Arc::as_ptr(producer))
                .finish(),
        }
    }
}

impl From<&str> for TypeDefs {
    fn from(text: &str) -> Self {
        TypeDefs::Text(text.to_string())
    }
}

impl From<String> for TypeDefs {
    fn from(text: String) -> Self {
        TypeDefs::Text(text)
    }
}

impl From<Document> for TypeDefs {
    fn from(node: Document) -> Self {
        TypeDefs::Node(node)
    }
}

/// Resolve a list of type-definition entries into a single deduplicated,
/// order-preserving SDL blob, entries joined with `\n`.
pub fn flatten_type_defs(defs: Vec<TypeDefs>) -> String {
    let mut chunks: IndexSet<String> = IndexSet::new();
    let mut invoked: HashSet<*const ()> = HashSet::new();
    visit(defs, &mut chunks, &mut invoked);
    chunks.iter().join("\n")
}

fn visit(defs: Vec<TypeDefs>, chunks: &mut IndexSet<String>, invoked: &mut HashSet<*const ()>) {
    for def in defs {
        match def {
            TypeDefs::Text(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    chunks.insert(text);
                }
            }
            TypeDefs::Node(node) => {
                let text = node.to_string().trim().to_string();
                if !text.is_empty() {
                    chunks.insert(text);
                }
            }
            TypeDefs::Lazy(producer) => {
                if invoked.insert(Arc::as_ptr(&producer) as *const ()) {
                    visit(producer(), chunks, invoked);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    #[test]
    fn flatten_preserves_order_and_deduplicates() {
        let result = flatten_type_defs(vec![
            "type A { id: ID }".into(),
            "type B { id: ID }".into(),
            "type A { id: ID }".into(),
        ]);
        assert_eq!(result, "type A { id: ID }\ntype B { id: ID }");
    }

    #[test]
    fn flatten_invokes_producers_and_recurses() {
        let produced: TypeDefsProducer =
            Arc::new(|| vec!["type C".into(), TypeDefs::Lazy(Arc::new(|| vec!["type D".into()]))]);
        let result = flatten_type_defs(vec!["type A".into(), TypeDefs::Lazy(produced)]);
        assert_eq!(result, "type A\ntype C\ntype D");
    }

    #[test]
    fn self_referential_producers_terminate() {
        let slot: Arc<OnceLock<TypeDefsProducer>> = Arc::new(OnceLock::new());
        let inner = slot.clone();
        let fn_a: TypeDefsProducer = Arc::new(move || {
            vec![
                "type B".into(),
                TypeDefs::Lazy(inner.get().expect("producer registered").clone()),
            ]
        });
        slot.set(fn_a.clone()).ok();

        let result = flatten_type_defs(vec!["type A".into(), TypeDefs::Lazy(fn_a)]);
        assert_eq!(result, "type A\ntype B");
    }

    #[test]
    fn parsed_documents_print_through_display() {
        let node = Document::parse("type B { id: ID }", "typedefs.graphql").unwrap();
        let expected = node.to_string().trim().to_string();
        let result = flatten_type_defs(vec!["type A".into(), node.into()]);
        assert_eq!(result, format!("type A\n{expected}"));
    }
}
