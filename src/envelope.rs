//! The proxied result envelope: provenance and error placement for partial
//! result trees.

use indexmap::IndexMap;

use crate::json_ext::Path;
use crate::response::Error;
use crate::subgraph::SubgraphId;

/// What the envelope knows about one response node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvelopeEntry {
    /// The subgraph whose delegated call produced this node.
    pub origin: Option<SubgraphId>,

    /// Errors scoped to this node.
    pub errors: Vec<Error>,
}

impl EnvelopeEntry {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.errors.is_empty()
    }
}

/// Side-table associating response nodes with their origin subgraph and the
/// errors attached at their path.
///
/// Scoped to one top-level execution and discarded with it; never embedded
/// in the result values themselves. Nodes are keyed by their [`Path`] from
/// the execution root, the same addressing the wire errors use. Origins are
/// last-write-wins; errors only accumulate.
#[derive(Debug, Default)]
pub struct ResultEnvelope {
    entries: IndexMap<Path, EnvelopeEntry>,
    unattached: Vec<Error>,
}

impl ResultEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the node at `path` was produced by `origin`.
    pub fn record_origin(&mut self, path: Path, origin: SubgraphId) {
        self.entries.entry(path).or_default().origin = Some(origin);
    }

    /// Attach an error to the node at `path`.
    pub fn attach_error(&mut self, path: Path, error: Error) {
        self.entries.entry(path).or_default().errors.push(error);
    }

    /// Retain an error whose path matched no node in the returned data. It
    /// is still surfaced to the caller, just without fine-grained placement.
    pub fn retain_unattached(&mut self, error: Error) {
        self.unattached.push(error);
    }

    pub fn entry(&self, path: &Path) -> Option<&EnvelopeEntry> {
        self.entries.get(path)
    }

    pub fn origin(&self, path: &Path) -> Option<&SubgraphId> {
        self.entries.get(path)?.origin.as_ref()
    }

    pub fn errors_at(&self, path: &Path) -> &[Error] {
        self.entries
            .get(path)
            .map(|entry| entry.errors.as_slice())
            .unwrap_or_default()
    }

    /// Errors attached at `path` or anywhere below it, in attachment order.
    pub fn errors_below(&self, path: &Path) -> Vec<&Error> {
        self.entries
            .iter()
            .filter(|(entry_path, _)| {
                entry_path.len() >= path.len()
                    && entry_path.iter().zip(path.iter()).all(|(a, b)| a == b)
            })
            .flat_map(|(_, entry)| entry.errors.iter())
            .collect()
    }

    /// Errors retained without placement, flagged best-effort.
    pub fn unattached(&self) -> &[Error] {
        &self.unattached
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.unattached.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
