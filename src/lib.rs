//! Remote schema delegation and result reconciliation.
//!
//! A schema-shaped query interface can delegate some or all of its fields to
//! remote execution backends and reconcile the partial, possibly-erroring,
//! possibly-streamed results into one response tree:
//!
//! - [`FieldMapping`] records, per subgraph, which local fields map onto
//!   which remote operations;
//! - [`ResolverFactory`] synthesizes one delegating resolver per mapped
//!   field;
//! - [`DelegationExecutor`] builds minimal operations, submits them through
//!   the [`Transport`] collaborator and normalizes the raw responses;
//! - [`ResultEnvelope`] tracks, outside the value tree, which subgraph
//!   produced each node and which errors attach at each path;
//! - [`SubscriptionStream`] adapts a subgraph's push source into a
//!   pull-based sequence of normalized events.

mod context;
mod delegation;
mod envelope;
mod error;
mod json_ext;
mod mapping;
mod request;
mod resolver;
mod response;
mod sdl;
mod selection;
mod subgraph;
mod subscription;

pub use context::*;
pub use delegation::*;
pub use envelope::*;
pub use error::*;
pub use json_ext::*;
pub use mapping::*;
pub use request::*;
pub use resolver::*;
pub use response::*;
pub use sdl::*;
pub use selection::*;
pub use subgraph::*;
pub use subscription::*;
