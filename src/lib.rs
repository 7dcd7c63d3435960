//! Inference of converged BGP best paths over AS-relationship graphs.
//!
//! Given a graph of ASes labeled with customer, provider, and peer
//! relationships and an announcement naming the origin ASes, the engine
//! computes, at every AS, the complete set of AS-paths tied for best under
//! Gao-Rexford export policy and local-preference ordering. The traversal
//! is phased by preference and stratified by path length, so it produces
//! the converged state directly instead of replaying announcement and
//! withdrawal dynamics.

// Re-export all public modules
pub mod announcement;
pub mod as_graph;
pub mod caida;
pub mod engine;
pub mod shared;

// Re-export commonly used types at the crate root
pub use announcement::Announcement;
pub use as_graph::{ASGraph, ImportFilter, ASN, ASPath, AS};
pub use caida::{read_caida_asrel_graph, CaidaCollector};
pub use engine::{InferenceCallback, WorkQueue};
pub use shared::{AnnouncementError, GraphError, PathPref, Relationship};
