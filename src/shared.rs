use std::fmt;

use thiserror::Error;

use crate::as_graph::{ASGraph, ASN};

/// Peering relationship between a pair of ASes, labeled on directed edges.
///
/// An edge `u -> v` labeled `C2P` means `u` is a customer of `v`; the
/// reciprocal edge `v -> u` then carries `P2C`. Discriminants match the
/// encoding used by CAIDA AS-relationship dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(i8)]
pub enum Relationship {
    C2P = 1,
    P2P = 0,
    P2C = -1,
}

impl Relationship {
    /// Get the relationship in the opposite direction of an edge.
    pub fn reversed(&self) -> Self {
        match self {
            Relationship::C2P => Relationship::P2C,
            Relationship::P2P => Relationship::P2P,
            Relationship::P2C => Relationship::C2P,
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relationship::C2P => "C2P",
            Relationship::P2P => "P2P",
            Relationship::P2C => "P2C",
        };
        write!(f, "{}", s)
    }
}

/// Preference of paths imported by an AS.
///
/// Customer routes beat peer routes beat provider routes; `Unknown` marks an
/// AS that has not learned any path yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(u8)]
pub enum PathPref {
    Unknown = 0,
    Provider = 1,
    Peer = 2,
    Customer = 3,
}

impl PathPref {
    /// Inference phases in processing order.
    pub const PHASES: [PathPref; 3] = [PathPref::Customer, PathPref::Peer, PathPref::Provider];

    /// Preference of routes imported over an edge, given the edge's
    /// relationship label on the importer's side.
    pub fn from_import_relationship(rel: Relationship) -> PathPref {
        match rel {
            Relationship::P2C => PathPref::Customer,
            Relationship::P2P => PathPref::Peer,
            Relationship::C2P => PathPref::Provider,
        }
    }

    /// Preference at `importer` of routes exported by `exporter`, looked up
    /// from the peering stored in `graph`.
    pub fn from_relationship(
        graph: &ASGraph,
        exporter: ASN,
        importer: ASN,
    ) -> Result<PathPref, GraphError> {
        graph
            .relationship(importer, exporter)
            .map(PathPref::from_import_relationship)
            .ok_or(GraphError::InvalidRelationship { exporter, importer })
    }
}

impl fmt::Display for PathPref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathPref::Unknown => "UNKNOWN",
            PathPref::Provider => "PROVIDER",
            PathPref::Peer => "PEER",
            PathPref::Customer => "CUSTOMER",
        };
        write!(f, "{}", s)
    }
}

/// Reasons an announcement fails validation against a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnnouncementError {
    #[error("origin AS{0} not in graph")]
    UnknownOrigin(ASN),
    #[error("peering AS{origin}-AS{neighbor} not in graph")]
    UnknownNeighbor { origin: ASN, neighbor: ASN },
    #[error("announcement from AS{origin} poisons adjacent neighbor AS{neighbor}")]
    SelfPoison { origin: ASN, neighbor: ASN },
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// A peering was re-added with a relationship that disagrees with the
    /// existing edge.
    #[error("duplicate peering AS{0}-AS{1} with a different relationship")]
    ConflictingPeering(ASN, ASN),
    /// A relationship lookup found no edge where one was required.
    #[error("no relationship from AS{importer} toward AS{exporter}")]
    InvalidRelationship { exporter: ASN, importer: ASN },
    #[error("invalid announcement: {0}")]
    InvalidAnnouncement(#[from] AnnouncementError),
    /// `infer_paths` or `try_clone` was called after inference already ran.
    #[error("paths were already inferred on this graph")]
    AlreadyInferred,
    #[error("parse error on line {line_number}: {reason}")]
    ParseError { line_number: usize, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_ordering() {
        assert!(PathPref::Customer > PathPref::Peer);
        assert!(PathPref::Peer > PathPref::Provider);
        assert!(PathPref::Provider > PathPref::Unknown);
    }

    #[test]
    fn reversed_is_involutive() {
        for rel in [Relationship::C2P, Relationship::P2P, Relationship::P2C] {
            assert_eq!(rel.reversed().reversed(), rel);
        }
        assert_eq!(Relationship::C2P.reversed(), Relationship::P2C);
        assert_eq!(Relationship::P2P.reversed(), Relationship::P2P);
    }

    #[test]
    fn import_preference_per_relationship() {
        assert_eq!(
            PathPref::from_import_relationship(Relationship::P2C),
            PathPref::Customer
        );
        assert_eq!(
            PathPref::from_import_relationship(Relationship::P2P),
            PathPref::Peer
        );
        assert_eq!(
            PathPref::from_import_relationship(Relationship::C2P),
            PathPref::Provider
        );
    }
}
