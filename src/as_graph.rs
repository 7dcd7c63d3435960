use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::announcement::Announcement;
use crate::engine::{InferenceCallback, InferenceCallbacks, WorkQueue};
use crate::shared::{AnnouncementError, GraphError, PathPref, Relationship};

pub type ASN = u32;

/// AS-path from an importer toward an origin, next hop first. The importer
/// itself is not part of the path.
pub type ASPath = Vec<ASN>;

/// Per-AS import filter.
///
/// The filter receives the exporter's ASN and the candidate paths tied for
/// best (each already starting with the exporter) and returns the paths
/// actually imported. State the filter needs goes into its captures.
pub type ImportFilter = Arc<dyn Fn(ASN, Vec<ASPath>) -> Vec<ASPath> + Send + Sync>;

/// A single AS: its peerings and the inference state attached to it.
#[derive(Clone)]
pub struct AS {
    pub asn: ASN,
    pub(crate) neighbors: BTreeMap<ASN, Relationship>,
    pub(crate) best_paths: Vec<ASPath>,
    pub(crate) path_len: usize,
    pub(crate) path_pref: PathPref,
    pub(crate) import_filter: Option<ImportFilter>,
}

impl AS {
    pub(crate) fn new(asn: ASN) -> Self {
        AS {
            asn,
            neighbors: BTreeMap::new(),
            best_paths: Vec::new(),
            path_len: 0,
            path_pref: PathPref::Unknown,
            import_filter: None,
        }
    }

    /// All AS-paths currently tied for best, in no particular order.
    pub fn best_paths(&self) -> &[ASPath] {
        &self.best_paths
    }

    /// Preference class of `best_paths`; `Unknown` before any import.
    pub fn path_pref(&self) -> PathPref {
        self.path_pref
    }

    /// Length of every path in `best_paths`; `None` while `path_pref` is
    /// `Unknown`.
    pub fn path_len(&self) -> Option<usize> {
        (self.path_pref != PathPref::Unknown).then_some(self.path_len)
    }

    /// Neighbors with the relationship labeled from this AS's side.
    pub fn neighbors(&self) -> impl Iterator<Item = (ASN, Relationship)> + '_ {
        self.neighbors.iter().map(|(&asn, &rel)| (asn, rel))
    }

    /// Relationship toward `neighbor`, if the peering exists.
    pub fn relationship(&self, neighbor: ASN) -> Option<Relationship> {
        self.neighbors.get(&neighbor).copied()
    }

    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }
}

impl fmt::Debug for AS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AS")
            .field("asn", &self.asn)
            .field("degree", &self.neighbors.len())
            .field("path_pref", &self.path_pref)
            .field("best_paths", &self.best_paths)
            .finish()
    }
}

/// Graph of ASes with a relationship label in each edge direction and
/// per-AS inference state.
///
/// Build it with [`ASGraph::add_peering`] or
/// [`crate::caida::read_caida_asrel_graph`], then call
/// [`ASGraph::infer_paths`] once. Clone first to run several announcements
/// over the same topology.
pub struct ASGraph {
    pub(crate) as_dict: HashMap<ASN, AS>,
    pub(crate) workqueue: WorkQueue,
    pub(crate) announce: Option<Announcement>,
    pub(crate) callbacks: InferenceCallbacks,
    pub(crate) tier1s: HashSet<ASN>,
    pub(crate) ixps: HashSet<ASN>,
}

impl ASGraph {
    pub fn new() -> Self {
        ASGraph {
            as_dict: HashMap::new(),
            workqueue: WorkQueue::new(),
            announce: None,
            callbacks: InferenceCallbacks::default(),
            tier1s: HashSet::new(),
            ixps: HashSet::new(),
        }
    }

    /// Number of ASes in the graph.
    pub fn len(&self) -> usize {
        self.as_dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_dict.is_empty()
    }

    pub fn contains(&self, asn: ASN) -> bool {
        self.as_dict.contains_key(&asn)
    }

    /// Get an AS by ASN.
    pub fn get(&self, asn: ASN) -> Option<&AS> {
        self.as_dict.get(&asn)
    }

    /// Iterate over all ASes.
    pub fn iter(&self) -> impl Iterator<Item = &AS> {
        self.as_dict.values()
    }

    /// Iterate over all ASNs.
    pub fn asns(&self) -> impl Iterator<Item = ASN> + '_ {
        self.as_dict.keys().copied()
    }

    /// Relationship labeled on the directed edge `from -> to`.
    pub fn relationship(&self, from: ASN, to: ASN) -> Option<Relationship> {
        self.as_dict.get(&from).and_then(|node| node.relationship(to))
    }

    /// Tier-1 ASes declared by the loaded dataset; empty when the graph was
    /// built by hand or the dataset carries no clique header.
    pub fn tier1s(&self) -> &HashSet<ASN> {
        &self.tier1s
    }

    /// IXP ASes declared by the loaded dataset.
    pub fn ixps(&self) -> &HashSet<ASN> {
        &self.ixps
    }

    /// Whether [`ASGraph::infer_paths`] already ran on this instance.
    pub fn inferred(&self) -> bool {
        self.announce.is_some()
    }

    /// The announcement paths were inferred for, once inference ran.
    pub fn announcement(&self) -> Option<&Announcement> {
        self.announce.as_ref()
    }

    /// Add the nodes and reciprocal edges of one peering relationship.
    ///
    /// Re-adding an existing peering with the same relationship is a no-op;
    /// a different relationship fails with
    /// [`GraphError::ConflictingPeering`].
    ///
    /// # Panics
    ///
    /// Panics if `source == sink`.
    pub fn add_peering(
        &mut self,
        source: ASN,
        sink: ASN,
        relationship: Relationship,
    ) -> Result<(), GraphError> {
        assert_ne!(source, sink, "AS{} cannot peer with itself", source);
        if let Some(existing) = self.relationship(source, sink) {
            if existing != relationship {
                return Err(GraphError::ConflictingPeering(source, sink));
            }
            return Ok(());
        }
        self.as_dict
            .entry(source)
            .or_insert_with(|| AS::new(source))
            .neighbors
            .insert(sink, relationship);
        self.as_dict
            .entry(sink)
            .or_insert_with(|| AS::new(sink))
            .neighbors
            .insert(source, relationship.reversed());
        Ok(())
    }

    /// Attach an import filter to one AS.
    ///
    /// # Panics
    ///
    /// Panics if `asn` is not in the graph.
    pub fn set_import_filter<F>(&mut self, asn: ASN, filter: F)
    where
        F: Fn(ASN, Vec<ASPath>) -> Vec<ASPath> + Send + Sync + 'static,
    {
        match self.as_dict.get_mut(&asn) {
            Some(node) => node.import_filter = Some(Arc::new(filter)),
            None => panic!("AS{} not in graph", asn),
        }
    }

    /// Install an observational callback; at most one per hook point.
    pub fn set_callback(&mut self, callback: InferenceCallback) {
        match callback {
            InferenceCallback::StartRelationshipPhase(hook) => {
                self.callbacks.start_phase = Some(hook)
            }
            InferenceCallback::NeighborAnnounce(hook) => {
                self.callbacks.neighbor_announce = Some(hook)
            }
            InferenceCallback::VisitEdge(hook) => self.callbacks.visit_edge = Some(hook),
        }
    }

    /// Check that all announced peerings exist and that no announced path
    /// poisons the adjacent neighbor.
    pub fn check_announcement(&self, announce: &Announcement) -> Result<(), GraphError> {
        for (&source, neighbor2path) in &announce.source2neighbor2path {
            let node = self
                .as_dict
                .get(&source)
                .ok_or(AnnouncementError::UnknownOrigin(source))?;
            for (&neighbor, path) in neighbor2path {
                if !node.neighbors.contains_key(&neighbor) {
                    return Err(AnnouncementError::UnknownNeighbor {
                        origin: source,
                        neighbor,
                    }
                    .into());
                }
                if path.contains(&neighbor) {
                    return Err(AnnouncementError::SelfPoison {
                        origin: source,
                        neighbor,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Deep copy for running further inferences: same topology, state, and
    /// import filters, but a fresh work queue, no announcement, and no
    /// callbacks. Fails once inference has begun on `self`.
    pub fn try_clone(&self) -> Result<ASGraph, GraphError> {
        if self.announce.is_some() {
            return Err(GraphError::AlreadyInferred);
        }
        Ok(ASGraph {
            as_dict: self.as_dict.clone(),
            workqueue: WorkQueue::new(),
            announce: None,
            callbacks: InferenceCallbacks::default(),
            tier1s: self.tier1s.clone(),
            ixps: self.ixps.clone(),
        })
    }
}

impl Default for ASGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ASGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ASGraph")
            .field("ases", &self.as_dict.len())
            .field("tier1s", &self.tier1s.len())
            .field("ixps", &self.ixps.len())
            .field("inferred", &self.announce.is_some())
            .finish()
    }
}
