use std::collections::BTreeMap;
use std::fmt;
use std::mem;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::announcement::Announcement;
use crate::as_graph::{ASGraph, ASN, ASPath};
use crate::shared::{GraphError, PathPref};

/// Observational hooks into the inference traversal.
///
/// Callbacks receive copies of the visited identifiers and read-only path
/// views; they cannot reach back into the graph.
pub enum InferenceCallback {
    /// Start of a relationship phase. Phases run in preference order:
    /// customer, peer, provider.
    StartRelationshipPhase(Box<dyn FnMut(PathPref) + Send>),
    /// An origin initializing routes at one of its neighbors during
    /// seeding, with the path it announces toward that neighbor.
    NeighborAnnounce(Box<dyn FnMut(ASN, ASN, PathPref, &[ASN]) + Send>),
    /// An `(exporter, importer)` edge dequeued from the work queue.
    VisitEdge(Box<dyn FnMut(ASN, ASN, PathPref) + Send>),
}

#[derive(Default)]
pub(crate) struct InferenceCallbacks {
    pub(crate) start_phase: Option<Box<dyn FnMut(PathPref) + Send>>,
    pub(crate) neighbor_announce: Option<Box<dyn FnMut(ASN, ASN, PathPref, &[ASN]) + Send>>,
    pub(crate) visit_edge: Option<Box<dyn FnMut(ASN, ASN, PathPref) + Send>>,
}

enum TieBreak {
    Newest,
    Random(StdRng),
}

#[derive(Default)]
struct DepthBuckets {
    depth2edges: Vec<Vec<(ASN, ASN)>>,
    // Depths below the cursor are exhausted. Within a phase, new work only
    // shows up at or beyond the depth currently being drained.
    cursor: usize,
}

/// Pending `(exporter, importer)` edges, bucketed by the preference the
/// import would have at the importer and, within each preference, by the
/// exporter's current path length.
pub struct WorkQueue {
    buckets: [DepthBuckets; 3],
    tie_break: TieBreak,
}

impl WorkQueue {
    pub fn new() -> Self {
        WorkQueue {
            buckets: Default::default(),
            tie_break: TieBreak::Newest,
        }
    }

    fn index(pref: PathPref) -> Option<usize> {
        match pref {
            PathPref::Customer => Some(0),
            PathPref::Peer => Some(1),
            PathPref::Provider => Some(2),
            PathPref::Unknown => None,
        }
    }

    /// Pop an edge from the smallest non-empty depth of `pref`'s bucket.
    pub fn get(&mut self, pref: PathPref) -> Option<(ASN, ASN)> {
        let bucket = &mut self.buckets[Self::index(pref)?];
        while bucket.cursor < bucket.depth2edges.len() {
            let edges = &mut bucket.depth2edges[bucket.cursor];
            if edges.is_empty() {
                bucket.cursor += 1;
                continue;
            }
            return match &mut self.tie_break {
                TieBreak::Newest => edges.pop(),
                TieBreak::Random(rng) => {
                    let index = rng.gen_range(0..edges.len());
                    Some(edges.swap_remove(index))
                }
            };
        }
        None
    }

    /// Enqueue work to forward `exporter`'s freshly acquired paths to its
    /// downstream neighbors.
    ///
    /// An edge toward a neighbor is enqueued only if the export is legal
    /// under Gao-Rexford policy: customer routes are exported to everyone,
    /// anything is exported to customers.
    pub fn add_work(&mut self, graph: &ASGraph, exporter: ASN) {
        let node = match graph.get(exporter) {
            Some(node) => node,
            None => return,
        };
        let pref = node.path_pref();
        let depth = match node.path_len() {
            Some(len) => len,
            None => return,
        };
        for (downstream, rel) in node.neighbors() {
            let downstream_pref = PathPref::from_import_relationship(rel.reversed());
            if pref == PathPref::Customer || downstream_pref == PathPref::Provider {
                self.push(downstream_pref, depth, (exporter, downstream));
            }
        }
    }

    fn push(&mut self, pref: PathPref, depth: usize, edge: (ASN, ASN)) {
        if let Some(index) = Self::index(pref) {
            let bucket = &mut self.buckets[index];
            if bucket.depth2edges.len() <= depth {
                bucket.depth2edges.resize_with(depth + 1, Vec::new);
            }
            bucket.depth2edges[depth].push(edge);
        }
    }

    /// Check that every edge `add_work(exporter)` would enqueue is still
    /// pending. Guards the no-new-enqueue branch of the transition function:
    /// an importer extending its tied set must already have its downstream
    /// work queued from the first install.
    pub fn check_work(&self, graph: &ASGraph, exporter: ASN) -> bool {
        let node = match graph.get(exporter) {
            Some(node) => node,
            None => return false,
        };
        let pref = node.path_pref();
        let depth = match node.path_len() {
            Some(len) => len,
            None => return false,
        };
        for (downstream, rel) in node.neighbors() {
            let downstream_pref = PathPref::from_import_relationship(rel.reversed());
            if pref != PathPref::Customer && downstream_pref != PathPref::Provider {
                continue;
            }
            let index = match Self::index(downstream_pref) {
                Some(index) => index,
                None => return false,
            };
            let pending = self.buckets[index]
                .depth2edges
                .get(depth)
                .map_or(false, |edges| edges.contains(&(exporter, downstream)));
            if !pending {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.buckets
            .iter()
            .all(|bucket| bucket.depth2edges.iter().all(Vec::is_empty))
    }

    pub(crate) fn randomize(&mut self, seed: u64) {
        self.tie_break = TieBreak::Random(StdRng::seed_from_u64(seed));
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: usize = self
            .buckets
            .iter()
            .map(|bucket| bucket.depth2edges.iter().map(Vec::len).sum::<usize>())
            .sum();
        f.debug_struct("WorkQueue").field("pending", &pending).finish()
    }
}

fn prepend(exporter: ASN, path: &[ASN]) -> ASPath {
    let mut new_path = Vec::with_capacity(path.len() + 1);
    new_path.push(exporter);
    new_path.extend_from_slice(path);
    new_path
}

impl ASGraph {
    /// Switch the work queue's intra-depth tie-break from newest-first to a
    /// seeded random draw.
    ///
    /// Converged preferences, path lengths, and path sets do not depend on
    /// the tie-break; this knob exists to validate that property on real
    /// graphs.
    pub fn randomize_tie_break(&mut self, seed: u64) {
        self.workqueue.randomize(seed);
    }

    /// Infer all AS-paths tied for best toward the announcement's origins.
    ///
    /// The traversal visits peering links in decreasing order of import
    /// preference. An AS that learned a path of preference X never installs
    /// a path with preference worse than X, nor a longer path of preference
    /// X, so best paths are computed directly without ever materializing
    /// candidates that a reactive simulator would later withdraw. Paths
    /// crossing a P2P or C2P link are only learnable through chains of
    /// providers, which is why the provider phase stratifies by length
    /// alone.
    ///
    /// Runs at most once per graph instance; inferring another announcement
    /// over the same topology requires [`ASGraph::try_clone`].
    pub fn infer_paths(&mut self, announce: Announcement) -> Result<(), GraphError> {
        if self.announce.is_some() {
            return Err(GraphError::AlreadyInferred);
        }
        self.check_announcement(&announce)?;

        let mut queue = mem::take(&mut self.workqueue);
        let mut callbacks = mem::take(&mut self.callbacks);
        for pref in PathPref::PHASES {
            log::debug!("starting {} phase", pref);
            if let Some(hook) = callbacks.start_phase.as_mut() {
                hook(pref);
            }
            self.make_announcements(&announce, pref, &mut queue, &mut callbacks)?;
            while let Some((exporter, importer)) = queue.get(pref) {
                if let Some(hook) = callbacks.visit_edge.as_mut() {
                    hook(exporter, importer, pref);
                }
                if announce.has_source(importer) {
                    // Origins never import.
                    continue;
                }
                debug_assert_eq!(
                    PathPref::from_relationship(self, exporter, importer).ok(),
                    Some(pref)
                );
                if self.update_paths(&queue, exporter, importer, None)? {
                    queue.add_work(self, importer);
                }
            }
        }
        self.workqueue = queue;
        self.callbacks = callbacks;
        self.announce = Some(announce);
        Ok(())
    }

    /// Initialize paths at origin neighbors whose import preference matches
    /// the current phase.
    ///
    /// Per neighbor, only the shortest announced paths survive: the
    /// transition function never lets installed paths shrink, so longer
    /// announcements toward the same neighbor are dead on arrival.
    fn make_announcements(
        &mut self,
        announce: &Announcement,
        pref: PathPref,
        queue: &mut WorkQueue,
        callbacks: &mut InferenceCallbacks,
    ) -> Result<(), GraphError> {
        let mut nei2len2srcs: BTreeMap<ASN, BTreeMap<usize, Vec<ASN>>> = BTreeMap::new();
        for (&source, neighbor2path) in &announce.source2neighbor2path {
            for (&neighbor, path) in neighbor2path {
                if PathPref::from_relationship(self, source, neighbor)? != pref {
                    continue;
                }
                if let Some(hook) = callbacks.neighbor_announce.as_mut() {
                    hook(source, neighbor, pref, path);
                }
                nei2len2srcs
                    .entry(neighbor)
                    .or_default()
                    .entry(path.len())
                    .or_default()
                    .push(source);
            }
        }

        for (neighbor, len2srcs) in nei2len2srcs {
            if let Some((_, sources)) = len2srcs.into_iter().next() {
                for source in sources {
                    let path = &announce.source2neighbor2path[&source][&neighbor];
                    if self.update_paths(queue, source, neighbor, Some(path))? {
                        queue.add_work(self, neighbor);
                    }
                }
            }
        }
        Ok(())
    }

    /// Decide whether `importer` accepts paths advertised by `exporter`.
    ///
    /// Returns `Ok(true)` when the importer just got its first paths, in
    /// which case the caller must enqueue the importer's downstream work.
    /// Additional paths tied at the same length extend the existing set and
    /// return `Ok(false)`: the first install already enqueued the work.
    ///
    /// `announce_path` overrides the exporter's own best paths during
    /// seeding, which is how per-neighbor prepending and poisoning enter
    /// the graph. The importer must not appear in `announce_path`.
    fn update_paths(
        &mut self,
        queue: &WorkQueue,
        exporter: ASN,
        importer: ASN,
        announce_path: Option<&ASPath>,
    ) -> Result<bool, GraphError> {
        let new_pref = PathPref::from_relationship(self, exporter, importer)?;
        let importer_node = &self.as_dict[&importer];
        let current_pref = importer_node.path_pref;
        let import_filter = importer_node.import_filter.clone();

        debug_assert!(current_pref == PathPref::Unknown || current_pref >= new_pref);
        if current_pref > new_pref {
            return Ok(false);
        }

        let mut new_paths: Vec<ASPath> = match announce_path {
            Some(path) => {
                debug_assert!(!path.contains(&importer));
                vec![prepend(exporter, path)]
            }
            None => self.as_dict[&exporter]
                .best_paths
                .iter()
                .filter(|path| !path.contains(&importer))
                .map(|path| prepend(exporter, path))
                .collect(),
        };
        if let Some(filter) = import_filter {
            new_paths = filter(exporter, new_paths);
        }
        if new_paths.is_empty() {
            return Ok(false);
        }
        let new_path_len = new_paths[0].len();

        {
            let node = match self.as_dict.get_mut(&importer) {
                Some(node) => node,
                None => return Err(GraphError::InvalidRelationship { exporter, importer }),
            };
            if current_pref == PathPref::Unknown {
                node.best_paths = new_paths;
                node.path_len = new_path_len;
                node.path_pref = new_pref;
                return Ok(true);
            }
            debug_assert_eq!(current_pref, new_pref);
            debug_assert!(new_path_len >= node.path_len);
            if new_path_len != node.path_len {
                return Ok(false);
            }
            node.best_paths.extend(new_paths);
        }
        debug_assert!(queue.check_work(self, importer));
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Relationship::{P2C, P2P};

    // AS2 is a peer of AS3 but not a customer of AS1:
    // 1--------\---\
    // |    2---3   4
    // |    5   |   6
    // |    7   8---/
    // |    9
    // 10---/
    fn implicit_withdrawal_graph() -> ASGraph {
        let mut graph = ASGraph::new();
        for (a, b, rel) in [
            (1, 3, P2C),
            (1, 4, P2C),
            (1, 10, P2C),
            (2, 3, P2P),
            (2, 5, P2C),
            (3, 8, P2C),
            (4, 6, P2C),
            (5, 7, P2C),
            (6, 8, P2C),
            (7, 9, P2C),
            (9, 10, P2C),
        ] {
            graph.add_peering(a, b, rel).unwrap();
        }
        graph
    }

    fn preset(graph: &mut ASGraph, asn: ASN, paths: Vec<ASPath>, pref: PathPref) {
        let len = paths.first().map(Vec::len).unwrap_or(0);
        let node = graph.as_dict.get_mut(&asn).unwrap();
        node.best_paths = paths;
        node.path_len = len;
        node.path_pref = pref;
    }

    fn preloaded_queue() -> (ASGraph, WorkQueue) {
        let mut graph = implicit_withdrawal_graph();
        preset(&mut graph, 3, vec![vec![]], PathPref::Customer);
        preset(&mut graph, 7, vec![vec![7, 7]], PathPref::Customer);
        let mut queue = WorkQueue::new();
        queue.add_work(&graph, 3);
        queue.add_work(&graph, 7);
        (graph, queue)
    }

    #[test]
    fn get_orders_by_depth_within_each_preference() {
        let (_, mut queue) = preloaded_queue();
        assert_eq!(queue.get(PathPref::Customer), Some((3, 1)));
        assert_eq!(queue.get(PathPref::Customer), Some((7, 5)));
        assert_eq!(queue.get(PathPref::Customer), None);
        assert_eq!(queue.get(PathPref::Peer), Some((3, 2)));
        assert_eq!(queue.get(PathPref::Peer), None);
        assert_eq!(queue.get(PathPref::Provider), Some((3, 8)));
        assert_eq!(queue.get(PathPref::Provider), Some((7, 9)));
        assert_eq!(queue.get(PathPref::Provider), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn get_on_unknown_preference_is_none() {
        let (_, mut queue) = preloaded_queue();
        assert_eq!(queue.get(PathPref::Unknown), None);
    }

    #[test]
    fn add_work_skips_illegal_exports() {
        let mut graph = implicit_withdrawal_graph();
        // A peer route at AS3 may only flow to AS3's customers.
        preset(&mut graph, 3, vec![vec![2, 5, 7, 9, 10]], PathPref::Peer);
        let mut queue = WorkQueue::new();
        queue.add_work(&graph, 3);
        assert_eq!(queue.get(PathPref::Provider), Some((3, 8)));
        assert_eq!(queue.get(PathPref::Provider), None);
        assert_eq!(queue.get(PathPref::Customer), None);
        assert_eq!(queue.get(PathPref::Peer), None);
    }

    #[test]
    fn check_work_reports_pending_edges() {
        let (graph, mut queue) = preloaded_queue();
        assert!(queue.check_work(&graph, 3));
        assert!(queue.check_work(&graph, 7));
        // Draining AS3's customer-bucket edge invalidates its work set.
        assert_eq!(queue.get(PathPref::Customer), Some((3, 1)));
        assert!(!queue.check_work(&graph, 3));
        assert!(queue.check_work(&graph, 7));
    }

    #[test]
    fn randomized_get_drains_the_same_edges() {
        let (_, mut baseline) = preloaded_queue();
        let (_, mut shuffled) = preloaded_queue();
        shuffled.randomize(7);
        for pref in PathPref::PHASES {
            let mut expected = Vec::new();
            while let Some(edge) = baseline.get(pref) {
                expected.push(edge);
            }
            let mut drained = Vec::new();
            while let Some(edge) = shuffled.get(pref) {
                drained.push(edge);
            }
            expected.sort_unstable();
            drained.sort_unstable();
            assert_eq!(expected, drained);
        }
    }
}
