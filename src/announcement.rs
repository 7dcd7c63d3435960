use std::collections::BTreeMap;

use crate::as_graph::{ASGraph, ASN, ASPath};
use crate::shared::{AnnouncementError, GraphError};

/// Specification of a prefix announcement.
///
/// A prefix can be announced simultaneously by a set of origin ASes. Each
/// origin announces to all or a subset of its neighbors, and can manipulate
/// the AS-path it exports toward each neighbor, e.g. to prepend itself or to
/// poison another AS. The empty path is a plain announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Announcement {
    pub source2neighbor2path: BTreeMap<ASN, BTreeMap<ASN, ASPath>>,
}

impl Announcement {
    pub fn new(source2neighbor2path: BTreeMap<ASN, BTreeMap<ASN, ASPath>>) -> Self {
        Announcement {
            source2neighbor2path,
        }
    }

    /// Announce from every source to all of its neighbors without
    /// prepending. Fails if a source is not in the graph.
    pub fn anycast(
        graph: &ASGraph,
        sources: impl IntoIterator<Item = ASN>,
    ) -> Result<Announcement, GraphError> {
        let mut source2neighbor2path = BTreeMap::new();
        for source in sources {
            let node = graph
                .get(source)
                .ok_or(AnnouncementError::UnknownOrigin(source))?;
            let neighbor2path = node
                .neighbors()
                .map(|(neighbor, _)| (neighbor, ASPath::new()))
                .collect();
            source2neighbor2path.insert(source, neighbor2path);
        }
        Ok(Announcement {
            source2neighbor2path,
        })
    }

    /// ASes originating the prefix.
    pub fn sources(&self) -> impl Iterator<Item = ASN> + '_ {
        self.source2neighbor2path.keys().copied()
    }

    pub fn has_source(&self, asn: ASN) -> bool {
        self.source2neighbor2path.contains_key(&asn)
    }
}
