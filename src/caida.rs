use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use chrono::{Datelike, Duration, Utc};

use crate::as_graph::{ASGraph, ASN};
use crate::shared::{GraphError, Relationship};

const CAIDA_SERIAL2_URL: &str = "http://data.caida.org/datasets/as-relationships/serial-2/";

/// Build an [`ASGraph`] from a bzip2-compressed CAIDA AS-relationship file.
///
/// Relationship lines are `<a>|<b>|<rel>` with `-1` meaning `a` is a
/// provider of `b` and `0` meaning `a` and `b` are peers; extra fields and
/// trailing whitespace are tolerated. Comment lines start with `#`; the
/// serial-2 clique and IXP headers are kept as graph metadata.
pub fn read_caida_asrel_graph(filepath: impl AsRef<Path>) -> Result<ASGraph, GraphError> {
    let filepath = filepath.as_ref();
    let file = File::open(filepath)?;
    let reader = BufReader::new(BzDecoder::new(file));

    let mut graph = ASGraph::new();
    let mut lines = 0usize;
    let mut peerings = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        lines += 1;
        if let Some(comment) = line.strip_prefix('#') {
            parse_metadata_comment(&mut graph, comment);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (source, sink, relationship) = parse_relationship_line(&line, index + 1)?;
        graph.add_peering(source, sink, relationship)?;
        peerings += 1;
    }
    log::info!(
        "read {}: {} lines, {} peering relationships",
        filepath.display(),
        lines,
        peerings
    );
    Ok(graph)
}

// serial-2 headers carry the clique and IXP ASes:
//   # input clique: 174 209 286 ...
//   # IXP ASes: 1200 4635 ...
fn parse_metadata_comment(graph: &mut ASGraph, comment: &str) {
    let comment = comment.trim();
    if let Some(asns) = comment.strip_prefix("input clique:") {
        graph.tier1s.extend(parse_asn_list(asns));
    } else if let Some(asns) = comment.strip_prefix("IXP ASes:") {
        graph.ixps.extend(parse_asn_list(asns));
    }
}

fn parse_asn_list(list: &str) -> impl Iterator<Item = ASN> + '_ {
    list.split_whitespace().filter_map(|token| token.parse().ok())
}

fn parse_relationship_line(
    line: &str,
    line_number: usize,
) -> Result<(ASN, ASN, Relationship), GraphError> {
    let mut fields = line.trim().split('|');
    let (source, sink, rel) = match (fields.next(), fields.next(), fields.next()) {
        (Some(source), Some(sink), Some(rel)) => (source, sink, rel),
        _ => {
            return Err(GraphError::ParseError {
                line_number,
                reason: format!("expected <as>|<as>|<rel>, got {:?}", line),
            })
        }
    };
    let source: ASN = source.parse().map_err(|_| GraphError::ParseError {
        line_number,
        reason: format!("bad AS number {:?}", source),
    })?;
    let sink: ASN = sink.parse().map_err(|_| GraphError::ParseError {
        line_number,
        reason: format!("bad AS number {:?}", sink),
    })?;
    let relationship = match rel {
        "-1" => Relationship::P2C,
        "0" => Relationship::P2P,
        _ => {
            return Err(GraphError::ParseError {
                line_number,
                reason: format!("unknown relationship {:?}", rel),
            })
        }
    };
    Ok((source, sink, relationship))
}

/// Downloads and caches CAIDA serial-2 AS-relationship dumps.
///
/// Files stay compressed in the cache; [`read_caida_asrel_graph`] consumes
/// them directly.
#[derive(Debug, Clone)]
pub struct CaidaCollector {
    days_ago: i64,
    cache_dir: PathBuf,
}

impl CaidaCollector {
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bgpinfer");
        CaidaCollector {
            days_ago: 0,
            cache_dir,
        }
    }

    pub fn with_days_ago(mut self, days_ago: i64) -> Self {
        self.days_ago = days_ago;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Fetch the dump for the configured date unless already cached, and
    /// return the path to the compressed file.
    pub fn run(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        fs::create_dir_all(&self.cache_dir)?;
        let filename = self.filename();
        let cached = self.cache_dir.join(&filename);
        if cached.exists() {
            log::info!("using cached CAIDA data at {}", cached.display());
            return Ok(cached);
        }

        let url = format!("{}{}", CAIDA_SERIAL2_URL, filename);
        log::info!("downloading {}", url);
        let response = reqwest::blocking::get(url.as_str())?;
        if !response.status().is_success() {
            return Err(format!("failed to download {}: {}", url, response.status()).into());
        }
        fs::write(&cached, response.bytes()?)?;
        Ok(cached)
    }

    // Dumps are published on the first of each month.
    fn filename(&self) -> String {
        let date = (Utc::now() - Duration::days(self.days_ago)).date_naive();
        let date = date.with_day(1).unwrap_or(date);
        format!("{}.as-rel2.txt.bz2", date.format("%Y%m%d"))
    }
}

impl Default for CaidaCollector {
    fn default() -> Self {
        Self::new()
    }
}
