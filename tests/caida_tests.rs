use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use bzip2::write::BzEncoder;
use bzip2::Compression;

use bgpinfer::{read_caida_asrel_graph, Announcement, GraphError, PathPref, Relationship, ASN};

fn write_bz2(path: &Path, contents: &str) {
    let file = File::create(path).unwrap();
    let mut encoder = BzEncoder::new(file, Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

#[test]
fn reads_relationships_and_serial2_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("asrel.txt.bz2");
    // Mix of serial-1 style lines, a serial-2 line with a source field,
    // comments, and trailing whitespace.
    let contents = "\
# input clique: 1 2
# IXP ASes: 99
# source: topology|something|else
1|3|-1
1|4|-1
3|4|0
2|3|-1|bgp
";
    write_bz2(&path, contents);

    let graph = read_caida_asrel_graph(&path).unwrap();
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.relationship(1, 3), Some(Relationship::P2C));
    assert_eq!(graph.relationship(3, 1), Some(Relationship::C2P));
    assert_eq!(graph.relationship(1, 4), Some(Relationship::P2C));
    assert_eq!(graph.relationship(3, 4), Some(Relationship::P2P));
    assert_eq!(graph.relationship(4, 3), Some(Relationship::P2P));
    assert_eq!(graph.relationship(2, 3), Some(Relationship::P2C));
    assert_eq!(graph.relationship(1, 2), None);

    assert!(graph.tier1s().contains(&1));
    assert!(graph.tier1s().contains(&2));
    assert!(graph.ixps().contains(&99));
    assert_eq!(graph.tier1s().len(), 2);
    assert_eq!(graph.ixps().len(), 1);
}

#[test]
fn loaded_graph_infers_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("asrel.txt.bz2");
    write_bz2(&path, "1|2|-1\n2|3|-1\n1|4|0\n");

    let mut graph = read_caida_asrel_graph(&path).unwrap();
    let announce = Announcement::anycast(&graph, [3]).unwrap();
    graph.infer_paths(announce).unwrap();

    assert_eq!(graph.get(2).unwrap().best_paths(), [vec![3]]);
    assert_eq!(graph.get(2).unwrap().path_pref(), PathPref::Customer);
    assert_eq!(graph.get(1).unwrap().best_paths(), [vec![2, 3]]);
    assert_eq!(graph.get(4).unwrap().best_paths(), [vec![1, 2, 3]]);
    assert_eq!(graph.get(4).unwrap().path_pref(), PathPref::Peer);
}

#[test]
fn malformed_lines_report_their_line_number() {
    let dir = tempfile::tempdir().unwrap();

    let bad_field = dir.path().join("bad_field.txt.bz2");
    write_bz2(&bad_field, "1|2|-1\n1|x|0\n");
    assert!(matches!(
        read_caida_asrel_graph(&bad_field),
        Err(GraphError::ParseError { line_number: 2, .. })
    ));

    let bad_rel = dir.path().join("bad_rel.txt.bz2");
    write_bz2(&bad_rel, "# comment\n1|2|2\n");
    assert!(matches!(
        read_caida_asrel_graph(&bad_rel),
        Err(GraphError::ParseError { line_number: 2, .. })
    ));

    let missing_fields = dir.path().join("missing.txt.bz2");
    write_bz2(&missing_fields, "1|2\n");
    assert!(matches!(
        read_caida_asrel_graph(&missing_fields),
        Err(GraphError::ParseError { line_number: 1, .. })
    ));
}

#[test]
fn conflicting_relationships_fail_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflict.txt.bz2");
    write_bz2(&path, "1|2|-1\n1|2|0\n");
    assert!(matches!(
        read_caida_asrel_graph(&path),
        Err(GraphError::ConflictingPeering(1, 2))
    ));
}

const CAIDA_20200101_URL: &str =
    "http://data.caida.org/datasets/as-relationships/serial-1/20200101.as-rel.txt.bz2";

fn download_caida_20200101() -> PathBuf {
    let path = std::env::temp_dir().join("bgpinfer-20200101.as-rel.txt.bz2");
    if !path.exists() {
        let response = reqwest::blocking::get(CAIDA_20200101_URL).unwrap();
        assert!(response.status().is_success());
        std::fs::write(&path, response.bytes().unwrap()).unwrap();
    }
    path
}

// Downloads ~10MB from CAIDA; run with `cargo test -- --ignored`.
#[test]
#[ignore]
fn tie_break_invariance_on_real_topology() {
    use rand::seq::SliceRandom;

    let base = read_caida_asrel_graph(download_caida_20200101()).unwrap();
    let asns: Vec<ASN> = base.asns().collect();
    let mut rng = rand::thread_rng();

    for round in 0..3u64 {
        let origins: Vec<ASN> = asns.choose_multiple(&mut rng, 3).copied().collect();
        let announce = Announcement::anycast(&base, origins.iter().copied()).unwrap();

        let mut baseline = base.try_clone().unwrap();
        baseline.infer_paths(announce.clone()).unwrap();

        for seed in 0..2u64 {
            let mut shuffled = base.try_clone().unwrap();
            shuffled.randomize_tie_break(round * 100 + seed);
            shuffled.infer_paths(announce.clone()).unwrap();

            for &asn in &asns {
                let n1 = baseline.get(asn).unwrap();
                let n2 = shuffled.get(asn).unwrap();
                assert_eq!(n1.path_pref(), n2.path_pref(), "AS{}", asn);
                assert_eq!(n1.path_len(), n2.path_len(), "AS{}", asn);
                let mut p1 = n1.best_paths().to_vec();
                let mut p2 = n2.best_paths().to_vec();
                p1.sort();
                p2.sort();
                assert_eq!(p1, p2, "AS{}", asn);
            }
        }
    }
}
