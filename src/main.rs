use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;

use bgpinfer::{
    read_caida_asrel_graph, ASGraph, Announcement, CaidaCollector, InferenceCallback, PathPref,
    ASN,
};

const DEFAULT_TRIALS: usize = 32;
const ORIGINS_PER_TRIAL: usize = 3;

fn main() {
    env_logger::init();
    let mut args = env::args().skip(1);
    let first = args.next();
    let trials = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_TRIALS);
    let outcome = match first.as_deref() {
        Some("--download") => CaidaCollector::new()
            .run()
            .and_then(|path| run_benchmark(path, trials)),
        Some(path) => run_benchmark(PathBuf::from(path), trials),
        None => run_demo(),
    };
    if let Err(err) = outcome {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

/// Two tiers of customer cones glued together by peering meshes:
/// 1---\---\
/// |   |   |
/// 2   3   4===6   (2, 3, 4 peer with 6)
/// |   |   |   |
/// 5---/---/   7
/// |
/// |---\---\
/// 8   9   10===12
/// |   |   |    |
/// 11--/---/    13
fn demo_topology() -> Result<ASGraph, Box<dyn Error>> {
    use bgpinfer::Relationship::{P2C, P2P};
    let mut graph = ASGraph::new();
    for (a, b, rel) in [
        (1, 2, P2C),
        (1, 3, P2C),
        (1, 4, P2C),
        (2, 5, P2C),
        (3, 5, P2C),
        (4, 5, P2C),
        (2, 6, P2P),
        (3, 6, P2P),
        (4, 6, P2P),
        (6, 7, P2C),
        (5, 8, P2C),
        (5, 9, P2C),
        (5, 10, P2C),
        (8, 11, P2C),
        (9, 11, P2C),
        (10, 11, P2C),
        (8, 12, P2P),
        (9, 12, P2P),
        (10, 12, P2P),
        (12, 13, P2C),
    ] {
        graph.add_peering(a, b, rel)?;
    }
    Ok(graph)
}

fn run_demo() -> Result<(), Box<dyn Error>> {
    println!("Anycast from AS2 and AS4, with AS2 prepending toward AS5\n");

    let mut graph = demo_topology()?;
    let visited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visited);
    graph.set_callback(InferenceCallback::VisitEdge(Box::new(move |_, _, _| {
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    let mut announce = Announcement::anycast(&graph, [2, 4])?;
    if let Some(neighbor2path) = announce.source2neighbor2path.get_mut(&2) {
        // The prepend makes AS5's whole cone route through AS4.
        neighbor2path.insert(5, vec![2]);
    }
    graph.infer_paths(announce)?;

    let mut asns: Vec<ASN> = graph.asns().collect();
    asns.sort_unstable();
    println!("{:>5}  {:<8}  best paths", "AS", "pref");
    for asn in asns {
        let node = graph.get(asn).expect("listed ASN");
        let paths: Vec<String> = node
            .best_paths()
            .iter()
            .map(|path| {
                path.iter()
                    .map(|hop| hop.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        println!("{:>5}  {:<8}  [{}]", asn, node.path_pref().to_string(), paths.join(", "));
    }
    println!("\nvisited {} edges", visited.load(Ordering::Relaxed));
    Ok(())
}

fn run_benchmark(path: PathBuf, trials: usize) -> Result<(), Box<dyn Error>> {
    let load_start = Instant::now();
    let graph = read_caida_asrel_graph(&path)?;
    if graph.is_empty() {
        return Err(format!("no peering relationships in {}", path.display()).into());
    }
    println!(
        "loaded {} ASes ({} tier-1, {} IXP) in {:.2}s",
        graph.len(),
        graph.tier1s().len(),
        graph.ixps().len(),
        load_start.elapsed().as_secs_f64()
    );

    // Draw every trial's origin set up front so runs are reproducible in
    // count and comparable across thread splits.
    let asns: Vec<ASN> = graph.asns().collect();
    let mut rng = rand::thread_rng();
    let origin_sets: Vec<Vec<ASN>> = (0..trials)
        .map(|_| {
            asns.choose_multiple(&mut rng, ORIGINS_PER_TRIAL)
                .copied()
                .collect()
        })
        .collect();

    let threads = num_cpus::get().saturating_sub(1).max(1).min(trials.max(1));
    let chunk_size = (trials + threads - 1) / threads.max(1);

    let bar = ProgressBar::new(trials as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} trials")?
            .progress_chars("##-"),
    );

    let mut handles = Vec::new();
    for chunk in origin_sets.chunks(chunk_size.max(1)) {
        let chunk = chunk.to_vec();
        // Every worker owns its own copy; per-trial clones come off it.
        let base = graph.try_clone()?;
        let bar = bar.clone();
        handles.push(thread::spawn(move || -> Result<Vec<f64>, String> {
            let mut durations = Vec::with_capacity(chunk.len());
            for origins in chunk {
                let mut trial_graph = base.try_clone().map_err(|err| err.to_string())?;
                let announce = Announcement::anycast(&trial_graph, origins.iter().copied())
                    .map_err(|err| err.to_string())?;
                let start = Instant::now();
                trial_graph.infer_paths(announce).map_err(|err| err.to_string())?;
                durations.push(start.elapsed().as_secs_f64());
                bar.inc(1);
            }
            Ok(durations)
        }));
    }
    let mut durations = Vec::new();
    for handle in handles {
        durations.extend(handle.join().map_err(|_| "worker thread panicked")??);
    }
    bar.finish();

    let mean = durations.iter().sum::<f64>() / durations.len().max(1) as f64;
    let reached = {
        // One extra inference to report reachability numbers.
        let mut sample_graph = graph.try_clone()?;
        if let Some(origins) = origin_sets.first() {
            let announce = Announcement::anycast(&sample_graph, origins.iter().copied())?;
            sample_graph.infer_paths(announce)?;
        }
        sample_graph
            .iter()
            .filter(|node| node.path_pref() != PathPref::Unknown)
            .count()
    };
    println!(
        "ran {} inferences, mean {:.3}s, {} of {} ASes reached in the sampled run",
        durations.len(),
        mean,
        reached,
        graph.len()
    );

    let summary = serde_json::json!({
        "file": path.display().to_string(),
        "ases": graph.len(),
        "trials": durations.len(),
        "origins_per_trial": ORIGINS_PER_TRIAL,
        "threads": threads,
        "mean_seconds": mean,
        "durations_seconds": durations,
        "finished_at": chrono::Utc::now().to_rfc3339(),
    });
    let summary_path = PathBuf::from("bgpinfer_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    println!("wrote {}", summary_path.display());
    Ok(())
}
