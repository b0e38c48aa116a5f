//! Navigation generator binary: builds a demo level, saves its index and
//! runs a sample path query.
//!
//! Usage: cargo run --release --bin generate_nav -- [OPTIONS]
//!
//! Options:
//!   --size <METERS>    Ground plane edge length (default: 64)
//!   --level <N>        Max division level (default: 6)
//!   --batches <N>      Voxelization batches (default: one per thread)
//!   --pillars <N>      Pillars per row on the ground (default: 4)
//!   --config <PATH>    Load a NavConfig JSON file (flags above override it)
//!   --out <PATH>       Output file (default: assets/nav/demo.nav)

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;

use octonav::core::logging;
use octonav::octree::persist;
use octonav::{NavConfig, NavPipeline, NavigationData, TriangleMesh, TriangleRaycaster};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(err) = run().await {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> octonav::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => NavConfig::load(&PathBuf::from(path))?,
        None => NavConfig::default(),
    };
    if let Some(level) = parse_u8_arg(&args, "--level") {
        config.max_division_level = level;
    }
    if let Some(batches) = parse_usize_arg(&args, "--batches") {
        config.batch_count = batches;
    }
    let size = parse_f32_arg(&args, "--size").unwrap_or(64.0);
    let pillars = parse_usize_arg(&args, "--pillars").unwrap_or(4);
    let out = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "assets/nav/demo.nav".to_string()));

    println!("=== Octonav Generator ===");
    println!("Ground:  {}m x {}m, {} x {} pillars", size, size, pillars, pillars);
    println!("Level:   {}", config.max_division_level);
    println!("Batches: {}", if config.batch_count == 0 { "auto".to_string() } else { config.batch_count.to_string() });
    println!("Output:  {}", out.display());
    println!();

    let meshes = demo_level(size, pillars);
    let triangles: Vec<_> = meshes
        .iter()
        .filter_map(|mesh| mesh.world_triangles().ok())
        .flatten()
        .collect();
    let ground = Arc::new(TriangleRaycaster::new(triangles));
    println!("Meshes: {} ({} triangles)", meshes.len(), ground.triangle_count());

    let start = Instant::now();
    let directions = config.neighbor_directions;
    let handle = NavPipeline::new(config)?.spawn(meshes, ground)?;
    while !handle.is_finished() {
        print!("\r  {:?}: {:5.1}%", handle.phase(), handle.progress() * 100.0);
        let _ = std::io::stdout().flush();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let data = handle.finish().await?;
    println!("\r  Done in {:.2}s                ", start.elapsed().as_secs_f64());

    report(&data);
    for rejected in &data.rejected_meshes {
        println!("  rejected: {}", rejected);
    }

    persist::save_index(&out, &data.index).await?;
    let reloaded = NavigationData::from_index(persist::load_index(&out).await?, directions);
    println!(
        "Saved and reloaded {} ({} graph nodes after reload)",
        out.display(),
        reloaded.graph.len()
    );
    println!();

    let from = Vec3::new(1.0, 1.5, 1.0);
    let to = Vec3::new(size - 1.0, 1.5, size - 1.0);
    let query = Instant::now();
    match reloaded.find_path(from, to) {
        Ok(raw) => {
            let smoothed = reloaded.smooth(&raw, None);
            println!(
                "Path {:?} -> {:?}: {} waypoints, {} after smoothing ({:.2}ms)",
                from,
                to,
                raw.len(),
                smoothed.len(),
                query.elapsed().as_secs_f64() * 1000.0
            );
            for point in &smoothed {
                println!("  {:?}", point);
            }
        }
        Err(err) => println!("Path {:?} -> {:?}: {}", from, to, err),
    }
    Ok(())
}

/// Ground plane with a grid of box pillars
fn demo_level(size: f32, pillars: usize) -> Vec<TriangleMesh> {
    let mut meshes = vec![TriangleMesh::plane("ground", Vec3::ZERO, size, size)];
    let spacing = size / (pillars as f32 + 1.0);
    for i in 0..pillars {
        for j in 0..pillars {
            let center = Vec3::new(spacing * (i as f32 + 1.0), 0.0, spacing * (j as f32 + 1.0));
            let half = Vec3::new(spacing * 0.2, 0.0, spacing * 0.2);
            meshes.push(TriangleMesh::cuboid(
                format!("pillar_{}_{}", i, j),
                center - half,
                center + half + Vec3::Y * size * 0.25,
            ));
        }
    }
    meshes
}

fn report(data: &NavigationData) {
    let bounds = &data.bounds_stats;
    let graph = &data.graph_stats;
    println!(
        "Index: {} nodes, root {} at {:?}, max level {}",
        data.index.len(),
        data.index.root_size(),
        data.index.corner(),
        data.index.max_level()
    );
    println!(
        "Leaves: {} collision, {} grounded, {} out of bounds",
        bounds.collision_leaves, bounds.grounded_leaves, bounds.out_of_bounds_leaves
    );
    println!(
        "Graph: {} nodes, {} edges ({} cross-level links, {} skipped)",
        graph.nodes, graph.edges, graph.cross_level_links, graph.missing_nodes
    );
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u8_arg(args: &[String], flag: &str) -> Option<u8> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
