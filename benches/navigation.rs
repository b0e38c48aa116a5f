use criterion::{criterion_group, criterion_main, Criterion, black_box};

use octonav::math::Triangle;
use octonav::nav::{build_graph, find_path, smooth, NeighborDirections};
use octonav::octree::{voxelize, BoundsClassifier, ParallelBuilder, SpatialIndex};
use octonav::{TriangleMesh, TriangleRaycaster};

use glam::Vec3;

/// Ground plane with a 3x3 grid of pillars inside a 32m root
fn test_level() -> Vec<Triangle> {
    let mut meshes = vec![TriangleMesh::plane("ground", Vec3::ZERO, 32.0, 32.0)];
    for i in 1..4 {
        for j in 1..4 {
            let corner = Vec3::new(i as f32 * 8.0 - 1.5, 0.0, j as f32 * 8.0 - 1.5);
            meshes.push(TriangleMesh::cuboid("pillar", corner, corner + Vec3::new(3.0, 12.0, 3.0)));
        }
    }
    meshes
        .iter()
        .flat_map(|mesh| mesh.world_triangles().unwrap_or_default())
        .collect()
}

fn classified_index(triangles: &[Triangle], level: u8) -> SpatialIndex {
    let template = SpatialIndex::with_root(Vec3::ZERO, 32.0, level);
    let mut index = ParallelBuilder::new(0).build(&template, triangles).unwrap();
    let ground = TriangleRaycaster::new(triangles.to_vec());
    BoundsClassifier::new(1.0e5).classify(&mut index, &ground, &|| {});
    index
}

fn bench_voxelize_sequential(c: &mut Criterion) {
    let triangles = test_level();

    c.bench_function("voxelize_sequential_level5", |b| {
        b.iter(|| {
            let mut index = SpatialIndex::with_root(Vec3::ZERO, 32.0, 5);
            voxelize(black_box(&triangles), 5, &mut index);
            index
        });
    });
}

fn bench_voxelize_parallel(c: &mut Criterion) {
    let triangles = test_level();
    let template = SpatialIndex::with_root(Vec3::ZERO, 32.0, 5);

    c.bench_function("voxelize_parallel_level5", |b| {
        b.iter(|| ParallelBuilder::new(0).build(&template, black_box(&triangles)).unwrap());
    });
}

fn bench_build_graph(c: &mut Criterion) {
    let index = classified_index(&test_level(), 5);

    c.bench_function("build_graph_level5", |b| {
        b.iter(|| build_graph(black_box(&index), NeighborDirections::FacesAndEdges));
    });
}

fn bench_find_path(c: &mut Criterion) {
    let index = classified_index(&test_level(), 5);
    let (graph, _) = build_graph(&index, NeighborDirections::FacesAndEdges);
    let start = Vec3::new(1.0, 1.5, 1.0);
    let end = Vec3::new(31.0, 1.5, 31.0);

    c.bench_function("astar_corner_to_corner", |b| {
        b.iter(|| find_path(&graph, black_box(start), black_box(end)).unwrap());
    });

    let raw = find_path(&graph, start, end).unwrap();
    c.bench_function("smooth_corner_to_corner", |b| {
        b.iter(|| smooth(black_box(&raw), &index, None));
    });
}

criterion_group!(
    benches,
    bench_voxelize_sequential,
    bench_voxelize_parallel,
    bench_build_graph,
    bench_find_path,
);
criterion_main!(benches);
