//! Level geometry input: indexed triangle meshes with a world transform

use log::warn;

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec3};
use crate::math::{Aabb, Ray, Triangle};
use crate::octree::bounds::{RayHit, Raycaster};

/// An indexed triangle mesh placed in the world.
///
/// `indices` holds three vertex-buffer positions per triangle; `transform`
/// maps the local vertex positions into world space.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub transform: Mat4,
}

impl TriangleMesh {
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Closed box between `min` and `max` (12 triangles)
    pub fn cuboid(name: impl Into<String>, min: Vec3, max: Vec3) -> Self {
        let vertices = (0..8)
            .map(|i| Vec3::new(
                if i & 1 != 0 { max.x } else { min.x },
                if i & 2 != 0 { max.y } else { min.y },
                if i & 4 != 0 { max.z } else { min.z },
            ))
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        Self::new(name, vertices, indices)
    }

    /// Horizontal quad with min corner `origin`, spanning `width` along x
    /// and `depth` along z (2 triangles)
    pub fn plane(name: impl Into<String>, origin: Vec3, width: f32, depth: f32) -> Self {
        let vertices = vec![
            origin,
            origin + Vec3::new(width, 0.0, 0.0),
            origin + Vec3::new(0.0, 0.0, depth),
            origin + Vec3::new(width, 0.0, depth),
        ];
        Self::new(name, vertices, vec![0, 2, 1, 1, 2, 3])
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Resolve indices and apply the transform.
    ///
    /// Fails with [`Error::Generation`] naming the offending triangle when
    /// an index is out of the vertex buffer's range or the index buffer is
    /// not a whole number of triangles.
    pub fn world_triangles(&self) -> Result<Vec<Triangle>> {
        if self.indices.len() % 3 != 0 {
            return Err(Error::Generation {
                mesh: self.name.clone(),
                triangle: self.indices.len() / 3,
                reason: format!("index buffer length {} is not a multiple of 3", self.indices.len()),
            });
        }

        let world: Vec<Vec3> = self.vertices
            .iter()
            .map(|v| self.transform.transform_point3(*v))
            .collect();

        self.indices
            .chunks_exact(3)
            .enumerate()
            .map(|(triangle, corners)| {
                let mut resolved = [Vec3::ZERO; 3];
                for (slot, &vertex) in corners.iter().enumerate() {
                    resolved[slot] = *world.get(vertex as usize).ok_or_else(|| Error::Generation {
                        mesh: self.name.clone(),
                        triangle,
                        reason: format!(
                            "vertex index {} out of range ({} vertices)",
                            vertex,
                            world.len()
                        ),
                    })?;
                }
                Ok(Triangle::new(resolved[0], resolved[1], resolved[2]))
            })
            .collect()
    }
}

/// World triangles of every mesh that resolves cleanly.
///
/// A malformed mesh is left out and returned alongside the triangles; the
/// other meshes are unaffected.
pub fn collect_triangles(meshes: &[TriangleMesh]) -> (Vec<Triangle>, Vec<Error>) {
    let mut triangles = Vec::with_capacity(meshes.iter().map(|m| m.triangle_count()).sum());
    let mut rejected = Vec::new();
    for mesh in meshes {
        match mesh.world_triangles() {
            Ok(tris) => triangles.extend(tris),
            Err(err) => {
                warn!("Skipping mesh '{}': {}", mesh.name, err);
                rejected.push(err);
            }
        }
    }
    (triangles, rejected)
}

/// Brute-force ray caster over a triangle soup.
///
/// Stands in for a host physics engine when classifying bounds offline.
pub struct TriangleRaycaster {
    triangles: Vec<Triangle>,
    bounds: Option<Aabb>,
}

impl TriangleRaycaster {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let bounds = Aabb::from_points(triangles.iter().flat_map(|t| t.vertices()));
        Self { triangles, bounds }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

impl Raycaster for TriangleRaycaster {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let ray = Ray::new(origin, direction.normalize_or_zero());
        let bounds = self.bounds?;
        if ray.intersects_aabb(&bounds).is_none() {
            return None;
        }
        self.triangles
            .iter()
            .filter_map(|tri| tri.raycast(&ray, max_distance).map(|t| (t, tri)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(distance, tri)| RayHit {
                point: ray.at(distance),
                normal: tri.normal().normalize_or_zero(),
                distance,
            })
    }
}
