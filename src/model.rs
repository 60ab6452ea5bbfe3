use crate::bounds::Aabb;
use cgmath::{InnerSpace, Point3, Vector3};
use std::collections::HashMap;
use std::ops::Range;
use wgpu::util::DeviceExt;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{
            BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
        };
        VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Lines,
}

/// CPU-side geometry, as produced by the decoders and the marker generator.
#[derive(Debug, Clone)]
pub struct CpuMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl CpuMesh {
    pub fn triangles(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        let indices = if indices.is_empty() {
            (0..positions.len() as u32).collect()
        } else {
            indices
        };
        let mut mesh = Self {
            positions,
            normals,
            indices,
            topology: Topology::Triangles,
        };
        if mesh.normals.len() != mesh.positions.len() {
            mesh.compute_vertex_normals();
        }
        mesh
    }

    /// Axis-aligned box centered on the origin with 24 vertices so each face
    /// carries its own normal.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
        // (normal, u axis, v axis) per face; corners are n +- u +- v
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let half = [hx, hy, hz];
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (n, u, v) in faces {
            let base = positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p: [f32; 3] =
                    std::array::from_fn(|k| (n[k] + su * u[k] + sv * v[k]) * half[k]);
                positions.push(p);
                normals.push(n);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            positions,
            normals,
            indices,
            topology: Topology::Triangles,
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().map(|p| Point3::from(*p)))
    }

    fn triangle(&self, tri: &[u32]) -> Option<[Vector3<f32>; 3]> {
        let p = |i: u32| self.positions.get(i as usize).map(|p| Vector3::from(*p));
        Some([p(tri[0])?, p(tri[1])?, p(tri[2])?])
    }

    /// Smooth normals from the area-weighted face normals around each vertex.
    pub fn compute_vertex_normals(&mut self) {
        let mut acc = vec![Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            if let Some([a, b, c]) = self.triangle(tri) {
                let face = (b - a).cross(c - a);
                for &i in tri {
                    acc[i as usize] += face;
                }
            }
        }
        self.normals = acc
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 0.0, 1.0]
                }
            })
            .collect();
    }

    /// Line-list geometry of the edges whose adjacent faces meet at more than
    /// one degree, plus open boundary edges.
    pub fn edges(&self) -> CpuMesh {
        const THRESHOLD_DOT: f32 = 0.999_847_7; // cos(1 deg)
        // Vertices are welded by position so split normals do not create seams
        let key = |p: [f32; 3]| p.map(|c| (c * 1e4).round() as i64);
        let mut welded: HashMap<[i64; 3], u32> = HashMap::new();
        let mut edges: HashMap<(u32, u32), (Vector3<f32>, [f32; 3], [f32; 3], bool)> =
            HashMap::new();
        let mut order = Vec::new();

        for tri in self.indices.chunks_exact(3) {
            let Some([a, b, c]) = self.triangle(tri) else {
                continue;
            };
            let normal = (b - a).cross(c - a);
            if normal.magnitude2() == 0.0 {
                continue;
            }
            let normal = normal.normalize();
            for k in 0..3 {
                let pa = self.positions[tri[k] as usize];
                let pb = self.positions[tri[(k + 1) % 3] as usize];
                let next = welded.len() as u32;
                let ia = *welded.entry(key(pa)).or_insert(next);
                let next = welded.len() as u32;
                let ib = *welded.entry(key(pb)).or_insert(next);
                if ia == ib {
                    continue;
                }
                let edge = (ia.min(ib), ia.max(ib));
                match edges.get_mut(&edge) {
                    Some(entry) => {
                        // second face decides whether the crease is visible
                        entry.3 = entry.0.dot(normal) <= THRESHOLD_DOT;
                    }
                    None => {
                        edges.insert(edge, (normal, pa, pb, true));
                        order.push(edge);
                    }
                }
            }
        }

        let mut positions = Vec::new();
        for edge in order {
            let (_, pa, pb, visible) = edges[&edge];
            if visible {
                positions.push(pa);
                positions.push(pb);
            }
        }
        let indices = (0..positions.len() as u32).collect();
        let normals = vec![[0.0, 0.0, 1.0]; positions.len()];

        CpuMesh {
            positions,
            normals,
            indices,
            topology: Topology::Lines,
        }
    }

    /// Nearest intersection distance of the ray with this mesh's triangles.
    /// Both faces count. Lines never intersect.
    pub fn ray_intersect(&self, origin: Point3<f32>, direction: Vector3<f32>) -> Option<f32> {
        if self.topology != Topology::Triangles {
            return None;
        }
        self.bounding_box().ray_hit(origin, direction)?;

        let o = Vector3::new(origin.x, origin.y, origin.z);
        let mut nearest: Option<f32> = None;
        for tri in self.indices.chunks_exact(3) {
            let Some([a, b, c]) = self.triangle(tri) else {
                continue;
            };
            // Moller-Trumbore
            let e1 = b - a;
            let e2 = c - a;
            let p = direction.cross(e2);
            let det = e1.dot(p);
            if det.abs() < f32::EPSILON {
                continue;
            }
            let inv_det = 1.0 / det;
            let s = o - a;
            let u = s.dot(p) * inv_det;
            if !(0.0..=1.0).contains(&u) {
                continue;
            }
            let q = s.cross(e1);
            let v = direction.dot(q) * inv_det;
            if v < 0.0 || u + v > 1.0 {
                continue;
            }
            let t = e2.dot(q) * inv_det;
            if t > 0.0 && nearest.is_none_or(|n| t < n) {
                nearest = Some(t);
            }
        }
        nearest
    }

    pub fn vertices(&self) -> Vec<ModelVertex> {
        self.positions
            .iter()
            .zip(self.normals.iter())
            .map(|(position, normal)| ModelVertex {
                position: *position,
                normal: *normal,
            })
            .collect()
    }
}

/// GPU realization of a [`CpuMesh`].
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub topology: Topology,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, mesh: &CpuMesh, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(&mesh.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_elements: mesh.indices.len() as u32,
            topology: mesh.topology,
        }
    }
}

pub trait DrawMesh<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a GpuMesh,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a, 'b> DrawMesh<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b GpuMesh,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, camera_bind_group, &[]);
        self.set_bind_group(1, light_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }
}
