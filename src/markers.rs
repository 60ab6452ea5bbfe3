//! Decorative marker boxes framing the viewport.
//!
//! Every marker is a flat box named [`MARKER_NAME`] with an edge outline
//! child named [`OUTLINE_NAME`] drawn in half the marker's color. Markers
//! are selectable; nothing else reacts to them.

use crate::material::{Color, Material};
use crate::model::CpuMesh;
use crate::scene::{NodeId, NodeKind, SceneGraph, Transform};
use cgmath::Vector3;

pub const MARKER_NAME: &str = "cube";
pub const OUTLINE_NAME: &str = "cube-frame";

#[derive(Debug, Clone)]
pub struct MarkerConfig {
    /// Marker width; height is half of it and depth a 64th.
    pub size: f32,
    /// Columns in the top and bottom bands. The side bands get one less.
    pub count: usize,
    /// Rows stacked in each top and bottom column.
    pub band_depth: usize,
    /// Columns stacked outwards in each side band.
    pub side_depth: usize,
    /// Distance from the view center to the first row of each band.
    pub edge_offset: f32,
    pub scale: f32,
    pub top_color: u32,
    pub bottom_color: u32,
    pub left_color: u32,
    pub right_color: u32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            size: 60.0,
            count: 10,
            band_depth: 5,
            side_depth: 3,
            edge_offset: 150.0,
            scale: 0.9,
            top_color: 0xaa0000,
            bottom_color: 0x00aa00,
            left_color: 0x0000aa,
            right_color: 0x00aaaa,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vector3<f32>,
    pub color: Color,
}

/// The marker layout per band, in order: top, bottom, left, right.
pub fn layout(config: &MarkerConfig) -> [Vec<Placement>; 4] {
    let size = config.size;
    let n = config.count;
    let offset = config.edge_offset;
    let place = |x: f32, y: f32, z: f32, hex: u32| Placement {
        position: Vector3::new(x, y, z),
        color: Color::from_hex(hex),
    };

    let mut top = Vec::new();
    let mut bottom = Vec::new();
    let initial_x = n.saturating_sub(1) as f32 * size / 2.0;
    for i in 0..n {
        for j in 0..config.band_depth {
            let x = initial_x - size * i as f32;
            let y = size / 1.45 * j as f32;
            let z = -size * j as f32 * 0.75;
            top.push(place(x, y + offset, z, config.top_color));
            bottom.push(place(x, -y - offset, z, config.bottom_color));
        }
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    let initial_y = offset - size / 2.0;
    for i in 0..n.saturating_sub(1) {
        for j in 0..config.side_depth {
            let y = initial_y - size / 2.0 * i as f32;
            let x = size * j as f32;
            left.push(place(x + offset, y, 0.0, config.left_color));
            right.push(place(-x - offset, y, 0.0, config.right_color));
        }
    }

    [top, bottom, left, right]
}

/// Adds the four marker bands to the scene as root groups. All markers share
/// one box mesh and one outline mesh.
pub fn generate(scene: &mut SceneGraph, config: &MarkerConfig) -> Vec<NodeId> {
    let geometry = CpuMesh::cuboid(config.size, config.size / 2.0, config.size / 64.0);
    let outline = scene.add_mesh(geometry.edges());
    let geometry = scene.add_mesh(geometry);

    let mut groups = Vec::with_capacity(4);
    let names = ["markers-top", "markers-bottom", "markers-left", "markers-right"];
    for (name, band) in names.into_iter().zip(layout(config)) {
        let Some(group) = scene.add(name, Transform::default(), NodeKind::Group, None) else {
            continue;
        };
        for placement in band {
            let mut transform = Transform::from_position(placement.position);
            transform.set_uniform_scale(config.scale);
            let kind = NodeKind::Mesh {
                mesh: geometry,
                material: Material::with_color(placement.color),
            };
            let Some(marker) = scene.add(MARKER_NAME, transform, kind, Some(group)) else {
                continue;
            };
            let kind = NodeKind::Mesh {
                mesh: outline,
                material: Material::with_color(placement.color.scaled(0.5)),
            };
            if let Some(frame) = scene.add(OUTLINE_NAME, Transform::default(), kind, Some(marker))
            {
                if let Some(node) = scene.get_mut(frame) {
                    node.render_order = 1;
                }
            }
        }
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_counts() {
        let [top, bottom, left, right] = layout(&MarkerConfig::default());
        assert_eq!(top.len(), 50);
        assert_eq!(bottom.len(), 50);
        assert_eq!(left.len(), 27);
        assert_eq!(right.len(), 27);
    }

    #[test]
    fn bands_sit_on_their_edges() {
        let [top, bottom, left, right] = layout(&MarkerConfig::default());
        assert!(top.iter().all(|p| p.position.y >= 150.0));
        assert!(bottom.iter().all(|p| p.position.y <= -150.0));
        assert!(left.iter().all(|p| p.position.x >= 150.0 && p.position.z == 0.0));
        assert!(right.iter().all(|p| p.position.x <= -150.0));

        // first column of the top band, first row
        assert_eq!(top[0].position, Vector3::new(270.0, 150.0, 0.0));
        // one row back: raised and pushed away from the camera
        assert_eq!(top[1].position.z, -45.0);
        assert_eq!(left[0].position, Vector3::new(150.0, 120.0, 0.0));
    }

    #[test]
    fn generated_markers_carry_outline_children() {
        let mut scene = SceneGraph::new();
        let groups = generate(&mut scene, &MarkerConfig::default());
        assert_eq!(groups.len(), 4);
        assert_eq!(scene.mesh_count(), 2);
        assert_eq!(scene.find_by_name(MARKER_NAME).count(), 154);
        assert_eq!(scene.find_by_name(OUTLINE_NAME).count(), 154);

        let marker = scene.get(groups[0]).unwrap().children()[0];
        let marker_node = scene.get(marker).unwrap();
        let root = marker_node.material().unwrap().color;
        assert_eq!(root.to_hex(), 0xaa0000);

        let frame = scene.get(marker_node.children()[0]).unwrap();
        assert_eq!(frame.name, OUTLINE_NAME);
        assert_eq!(frame.render_order, 1);
        assert_eq!(frame.material().unwrap().color.to_hex(), 0x550000);
    }
}
