//! Scene graph.
//!
//! Nodes live in a generational arena: a [`NodeId`] held after its node was
//! removed simply stops resolving instead of aliasing whatever reuses the
//! slot. Decoders build detached [`SceneObject`] trees which are inserted in
//! one go; their meshes move into a per-scene store that is reference
//! counted by the nodes using them.

use crate::bounds::Aabb;
use crate::material::{Color, Material};
use crate::model::{CpuMesh, Topology};
use cgmath::{Matrix4, Point3, Quaternion, SquareMatrix, Transform as _, Vector3};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn set_uniform_scale(&mut self, s: f32) {
        self.scale = Vector3::new(s, s, s);
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh { mesh: MeshId, material: Material },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    /// Higher orders draw later within a frame.
    pub render_order: i32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn material(&self) -> Option<&Material> {
        match &self.kind {
            NodeKind::Mesh { material, .. } => Some(material),
            NodeKind::Group => None,
        }
    }

    pub fn material_mut(&mut self) -> Option<&mut Material> {
        match &mut self.kind {
            NodeKind::Mesh { material, .. } => Some(material),
            NodeKind::Group => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Group,
    Mesh { mesh: CpuMesh, material: Material },
}

/// A decoded object tree that is not part of any scene yet.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub kind: ObjectKind,
    pub render_order: i32,
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            kind: ObjectKind::Group,
            render_order: 0,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: CpuMesh, material: Material) -> Self {
        Self {
            kind: ObjectKind::Mesh { mesh, material },
            ..Self::group(name)
        }
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    /// Bounds in the parent's frame, i.e. with this object's own transform
    /// applied.
    pub fn bounding_box(&self) -> Aabb {
        self.bounds_under(&Matrix4::identity())
    }

    fn bounds_under(&self, parent: &Matrix4<f32>) -> Aabb {
        let world = parent * self.transform.matrix();
        let own = match &self.kind {
            ObjectKind::Mesh { mesh, .. } => mesh.bounding_box().transformed(&world),
            ObjectKind::Group => Aabb::empty(),
        };
        self.children
            .iter()
            .fold(own, |acc, child| acc.union(&child.bounds_under(&world)))
    }

    /// Moves the object so its bounding-box center sits on the parent origin.
    pub fn center_on_origin(&mut self) {
        let center = self.bounding_box().center();
        self.transform.position -= Vector3::new(center.x, center.y, center.z);
    }

    /// Depth-first visit of this object and every descendant.
    pub fn traverse_mut(&mut self, f: &mut dyn FnMut(&mut SceneObject)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let own = matches!(self.kind, ObjectKind::Mesh { .. }) as usize;
        own + self.children.iter().map(SceneObject::mesh_count).sum::<usize>()
    }
}

/// Nearest ray intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub node: NodeId,
    pub distance: f32,
    pub point: Point3<f32>,
}

/// One mesh instance to draw this frame.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub mesh: MeshId,
    pub topology: Topology,
    pub world: Matrix4<f32>,
    pub color: Color,
    pub render_order: i32,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

struct MeshEntry {
    mesh: CpuMesh,
    users: usize,
}

#[derive(Default)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    meshes: HashMap<MeshId, MeshEntry>,
    next_mesh: u32,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers geometry that nodes can share. The mesh is dropped again
    /// once the last node using it is removed.
    pub fn add_mesh(&mut self, mesh: CpuMesh) -> MeshId {
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.insert(id, MeshEntry { mesh, users: 0 });
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&CpuMesh> {
        self.meshes.get(&id).map(|entry| &entry.mesh)
    }

    pub fn contains_mesh(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a node under `parent`, or as a root. Returns `None` when the
    /// parent no longer exists.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return None;
            }
        }
        if let NodeKind::Mesh { mesh, .. } = &kind {
            let entry = self.meshes.get_mut(mesh)?;
            entry.users += 1;
        }

        let node = Node {
            name: name.into(),
            transform,
            kind,
            render_order: 0,
            parent,
            children: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        };

        match parent.and_then(|p| self.get_mut(p)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        Some(id)
    }

    /// Inserts a detached tree, moving its meshes into the scene's store.
    pub fn insert_object(&mut self, object: SceneObject, parent: Option<NodeId>) -> Option<NodeId> {
        let SceneObject {
            name,
            transform,
            kind,
            render_order,
            children,
        } = object;
        let kind = match kind {
            ObjectKind::Group => NodeKind::Group,
            ObjectKind::Mesh { mesh, material } => NodeKind::Mesh {
                mesh: self.add_mesh(mesh),
                material,
            },
        };
        let id = self.add(name, transform, kind, parent)?;
        if let Some(node) = self.get_mut(id) {
            node.render_order = render_order;
        }
        for child in children {
            self.insert_object(child, Some(id))?;
        }
        Some(id)
    }

    /// Removes a node and its whole subtree. Returns whether it existed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        match node.parent.and_then(|p| self.get_mut(p)) {
            Some(parent) => parent.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index as usize];
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);

            if let NodeKind::Mesh { mesh, .. } = node.kind {
                if let Some(entry) = self.meshes.get_mut(&mesh) {
                    entry.users = entry.users.saturating_sub(1);
                    if entry.users == 0 {
                        self.meshes.remove(&mesh);
                    }
                }
            }
            stack.extend(node.children);
        }
        true
    }

    /// Whether `id` is `ancestor` or lies somewhere below it.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.get(node_id).and_then(|node| node.parent);
        }
        false
    }

    pub fn world_matrix(&self, id: NodeId) -> Option<Matrix4<f32>> {
        let mut node = self.get(id)?;
        let mut matrix = node.transform.matrix();
        while let Some(parent) = node.parent.and_then(|p| self.get(p)) {
            matrix = parent.transform.matrix() * matrix;
            node = parent;
        }
        Some(matrix)
    }

    /// Depth-first walk of a subtree with each node's world matrix.
    fn walk(&self, from: &[NodeId], parent: Matrix4<f32>, f: &mut dyn FnMut(NodeId, &Node, &Matrix4<f32>)) {
        for &id in from {
            if let Some(node) = self.get(id) {
                let world = parent * node.transform.matrix();
                f(id, node, &world);
                self.walk(&node.children, world, f);
            }
        }
    }

    /// World-space bounds of a node and its descendants.
    pub fn bounding_box(&self, id: NodeId) -> Aabb {
        let Some(node) = self.get(id) else {
            return Aabb::empty();
        };
        let parent = node
            .parent
            .and_then(|p| self.world_matrix(p))
            .unwrap_or_else(Matrix4::identity);

        let mut aabb = Aabb::empty();
        self.walk(&[id], parent, &mut |_, node, world| {
            if let NodeKind::Mesh { mesh, .. } = &node.kind {
                if let Some(mesh) = self.mesh(*mesh) {
                    aabb = aabb.union(&mesh.bounding_box().transformed(world));
                }
            }
        });
        aabb
    }

    /// Nearest triangle-mesh hit along a world-space ray over every node in
    /// the scene. Line geometry is not pickable.
    pub fn raycast(&self, origin: Point3<f32>, direction: Vector3<f32>) -> Option<Hit> {
        let mut nearest: Option<Hit> = None;
        self.walk(&self.roots, Matrix4::identity(), &mut |id, node, world| {
            let NodeKind::Mesh { mesh, .. } = &node.kind else {
                return;
            };
            let (Some(mesh), Some(inverse)) = (self.mesh(*mesh), world.invert()) else {
                return;
            };
            // The ray parameter is preserved by the affine map, so the local
            // distance is the world distance for a unit world direction.
            let local_origin = inverse.transform_point(origin);
            let local_direction = inverse.transform_vector(direction);
            if let Some(t) = mesh.ray_intersect(local_origin, local_direction) {
                if nearest.is_none_or(|n| t < n.distance) {
                    nearest = Some(Hit {
                        node: id,
                        distance: t,
                        point: origin + direction * t,
                    });
                }
            }
        });
        nearest
    }

    /// Every mesh instance in draw order.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        self.walk(&self.roots, Matrix4::identity(), &mut |_, node, world| {
            if let NodeKind::Mesh { mesh, material } = &node.kind {
                if let Some(cpu) = self.mesh(*mesh) {
                    items.push(DrawItem {
                        mesh: *mesh,
                        topology: cpu.topology,
                        world: *world,
                        color: material.color,
                        render_order: node.render_order,
                    });
                }
            }
        });
        items.sort_by_key(|item| item.render_order);
        items
    }

    pub fn find_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.node
                .as_ref()
                .filter(|node| node.name == name)
                .map(|_| NodeId {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_object(name: &str, size: f32) -> SceneObject {
        SceneObject::mesh(name, CpuMesh::cuboid(size, size, size), Material::default())
    }

    #[test]
    fn removed_ids_do_not_alias_new_nodes() {
        let mut scene = SceneGraph::new();
        let a = scene
            .add("a", Transform::default(), NodeKind::Group, None)
            .unwrap();
        assert!(scene.remove(a));
        let b = scene
            .add("b", Transform::default(), NodeKind::Group, None)
            .unwrap();
        assert!(scene.get(a).is_none());
        assert_eq!(scene.get(b).unwrap().name, "b");
        assert!(!scene.remove(a));
    }

    #[test]
    fn remove_takes_the_subtree_and_its_meshes() {
        let mut scene = SceneGraph::new();
        let tree = SceneObject::group("root")
            .with_child(cube_object("child", 1.0).with_child(cube_object("grandchild", 1.0)));
        let root = scene.insert_object(tree, None).unwrap();
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.mesh_count(), 2);

        assert!(scene.remove(root));
        assert!(scene.is_empty());
        assert_eq!(scene.mesh_count(), 0);
        assert!(scene.roots().is_empty());
    }

    #[test]
    fn shared_mesh_survives_until_last_user_is_removed() {
        let mut scene = SceneGraph::new();
        let mesh = scene.add_mesh(CpuMesh::cuboid(1.0, 1.0, 1.0));
        let kind = || NodeKind::Mesh {
            mesh,
            material: Material::default(),
        };
        let a = scene.add("a", Transform::default(), kind(), None).unwrap();
        let b = scene.add("b", Transform::default(), kind(), None).unwrap();
        scene.remove(a);
        assert!(scene.contains_mesh(mesh));
        scene.remove(b);
        assert!(!scene.contains_mesh(mesh));
    }

    #[test]
    fn centering_moves_bounds_center_to_origin() {
        let mut object = SceneObject::group("model").with_child(SceneObject {
            transform: Transform::from_position(Vector3::new(40.0, -12.0, 7.5)),
            ..cube_object("part", 10.0)
        });
        object.transform.position = Vector3::new(3.0, 3.0, 3.0);
        object.center_on_origin();

        let center = object.bounding_box().center();
        assert!(center.x.abs() < 1e-4);
        assert!(center.y.abs() < 1e-4);
        assert!(center.z.abs() < 1e-4);
    }

    #[test]
    fn world_bounds_follow_parent_transforms() {
        let mut scene = SceneGraph::new();
        let mut parent = SceneObject::group("parent").with_child(cube_object("cube", 2.0));
        parent.transform.position = Vector3::new(10.0, 0.0, 0.0);
        parent.transform.set_uniform_scale(3.0);
        let id = scene.insert_object(parent, None).unwrap();

        let aabb = scene.bounding_box(id);
        assert_eq!(aabb.min, Point3::new(7.0, -3.0, -3.0));
        assert_eq!(aabb.max, Point3::new(13.0, 3.0, 3.0));

        let child = scene.get(id).unwrap().children()[0];
        assert_eq!(scene.bounding_box(child), aabb);
    }

    #[test]
    fn raycast_returns_nearest_mesh() {
        let mut scene = SceneGraph::new();
        let mut near = cube_object("near", 2.0);
        near.transform.position = Vector3::new(0.0, 0.0, 5.0);
        let far = cube_object("far", 2.0);
        let near = scene.insert_object(near, None).unwrap();
        scene.insert_object(far, None).unwrap();

        let hit = scene
            .raycast(Point3::new(0.0, 0.0, 20.0), Vector3::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_eq!(hit.node, near);
        assert!((hit.distance - 14.0).abs() < 1e-4);
        assert!((hit.point.z - 6.0).abs() < 1e-4);

        assert!(
            scene
                .raycast(Point3::new(50.0, 0.0, 20.0), Vector3::new(0.0, 0.0, -1.0))
                .is_none()
        );
    }

    #[test]
    fn raycast_respects_scale() {
        let mut scene = SceneGraph::new();
        let mut big = cube_object("big", 2.0);
        big.transform.set_uniform_scale(10.0);
        scene.insert_object(big, None).unwrap();

        let hit = scene
            .raycast(Point3::new(8.0, 0.0, 100.0), Vector3::new(0.0, 0.0, -1.0))
            .unwrap();
        assert!((hit.distance - 90.0).abs() < 1e-3);
    }

    #[test]
    fn draw_list_orders_by_render_order() {
        let mut scene = SceneGraph::new();
        let outline = SceneObject {
            render_order: 1,
            ..SceneObject::mesh(
                "outline",
                CpuMesh::cuboid(1.0, 1.0, 1.0).edges(),
                Material::default(),
            )
        };
        scene
            .insert_object(cube_object("box", 1.0).with_child(outline), None)
            .unwrap();
        scene.insert_object(cube_object("other", 1.0), None).unwrap();

        let items = scene.draw_list();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].topology, Topology::Lines);
        assert!(
            items[..2]
                .iter()
                .all(|item| item.topology == Topology::Triangles)
        );
    }

    #[test]
    fn ancestry_walks_up_to_the_root() {
        let mut scene = SceneGraph::new();
        let root = scene
            .insert_object(SceneObject::group("root").with_child(cube_object("child", 1.0)), None)
            .unwrap();
        let other = scene.insert_object(cube_object("other", 1.0), None).unwrap();
        let child = scene.get(root).unwrap().children()[0];
        assert!(scene.is_within(child, root));
        assert!(scene.is_within(root, root));
        assert!(!scene.is_within(root, child));
        assert!(!scene.is_within(other, root));
    }

    #[test]
    fn adding_under_missing_parent_fails() {
        let mut scene = SceneGraph::new();
        let parent = scene
            .add("p", Transform::default(), NodeKind::Group, None)
            .unwrap();
        scene.remove(parent);
        assert!(
            scene
                .add("c", Transform::default(), NodeKind::Group, Some(parent))
                .is_none()
        );
    }
}
