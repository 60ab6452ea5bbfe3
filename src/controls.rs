//! Drag-to-rotate, wheel-to-scale manipulation of a single scene node.

use crate::defaults;
use crate::scene::{NodeId, SceneGraph};
use cgmath::{Quaternion, Rad, Rotation3, Vector3};

/// Radians per pixel of drag at rotation speed 1.0.
const RADIANS_PER_PIXEL: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct ObjectControls {
    target: NodeId,
    current_scale: f32,
    min_scale: f32,
    max_scale: f32,
    scale_speed: f32,
    rotation_speed: f32,
    vertical_rotation: bool,
    dragging: bool,
    last_cursor: Option<[f32; 2]>,
}

impl ObjectControls {
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            current_scale: 1.0,
            min_scale: defaults::MIN_MODEL_SCALE,
            max_scale: defaults::MAX_MODEL_SCALE,
            scale_speed: defaults::SCALE_SPEED,
            rotation_speed: defaults::ROTATION_SPEED,
            vertical_rotation: false,
            dragging: false,
            last_cursor: None,
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Points the controls at another node, dropping any drag in progress.
    pub fn set_object_to_move(&mut self, target: NodeId) {
        self.target = target;
        self.dragging = false;
        self.last_cursor = None;
    }

    pub fn current_scale(&self) -> f32 {
        self.current_scale
    }

    pub fn set_current_scale(&mut self, scale: f32) {
        self.current_scale = scale;
    }

    pub fn scale_limits(&self) -> (f32, f32) {
        (self.min_scale, self.max_scale)
    }

    pub fn set_scale_limits(&mut self, min: f32, max: f32) {
        self.min_scale = min.min(max);
        self.max_scale = max.max(min);
    }

    pub fn set_scale_speed(&mut self, speed: f32) {
        self.scale_speed = speed;
    }

    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.rotation_speed = speed;
    }

    pub fn enable_vertical_rotation(&mut self) {
        self.vertical_rotation = true;
    }

    pub fn vertical_rotation(&self) -> bool {
        self.vertical_rotation
    }

    pub fn rotation_speed(&self) -> f32 {
        self.rotation_speed
    }

    pub fn scale_speed(&self) -> f32 {
        self.scale_speed
    }

    pub fn handle_button(&mut self, pressed: bool) {
        self.dragging = pressed;
        if !pressed {
            self.last_cursor = None;
        }
    }

    /// Rotates the target while dragging: horizontal movement spins around
    /// the world y axis, vertical movement (when enabled) around x.
    pub fn handle_cursor(&mut self, scene: &mut SceneGraph, cursor: [f32; 2]) {
        let last = self.last_cursor.replace(cursor);
        if !self.dragging {
            return;
        }
        let Some(last) = last else {
            return;
        };
        let Some(node) = scene.get_mut(self.target) else {
            return;
        };

        let step = self.rotation_speed * RADIANS_PER_PIXEL;
        let (dx, dy) = (cursor[0] - last[0], cursor[1] - last[1]);
        let mut rotation = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(dx * step));
        if self.vertical_rotation {
            rotation = Quaternion::from_axis_angle(Vector3::unit_x(), Rad(dy * step)) * rotation;
        }
        node.transform.rotation = rotation * node.transform.rotation;
    }

    /// Scales the target by `scale_speed` per wheel step; positive `lines`
    /// zoom in.
    pub fn handle_scroll(&mut self, scene: &mut SceneGraph, lines: f32) {
        if lines == 0.0 {
            return;
        }
        let Some(node) = scene.get_mut(self.target) else {
            return;
        };
        let factor = (1.0 + self.scale_speed).powf(lines);
        self.current_scale = (self.current_scale * factor).clamp(self.min_scale, self.max_scale);
        node.transform.set_uniform_scale(self.current_scale);
    }
}
