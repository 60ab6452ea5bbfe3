//! Scene controller: owns the scene graph, camera, lights, markers, the
//! current main model and the selection, and reacts to input.
//!
//! Nothing in here touches the GPU. [`crate::state::State`] reads the
//! viewer every frame to draw it.

use crate::asset_path::AssetPath;
use crate::camera::{self, Camera, CameraDefaults, Projection};
use crate::controls::ObjectControls;
use crate::defaults;
use crate::light::LightManager;
use crate::loader::{Decoder, LoadError, Loader, MeshHook, ModelRequest};
use crate::markers::{self, MarkerConfig};
use crate::material::Color;
use crate::scene::{Hit, NodeId, SceneGraph, SceneObject};
use crate::selection::Selection;
use crate::tween::{FrameUpdate, TweenGroup};
use cgmath::Deg;
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use thiserror::Error;
use web_time::Duration;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// What a click landed on, as reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Picked {
    pub hit: Hit,
    pub name: String,
    pub in_main_model: bool,
}

/// Hooks the host application gets called back on.
pub trait ViewerCallbacks {
    /// Once per frame, before rendering.
    fn update(&mut self) {}
    /// After every click, with the nearest hit if any.
    fn click(&mut self, _picked: Option<&Picked>) {}
}

pub struct NoCallbacks;

impl ViewerCallbacks for NoCallbacks {}

pub struct ViewerOptions {
    /// Id of the canvas element to render into (web only).
    pub element_to_bind_to: Option<String>,
    /// Opaque host data, kept for the host to read back.
    pub objects: Vec<serde_json::Value>,
    pub debug: bool,
    pub callbacks: Box<dyn ViewerCallbacks>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            element_to_bind_to: None,
            objects: Vec::new(),
            debug: false,
            callbacks: Box::new(NoCallbacks),
        }
    }
}

/// The serializable part of [`ViewerOptions`], as a host page passes it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostOptions {
    pub element_to_bind_to: Option<String>,
    #[serde(alias = "object")]
    pub objects: Vec<serde_json::Value>,
    pub debug: bool,
}

impl HostOptions {
    pub fn with_callbacks(self, callbacks: Box<dyn ViewerCallbacks>) -> ViewerOptions {
        ViewerOptions {
            element_to_bind_to: self.element_to_bind_to,
            objects: self.objects,
            debug: self.debug,
            callbacks,
        }
    }
}

/// Host-facing description of a model to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadModelOptions {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub obj_path: Option<String>,
    pub mlt_path: Option<String>,
    pub gltf_path: Option<String>,
}

impl TryFrom<&LoadModelOptions> for ModelRequest {
    type Error = ViewerError;

    fn try_from(options: &LoadModelOptions) -> Result<Self, Self::Error> {
        let kind = options
            .kind
            .as_deref()
            .ok_or_else(|| ViewerError::InvalidConfiguration("type is required".to_string()))?;

        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ViewerError::InvalidConfiguration(format!("{} is required", key)))
        };

        match kind {
            "obj" => {
                let obj_path = required(&options.obj_path, "objPath")?;
                let name = options
                    .name
                    .clone()
                    .unwrap_or_else(|| AssetPath::parse(&obj_path).stem().to_string());
                Ok(ModelRequest::Obj {
                    name,
                    obj_path,
                    mtl_path: options.mlt_path.clone().filter(|p| !p.is_empty()),
                })
            }
            "gltf" => Ok(ModelRequest::Gltf {
                path: required(&options.gltf_path, "gltfPath")?,
            }),
            other => Err(ViewerError::InvalidConfiguration(format!(
                "unknown model type {:?}",
                other
            ))),
        }
    }
}

pub struct Viewer {
    scene: Rc<RefCell<SceneGraph>>,
    loader: Loader,
    camera: Camera,
    camera_defaults: CameraDefaults,
    projection: Projection,
    lights: LightManager,
    markers: Vec<NodeId>,
    selection: Selection,
    main_model: Option<NodeId>,
    controls: Option<ObjectControls>,
    animations: Box<dyn FrameUpdate>,
    callbacks: Box<dyn ViewerCallbacks>,
    clear_color: Color,
    auto_clear: bool,
    element_to_bind_to: Option<String>,
    objects: Vec<serde_json::Value>,
    debug: bool,
}

impl Viewer {
    pub fn new(options: ViewerOptions) -> Result<Self, ViewerError> {
        Self::with_markers(options, &MarkerConfig::default())
    }

    pub fn with_markers(options: ViewerOptions, markers: &MarkerConfig) -> Result<Self, ViewerError> {
        let ViewerOptions {
            element_to_bind_to,
            objects,
            debug,
            callbacks,
        } = options;

        let scene = Rc::new(RefCell::new(SceneGraph::new()));
        let loader = Loader::new(Rc::downgrade(&scene), debug)?;

        let camera_defaults = CameraDefaults::default();
        let camera = Camera::new(&camera_defaults);
        let projection = Projection::new(
            1.0,
            Deg(camera_defaults.fov),
            camera_defaults.near,
            camera_defaults.far,
        );

        let mut lights = LightManager::new(Color::from_hex(defaults::AMBIENT_LIGHT));
        for position in defaults::DIRECTIONAL_LIGHT_POSITIONS {
            lights.add_light(position, Color::from_hex(defaults::DIRECTIONAL_LIGHT));
        }

        let markers = markers::generate(&mut scene.borrow_mut(), markers);
        if debug {
            log::info!(
                "viewer ready: {} marker groups, {} nodes",
                markers.len(),
                scene.borrow().len()
            );
        }

        Ok(Self {
            scene,
            loader,
            camera,
            camera_defaults,
            projection,
            lights,
            markers,
            selection: Selection::default(),
            main_model: None,
            controls: None,
            animations: Box::new(TweenGroup::new()),
            callbacks,
            clear_color: Color::from_hex(defaults::CLEAR_COLOR),
            auto_clear: true,
            element_to_bind_to,
            objects,
            debug,
        })
    }

    pub fn scene(&self) -> Ref<'_, SceneGraph> {
        self.scene.borrow()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn lights(&self) -> &LightManager {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightManager {
        &mut self.lights
    }

    pub fn markers(&self) -> &[NodeId] {
        &self.markers
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selection.selected()
    }

    pub fn main_model(&self) -> Option<NodeId> {
        self.main_model
    }

    pub fn controls(&self) -> Option<&ObjectControls> {
        self.controls.as_ref()
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    pub fn auto_clear(&self) -> bool {
        self.auto_clear
    }

    pub fn set_auto_clear(&mut self, auto_clear: bool) {
        self.auto_clear = auto_clear;
    }

    pub fn element_to_bind_to(&self) -> Option<&str> {
        self.element_to_bind_to.as_deref()
    }

    pub fn objects(&self) -> &[serde_json::Value] {
        &self.objects
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Replaces the animation service ticked every frame.
    pub fn set_animations(&mut self, animations: Box<dyn FrameUpdate>) {
        self.animations = animations;
    }

    pub fn set_mesh_hook(&mut self, hook: MeshHook) {
        self.loader.set_mesh_hook(hook);
    }

    /// A decoder for running loads away from the viewer.
    pub fn decoder(&self) -> Decoder {
        self.loader.decoder()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection
            .set_aspect(camera::aspect_ratio(width as f32, height as f32));
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset(&self.camera_defaults);
    }

    /// Advances animations and notifies the host. Called once per frame.
    pub fn update(&mut self, dt: Duration) {
        self.animations.update(dt);
        self.callbacks.update();
    }

    /// Picks along the ray under `cursor` and updates the selection. The
    /// surface covers `origin..origin + size` in the cursor's coordinates.
    pub fn click(&mut self, cursor: [f32; 2], origin: [f32; 2], size: [f32; 2]) -> Option<Hit> {
        let ndc = camera::cursor_to_ndc(cursor, origin, size);
        let (ray_origin, direction) = self.projection.ray_from_ndc(&self.camera, ndc);

        let (hit, picked) = {
            let mut scene = self.scene.borrow_mut();
            let hit = scene.raycast(ray_origin, direction);
            let picked = hit.map(|hit| Picked {
                hit,
                name: scene
                    .get(hit.node)
                    .map(|node| node.name.clone())
                    .unwrap_or_default(),
                in_main_model: self
                    .main_model
                    .is_some_and(|model| scene.is_within(hit.node, model)),
            });
            self.selection
                .apply_click(&mut scene, hit.map(|h| h.node), self.main_model);
            (hit, picked)
        };

        if self.debug {
            log::info!("click at {:?}: {:?}", ndc, picked);
        }
        self.callbacks.click(picked.as_ref());
        hit
    }

    pub fn handle_mouse_button(&mut self, pressed: bool) {
        if let Some(controls) = &mut self.controls {
            controls.handle_button(pressed);
        }
    }

    pub fn handle_cursor(&mut self, cursor: [f32; 2]) {
        if let Some(controls) = &mut self.controls {
            controls.handle_cursor(&mut self.scene.borrow_mut(), cursor);
        }
    }

    pub fn handle_scroll(&mut self, lines: f32) {
        if let Some(controls) = &mut self.controls {
            controls.handle_scroll(&mut self.scene.borrow_mut(), lines);
        }
    }

    /// Validates host options into a request. Invalid options are logged
    /// and leave the scene untouched.
    pub fn load_model(&self, options: &LoadModelOptions) -> Result<ModelRequest, ViewerError> {
        ModelRequest::try_from(options).inspect_err(|e| {
            log::error!("load_model: {}", e);
        })
    }

    /// Inserts a finished decode and makes it the main model.
    pub fn finish_load(
        &mut self,
        decoded: Result<SceneObject, LoadError>,
    ) -> Result<NodeId, ViewerError> {
        let group = decoded
            .and_then(|object| self.loader.add_to_scene(object))
            .inspect_err(|e| log::error!("model load failed: {}", e))?;
        self.update_main_model(group);
        Ok(group)
    }

    /// Scales `group` to the main model width, replaces the previous main
    /// model and points the object controls at it.
    pub fn update_main_model(&mut self, group: NodeId) {
        let mut scene = self.scene.borrow_mut();

        let width = 2.0 * scene.bounding_box(group).max.x;
        if let Some(node) = scene.get_mut(group) {
            if width.is_finite() && width > 0.0 {
                node.transform
                    .set_uniform_scale(defaults::MAIN_MODEL_WIDTH / width);
            } else {
                log::warn!("model has no usable width ({}), keeping its scale", width);
            }
        }

        if let Some(previous) = self.main_model.replace(group) {
            if previous != group {
                scene.remove(previous);
            }
        }

        let scale = scene
            .get(group)
            .map(|node| node.transform.scale.x)
            .unwrap_or(1.0);
        let controls = self
            .controls
            .get_or_insert_with(|| ObjectControls::new(group));
        controls.set_object_to_move(group);
        controls.set_current_scale(scale);
        controls.set_scale_limits(defaults::MIN_MODEL_SCALE, defaults::MAX_MODEL_SCALE);
        controls.set_scale_speed(defaults::SCALE_SPEED);
        controls.enable_vertical_rotation();
        controls.set_rotation_speed(defaults::ROTATION_SPEED);

        if self.debug {
            log::info!("main model is now {:?} (scale {})", group, scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::model::CpuMesh;
    use crate::tween::Tween;
    use cgmath::{Point3, Vector3};
    use std::cell::Cell;

    fn slab(width: f32, offset_x: f32) -> SceneObject {
        let mut part = SceneObject::mesh(
            "slab",
            CpuMesh::cuboid(width, 10.0, 10.0),
            Material::default(),
        );
        part.transform.position = Vector3::new(offset_x, 40.0, -5.0);
        SceneObject::group("wide").with_child(part)
    }

    #[derive(Default)]
    struct Recorder {
        updates: Rc<Cell<u32>>,
        clicks: Rc<RefCell<Vec<Option<Picked>>>>,
    }

    impl ViewerCallbacks for Recorder {
        fn update(&mut self) {
            self.updates.set(self.updates.get() + 1);
        }

        fn click(&mut self, picked: Option<&Picked>) {
            self.clicks.borrow_mut().push(picked.cloned());
        }
    }

    /// Cursor position over a world point for a square `size` surface.
    fn cursor_over(viewer: &Viewer, point: Point3<f32>, size: f32) -> [f32; 2] {
        let eye = viewer.camera().position;
        let depth = eye.z - point.z;
        let tan_half = (CameraDefaults::default().fov.to_radians() * 0.5).tan();
        let ndc_x = (point.x - eye.x) / depth / tan_half;
        let ndc_y = (point.y - eye.y) / depth / tan_half;
        [(ndc_x + 1.0) * 0.5 * size, (1.0 - ndc_y) * 0.5 * size]
    }

    #[test]
    fn initial_scene_has_lights_and_markers() {
        let viewer = Viewer::new(ViewerOptions::default()).unwrap();
        assert_eq!(viewer.markers().len(), 4);
        assert_eq!(viewer.lights().num_lights(), 2);
        assert_eq!(viewer.clear_color().to_hex(), 0x666666);
        assert!(viewer.auto_clear());
        assert!(viewer.main_model().is_none());
        assert!(viewer.controls().is_none());
    }

    #[test]
    fn main_model_is_scaled_to_width() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let group = viewer.finish_load(Ok(slab(350.0, 275.0))).unwrap();

        let scene = viewer.scene();
        assert!((scene.get(group).unwrap().transform.scale.x - 0.5).abs() < 1e-6);
        let controls = viewer.controls().unwrap();
        assert_eq!(controls.target(), group);
        assert!((controls.current_scale() - 0.5).abs() < 1e-6);
        assert_eq!(controls.scale_limits(), (0.001, 100.0));
        assert!(controls.vertical_rotation());
        assert_eq!(controls.rotation_speed(), 0.075);
    }

    #[test]
    fn only_one_main_model_at_a_time() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let first = viewer.finish_load(Ok(slab(100.0, 0.0))).unwrap();
        let before = viewer.scene().len();
        let second = viewer.finish_load(Ok(slab(200.0, 0.0))).unwrap();

        assert_eq!(viewer.main_model(), Some(second));
        assert!(!viewer.scene().contains(first));
        assert_eq!(viewer.scene().len(), before);
        assert_eq!(viewer.controls().unwrap().target(), second);
    }

    #[test]
    fn flat_model_keeps_its_scale() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let group = viewer.finish_load(Ok(slab(0.0, 0.0))).unwrap();
        assert_eq!(viewer.scene().get(group).unwrap().transform.scale.x, 1.0);
        assert_eq!(viewer.main_model(), Some(group));
    }

    #[test]
    fn failed_load_keeps_previous_model() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let first = viewer.finish_load(Ok(slab(100.0, 0.0))).unwrap();
        let result = viewer.finish_load(Err(LoadError::EmptyModel("x.obj".to_string())));
        assert!(matches!(result, Err(ViewerError::Load(LoadError::EmptyModel(_)))));
        assert_eq!(viewer.main_model(), Some(first));
    }

    #[test]
    fn missing_type_leaves_scene_untouched() {
        let viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let nodes = viewer.scene().len();
        let options = LoadModelOptions {
            obj_path: Some("models/cube.obj".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            viewer.load_model(&options),
            Err(ViewerError::InvalidConfiguration(_))
        ));
        assert_eq!(viewer.scene().len(), nodes);
        assert!(viewer.main_model().is_none());
    }

    #[test]
    fn options_parse_from_host_json() {
        let options: LoadModelOptions = serde_json::from_str(
            r#"{"type": "obj", "objPath": "models/cube.obj", "mltPath": "models/cube.mtl"}"#,
        )
        .unwrap();
        assert_eq!(
            ModelRequest::try_from(&options).unwrap(),
            ModelRequest::Obj {
                name: "cube".to_string(),
                obj_path: "models/cube.obj".to_string(),
                mtl_path: Some("models/cube.mtl".to_string()),
            }
        );

        let options: LoadModelOptions =
            serde_json::from_str(r#"{"type": "gltf", "gltfPath": "a/b.glb"}"#).unwrap();
        assert_eq!(
            ModelRequest::try_from(&options).unwrap(),
            ModelRequest::Gltf {
                path: "a/b.glb".to_string()
            }
        );

        let options: LoadModelOptions = serde_json::from_str(r#"{"type": "fbx"}"#).unwrap();
        assert!(ModelRequest::try_from(&options).is_err());
        let options: LoadModelOptions = serde_json::from_str(r#"{"type": "gltf"}"#).unwrap();
        assert!(ModelRequest::try_from(&options).is_err());
    }

    #[test]
    fn host_options_accept_either_objects_key() {
        let options: HostOptions = serde_json::from_str(
            r#"{"elementToBindTo": "view", "object": [{"id": 1}], "debug": true}"#,
        )
        .unwrap();
        assert_eq!(options.element_to_bind_to.as_deref(), Some("view"));
        assert_eq!(options.objects, vec![serde_json::json!({"id": 1})]);
        assert!(options.debug);

        let options: HostOptions = serde_json::from_str(r#"{"objects": [2, 3]}"#).unwrap();
        assert_eq!(options.objects.len(), 2);

        let viewer = Viewer::new(options.with_callbacks(Box::new(NoCallbacks))).unwrap();
        assert_eq!(viewer.objects(), &[serde_json::json!(2), serde_json::json!(3)]);
        assert_eq!(viewer.element_to_bind_to(), None);
    }

    #[test]
    fn zero_height_resize_uses_unit_aspect() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        viewer.resize(640, 0);
        assert_eq!(viewer.projection().aspect(), 1.0);
        viewer.resize(640, 320);
        assert_eq!(viewer.projection().aspect(), 2.0);
    }

    #[test]
    fn clicking_markers_toggles_selection() {
        let recorder = Recorder::default();
        let clicks = recorder.clicks.clone();
        let mut viewer = Viewer::new(ViewerOptions {
            callbacks: Box::new(recorder),
            ..Default::default()
        })
        .unwrap();
        viewer.resize(400, 400);

        let target = markers::layout(&MarkerConfig::default())[0][0].position;
        let cursor = cursor_over(&viewer, Point3::new(target.x, target.y, target.z), 400.0);
        let marker = viewer.scene().get(viewer.markers()[0]).unwrap().children()[0];

        let hit = viewer.click(cursor, [0.0, 0.0], [400.0, 400.0]);
        assert_eq!(hit.map(|h| h.node), Some(marker));
        assert_eq!(viewer.selected(), Some(marker));

        viewer.click(cursor, [0.0, 0.0], [400.0, 400.0]);
        assert_eq!(viewer.selected(), None);

        // empty space: the callback still fires
        viewer.click([200.0, 200.0], [0.0, 0.0], [400.0, 400.0]);
        let reported: Vec<_> = clicks
            .borrow()
            .iter()
            .map(|p| p.as_ref().map(|p| (p.hit.node, p.name.clone(), p.in_main_model)))
            .collect();
        let cube = Some((marker, markers::MARKER_NAME.to_string(), false));
        assert_eq!(reported, vec![cube.clone(), cube, None]);
    }

    #[test]
    fn main_model_is_never_selected() {
        let recorder = Recorder::default();
        let clicks = recorder.clicks.clone();
        let mut viewer = Viewer::new(ViewerOptions {
            callbacks: Box::new(recorder),
            ..Default::default()
        })
        .unwrap();
        viewer.resize(400, 400);
        let mut object = slab(100.0, 0.0);
        object.children[0].name = markers::MARKER_NAME.to_string();
        let group = viewer.finish_load(Ok(object)).unwrap();

        let hit = viewer.click([200.0, 200.0], [0.0, 0.0], [400.0, 400.0]).unwrap();
        assert!(viewer.scene().is_within(hit.node, group));
        assert_eq!(viewer.selected(), None);

        let clicks = clicks.borrow();
        let picked = clicks[0].as_ref().unwrap();
        assert_eq!(picked.hit.node, hit.node);
        assert_eq!(picked.name, markers::MARKER_NAME);
        assert!(picked.in_main_model);
    }

    #[test]
    fn frame_update_ticks_animations_and_host() {
        let recorder = Recorder::default();
        let updates = recorder.updates.clone();
        let mut viewer = Viewer::new(ViewerOptions {
            callbacks: Box::new(recorder),
            ..Default::default()
        })
        .unwrap();

        let value = Rc::new(Cell::new(0.0));
        let sink = value.clone();
        let mut tweens = TweenGroup::new();
        tweens.add(Tween::new(0.0, 1.0, Duration::from_millis(100), move |v| sink.set(v)));
        viewer.set_animations(Box::new(tweens));

        viewer.update(Duration::from_millis(100));
        assert_eq!(value.get(), 1.0);
        assert_eq!(updates.get(), 1);
    }

    #[test]
    fn reset_camera_restores_defaults() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        viewer.camera.position = Point3::new(1.0, 2.0, 3.0);
        viewer.reset_camera();
        assert_eq!(viewer.camera().position, CameraDefaults::default().position);
    }

    #[test]
    fn wheel_scales_main_model() {
        let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
        let group = viewer.finish_load(Ok(slab(350.0, 0.0))).unwrap();
        viewer.handle_scroll(1.0);
        let scale = viewer.scene().get(group).unwrap().transform.scale.x;
        assert!((scale - 0.55).abs() < 1e-5);
    }
}
