//! Asset loading: OBJ (+MTL) through `tobj`, glTF/GLB through `gltf`.
//!
//! Decoding is split from scene insertion. [`Decoder`] turns a file into a
//! detached [`SceneObject`] and owns no scene state, so its futures can run
//! in the background; [`Loader::add_to_scene`] centers the result, wraps it
//! in a group and inserts it.

use crate::asset_path::AssetPath;
use crate::defaults;
use crate::material::{Color, Material};
use crate::model::CpuMesh;
use crate::resources::{load_binary, load_string};
use crate::scene::{NodeId, ObjectKind, SceneGraph, SceneObject, Transform};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cgmath::{Quaternion, Vector3};
use std::cell::RefCell;
use std::io::{BufReader, Cursor};
use std::rc::{Rc, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no scene to load into")]
    MissingScene,
    #[error("scene was dropped before the load completed")]
    SceneDropped,
    #[error("invalid load configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to fetch {path}")]
    Fetch {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to decode {path}: {reason}")]
    DecodeFailed { path: String, reason: String },
    #[error("{0} contains no geometry")]
    EmptyModel(String),
}

impl LoadError {
    fn fetch(path: &str, err: anyhow::Error) -> Self {
        LoadError::Fetch {
            path: path.to_string(),
            source: err.into(),
        }
    }

    fn decode(path: &str, reason: impl ToString) -> Self {
        LoadError::DecodeFailed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRequest {
    Obj {
        name: String,
        obj_path: String,
        mtl_path: Option<String>,
    },
    Gltf {
        path: String,
    },
}

impl ModelRequest {
    pub fn path(&self) -> &str {
        match self {
            ModelRequest::Obj { obj_path, .. } => obj_path,
            ModelRequest::Gltf { path } => path,
        }
    }
}

/// Called for every mesh of a decoded glTF scene before it is returned.
pub type MeshHook = Rc<dyn Fn(&mut SceneObject)>;

#[derive(Clone, Default)]
pub struct Decoder {
    debug: bool,
    mesh_hook: Option<MeshHook>,
}

impl Decoder {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            mesh_hook: None,
        }
    }

    pub fn set_mesh_hook(&mut self, hook: MeshHook) {
        self.mesh_hook = Some(hook);
    }

    fn log_level(&self) -> log::Level {
        if self.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    pub async fn decode(&self, request: &ModelRequest) -> Result<SceneObject, LoadError> {
        match request {
            ModelRequest::Obj {
                name,
                obj_path,
                mtl_path,
            } => self.decode_obj(name, obj_path, mtl_path.as_deref()).await,
            ModelRequest::Gltf { path } => self.decode_gltf(path).await,
        }
    }

    /// Decodes an OBJ file. An explicit material library is fetched and
    /// parsed before the geometry and replaces any `mtllib` the file names;
    /// otherwise `mtllib` resolves next to the OBJ.
    pub async fn decode_obj(
        &self,
        model_name: &str,
        obj_path: &str,
        mtl_path: Option<&str>,
    ) -> Result<SceneObject, LoadError> {
        if obj_path.is_empty() {
            return Err(LoadError::InvalidConfiguration(
                "OBJ path must not be empty".to_string(),
            ));
        }
        let obj_asset = AssetPath::parse(obj_path);

        let mut mtl_asset = None;
        let mtl_text = match mtl_path.filter(|p| !p.is_empty()) {
            Some(path) => {
                let asset = AssetPath::parse(path);
                log::log!(self.log_level(), "loading materials {}", asset.original);
                let text = load_string(&asset.original)
                    .await
                    .map_err(|e| LoadError::fetch(path, e))?;
                mtl_asset = Some(asset);
                Some(text)
            }
            None => None,
        };

        log::log!(self.log_level(), "loading geometry {}", obj_asset.original);
        let mut obj_text = load_string(&obj_asset.original)
            .await
            .map_err(|e| LoadError::fetch(obj_path, e))?;
        // tobj only asks for materials when the file names a library
        if let Some(asset) = &mtl_asset {
            if !references_material_library(&obj_text) {
                obj_text = format!("mtllib {}\n{}", asset.file_name, obj_text);
            }
        }
        let mut obj_reader = BufReader::new(Cursor::new(obj_text));

        let (models, obj_materials) = tobj::load_obj_buf_async(
            &mut obj_reader,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |mtllib| {
                let preloaded = mtl_text.clone();
                let library = obj_asset.sibling(&mtllib);
                async move {
                    let text = match preloaded {
                        Some(text) => text,
                        None => load_string(&library).await.map_err(|e| {
                            log::warn!("unable to load material library {}: {}", library, e);
                            tobj::LoadError::OpenFileFailed
                        })?,
                    };
                    tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(text)))
                }
            },
        )
        .await
        .map_err(|e| LoadError::decode(obj_path, e))?;

        let obj_materials = obj_materials.unwrap_or_else(|e| {
            log::warn!("materials for {} unavailable: {}", obj_path, e);
            Vec::new()
        });

        let mut root = SceneObject::group(model_name);
        for model in models {
            let mesh = model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }
            let positions = mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let normals = mesh
                .normals
                .chunks_exact(3)
                .map(|n| [n[0], n[1], n[2]])
                .collect();

            let material = match mesh.material_id.and_then(|i| obj_materials.get(i)) {
                Some(mat) => Material {
                    name: mat.name.clone(),
                    color: Color::from(mat.diffuse),
                },
                None => Material::default(),
            };

            root.children.push(SceneObject::mesh(
                model.name,
                CpuMesh::triangles(positions, normals, mesh.indices),
                material,
            ));
        }

        if root.children.is_empty() {
            return Err(LoadError::EmptyModel(obj_path.to_string()));
        }
        log::log!(
            self.log_level(),
            "decoded {} ({} meshes, {} materials)",
            obj_path,
            root.children.len(),
            obj_materials.len()
        );
        Ok(root)
    }

    /// Decodes a glTF or GLB file. External buffers resolve next to the file.
    pub async fn decode_gltf(&self, path: &str) -> Result<SceneObject, LoadError> {
        if path.is_empty() {
            return Err(LoadError::InvalidConfiguration(
                "glTF path must not be empty".to_string(),
            ));
        }
        let asset = AssetPath::parse(path);
        log::log!(self.log_level(), "loading glTF {}", asset.original);
        let bytes = load_binary(&asset.original)
            .await
            .map_err(|e| LoadError::fetch(path, e))?;
        self.decode_gltf_bytes(&asset, &bytes).await
    }

    pub async fn decode_gltf_bytes(
        &self,
        asset: &AssetPath,
        bytes: &[u8],
    ) -> Result<SceneObject, LoadError> {
        let path = asset.original.as_str();
        let gltf = gltf::Gltf::from_slice(bytes).map_err(|e| LoadError::decode(path, e))?;

        let mut buffers = Vec::new();
        for buffer in gltf.document.buffers() {
            let data = match buffer.source() {
                gltf::buffer::Source::Bin => gltf
                    .blob
                    .clone()
                    .ok_or_else(|| LoadError::decode(path, "missing binary chunk"))?,
                gltf::buffer::Source::Uri(uri) => match decode_data_uri(uri) {
                    Some(data) => data.map_err(|e| LoadError::decode(path, e))?,
                    None => {
                        let location = asset.sibling(uri);
                        load_binary(&location)
                            .await
                            .map_err(|e| LoadError::fetch(&location, e))?
                    }
                },
            };
            if data.len() < buffer.length() {
                return Err(LoadError::decode(
                    path,
                    format!("buffer {} is truncated", buffer.index()),
                ));
            }
            buffers.push(data);
        }

        let mut root = build_gltf_object(&gltf.document, &buffers, asset.stem())
            .ok_or_else(|| LoadError::EmptyModel(path.to_string()))?;

        if let Some(hook) = &self.mesh_hook {
            root.traverse_mut(&mut |object| {
                if matches!(object.kind, ObjectKind::Mesh { .. }) {
                    hook(object);
                }
            });
        }
        log::log!(
            self.log_level(),
            "decoded {} ({} meshes)",
            path,
            root.mesh_count()
        );
        Ok(root)
    }
}

fn references_material_library(obj_text: &str) -> bool {
    obj_text
        .lines()
        .any(|line| line.split_whitespace().next() == Some("mtllib"))
}

/// `Some` when `uri` is a base64 data uri.
fn decode_data_uri(uri: &str) -> Option<Result<Vec<u8>, base64::DecodeError>> {
    let rest = uri.strip_prefix("data:")?;
    let (_, payload) = rest.split_once(";base64,")?;
    Some(BASE64.decode(payload.as_bytes()))
}

fn build_gltf_object(
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    name: &str,
) -> Option<SceneObject> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())?;
    let mut root = SceneObject::group(name);
    for node in scene.nodes() {
        root.children.push(convert_node(&node, buffers));
    }
    (root.mesh_count() > 0).then_some(root)
}

fn convert_node(node: &gltf::Node, buffers: &[Vec<u8>]) -> SceneObject {
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut object = SceneObject::group(node.name().unwrap_or("node"));
    object.transform = Transform {
        position: Vector3::from(translation),
        rotation: Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: Vector3::from(scale),
    };

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::debug!("skipping {:?} primitive", primitive.mode());
                continue;
            }
            let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals = reader
                .read_normals()
                .map(|n| n.collect())
                .unwrap_or_default();
            let indices = reader
                .read_indices()
                .map(|i| i.into_u32().collect())
                .unwrap_or_default();

            let gltf_material = primitive.material();
            let [r, g, b, _] = gltf_material.pbr_metallic_roughness().base_color_factor();
            let material = Material {
                name: gltf_material
                    .name()
                    .unwrap_or(defaults::DEFAULT_MATERIAL_NAME)
                    .to_string(),
                color: Color::new(r, g, b),
            };

            object.children.push(SceneObject::mesh(
                mesh.name().unwrap_or("mesh"),
                CpuMesh::triangles(positions, normals, indices),
                material,
            ));
        }
    }

    for child in node.children() {
        object.children.push(convert_node(&child, buffers));
    }
    object
}

/// Decodes assets and inserts them into a scene it does not own.
pub struct Loader {
    scene: Weak<RefCell<SceneGraph>>,
    decoder: Decoder,
}

impl Loader {
    pub fn new(scene: Weak<RefCell<SceneGraph>>, debug: bool) -> Result<Self, LoadError> {
        if scene.upgrade().is_none() {
            log::error!("Invalid scene. Unable to initialize loader.");
            return Err(LoadError::MissingScene);
        }
        Ok(Self {
            scene,
            decoder: Decoder::new(debug),
        })
    }

    /// A decoder sharing this loader's settings, for background decoding.
    pub fn decoder(&self) -> Decoder {
        self.decoder.clone()
    }

    pub fn set_mesh_hook(&mut self, hook: MeshHook) {
        self.decoder.set_mesh_hook(hook);
    }

    pub async fn load_obj(
        &self,
        model_name: &str,
        obj_path: &str,
        mtl_path: Option<&str>,
    ) -> Result<NodeId, LoadError> {
        let object = self
            .decoder
            .decode_obj(model_name, obj_path, mtl_path)
            .await?;
        self.add_to_scene(object)
    }

    pub async fn load_gltf(&self, path: &str) -> Result<NodeId, LoadError> {
        let object = self.decoder.decode_gltf(path).await?;
        self.add_to_scene(object)
    }

    /// Centers the object on its bounding box, wraps it in a fresh group and
    /// inserts the group as a scene root.
    pub fn add_to_scene(&self, mut object: SceneObject) -> Result<NodeId, LoadError> {
        let scene = self.scene.upgrade().ok_or(LoadError::SceneDropped)?;
        object.center_on_origin();
        let group = SceneObject::group(defaults::MODEL_GROUP_NAME).with_child(object);
        scene
            .borrow_mut()
            .insert_object(group, None)
            .ok_or(LoadError::SceneDropped)
    }
}
