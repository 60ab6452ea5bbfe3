use model_viewer::loader::{Decoder, Loader};
use model_viewer::scene::SceneGraph;
use std::cell::RefCell;
use std::rc::Rc;
use model_viewer::material::Color;
use model_viewer::scene::{ObjectKind, SceneObject};
use model_viewer::{LoadError, LoadModelOptions, Viewer, ViewerOptions};

fn materials(object: &SceneObject) -> Vec<(String, u32)> {
    let mut found = Vec::new();
    let mut object = object.clone();
    object.traverse_mut(&mut |node| {
        if let ObjectKind::Mesh { material, .. } = &node.kind {
            found.push((material.name.clone(), material.color.to_hex()));
        }
    });
    found.sort();
    found.dedup();
    found
}

fn red() -> u32 {
    Color::new(0.8, 0.1, 0.1).to_hex()
}

fn blue() -> u32 {
    Color::new(0.1, 0.1, 0.8).to_hex()
}

#[test]
fn obj_uses_explicit_material_library() {
    let decoder = Decoder::new(false);
    let cube = pollster::block_on(decoder.decode_obj(
        "crate",
        "models/cube.obj",
        Some("models/cube.mtl"),
    ))
    .unwrap();

    assert_eq!(cube.name, "crate");
    assert_eq!(
        materials(&cube),
        vec![("blue".to_string(), blue()), ("red".to_string(), red())]
    );
    let size = cube.bounding_box().size();
    assert_eq!((size.x, size.y, size.z), (2.0, 2.0, 2.0));
}

#[test]
fn obj_mtllib_resolves_next_to_the_file() {
    let decoder = Decoder::new(false);
    let cube = pollster::block_on(decoder.decode_obj("cube", "models/cube.obj", None)).unwrap();
    assert_eq!(
        materials(&cube),
        vec![("blue".to_string(), blue()), ("red".to_string(), red())]
    );
}

#[test]
fn explicit_material_library_applies_without_mtllib() {
    let decoder = Decoder::new(false);
    let plain = pollster::block_on(decoder.decode_obj(
        "plain",
        "models/plain.obj",
        Some("models/cube.mtl"),
    ))
    .unwrap();
    assert_eq!(
        materials(&plain),
        vec![("blue".to_string(), blue()), ("red".to_string(), red())]
    );

    // same file, no library given: nothing to resolve
    let plain = pollster::block_on(decoder.decode_obj("plain", "models/plain.obj", None)).unwrap();
    assert_eq!(materials(&plain), vec![("default".to_string(), 0xffffff)]);
}

#[test]
fn obj_without_materials_gets_the_default() {
    let decoder = Decoder::new(false);
    let wide = pollster::block_on(decoder.decode_obj("wide", "models/wide.obj", None)).unwrap();
    assert_eq!(materials(&wide), vec![("default".to_string(), 0xffffff)]);
}

#[test]
fn missing_explicit_material_library_fails_the_load() {
    let decoder = Decoder::new(false);
    let result = pollster::block_on(decoder.decode_obj(
        "cube",
        "models/cube.obj",
        Some("models/missing.mtl"),
    ));
    assert!(matches!(result, Err(LoadError::Fetch { .. })));
}

#[test]
fn obj_without_geometry_is_rejected() {
    let decoder = Decoder::new(false);
    let result = pollster::block_on(decoder.decode_obj("broken", "models/broken.obj", None));
    assert!(matches!(result, Err(LoadError::EmptyModel(_))));

    let result = pollster::block_on(decoder.decode_obj("gone", "models/missing.obj", None));
    assert!(matches!(result, Err(LoadError::Fetch { .. })));
}

#[test]
fn gltf_with_external_buffer() {
    let decoder = Decoder::new(false);
    let model = pollster::block_on(decoder.decode_gltf("models/triangle_external.gltf")).unwrap();
    assert_eq!(model.mesh_count(), 1);
    assert_eq!(materials(&model), vec![("red".to_string(), 0xff0000)]);

    let embedded = pollster::block_on(decoder.decode_gltf("models/triangle.gltf")).unwrap();
    assert_eq!(embedded.bounding_box(), model.bounding_box());
}

#[test]
fn loaded_model_is_centered_and_scaled() {
    let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
    let options: LoadModelOptions =
        serde_json::from_str(r#"{"type": "obj", "name": "wide", "objPath": "models/wide.obj"}"#)
            .unwrap();

    let request = viewer.load_model(&options).unwrap();
    let decoded = pollster::block_on(viewer.decoder().decode(&request));
    let group = viewer.finish_load(decoded).unwrap();

    assert_eq!(viewer.main_model(), Some(group));
    let scene = viewer.scene();
    assert!((scene.get(group).unwrap().transform.scale.x - 0.5).abs() < 1e-6);

    let bounds = scene.bounding_box(group);
    let center = bounds.center();
    assert!(center.x.abs() < 1e-3 && center.y.abs() < 1e-3 && center.z.abs() < 1e-3);
    assert!((bounds.size().x - 175.0).abs() < 1e-3);
}

#[test]
fn last_completed_load_wins() {
    let mut viewer = Viewer::new(ViewerOptions::default()).unwrap();
    let decoder = viewer.decoder();
    let cube = pollster::block_on(decoder.decode_obj("cube", "models/cube.obj", None));
    let wide = pollster::block_on(decoder.decode_obj("wide", "models/wide.obj", None));

    // the wide load finishes first, the cube second
    let first = viewer.finish_load(wide).unwrap();
    let second = viewer.finish_load(cube).unwrap();

    assert_eq!(viewer.main_model(), Some(second));
    assert!(!viewer.scene().contains(first));
}

fn assert_centered_model(scene: &SceneGraph, group: model_viewer::scene::NodeId, child: &str) {
    let node = scene.get(group).unwrap();
    assert_eq!(node.name, "model");
    assert_eq!(node.children().len(), 1);
    assert_eq!(scene.get(node.children()[0]).unwrap().name, child);

    let center = scene.bounding_box(group).center();
    assert!(center.x.abs() < 1e-4 && center.y.abs() < 1e-4 && center.z.abs() < 1e-4);
}

#[test]
fn loader_inserts_obj_into_scene() {
    let scene = Rc::new(RefCell::new(SceneGraph::new()));
    let loader = Loader::new(Rc::downgrade(&scene), false).unwrap();
    let group = pollster::block_on(loader.load_obj(
        "crate",
        "models/cube.obj",
        Some("models/cube.mtl"),
    ))
    .unwrap();

    let scene = scene.borrow();
    assert!(scene.roots().contains(&group));
    assert_centered_model(&scene, group, "crate");
    let size = scene.bounding_box(group).size();
    assert_eq!((size.x, size.y, size.z), (2.0, 2.0, 2.0));
}

#[test]
fn loader_inserts_gltf_into_scene() {
    let scene = Rc::new(RefCell::new(SceneGraph::new()));
    let loader = Loader::new(Rc::downgrade(&scene), false).unwrap();
    let group = pollster::block_on(loader.load_gltf("models/triangle_external.gltf")).unwrap();

    let scene = scene.borrow();
    assert!(scene.roots().contains(&group));
    assert_centered_model(&scene, group, "triangle_external");
    assert_eq!(scene.mesh_count(), 1);
}

#[test]
fn loader_failure_leaves_scene_empty() {
    let scene = Rc::new(RefCell::new(SceneGraph::new()));
    let loader = Loader::new(Rc::downgrade(&scene), false).unwrap();
    let result = pollster::block_on(loader.load_obj("gone", "models/missing.obj", None));
    assert!(matches!(result, Err(LoadError::Fetch { .. })));
    assert!(scene.borrow().is_empty());
}
