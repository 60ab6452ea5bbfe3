//! Opens a model in a desktop window.
//!
//! ```text
//! cargo run --example desktop -- models/cube.obj [models/cube.mtl]
//! cargo run --example desktop -- models/triangle.gltf
//! ```

use model_viewer::{LoadModelOptions, ViewerOptions};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "models/cube.obj".to_string());

    let is_gltf = path.ends_with(".gltf") || path.ends_with(".glb");
    let model = LoadModelOptions {
        kind: Some(if is_gltf { "gltf" } else { "obj" }.to_string()),
        obj_path: (!is_gltf).then(|| path.clone()),
        mlt_path: args.next(),
        gltf_path: is_gltf.then(|| path.clone()),
        ..Default::default()
    };

    let options = ViewerOptions {
        debug: std::env::var("VIEWER_DEBUG").is_ok(),
        ..Default::default()
    };
    model_viewer::run(options, Some(model))
}
