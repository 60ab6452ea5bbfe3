use crate::viewer::Viewer;
use egui::{Align2, Context};

#[derive(Default)]
pub struct OverlayState {
    pub show_scene: bool,
}

/// Debug panel drawn over the scene when the viewer runs with `debug`.
pub fn viewer_ui(ctx: &Context, state: &mut OverlayState, viewer: &mut Viewer, delta_time_ms: f32) {
    egui::Window::new("Viewer")
        .default_open(true)
        .max_width(320.0)
        .default_width(260.0)
        .resizable(true)
        .anchor(Align2::LEFT_TOP, [10.0, 10.0])
        .show(ctx, |ui| {
            {
                let scene = viewer.scene();
                let model = viewer
                    .main_model()
                    .and_then(|id| scene.get(id))
                    .and_then(|group| group.children().first().copied())
                    .and_then(|id| scene.get(id))
                    .map(|node| node.name.clone());
                ui.label(format!(
                    "Model: {}",
                    model.as_deref().unwrap_or("(none)")
                ));
                if let Some(controls) = viewer.controls() {
                    ui.label(format!("Scale: {:.3}", controls.current_scale()));
                }
                ui.label(format!(
                    "Selected: {}",
                    viewer
                        .selected()
                        .map(|id| format!("{:?}", id))
                        .unwrap_or_else(|| "nothing".to_string())
                ));

                ui.checkbox(&mut state.show_scene, "Scene statistics");
                if state.show_scene {
                    ui.label(format!("Nodes: {}", scene.len()));
                    ui.label(format!("Meshes: {}", scene.mesh_count()));
                    ui.label(format!("Lights: {}", viewer.lights().num_lights()));
                }
            }

            ui.separator();

            ui.label("Background Color:");
            let mut color = viewer.clear_color().to_rgba();
            if ui.color_edit_button_rgba_unmultiplied(&mut color).changed() {
                viewer.set_clear_color([color[0], color[1], color[2]].into());
            }
            ui.label("Ambient Light:");
            let mut ambient = viewer.lights().ambient().to_rgba();
            if ui.color_edit_button_rgba_unmultiplied(&mut ambient).changed() {
                viewer
                    .lights_mut()
                    .set_ambient([ambient[0], ambient[1], ambient[2]].into());
            }
            let mut auto_clear = viewer.auto_clear();
            if ui.checkbox(&mut auto_clear, "Auto clear").changed() {
                viewer.set_auto_clear(auto_clear);
            }

            if ui.button("Reset camera").clicked() {
                viewer.reset_camera();
            }

            ui.separator();

            ui.label(format!("Delta Time: {:.2} ms", delta_time_ms));
            if delta_time_ms > 0.0 {
                ui.label(format!("FPS: {:.1}", 1000.0 / delta_time_ms));
            }
        });
}
