use egui::Context;
use egui_wgpu::Renderer;
use egui_wgpu::ScreenDescriptor;
use egui_wgpu::wgpu::{
    CommandEncoder, Device, LoadOp, Operations, Queue, RenderPassColorAttachment,
    RenderPassDescriptor, StoreOp, TextureFormat, TextureView,
};
use egui_winit::State;
use winit::event::WindowEvent;
use winit::window::Window;

/// egui integration: winit input in, wgpu draw calls out.
pub struct EguiRenderer {
    context: Context,
    state: State,
    renderer: Renderer,
}

impl EguiRenderer {
    /// The overlay draws into the resolved surface after the scene, so it
    /// never needs depth or multisampling.
    pub fn new(device: &Device, output_color_format: TextureFormat, window: &Window) -> Self {
        let egui_context = Context::default();
        let viewport_id = egui_context.viewport_id();

        let egui_state = State::new(egui_context.clone(), viewport_id, &window, None, None, None);

        let egui_renderer = Renderer::new(device, output_color_format, None, 1, false);

        Self {
            context: egui_context,
            state: egui_state,
            renderer: egui_renderer,
        }
    }

    /// Returns true when egui consumed the event.
    pub fn handle_input(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    pub fn draw(
        &mut self,
        device: &Device,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        window: &Window,
        window_surface_view: &TextureView,
        screen_descriptor: ScreenDescriptor,
        mut run_ui: impl FnMut(&Context),
    ) {
        let raw_input = self.state.take_egui_input(window);
        let full_output = self.context.run(raw_input, |ctx| run_ui(ctx));

        self.state
            .handle_platform_output(window, full_output.platform_output);

        let tris = self
            .context
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.renderer
            .update_buffers(device, queue, encoder, &tris, &screen_descriptor);

        let mut rpass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: window_surface_view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Load,
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                label: Some("egui overlay render pass"),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.renderer.render(&mut rpass, &tris, &screen_descriptor);
        drop(rpass);

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id)
        }
    }
}
