use crate::camera::{Camera, Projection};
use crate::defaults;
use crate::egui::EguiRenderer;
use crate::instance::InstanceRaw;
use crate::model::{DrawMesh, GpuMesh, ModelVertex, Topology, Vertex};
use crate::overlay::{self, OverlayState};
use crate::resources;
use crate::scene::MeshId;
use crate::texture::GpuTexture;
use crate::viewer::Viewer;
use cgmath::{Matrix4, SquareMatrix};
use egui_wgpu::ScreenDescriptor;
use std::collections::HashMap;
use std::{iter, sync::Arc};
use wgpu::util::DeviceExt;
use winit::event::WindowEvent;
use winit::window::Window;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    sample_count: u32,
    topology: Topology,
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);
    let (primitive_topology, label) = match topology {
        Topology::Triangles => (wgpu::PrimitiveTopology::TriangleList, "Mesh Pipeline"),
        Topology::Lines => (wgpu::PrimitiveTopology::LineList, "Line Pipeline"),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[ModelVertex::desc(), InstanceRaw::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState {
                    alpha: wgpu::BlendComponent::REPLACE,
                    color: wgpu::BlendComponent::REPLACE,
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: primitive_topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // picking is double sided, so is drawing
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: GpuTexture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

pub struct State {
    // Put egui_renderer first so it gets dropped before GPU resources
    egui_renderer: Option<EguiRenderer>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    is_surface_configured: bool,
    sample_count: u32,
    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    light_buffer: wgpu::Buffer,
    light_bind_group: wgpu::BindGroup,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    meshes: HashMap<MeshId, GpuMesh>,
    depth_texture: GpuTexture,
    msaa_texture: Option<GpuTexture>,
    window: Arc<Window>,
    overlay: OverlayState,
}

impl State {
    pub async fn new(window: Arc<Window>, debug: bool) -> anyhow::Result<State> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let backend = adapter.get_info().backend;
        log::info!("Render backend: {}", backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let supports = |format: wgpu::TextureFormat| {
            adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(defaults::SAMPLE_COUNT)
        };
        let sample_count = if supports(surface_format) && supports(GpuTexture::DEPTH_FORMAT) {
            defaults::SAMPLE_COUNT
        } else {
            log::warn!(
                "{}x MSAA unsupported, rendering without antialiasing",
                defaults::SAMPLE_COUNT
            );
            1
        };

        let depth_texture =
            GpuTexture::create_depth_texture(&device, &config, sample_count, "Depth Texture");
        let msaa_texture = (sample_count > 1).then(|| {
            GpuTexture::create_msaa_texture(&device, &config, sample_count, "MSAA Texture")
        });

        let camera_uniform = CameraUniform::new();
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group_layout = uniform_layout(&device, "camera_bind_group_layout");
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light_buffer"),
            size: std::mem::size_of::<crate::light::LightArrayGpu>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_bind_group_layout = uniform_layout(&device, "light_bind_group_layout");
        let light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_bind_group"),
            layout: &light_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_buffer.as_entire_binding(),
            }],
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&camera_bind_group_layout, &light_bind_group_layout],
                push_constant_ranges: &[],
            });

        let shader_source = resources::load_string("shader.wgsl").await?;
        let mesh_pipeline = create_render_pipeline(
            &device,
            &render_pipeline_layout,
            config.format,
            sample_count,
            Topology::Triangles,
            wgpu::ShaderModuleDescriptor {
                label: Some("Shader"),
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            },
        );

        let line_source = resources::load_string("line.wgsl").await?;
        let line_pipeline = create_render_pipeline(
            &device,
            &render_pipeline_layout,
            config.format,
            sample_count,
            Topology::Lines,
            wgpu::ShaderModuleDescriptor {
                label: Some("Line Shader"),
                source: wgpu::ShaderSource::Wgsl(line_source.into()),
            },
        );

        let instance_capacity = 256;
        let instance_buffer = Self::create_instance_buffer(&device, instance_capacity);

        let egui_renderer = debug.then(|| EguiRenderer::new(&device, config.format, &window));

        Ok(Self {
            egui_renderer,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            sample_count,
            mesh_pipeline,
            line_pipeline,
            camera_uniform,
            camera_buffer,
            camera_bind_group,
            light_buffer,
            light_bind_group,
            instance_buffer,
            instance_capacity,
            meshes: HashMap::new(),
            depth_texture,
            msaa_texture,
            window,
            overlay: OverlayState::default(),
        })
    }

    fn create_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (capacity * std::mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Origin and size of the drawable area, in window pixels.
    pub fn surface_rect(&self) -> ([f32; 2], [f32; 2]) {
        (
            [0.0, 0.0],
            [self.config.width as f32, self.config.height as f32],
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.is_surface_configured = true;
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = GpuTexture::create_depth_texture(
                &self.device,
                &self.config,
                self.sample_count,
                "Depth Texture",
            );
            if self.sample_count > 1 {
                self.msaa_texture = Some(GpuTexture::create_msaa_texture(
                    &self.device,
                    &self.config,
                    self.sample_count,
                    "MSAA Texture",
                ));
            }
        }
    }

    /// Gives the overlay first pick of window events. Returns true when the
    /// event was consumed.
    pub fn handle_input(&mut self, event: &WindowEvent) -> bool {
        match &mut self.egui_renderer {
            Some(egui) => egui.handle_input(&self.window, event),
            None => false,
        }
    }

    /// Creates GPU meshes for new scene meshes and drops those the scene
    /// has released.
    fn sync_meshes(&mut self, viewer: &Viewer) {
        let scene = viewer.scene();
        self.meshes.retain(|id, _| scene.contains_mesh(*id));
        for item in scene.draw_list() {
            if self.meshes.contains_key(&item.mesh) {
                continue;
            }
            if let Some(cpu) = scene.mesh(item.mesh) {
                let label = format!("{:?}", item.mesh);
                self.meshes
                    .insert(item.mesh, GpuMesh::new(&self.device, cpu, &label));
            }
        }
    }

    pub fn render(
        &mut self,
        viewer: &mut Viewer,
        dt: web_time::Duration,
    ) -> Result<(), wgpu::SurfaceError> {
        self.window.request_redraw();

        if !self.is_surface_configured {
            return Ok(());
        }

        self.camera_uniform
            .update_view_proj(viewer.camera(), viewer.projection());
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[self.camera_uniform]),
        );
        if viewer.lights().is_dirty() {
            let lights = viewer.lights().sync_to_gpu();
            self.queue
                .write_buffer(&self.light_buffer, 0, bytemuck::cast_slice(&[lights]));
            viewer.lights_mut().clear_dirty();
        }

        self.sync_meshes(viewer);
        let items = viewer.scene().draw_list();
        let instances: Vec<InstanceRaw> = items.iter().map(InstanceRaw::from_draw_item).collect();
        if instances.len() > self.instance_capacity {
            self.instance_capacity = instances.len().next_power_of_two();
            self.instance_buffer =
                Self::create_instance_buffer(&self.device, self.instance_capacity);
        }
        self.queue
            .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));

        let output = self.surface.get_current_texture()?;
        if output.suboptimal {
            return Err(wgpu::SurfaceError::Outdated);
        }
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // With MSAA we draw into the multisampled target and resolve into
        // the surface.
        let (target, resolve_target) = match &self.msaa_texture {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let clear_color: wgpu::Color = viewer.clear_color().into();
        if !viewer.auto_clear() {
            drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            }));
        }
        let (color_load, depth_load) = if viewer.auto_clear() {
            (wgpu::LoadOp::Clear(clear_color), wgpu::LoadOp::Clear(1.0))
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            let mut bound: Option<Topology> = None;
            for (index, item) in items.iter().enumerate() {
                let Some(mesh) = self.meshes.get(&item.mesh) else {
                    continue;
                };
                if bound != Some(mesh.topology) {
                    render_pass.set_pipeline(match mesh.topology {
                        Topology::Triangles => &self.mesh_pipeline,
                        Topology::Lines => &self.line_pipeline,
                    });
                    bound = Some(mesh.topology);
                }
                let index = index as u32;
                render_pass.draw_mesh_instanced(
                    mesh,
                    index..index + 1,
                    &self.camera_bind_group,
                    &self.light_bind_group,
                );
            }
        }

        if let Some(egui_renderer) = &mut self.egui_renderer {
            let screen_descriptor = ScreenDescriptor {
                size_in_pixels: [self.config.width, self.config.height],
                pixels_per_point: self.window.scale_factor() as f32,
            };
            let overlay_state = &mut self.overlay;
            egui_renderer.draw(
                &self.device,
                &self.queue,
                &mut encoder,
                &self.window,
                &view,
                screen_descriptor,
                |ctx| overlay::viewer_ui(ctx, overlay_state, viewer, dt.as_secs_f32() * 1000.0),
            );
        }

        self.queue.submit(iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
