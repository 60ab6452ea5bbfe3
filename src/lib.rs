pub mod asset_path;
pub mod bounds;
pub mod camera;
pub mod controls;
pub mod defaults;
mod egui;
mod instance;
pub mod light;
pub mod loader;
pub mod markers;
pub mod material;
pub mod model;
mod overlay;
mod resources;
pub mod scene;
pub mod selection;
mod state;
mod texture;
pub mod tween;
pub mod viewer;

pub use loader::{LoadError, ModelRequest};
pub use viewer::{
    HostOptions, LoadModelOptions, Picked, Viewer, ViewerCallbacks, ViewerError, ViewerOptions,
};

use crate::scene::SceneObject;
use crate::state::State;
use std::sync::Arc;
use web_time::Instant;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

/// Messages delivered to the event loop from background work and the host.
enum ViewerEvent {
    #[cfg(target_arch = "wasm32")]
    Ready(Box<State>),
    ModelDecoded(Result<SceneObject, LoadError>),
    LoadModel(LoadModelOptions),
}

struct App {
    proxy: EventLoopProxy<ViewerEvent>,
    viewer: Viewer,
    state: Option<State>,
    initial_model: Option<LoadModelOptions>,
    cursor: [f32; 2],
    last_frame: Instant,
}

impl App {
    fn new(
        viewer: Viewer,
        proxy: EventLoopProxy<ViewerEvent>,
        initial_model: Option<LoadModelOptions>,
    ) -> Self {
        Self {
            proxy,
            viewer,
            state: None,
            initial_model,
            cursor: [0.0, 0.0],
            last_frame: Instant::now(),
        }
    }

    /// Validates the options and decodes in the background. The decoded
    /// object comes back as [`ViewerEvent::ModelDecoded`], so whichever load
    /// completes last becomes the main model.
    fn load_model(&mut self, options: &LoadModelOptions) {
        let Ok(request) = self.viewer.load_model(options) else {
            return;
        };
        let decoder = self.viewer.decoder();

        // [Desktop]
        // Block on the decode; the event loop thread is the only thread.
        #[cfg(not(target_arch = "wasm32"))]
        {
            let decoded = pollster::block_on(decoder.decode(&request));
            if self.proxy.send_event(ViewerEvent::ModelDecoded(decoded)).is_err() {
                log::warn!("event loop closed before {} finished loading", request.path());
            }
        }

        // [Browser]
        // Fetching cannot block in wasm. Decode in a background task and
        // post the result back to the event loop.
        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let decoded = decoder.decode(&request).await;
                if proxy.send_event(ViewerEvent::ModelDecoded(decoded)).is_err() {
                    log::warn!("event loop closed before {} finished loading", request.path());
                }
            });
        }
    }

    fn finish_load(&mut self, decoded: Result<SceneObject, LoadError>) {
        if self.viewer.finish_load(decoded).is_ok() {
            if let Some(state) = &self.state {
                state.window().request_redraw();
            }
        }
    }

    fn set_state(&mut self, mut state: State) {
        let size = state.window().inner_size();
        self.viewer.resize(size.width, size.height);
        state.resize(size.width, size.height);
        state.window().request_redraw();
        self.state = Some(state);
        self.last_frame = Instant::now();

        if let Some(options) = self.initial_model.take() {
            self.load_model(&options);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn find_canvas(id: &str) -> Option<web_sys::HtmlCanvasElement> {
    use wasm_bindgen::JsCast;

    web_sys::window()?
        .document()?
        .get_element_by_id(id)?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .ok()
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("Model Viewer");

        // Bind to the requested canvas, then the default one, else append a
        // fresh canvas to the page.
        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = self
                .viewer
                .element_to_bind_to()
                .and_then(find_canvas)
                .or_else(|| find_canvas(defaults::CANVAS_ID));
            window_attributes = match canvas {
                Some(canvas) => window_attributes.with_canvas(Some(canvas)),
                None => window_attributes.with_append(true),
            };
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Unable to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        let debug = self.viewer.debug();

        // [Desktop]
        // This is pretty basic - just await (block_on) async initialization.
        #[cfg(not(target_arch = "wasm32"))]
        {
            match pollster::block_on(State::new(window, debug)) {
                Ok(state) => self.set_state(state),
                Err(e) => {
                    log::error!("Unable to initialize renderer: {:#}", e);
                    event_loop.exit();
                }
            }
        }

        // [Browser]
        // Renderer setup is asynchronous and cannot be awaited here. Launch
        // it in a background task which posts the finished state back to
        // the event loop.
        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window, debug).await {
                    Ok(state) => {
                        if proxy.send_event(ViewerEvent::Ready(Box::new(state))).is_err() {
                            log::warn!("event loop closed before the renderer was ready");
                        }
                    }
                    Err(e) => log::error!("Unable to initialize renderer: {:#}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            ViewerEvent::Ready(state) => self.set_state(*state),
            ViewerEvent::ModelDecoded(decoded) => self.finish_load(decoded),
            ViewerEvent::LoadModel(options) => self.load_model(&options),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };
        if state.handle_input(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                self.viewer.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now - self.last_frame;
                self.last_frame = now;

                self.viewer.update(dt);
                match state.render(&mut self.viewer, dt) {
                    Ok(_) => {}
                    // Reconfigure the surface if it's lost, outdated, or suboptimal
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.window().inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = [position.x as f32, position.y as f32];
                self.viewer.handle_cursor(self.cursor);
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                let pressed = button_state.is_pressed();
                self.viewer.handle_mouse_button(pressed);
                if !pressed {
                    let (origin, size) = state.surface_rect();
                    self.viewer.click(self.cursor, origin, size);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.viewer.handle_scroll(lines);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match code {
                KeyCode::KeyR => self.viewer.reset_camera(),
                #[cfg(not(target_arch = "wasm32"))]
                KeyCode::Escape => event_loop.exit(),
                _ => {}
            },
            _ => {}
        }
    }
}

/// Opens a desktop window and runs the viewer until it is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(options: ViewerOptions, initial_model: Option<LoadModelOptions>) -> anyhow::Result<()> {
    env_logger::init();

    let event_loop = EventLoop::with_user_event().build()?;
    let viewer = Viewer::new(options)?;
    let mut app = App::new(viewer, event_loop.create_proxy(), initial_model);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
mod web {
    use super::*;
    use serde::Serialize;
    use winit::platform::web::EventLoopExtWebSys;

    fn to_js(err: impl std::fmt::Display) -> JsValue {
        JsValue::from_str(&err.to_string())
    }

    /// Round-trips a JS value through `JSON.stringify` into a serde type.
    fn from_js<T: serde::de::DeserializeOwned + Default>(value: &JsValue) -> Result<T, JsValue> {
        if value.is_undefined() || value.is_null() {
            return Ok(T::default());
        }
        let json = js_sys::JSON::stringify(value)?
            .as_string()
            .ok_or_else(|| JsValue::from_str("options are not serializable"))?;
        serde_json::from_str(&json).map_err(to_js)
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ClickInfo<'a> {
        name: &'a str,
        in_main_model: bool,
        distance: f32,
        point: [f32; 3],
    }

    struct JsCallbacks {
        update: Option<js_sys::Function>,
        click: Option<js_sys::Function>,
    }

    impl ViewerCallbacks for JsCallbacks {
        fn update(&mut self) {
            if let Some(update) = &self.update {
                if let Err(e) = update.call0(&JsValue::NULL) {
                    log::warn!("update callback failed: {:?}", e);
                }
            }
        }

        fn click(&mut self, picked: Option<&Picked>) {
            let Some(click) = &self.click else {
                return;
            };
            let arg = match picked {
                Some(picked) => {
                    let info = ClickInfo {
                        name: &picked.name,
                        in_main_model: picked.in_main_model,
                        distance: picked.hit.distance,
                        point: picked.hit.point.into(),
                    };
                    serde_json::to_string(&info)
                        .ok()
                        .and_then(|json| js_sys::JSON::parse(&json).ok())
                        .unwrap_or(JsValue::NULL)
                }
                None => JsValue::NULL,
            };
            if let Err(e) = click.call1(&JsValue::NULL, &arg) {
                log::warn!("click callback failed: {:?}", e);
            }
        }
    }

    /// Handle returned to the page for driving a running viewer.
    #[wasm_bindgen]
    pub struct ViewerHandle {
        proxy: EventLoopProxy<ViewerEvent>,
    }

    #[wasm_bindgen]
    impl ViewerHandle {
        #[wasm_bindgen(js_name = loadModel)]
        pub fn load_model(&self, options: JsValue) -> Result<(), JsValue> {
            let options: LoadModelOptions = from_js(&options)?;
            self.proxy
                .send_event(ViewerEvent::LoadModel(options))
                .map_err(|_| JsValue::from_str("viewer has stopped"))
        }
    }

    #[wasm_bindgen(js_name = startViewer)]
    pub fn start_viewer(
        options: JsValue,
        update: Option<js_sys::Function>,
        click: Option<js_sys::Function>,
    ) -> Result<ViewerHandle, JsValue> {
        let options = from_js::<HostOptions>(&options)?
            .with_callbacks(Box::new(JsCallbacks { update, click }));

        let event_loop = EventLoop::with_user_event().build().map_err(to_js)?;
        let viewer = Viewer::new(options).map_err(to_js)?;
        let handle = ViewerHandle {
            proxy: event_loop.create_proxy(),
        };
        let app = App::new(viewer, event_loop.create_proxy(), None);
        event_loop.spawn_app(app);

        Ok(handle)
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{ViewerHandle, start_viewer};
