/// Centralized default values for the viewer.
/// Keeps tunables out of the code paths that use them.

/// Canvas id looked up when no element is given explicitly
pub const CANVAS_ID: &str = "canvas";

/// Background clear color
pub const CLEAR_COLOR: u32 = 0x666666;

/// Ambient light color
pub const AMBIENT_LIGHT: u32 = 0xa0a0a0;

/// Directional light color, shared by both key lights
pub const DIRECTIONAL_LIGHT: u32 = 0xc0c090;

/// Positions of the two directional lights
pub const DIRECTIONAL_LIGHT_POSITIONS: [[f32; 3]; 2] = [[-100.0, -50.0, 100.0], [100.0, 50.0, -100.0]];

/// Width a freshly loaded main model is scaled to
pub const MAIN_MODEL_WIDTH: f32 = 175.0;

/// Object controls: scale limits, speeds
pub const MIN_MODEL_SCALE: f32 = 0.001;
pub const MAX_MODEL_SCALE: f32 = 100.0;
pub const SCALE_SPEED: f32 = 0.1;
pub const ROTATION_SPEED: f32 = 0.075;

/// Material name used when a decoder provides none
pub const DEFAULT_MATERIAL_NAME: &str = "default";

/// Name of the group every loaded model is wrapped in
pub const MODEL_GROUP_NAME: &str = "model";

/// MSAA sample count requested for the main pass
pub const SAMPLE_COUNT: u32 = 4;
