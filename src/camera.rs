use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Initial camera placement and projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraDefaults {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub near: f32,
    pub far: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 500.0),
            target: Point3::new(0.0, 0.0, 0.0),
            near: 0.1,
            far: 10000.0,
            fov: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

impl Camera {
    pub fn new(defaults: &CameraDefaults) -> Self {
        Self {
            position: defaults.position,
            target: defaults.target,
        }
    }

    pub fn reset(&mut self, defaults: &CameraDefaults) {
        self.position = defaults.position;
        self.target = defaults.target;
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, Vector3::unit_y())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(aspect: f32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// OpenGL-convention projection (NDC depth in -1..1).
    pub fn calc_gl_matrix(&self) -> Matrix4<f32> {
        perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * self.calc_gl_matrix()
    }

    /// World-space ray through a point given in normalized device
    /// coordinates. The direction is unit length.
    pub fn ray_from_ndc(&self, camera: &Camera, ndc: [f32; 2]) -> (Point3<f32>, Vector3<f32>) {
        let forward = (camera.target - camera.position).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward);
        let tan_half = (self.fovy.0 * 0.5).tan();

        let direction =
            forward + right * (ndc[0] * tan_half * self.aspect) + up * (ndc[1] * tan_half);
        (camera.position, direction.normalize())
    }
}

/// Width over height, or `1.0` for a zero-height surface.
pub fn aspect_ratio(width: f32, height: f32) -> f32 {
    if height == 0.0 { 1.0 } else { width / height }
}

/// Maps a cursor position to normalized device coordinates relative to the
/// surface rectangle `origin`..`origin + size`; y points up.
pub fn cursor_to_ndc(cursor: [f32; 2], origin: [f32; 2], size: [f32; 2]) -> [f32; 2] {
    let width = if size[0] == 0.0 { 1.0 } else { size[0] };
    let height = if size[1] == 0.0 { 1.0 } else { size[1] };
    [
        ((cursor[0] - origin[0]) / width) * 2.0 - 1.0,
        -((cursor[1] - origin[1]) / height) * 2.0 + 1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    #[test]
    fn zero_height_aspect_is_one() {
        assert_eq!(aspect_ratio(800.0, 0.0), 1.0);
        assert_eq!(aspect_ratio(0.0, 0.0), 1.0);
        assert_eq!(aspect_ratio(800.0, 400.0), 2.0);
    }

    #[test]
    fn ndc_corners() {
        let size = [200.0, 100.0];
        let origin = [10.0, 20.0];
        assert_eq!(cursor_to_ndc([10.0, 20.0], origin, size), [-1.0, 1.0]);
        assert_eq!(cursor_to_ndc([210.0, 120.0], origin, size), [1.0, -1.0]);
        assert_eq!(cursor_to_ndc([110.0, 70.0], origin, size), [0.0, 0.0]);
    }

    #[test]
    fn center_ray_points_at_target() {
        let defaults = CameraDefaults::default();
        let camera = Camera::new(&defaults);
        let projection = Projection::new(1.5, Deg(defaults.fov), defaults.near, defaults.far);
        let (origin, dir) = projection.ray_from_ndc(&camera, [0.0, 0.0]);
        assert_eq!(origin, defaults.position);
        assert!((dir - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-4);
    }

    #[test]
    fn edge_ray_matches_field_of_view() {
        let defaults = CameraDefaults::default();
        let camera = Camera::new(&defaults);
        let projection = Projection::new(1.0, Deg(60.0), defaults.near, defaults.far);
        let (_, dir) = projection.ray_from_ndc(&camera, [0.0, 1.0]);
        // top edge of a 60 degree frustum is 30 degrees above the view axis
        let angle = dir.angle(Vector3::new(0.0, 0.0, -1.0));
        assert!((angle.0 - 30f32.to_radians()).abs() < 1e-3);
        assert!(dir.y > 0.0);
    }
}
