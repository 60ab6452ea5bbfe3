use crate::material::Color;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLight {
    /// Position of the light; it shines from here towards the origin.
    pub position: [f32; 4],
    pub color: [f32; 4],
}

const MAX_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightArrayGpu {
    ambient: [f32; 4],
    lights: [DirectionalLight; MAX_LIGHTS],
    num_lights: u32,
    _padding: [u32; 3],
}

pub struct LightManager {
    ambient: Color,
    lights: [DirectionalLight; MAX_LIGHTS],
    active_mask: u32,
    dirty: bool,
}

impl LightManager {
    pub fn new(ambient: Color) -> Self {
        Self {
            ambient,
            lights: [DirectionalLight::default(); MAX_LIGHTS],
            active_mask: 0,
            dirty: true,
        }
    }

    pub fn ambient(&self) -> Color {
        self.ambient
    }

    pub fn set_ambient(&mut self, color: Color) {
        self.ambient = color;
        self.dirty = true;
    }

    pub fn add_light(&mut self, pos: [f32; 3], color: Color) -> Option<usize> {
        for i in 0..MAX_LIGHTS {
            if self.active_mask & (1 << i) == 0 {
                self.lights[i] = DirectionalLight {
                    position: [pos[0], pos[1], pos[2], 0.0],
                    color: color.to_rgba(),
                };
                self.active_mask |= 1 << i;
                self.dirty = true;
                return Some(i);
            }
        }
        log::warn!("light limit of {} reached", MAX_LIGHTS);
        None
    }

    pub fn remove_light(&mut self, index: usize) {
        if index < MAX_LIGHTS {
            self.active_mask &= !(1 << index);
            self.dirty = true;
        }
    }

    pub fn get_light(&self, index: usize) -> Option<&DirectionalLight> {
        if self.is_active(index) {
            Some(&self.lights[index])
        } else {
            None
        }
    }

    pub fn sync_to_gpu(&self) -> LightArrayGpu {
        let mut gpu_lights = [DirectionalLight::default(); MAX_LIGHTS];
        let mut write_idx = 0;

        for i in 0..MAX_LIGHTS {
            if self.is_active(i) {
                gpu_lights[write_idx] = self.lights[i];
                write_idx += 1;
            }
        }

        LightArrayGpu {
            ambient: self.ambient.to_rgba(),
            lights: gpu_lights,
            num_lights: write_idx as u32,
            _padding: [0; 3],
        }
    }

    pub fn is_active(&self, index: usize) -> bool {
        index < MAX_LIGHTS && (self.active_mask & (1 << index)) != 0
    }

    pub fn num_lights(&self) -> u32 {
        self.active_mask.count_ones()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_array_is_packed_in_slot_order() {
        let mut lights = LightManager::new(Color::from_hex(0xa0a0a0));
        let a = lights.add_light([-100.0, -50.0, 100.0], Color::from_hex(0xc0c090)).unwrap();
        let b = lights.add_light([100.0, 50.0, -100.0], Color::from_hex(0xc0c090)).unwrap();
        lights.remove_light(a);

        let gpu = lights.sync_to_gpu();
        assert_eq!(gpu.num_lights, 1);
        assert_eq!(gpu.lights[0].position, [100.0, 50.0, -100.0, 0.0]);
        assert_eq!(lights.get_light(b).unwrap().position[0], 100.0);
        assert!(lights.get_light(a).is_none());
    }

    #[test]
    fn limit_is_enforced() {
        let mut lights = LightManager::new(Color::WHITE);
        for _ in 0..MAX_LIGHTS {
            assert!(lights.add_light([0.0, 1.0, 0.0], Color::WHITE).is_some());
        }
        assert!(lights.add_light([0.0, 1.0, 0.0], Color::WHITE).is_none());
        assert_eq!(lights.num_lights(), MAX_LIGHTS as u32);
    }

    #[test]
    fn ambient_change_is_uploaded_again() {
        let mut lights = LightManager::new(Color::from_hex(0xa0a0a0));
        lights.clear_dirty();
        lights.set_ambient(Color::from_hex(0x202020));

        assert!(lights.is_dirty());
        assert_eq!(lights.ambient(), Color::from_hex(0x202020));
        assert_eq!(lights.sync_to_gpu().ambient, Color::from_hex(0x202020).to_rgba());
    }

    #[test]
    fn uniform_size_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<LightArrayGpu>(), 160);
    }
}
