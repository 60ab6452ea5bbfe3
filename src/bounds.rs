use cgmath::{Matrix4, Point3, Transform, Vector3};

/// Axis-aligned bounding box. An empty box has `min > max` on every axis and
/// absorbs nothing when unioned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Point3<f32>>>(points: I) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand_by_point(p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn expand_by_point(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        out.expand_by_point(other.min);
        out.expand_by_point(other.max);
        out
    }

    pub fn center(&self) -> Point3<f32> {
        if self.is_empty() {
            return Point3::new(0.0, 0.0, 0.0);
        }
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this box after `matrix` is applied to all eight corners.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb::from_points(self.corners().iter().map(|c| matrix.transform_point(*c)))
    }

    /// Slab test. Returns the entry distance along `direction`, or the exit
    /// distance when the origin is inside the box.
    pub fn ray_hit(&self, origin: Point3<f32>, direction: Vector3<f32>) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in 0..3 {
            let inv = if direction[axis] != 0.0 {
                1.0 / direction[axis]
            } else {
                f32::INFINITY
            };
            let mut t0 = (self.min[axis] - origin[axis]) * inv;
            let mut t1 = (self.max[axis] - origin[axis]) * inv;
            // 0 * inf for rays parallel to a slab they start inside of
            if t0.is_nan() || t1.is_nan() {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return None;
            }
        }

        if tmax < 0.0 {
            return None;
        }
        Some(if tmin >= 0.0 { tmin } else { tmax })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::from_points([Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)])
    }

    #[test]
    fn empty_box_is_neutral_for_union() {
        let b = unit_box();
        assert_eq!(Aabb::empty().union(&b), b);
        assert_eq!(b.union(&Aabb::empty()), b);
        assert!(Aabb::empty().is_empty());
    }

    #[test]
    fn center_and_size() {
        let b = Aabb::from_points([Point3::new(2.0, 0.0, -4.0), Point3::new(6.0, 2.0, 0.0)]);
        assert_eq!(b.center(), Point3::new(4.0, 1.0, -2.0));
        assert_eq!(b.size(), Vector3::new(4.0, 2.0, 4.0));
    }

    #[test]
    fn transformed_by_scale_and_translation() {
        let m = Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)) * Matrix4::from_scale(2.0);
        let b = unit_box().transformed(&m);
        assert_eq!(b.min, Point3::new(8.0, -2.0, -2.0));
        assert_eq!(b.max, Point3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn ray_hits_from_outside_and_inside() {
        let b = unit_box();
        let t = b
            .ray_hit(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0))
            .unwrap();
        assert!((t - 4.0).abs() < 1e-6);

        let t = b
            .ray_hit(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert!((t - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ray_misses() {
        let b = unit_box();
        assert!(
            b.ray_hit(Point3::new(0.0, 3.0, 5.0), Vector3::new(0.0, 0.0, -1.0))
                .is_none()
        );
        // pointing away
        assert!(
            b.ray_hit(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 1.0))
                .is_none()
        );
    }
}
