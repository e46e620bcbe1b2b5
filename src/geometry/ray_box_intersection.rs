use crate::geometry::{FloatType, Ray, WorldBox};

pub trait RayIntersectionExt {
    /// Calculate the first and last ray parameter inside the box, clipped to `[t_min, t_max]`.
    /// Returns None if the ray misses the box within that range.
    fn intersect(
        &self,
        ray: &Ray,
        t_min: FloatType,
        t_max: FloatType,
    ) -> Option<(FloatType, FloatType)>;

    fn intersects(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> bool {
        self.intersect(ray, t_min, t_max).is_some()
    }
}

impl RayIntersectionExt for WorldBox {
    /// Slab test.
    /// Axes where the ray direction is exactly zero never divide, the ray either stays
    /// inside the slab for the whole range or misses it completely.
    fn intersect(
        &self,
        ray: &Ray,
        mut t_min: FloatType,
        mut t_max: FloatType,
    ) -> Option<(FloatType, FloatType)> {
        // Inverted infinities of an empty box would otherwise make an infinite slab
        if self.is_empty() || t_min > t_max {
            return None;
        }

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];

            if direction == 0.0 {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }

            let inv_direction = 1.0 / direction;
            let mut t0 = (self.min[axis] - origin) * inv_direction;
            let mut t1 = (self.max[axis] - origin) * inv_direction;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}
