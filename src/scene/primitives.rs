use nalgebra::Unit;

use crate::geometry::{FloatType, Ray, TimeInterval, Triangle, WorldBox, WorldPoint, WorldVector};

use super::{Surface, SurfaceHit};

/// Closed set of the built in surfaces, dispatched without virtual calls.
#[derive(Clone, Debug)]
pub enum Primitive {
    Sphere(Sphere),
    MovingSphere(MovingSphere),
    Facet(Facet),
}

impl Surface for Primitive {
    fn bounding_box(&self, interval: &TimeInterval) -> WorldBox {
        match self {
            Primitive::Sphere(s) => s.bounding_box(interval),
            Primitive::MovingSphere(s) => s.bounding_box(interval),
            Primitive::Facet(f) => f.bounding_box(interval),
        }
    }

    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit> {
        match self {
            Primitive::Sphere(s) => s.hit(ray, t_min, t_max),
            Primitive::MovingSphere(s) => s.hit(ray, t_min, t_max),
            Primitive::Facet(f) => f.hit(ray, t_min, t_max),
        }
    }

    fn material(&self) -> Option<&str> {
        match self {
            Primitive::Sphere(s) => s.material(),
            Primitive::MovingSphere(s) => s.material(),
            Primitive::Facet(f) => f.material(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sphere {
    pub center: WorldPoint,
    pub radius: FloatType,
    pub material: Option<String>,
}

impl Sphere {
    pub fn new(center: WorldPoint, radius: FloatType) -> Sphere {
        Sphere {
            center,
            radius,
            material: None,
        }
    }

    pub fn with_material(self, material: impl Into<String>) -> Sphere {
        Sphere {
            material: Some(material.into()),
            ..self
        }
    }
}

impl Surface for Sphere {
    fn bounding_box(&self, _interval: &TimeInterval) -> WorldBox {
        sphere_box(&self.center, self.radius)
    }

    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit> {
        intersect_sphere(&self.center, self.radius, ray, t_min, t_max)
    }

    fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }
}

/// Sphere moving linearly between two centers during `times`.
/// Outside of `times` the motion is extrapolated.
#[derive(Clone, Debug)]
pub struct MovingSphere {
    pub centers: [WorldPoint; 2],
    pub times: TimeInterval,
    pub radius: FloatType,
    pub material: Option<String>,
}

impl MovingSphere {
    pub fn new(centers: [WorldPoint; 2], times: TimeInterval, radius: FloatType) -> MovingSphere {
        MovingSphere {
            centers,
            times,
            radius,
            material: None,
        }
    }

    pub fn with_material(self, material: impl Into<String>) -> MovingSphere {
        MovingSphere {
            material: Some(material.into()),
            ..self
        }
    }

    pub fn center(&self, time: FloatType) -> WorldPoint {
        let [start, end] = self.centers;
        start + (end - start) * self.times.fraction(time)
    }
}

impl Surface for MovingSphere {
    /// Motion is linear, so the boxes at both ends of the interval enclose everything in between.
    fn bounding_box(&self, interval: &TimeInterval) -> WorldBox {
        sphere_box(&self.center(interval.start), self.radius)
            .union(&sphere_box(&self.center(interval.end), self.radius))
    }

    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit> {
        intersect_sphere(&self.center(ray.time), self.radius, ray, t_min, t_max)
    }

    fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }
}

/// Single two sided triangle.
#[derive(Clone, Debug)]
pub struct Facet {
    pub vertices: Triangle<WorldPoint>,
    pub material: Option<String>,
}

impl Facet {
    pub fn new(vertices: [WorldPoint; 3]) -> Facet {
        Facet {
            vertices: vertices.into(),
            material: None,
        }
    }

    pub fn with_material(self, material: impl Into<String>) -> Facet {
        Facet {
            material: Some(material.into()),
            ..self
        }
    }
}

impl Surface for Facet {
    fn bounding_box(&self, _interval: &TimeInterval) -> WorldBox {
        WorldBox::from_points(self.vertices.iter()).unwrap_or_default()
    }

    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit> {
        let (t, _u, _v) = self.vertices.intersect(ray)?;
        if t < t_min || t > t_max {
            return None;
        }

        // Normal facing against the ray
        let mut normal = self.vertices.normal();
        if normal.dot(&ray.direction) > 0.0 {
            normal = -normal;
        }

        Some(SurfaceHit {
            t,
            point: ray.point_at(t),
            normal: Unit::new_normalize(normal),
        })
    }

    fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }
}

fn sphere_box(center: &WorldPoint, radius: FloatType) -> WorldBox {
    let r_vec = WorldVector::repeat(radius.abs());
    WorldBox {
        min: *center - r_vec,
        max: *center + r_vec,
    }
}

/// Nearest of the two ray-sphere intersections that lies within `[t_min, t_max]`.
fn intersect_sphere(
    center: &WorldPoint,
    radius: FloatType,
    ray: &Ray,
    t_min: FloatType,
    t_max: FloatType,
) -> Option<SurfaceHit> {
    let a = ray.direction.norm_squared();
    if a == 0.0 || radius <= 0.0 {
        return None;
    }

    let oc = ray.origin - *center;
    let half_b = oc.dot(&ray.direction);
    let c = oc.norm_squared() - radius * radius;
    let discriminant = half_b * half_b - a * c;

    if discriminant < 0.0 {
        return None;
    }

    let sqrt_disc = discriminant.sqrt();
    let t1 = (-half_b - sqrt_disc) / a;
    let t2 = (-half_b + sqrt_disc) / a;
    let t = if (t_min..=t_max).contains(&t1) {
        t1
    } else if (t_min..=t_max).contains(&t2) {
        t2
    } else {
        return None;
    };

    let point = ray.point_at(t);
    let normal = Unit::new_normalize(point - *center);

    Some(SurfaceHit { t, point, normal })
}
