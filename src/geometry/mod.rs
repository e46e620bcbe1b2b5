mod aabb;
mod ray_box_intersection;
mod triangle;

pub use aabb::AABB;
pub use ray_box_intersection::RayIntersectionExt;
pub use triangle::Triangle;

pub type FloatType = f32;

pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

/// Normalizes the vector, leaving zero vectors untouched instead of producing NaNs.
pub fn normalize_or_unchanged(v: WorldVector) -> WorldVector {
    let norm = v.norm();
    if norm == 0.0 { v } else { v / norm }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Direction of the ray, not necessarily normalized.
    /// Ray parameter t is measured in multiples of this vector.
    pub direction: WorldVector,

    /// Instant inside the shutter interval at which moving surfaces are evaluated.
    pub time: FloatType,
}

impl Ray {
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Self::with_time(origin, direction, 0.0)
    }

    pub fn with_time(origin: WorldPoint, direction: WorldVector, time: FloatType) -> Ray {
        Ray {
            origin,
            direction,
            time,
        }
    }

    pub fn point_at(&self, t: FloatType) -> WorldPoint {
        self.origin + self.direction * t
    }

    /// True if the direction is a zero vector and the ray can't travel anywhere.
    pub fn is_degenerate(&self) -> bool {
        self.direction == WorldVector::zeros()
    }
}

/// Closed interval of time, typically the camera shutter interval.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeInterval {
    pub start: FloatType,
    pub end: FloatType,
}

impl TimeInterval {
    pub fn new(start: FloatType, end: FloatType) -> TimeInterval {
        TimeInterval { start, end }
    }

    /// Interval containing just a single moment.
    pub fn instant(time: FloatType) -> TimeInterval {
        TimeInterval {
            start: time,
            end: time,
        }
    }

    pub fn contains(&self, time: FloatType) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn duration(&self) -> FloatType {
        self.end - self.start
    }

    /// Fraction of the interval elapsed at `time`.
    /// Zero length intervals map everything to 0.
    pub fn fraction(&self, time: FloatType) -> FloatType {
        let duration = self.duration();
        if duration == 0.0 {
            0.0
        } else {
            (time - self.start) / duration
        }
    }
}

impl Default for TimeInterval {
    fn default() -> Self {
        TimeInterval::new(0.0, 1.0)
    }
}
