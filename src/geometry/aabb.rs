use num_traits::One;
use std::ops::Sub;

use nalgebra::{ClosedAddAssign, ClosedDivAssign, Point, Scalar};

use super::{FloatType, WorldBox, WorldPoint};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + ClosedAddAssign + ClosedDivAssign + One, const D: usize> AABB<Point<T, D>> {
    pub fn center(&self) -> Point<T, D> {
        let two = T::one() + T::one();
        let avg_coords = (&self.min.coords + &self.max.coords) / two;
        Point::from(avg_coords)
    }
}

impl WorldBox {
    /// The box enclosing nothing.
    /// Min corner is at +inf and max corner at -inf, so that it is an identity for `union`.
    pub fn empty() -> WorldBox {
        WorldBox {
            min: WorldPoint::from([FloatType::INFINITY; 3]),
            max: WorldPoint::from([FloatType::NEG_INFINITY; 3]),
        }
    }

    pub fn from_point(point: &WorldPoint) -> WorldBox {
        WorldBox {
            min: *point,
            max: *point,
        }
    }

    /// Smallest box enclosing all the points, or None if the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a WorldPoint>) -> Option<WorldBox> {
        let mut points = points.into_iter();
        let first = WorldBox::from_point(points.next()?);
        Some(points.fold(first, |acc, p| acc.expand(p)))
    }

    /// True if the box doesn't contain any point.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| !(self.min[axis] <= self.max[axis]))
    }

    /// Returns the box enlarged to contain the point.
    pub fn expand(&self, point: &WorldPoint) -> WorldBox {
        WorldBox {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &WorldBox) -> WorldBox {
        WorldBox {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn contains_point(&self, point: &WorldPoint) -> bool {
        (0..3).all(|axis| self.min[axis] <= point[axis] && point[axis] <= self.max[axis])
    }

    /// True if `other` lies completely inside this box.
    /// Empty box is contained in everything.
    pub fn contains(&self, other: &WorldBox) -> bool {
        other.is_empty()
            || (0..3).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    /// Axis with the largest extent. Ties are resolved in order X, Y, Z.
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        let mut best = 0;
        for axis in 1..3 {
            if size[axis] > size[best] {
                best = axis;
            }
        }
        best
    }

    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
    }
}

impl Default for WorldBox {
    fn default() -> Self {
        WorldBox::empty()
    }
}
