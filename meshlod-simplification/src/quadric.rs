//! Quadric error metric

use meshlod_core::{Point3d, Vector3d};
use nalgebra::{Matrix4, Vector4};
use std::ops::{Add, AddAssign};

/// Symmetric 4x4 quadric measuring squared distance to a set of planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(pub Matrix4<f64>);

impl Quadric {
    pub fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of the plane `n·x + d = 0`, scaled by `weight`
    pub fn from_plane(normal: &Vector3d, d: f64, weight: f64) -> Self {
        let p = Vector4::new(normal.x, normal.y, normal.z, d);
        Quadric(p * p.transpose() * weight)
    }

    /// Plane through three points. Degenerate triangles yield `None`.
    pub fn from_triangle(p0: &Point3d, p1: &Point3d, p2: &Point3d) -> Option<Self> {
        let normal = triangle_normal(p0, p1, p2)?;
        Some(Self::from_plane(&normal, -normal.dot(&p0.coords), 1.0))
    }

    /// Error of placing a vertex at `p`
    pub fn error(&self, p: &Point3d) -> f64 {
        let v = Vector4::new(p.x, p.y, p.z, 1.0);
        (v.transpose() * self.0 * v)[0].max(0.0)
    }

    /// Position minimising the quadric, if the 3x3 system is well conditioned
    pub fn optimal_position(&self) -> Option<Point3d> {
        let a = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        if a.determinant().abs() < 1e-12 {
            return None;
        }
        let b = self.0.fixed_view::<3, 1>(0, 3).into_owned();
        let p = a.try_inverse()? * -b;
        if p.iter().all(|x| x.is_finite()) {
            Some(Point3d::from(p))
        } else {
            None
        }
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric(self.0 + rhs.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        self.0 += rhs.0;
    }
}

/// Unit normal of a triangle, `None` if it has no area
pub fn triangle_normal(p0: &Point3d, p1: &Point3d, p2: &Point3d) -> Option<Vector3d> {
    let n = (p1 - p0).cross(&(p2 - p0));
    let len = n.norm();
    if len <= f64::EPSILON || !len.is_finite() {
        return None;
    }
    Some(n / len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_distance() {
        let q = Quadric::from_triangle(
            &Point3d::new(0.0, 0.0, 0.0),
            &Point3d::new(1.0, 0.0, 0.0),
            &Point3d::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(q.error(&Point3d::new(5.0, -3.0, 0.0)), 0.0);
        assert_relative_eq!(q.error(&Point3d::new(0.0, 0.0, 2.0)), 4.0);
    }

    #[test]
    fn test_degenerate_triangle() {
        let p = Point3d::new(1.0, 1.0, 1.0);
        assert!(Quadric::from_triangle(&p, &p, &Point3d::new(2.0, 2.0, 2.0)).is_none());
    }

    #[test]
    fn test_optimal_position_corner() {
        // Three orthogonal planes meet at (1, 2, 3)
        let mut q = Quadric::zero();
        q += Quadric::from_plane(&Vector3d::x(), -1.0, 1.0);
        q += Quadric::from_plane(&Vector3d::y(), -2.0, 1.0);
        q += Quadric::from_plane(&Vector3d::z(), -3.0, 1.0);
        let p = q.optimal_position().unwrap();
        assert_relative_eq!(p, Point3d::new(1.0, 2.0, 3.0), epsilon = 1e-9);
        assert_relative_eq!(q.error(&p), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_system() {
        // Coplanar planes cannot pin a point
        let q = Quadric::from_plane(&Vector3d::z(), 0.0, 1.0) + Quadric::from_plane(&Vector3d::z(), 0.0, 2.0);
        assert!(q.optimal_position().is_none());
    }
}
