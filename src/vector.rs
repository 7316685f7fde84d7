use nalgebra as na;
use std::fmt;
use std::ops::{Mul, Neg};

/// A 3-vector where any component may be unknown (`?` in imgCIF)
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}
impl Vector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }
    pub fn zero() -> Self {
        Self::new(0f64, 0f64, 0f64)
    }
    /// All three components unknown
    pub fn unknown() -> Self {
        Default::default()
    }
    pub fn from_x(value: f64) -> Self {
        Self::new(value, 0f64, 0f64)
    }
    pub fn from_y(value: f64) -> Self {
        Self::new(0f64, value, 0f64)
    }
    pub fn from_z(value: f64) -> Self {
        Self::new(0f64, 0f64, value)
    }
    /// Returns `true` if every component is known
    pub fn is_known(&self) -> bool {
        self.x.is_some() && self.y.is_some() && self.z.is_some()
    }
    /// Returns `true` if at least one component is unknown
    pub fn is_unknown(&self) -> bool {
        !self.is_known()
    }
    /// Returns `true` if no known component is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.as_array().iter().flatten().all(|v| v.is_finite())
    }
    /// Returns `true` if the vector is known and all its components are within `tol` of zero
    pub fn is_zero(&self, tol: f64) -> bool {
        self.as_tuple()
            .map_or(false, |(x, y, z)| x.abs() <= tol && y.abs() <= tol && z.abs() <= tol)
    }
    pub fn as_tuple(&self) -> Option<(f64, f64, f64)> {
        match self {
            Vector {
                x: Some(a1),
                y: Some(a2),
                z: Some(a3),
            } => Some((*a1, *a2, *a3)),
            _ => None,
        }
    }
    pub fn as_array(&self) -> [Option<f64>; 3] {
        [self.x, self.y, self.z]
    }
    pub fn magnitude(&self) -> Option<f64> {
        self.to_na().map(|v| v.norm())
    }
    /// Unit vector along `self`, `None` if unknown or zero
    pub fn normalized(&self) -> Option<Vector> {
        self.to_na()
            .and_then(|v| v.try_normalize(f64::EPSILON))
            .map(Vector::from)
    }
    pub fn to_na(&self) -> Option<na::Vector3<f64>> {
        self.as_tuple().map(|(x, y, z)| na::Vector3::new(x, y, z))
    }
    pub fn dot(&self, other: &Vector) -> Option<f64> {
        Some(self.to_na()?.dot(&other.to_na()?))
    }
    /// Rounds each known component to `decimals` places, clearing negative zeros
    pub fn rounded(&self, decimals: i32) -> Vector {
        let scale = 10f64.powi(decimals);
        let round = |v: Option<f64>| {
            v.map(|v| {
                let r = (v * scale).round() / scale;
                if r == 0f64 {
                    0f64
                } else {
                    r
                }
            })
        };
        Vector {
            x: round(self.x),
            y: round(self.y),
            z: round(self.z),
        }
    }
}
impl From<na::Vector3<f64>> for Vector {
    fn from(v: na::Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}
impl From<[f64; 3]> for Vector {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}
impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Self::Output {
        Vector {
            x: self.x.map(|v| -v),
            y: self.y.map(|v| -v),
            z: self.z.map(|v| -v),
        }
    }
}
impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Self::Output {
        Vector {
            x: self.x.map(|v| v * rhs),
            y: self.y.map(|v| v * rhs),
            z: self.z.map(|v| v * rhs),
        }
    }
}
impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = |v: Option<f64>| v.map_or("?".to_string(), |v| format!("{:.3}", v));
        write!(f, "[{},{},{}]", c(self.x), c(self.y), c(self.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_not_zero() {
        let v = Vector::unknown();
        assert!(v.is_unknown());
        assert!(!v.is_zero(1e-9));
        assert_eq!(v.magnitude(), None);
        assert_eq!(v.normalized(), None);
        assert_eq!(format!("{}", v), "[?,?,?]");
    }

    #[test]
    fn partially_unknown() {
        let v = Vector {
            x: Some(1.),
            y: None,
            z: Some(2.),
        };
        assert!(v.is_unknown());
        assert_eq!(v.as_tuple(), None);
        assert_eq!(format!("{}", -v), "[-1.000,?,-2.000]");
    }

    #[test]
    fn finiteness() {
        assert!(Vector::unknown().is_finite());
        assert!(Vector::from_x(1.).is_finite());
        assert!(!Vector {
            x: Some(f64::NAN),
            y: None,
            z: Some(0.)
        }
        .is_finite());
        assert!(!Vector::from_z(f64::NEG_INFINITY).is_finite());
    }

    #[test]
    fn normalize() {
        let v = Vector::new(0., 3., 4.).normalized().unwrap();
        assert!((v.magnitude().unwrap() - 1.).abs() < 1e-12);
        assert_eq!(v.rounded(8), Vector::new(0., 0.6, 0.8));
        assert_eq!(Vector::zero().normalized(), None);
    }

    #[test]
    fn rounding_clears_negative_zero() {
        let v = Vector::new(-1e-12, 0.123456789, -0.5).rounded(8);
        assert_eq!(v.x, Some(0f64));
        assert!(v.x.unwrap().is_sign_positive());
        assert_eq!(v.y, Some(0.12345679));
    }
}
