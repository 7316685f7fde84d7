//! Kappa and chi goniometer axes
//!
//! A kappa or chi axis is an ordinary rotation axis with extra geometric constraints.
//! The role is carried by a [RoleDescriptor] next to the axis, and checked against
//! an [AxisGraph] with [AxisGraph::validate_sense_consistency].

use regex::Regex;
use std::{fmt, num::ParseFloatError};

use crate::{
    axis::{AxisError, AxisKind, Equipment},
    diagnostic::{Diagnostic, DiagnosticKind},
    graph::{AxisGraph, AxisNode},
};

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error(r#"answer "{0}" doesn't match expected pattern: {1}"#)]
    Pattern(String, &'static str),
    #[error("invalid answer regex")]
    Regex(#[from] regex::Error),
    #[error("answer angle parsing error")]
    Angle(#[from] ParseFloatError),
    #[error("invalid rotation sense")]
    Sense(#[from] AxisError),
}
type Result<T> = std::result::Result<T, AnswerError>;

/// Kappa base locations, in degree
pub const KAPPA_BASE_ANGLES: [f64; 2] = [0f64, 180f64];
/// Omega angles at which a chi axis may be parallel to the beam, in degree
pub const CHI_OMEGA_ANGLES: [f64; 4] = [0f64, 90f64, 180f64, 270f64];
/// Angular tolerance when comparing an axis vector with its role, in degree
const ANGLE_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisRole {
    /// Kappa axis `tilt` degrees away from the principal axis, its support at the `base` angle
    Kappa { tilt: f64, base: f64 },
    /// Chi axis parallel to the beam when omega is at `omega` degrees
    Chi { omega: f64 },
}
impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRole::Kappa { .. } => write!(f, "kappa"),
            AxisRole::Chi { .. } => write!(f, "chi"),
        }
    }
}

/// An axis claimed to play the kappa or chi role
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDescriptor {
    pub axis: String,
    pub role: AxisRole,
}
impl RoleDescriptor {
    pub fn kappa(axis: impl Into<String>, tilt: f64, base: f64) -> Self {
        Self {
            axis: axis.into(),
            role: AxisRole::Kappa { tilt, base },
        }
    }
    pub fn chi(axis: impl Into<String>, omega: f64) -> Self {
        Self {
            axis: axis.into(),
            role: AxisRole::Chi { omega },
        }
    }
    /// Parses the kappa answer `<axis> <tilt> [<base>]`
    ///
    /// `names` are the goniometer axes the axis must be chosen from.
    /// A blank or `none` answer means there is no kappa axis.
    pub fn parse_kappa<S: AsRef<str>>(answer: &str, names: &[S]) -> Result<Option<Self>> {
        const EXPECTED: &str = "<axis> <kappa angle> [<base angle>]";
        let Some((axis, angles)) = parse_answer(answer, names, 1, 2, EXPECTED)? else {
            return Ok(None);
        };
        Ok(Some(Self::kappa(
            axis,
            angles[0],
            angles.get(1).copied().unwrap_or_default(),
        )))
    }
    /// Parses the chi answer `<axis> <omega angle>`
    ///
    /// A blank or `none` answer means there is no chi axis.
    pub fn parse_chi<S: AsRef<str>>(answer: &str, names: &[S]) -> Result<Option<Self>> {
        const EXPECTED: &str = "<axis> <omega angle>";
        let Some((axis, angles)) = parse_answer(answer, names, 1, 1, EXPECTED)? else {
            return Ok(None);
        };
        Ok(Some(Self::chi(axis, angles[0])))
    }
    /// The angle that must take one of the admissible values
    pub fn angle(&self) -> f64 {
        match self.role {
            AxisRole::Kappa { base, .. } => base,
            AxisRole::Chi { omega } => omega,
        }
    }
    pub fn admissible_angles(&self) -> &'static [f64] {
        match self.role {
            AxisRole::Kappa { .. } => &KAPPA_BASE_ANGLES,
            AxisRole::Chi { .. } => &CHI_OMEGA_ANGLES,
        }
    }
}

/// Matches `<name>( |,)<angle>...` with 1 to 3 digits angles, case-insensitively
fn parse_answer<S: AsRef<str>>(
    answer: &str,
    names: &[S],
    min: usize,
    max: usize,
    expected: &'static str,
) -> Result<Option<(String, Vec<f64>)>> {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let stem = names
        .iter()
        .map(|name| regex::escape(name.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&format!(
        r"(?i)^({})((?:[\s,]\s*\d{{1,3}}){{{},{}}})$",
        stem, min, max
    ))?;
    let capts = re
        .captures(answer)
        .ok_or_else(|| AnswerError::Pattern(answer.into(), expected))?;
    let typed = &capts[1];
    let axis = names
        .iter()
        .map(|name| name.as_ref())
        .find(|name| name.eq_ignore_ascii_case(typed))
        .unwrap_or(typed)
        .to_string();
    let angles = capts[2]
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<Vec<f64>, ParseFloatError>>()?;
    Ok(Some((axis, angles)))
}

/// Angle in degree between two axis directions, irrespective of their senses
fn unsigned_angle(node: &AxisNode, other: &AxisNode) -> Option<f64> {
    let a = node.record().vector.normalized()?;
    let b = other.record().vector.normalized()?;
    let cos = a.dot(&b)?.abs().min(1f64);
    Some(cos.acos().to_degrees())
}

impl AxisGraph {
    /// Checks that the axis of `descriptor` can play the kappa or chi role
    ///
    /// The axis must exist, be a goniometer rotation axis and the descriptor angle must be
    /// one of the admissible values. When the vectors are known, a kappa axis must also be
    /// tilted by the kappa angle from the principal goniometer axis and a chi axis must be
    /// perpendicular to it.
    pub fn validate_sense_consistency(
        &self,
        descriptor: &RoleDescriptor,
    ) -> std::result::Result<&AxisNode, Diagnostic> {
        let role = descriptor.role;
        let invalid = |message: String| {
            Diagnostic::error(
                DiagnosticKind::InvalidAxisRole,
                [descriptor.axis.as_str()],
                message,
            )
        };
        let node = self
            .find(&descriptor.axis)
            .ok_or_else(|| invalid(format!("no axis to play the {} role", role)))?;
        if node.record().kind != AxisKind::Rotation {
            return Err(invalid(format!(
                "{} axis must be a rotation axis, found {}",
                role,
                node.record().kind
            )));
        }
        if node.equipment() != Equipment::Goniometer {
            return Err(invalid(format!(
                "{} axis must belong to the goniometer, found {}",
                role,
                node.equipment()
            )));
        }
        let angle = descriptor.angle();
        let admissible = descriptor.admissible_angles();
        if !admissible.iter().any(|a| (a - angle).abs() < f64::EPSILON) {
            return Err(invalid(format!(
                "{} angle {} is not one of {:?} degree",
                role, angle, admissible
            )));
        }
        if let AxisRole::Kappa { tilt, .. } = role {
            if !(tilt > 0f64 && tilt <= 90f64) {
                return Err(invalid(format!(
                    "kappa angle {} is not within ]0,90] degree",
                    tilt
                )));
            }
        }
        let principal = self
            .chain_roots(Equipment::Goniometer)
            .next()
            .filter(|principal| principal.id() != node.id());
        if let Some(measured) = principal.and_then(|principal| unsigned_angle(node, principal)) {
            let expected = match role {
                AxisRole::Kappa { tilt, .. } => tilt,
                AxisRole::Chi { .. } => 90f64,
            };
            if (measured - expected).abs() > ANGLE_TOLERANCE {
                return Err(invalid(format!(
                    "{} axis is {:.2} degree away from the principal axis, expected {}",
                    role, measured, expected
                )));
            }
        }
        log::debug!("{} plays the {} role", node.id(), role);
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{
        axis::{AxisRecord, DependsOn},
        vector::Vector,
    };

    const NAMES: [&str; 3] = ["Phi", "Kappa", "Omega"];

    fn kappa_goniometer() -> AxisGraph {
        let (s, c) = 50f64.to_radians().sin_cos();
        AxisGraph::build([
            AxisRecord::rotation(
                "omega",
                Equipment::Goniometer,
                DependsOn::Root,
                Vector::from_x(1.),
            ),
            AxisRecord::rotation(
                "kappa",
                Equipment::Goniometer,
                DependsOn::parse("omega"),
                Vector::new(-c, 0., -s),
            ),
            AxisRecord::rotation(
                "phi",
                Equipment::Goniometer,
                DependsOn::parse("kappa"),
                Vector::from_x(-1.),
            ),
            AxisRecord::translation(
                "trans",
                Equipment::Detector,
                DependsOn::Root,
                Vector::from_z(-1.),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn parse_kappa_answers() -> std::result::Result<(), Box<dyn Error>> {
        assert_eq!(
            RoleDescriptor::parse_kappa("kappa 50", &NAMES)?,
            Some(RoleDescriptor::kappa("Kappa", 50., 0.))
        );
        assert_eq!(
            RoleDescriptor::parse_kappa("  KAPPA, 50 180", &NAMES)?,
            Some(RoleDescriptor::kappa("Kappa", 50., 180.))
        );
        assert_eq!(RoleDescriptor::parse_kappa("none", &NAMES)?, None);
        assert_eq!(RoleDescriptor::parse_kappa("", &NAMES)?, None);
        assert!(matches!(
            RoleDescriptor::parse_kappa("chi 50", &NAMES),
            Err(AnswerError::Pattern(..))
        ));
        assert!(RoleDescriptor::parse_kappa("kappa 50 0 0", &NAMES).is_err());
        assert!(RoleDescriptor::parse_kappa("kappa 5000", &NAMES).is_err());
        Ok(())
    }

    #[test]
    fn parse_chi_answers() -> std::result::Result<(), Box<dyn Error>> {
        assert_eq!(
            RoleDescriptor::parse_chi("phi,90", &["phi", "chi"])?,
            Some(RoleDescriptor::chi("phi", 90.))
        );
        assert!(RoleDescriptor::parse_chi("chi 0 180", &["phi", "chi"]).is_err());
        assert!(RoleDescriptor::parse_chi("chi", &["phi", "chi"]).is_err());
        Ok(())
    }

    #[test]
    fn kappa_role() -> std::result::Result<(), Box<dyn Error>> {
        let graph = kappa_goniometer();
        let node = graph.validate_sense_consistency(&RoleDescriptor::kappa("Kappa", 50., 0.))?;
        assert_eq!(node.id(), "kappa");
        Ok(())
    }

    #[test]
    fn kappa_base_angle_must_be_0_or_180() {
        let graph = kappa_goniometer();
        let err = graph
            .validate_sense_consistency(&RoleDescriptor::kappa("kappa", 50., 90.))
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::InvalidAxisRole);
        assert!(err.is_error());
        assert!(graph
            .validate_sense_consistency(&RoleDescriptor::kappa("kappa", 50., 180.))
            .is_ok());
    }

    #[test]
    fn kappa_tilt_must_match_vector() {
        let graph = kappa_goniometer();
        let err = graph
            .validate_sense_consistency(&RoleDescriptor::kappa("kappa", 60., 0.))
            .unwrap_err();
        assert!(err.message.contains("principal axis"), "{}", err.message);
    }

    #[test]
    fn role_needs_goniometer_rotation() {
        let graph = kappa_goniometer();
        let missing = graph
            .validate_sense_consistency(&RoleDescriptor::chi("chi", 0.))
            .unwrap_err();
        assert_eq!(missing.axes, vec!["chi"]);
        let translation = graph
            .validate_sense_consistency(&RoleDescriptor::chi("trans", 0.))
            .unwrap_err();
        assert!(translation.message.contains("rotation"));
    }

    #[test]
    fn chi_role() -> std::result::Result<(), Box<dyn Error>> {
        let graph = AxisGraph::build([
            AxisRecord::rotation(
                "omega",
                Equipment::Goniometer,
                DependsOn::Root,
                Vector::from_x(1.),
            ),
            AxisRecord::rotation(
                "chi",
                Equipment::Goniometer,
                DependsOn::parse("omega"),
                Vector::from_z(-1.),
            ),
            AxisRecord::rotation(
                "phi",
                Equipment::Goniometer,
                DependsOn::parse("chi"),
                Vector::from_x(1.),
            ),
        ])?;
        graph.validate_sense_consistency(&RoleDescriptor::chi("chi", 0.))?;
        assert!(graph
            .validate_sense_consistency(&RoleDescriptor::chi("chi", 45.))
            .is_err());
        assert!(graph
            .validate_sense_consistency(&RoleDescriptor::chi("phi", 0.))
            .is_err());
        Ok(())
    }
}
