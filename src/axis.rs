use std::{fmt, str::FromStr};
use strum_macros::EnumIter;

use crate::vector::Vector;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AxisError {
    #[error(r#"axis type "{0}" is not recognized, expected "rotation", "translation" or "general""#)]
    Kind(String),
    #[error(
        r#"equipment "{0}" is not recognized, expected "goniometer", "detector", "detector_element", "source" or "gravity""#
    )]
    Equipment(String),
    #[error(r#"rotation sense "{0}" is not recognized, expected "c" (clockwise) or "a" (anticlockwise)"#)]
    Sense(String),
}
type Result<T> = std::result::Result<T, AxisError>;

/// Motion type of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    Rotation,
    Translation,
    /// Reference direction without motion (`source`, `gravity`)
    General,
}
impl FromStr for AxisKind {
    type Err = AxisError;

    fn from_str(s: &str) -> Result<Self> {
        use AxisKind::*;
        match s.trim().to_lowercase().as_str() {
            "rotation" => Ok(Rotation),
            "translation" => Ok(Translation),
            "general" => Ok(General),
            _ => Err(AxisError::Kind(s.into())),
        }
    }
}
impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisKind::Rotation => write!(f, "rotation"),
            AxisKind::Translation => write!(f, "translation"),
            AxisKind::General => write!(f, "general"),
        }
    }
}

/// Physical subsystem an axis belongs to
///
/// The declaration order is the order in which chains are written out.
#[derive(EnumIter, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Equipment {
    Goniometer,
    Detector,
    DetectorElement,
    Source,
    Gravity,
}
impl Equipment {
    /// Returns `true` if an axis of this equipment may hang off an axis of `parent`
    pub fn may_depend_on(&self, parent: Equipment) -> bool {
        *self == parent || (*self == Equipment::DetectorElement && parent == Equipment::Detector)
    }
}
impl FromStr for Equipment {
    type Err = AxisError;

    fn from_str(s: &str) -> Result<Self> {
        use Equipment::*;
        match s.trim().to_lowercase().as_str() {
            "goniometer" => Ok(Goniometer),
            "detector" => Ok(Detector),
            "detector_element" | "detector-element" => Ok(DetectorElement),
            "source" => Ok(Source),
            "gravity" => Ok(Gravity),
            _ => Err(AxisError::Equipment(s.into())),
        }
    }
}
impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Equipment::*;
        match self {
            Goniometer => write!(f, "goniometer"),
            Detector => write!(f, "detector"),
            DetectorElement => write!(f, "detector_element"),
            Source => write!(f, "source"),
            Gravity => write!(f, "gravity"),
        }
    }
}

/// Parent reference of an axis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependsOn {
    /// Chain root, written `.` in imgCIF
    Root,
    Axis(String),
}
impl DependsOn {
    /// Parses a `depends_on` value, `.`, `?` and blanks being the root sentinel
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "." | "?" => DependsOn::Root,
            id if id.eq_ignore_ascii_case("none") => DependsOn::Root,
            id => DependsOn::Axis(id.to_string()),
        }
    }
    pub fn is_root(&self) -> bool {
        matches!(self, DependsOn::Root)
    }
    pub fn as_axis(&self) -> Option<&str> {
        match self {
            DependsOn::Root => None,
            DependsOn::Axis(id) => Some(id.as_str()),
        }
    }
}
impl<S: Into<String>> From<Option<S>> for DependsOn {
    fn from(value: Option<S>) -> Self {
        value.map_or(DependsOn::Root, |id| DependsOn::Axis(id.into()))
    }
}
impl fmt::Display for DependsOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependsOn::Root => write!(f, "."),
            DependsOn::Axis(id) => write!(f, "{}", id),
        }
    }
}

/// Rotation sense looking from the crystal along the axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Clockwise,
    Anticlockwise,
}
impl Sense {
    /// `+1` for anticlockwise, `-1` for clockwise
    pub fn sign(&self) -> f64 {
        match self {
            Sense::Clockwise => -1f64,
            Sense::Anticlockwise => 1f64,
        }
    }
}
impl FromStr for Sense {
    type Err = AxisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "c" | "clockwise" => Ok(Sense::Clockwise),
            "a" | "anticlockwise" => Ok(Sense::Anticlockwise),
            _ => Err(AxisError::Sense(s.into())),
        }
    }
}
impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Clockwise => write!(f, "c"),
            Sense::Anticlockwise => write!(f, "a"),
        }
    }
}

/// One physical axis, i.e. one row of the imgCIF `_axis` table
#[derive(Debug, Clone, PartialEq)]
pub struct AxisRecord {
    pub id: String,
    pub kind: AxisKind,
    pub equipment: Equipment,
    pub depends_on: DependsOn,
    /// Direction in the frame of the parent axis
    pub vector: Vector,
    /// Origin translation from the parent origin
    pub offset: Vector,
}
impl AxisRecord {
    pub fn new(
        id: impl Into<String>,
        kind: AxisKind,
        equipment: Equipment,
        depends_on: DependsOn,
        vector: Vector,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            equipment,
            depends_on,
            vector,
            offset: Vector::zero(),
        }
    }
    pub fn rotation(
        id: impl Into<String>,
        equipment: Equipment,
        depends_on: DependsOn,
        vector: Vector,
    ) -> Self {
        Self::new(id, AxisKind::Rotation, equipment, depends_on, vector)
    }
    pub fn translation(
        id: impl Into<String>,
        equipment: Equipment,
        depends_on: DependsOn,
        vector: Vector,
    ) -> Self {
        Self::new(id, AxisKind::Translation, equipment, depends_on, vector)
    }
    pub fn general(id: impl Into<String>, equipment: Equipment, vector: Vector) -> Self {
        Self::new(id, AxisKind::General, equipment, DependsOn::Root, vector)
    }
    pub fn with_offset(self, offset: Vector) -> Self {
        Self { offset, ..self }
    }
    pub fn is_root(&self) -> bool {
        self.depends_on.is_root()
    }
}
impl fmt::Display for AxisRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}) -> {}: {} @ {}",
            self.id, self.equipment, self.kind, self.depends_on, self.vector, self.offset
        )
    }
}
