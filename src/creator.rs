//! Axis records from the interactive creator answers
//!
//! Goniometer axes are given in zero position, closest to the crystal first, with the
//! rotation sense seen from the crystal looking along the axis. The principal axis is the
//! last listed one and defines the laboratory `x` direction.

use nalgebra as na;

use crate::{
    axis::{AxisRecord, DependsOn, Equipment, Sense},
    diagnostic::Diagnostics,
    graph::AxisGraph,
    role::{AnswerError, AxisRole, RoleDescriptor},
    vector::Vector,
};

type Result<T> = std::result::Result<T, AnswerError>;

/// Parses `phi c, kappa c, omega a` (or `phi, c, kappa, c, omega, a`) into axis names
/// and rotation senses
pub fn parse_axis_senses(answer: &str) -> Result<Vec<(String, Sense)>> {
    const EXPECTED: &str = "<axis> <sense>, <axis> <sense>, ...";
    let words: Vec<&str> = answer
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() || words.len() % 2 != 0 {
        return Err(AnswerError::Pattern(answer.trim().into(), EXPECTED));
    }
    words
        .chunks(2)
        .map(|pair| -> Result<(String, Sense)> { Ok((pair[0].to_string(), pair[1].parse()?)) })
        .collect()
}

/// Unit vector tilted by `angle` degree from `x` towards `towards`
fn tilted(angle: f64, towards: na::Vector3<f64>) -> na::Vector3<f64> {
    let (s, c) = angle.to_radians().sin_cos();
    na::Vector3::x() * c + towards * s
}

/// Direction in the `y`-`z` plane at `angle` degree from `z`
fn in_yz_plane(angle: f64) -> na::Vector3<f64> {
    let (s, c) = angle.to_radians().sin_cos();
    na::Vector3::new(0f64, s, c)
}

/// Goniometer answers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoniometerAnswers {
    /// Rotation axes and senses, closest to the crystal first
    pub axes: Vec<(String, Sense)>,
    pub kappa: Option<RoleDescriptor>,
    pub chi: Option<RoleDescriptor>,
}
impl GoniometerAnswers {
    pub fn new(axes: Vec<(String, Sense)>) -> Self {
        Self {
            axes,
            ..Default::default()
        }
    }
    pub fn kappa(self, kappa: Option<RoleDescriptor>) -> Self {
        Self { kappa, ..self }
    }
    pub fn chi(self, chi: Option<RoleDescriptor>) -> Self {
        Self { chi, ..self }
    }
    /// Axis names, as the kappa and chi answers must use them
    pub fn names(&self) -> Vec<&str> {
        self.axes.iter().map(|(name, _)| name.as_str()).collect()
    }
    /// The sense of the principal, last listed, axis
    pub fn principal_sense(&self) -> Option<Sense> {
        self.axes.last().map(|(_, sense)| *sense)
    }
    fn role_of(&self, name: &str) -> Option<AxisRole> {
        self.kappa
            .iter()
            .chain(self.chi.iter())
            .find(|descriptor| descriptor.axis.eq_ignore_ascii_case(name))
            .map(|descriptor| descriptor.role)
    }
    /// Goniometer rotation axes, each one depending on the next listed one
    pub fn to_records(&self) -> Vec<AxisRecord> {
        self.axes
            .iter()
            .enumerate()
            .map(|(i, (name, sense))| {
                let direction = match self.role_of(name) {
                    Some(AxisRole::Kappa { tilt, base }) => tilted(tilt, in_yz_plane(base)),
                    Some(AxisRole::Chi { omega }) => in_yz_plane(omega),
                    None => na::Vector3::x(),
                };
                let depends_on = self
                    .axes
                    .get(i + 1)
                    .map_or(DependsOn::Root, |(parent, _)| DependsOn::Axis(parent.clone()));
                AxisRecord::rotation(
                    name.as_str(),
                    Equipment::Goniometer,
                    depends_on,
                    Vector::from(direction * sense.sign()),
                )
            })
            .collect()
    }
    pub fn into_records(self) -> Vec<AxisRecord> {
        self.to_records()
    }
    /// Checks the kappa and chi answers against the goniometer built from them
    pub fn check_roles(&self, graph: &AxisGraph) -> Diagnostics {
        let mut diagnostics = Diagnostics::default();
        for descriptor in self.kappa.iter().chain(self.chi.iter()) {
            if let Err(diagnostic) = graph.validate_sense_consistency(descriptor) {
                diagnostics.push(diagnostic);
            }
        }
        diagnostics
    }
}

/// Detector answers, all axes at their home positions
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorAnswers {
    /// Rotation axes and senses, the last one being the base of the detector stack
    pub rotations: Vec<(String, Sense)>,
    /// Translation axes, closest to the detector face first
    pub translations: Vec<String>,
    /// Angle of the principal goniometer axis from the horizontal, in degree
    pub principal_angle: f64,
}
impl DetectorAnswers {
    pub fn new(translations: Vec<String>) -> Self {
        Self {
            rotations: Vec::new(),
            translations,
            principal_angle: 0f64,
        }
    }
    pub fn rotations(self, rotations: Vec<(String, Sense)>) -> Self {
        Self { rotations, ..self }
    }
    pub fn principal_angle(self, principal_angle: f64) -> Self {
        Self {
            principal_angle,
            ..self
        }
    }
    /// Gravity direction in the laboratory frame
    pub fn gravity(&self) -> Vector {
        let (s, c) = self.principal_angle.to_radians().sin_cos();
        Vector::new(-s, -c, 0f64)
    }
    /// Detector axes followed by the `source` and `gravity` reference axes
    ///
    /// Translations are along `-z`, each one depending on the next, the last one
    /// depending on the first rotation axis. Rotations are parallel to the principal
    /// axis, each one depending on the next.
    pub fn to_records(&self) -> Vec<AxisRecord> {
        let mut records: Vec<AxisRecord> = Vec::new();
        let next = |names: &[String], i: usize| names.get(i + 1).cloned();
        let rotation_names: Vec<String> =
            self.rotations.iter().map(|(name, _)| name.clone()).collect();
        for (i, name) in self.translations.iter().enumerate() {
            let parent = next(&self.translations, i).or_else(|| rotation_names.first().cloned());
            records.push(AxisRecord::translation(
                name.as_str(),
                Equipment::Detector,
                parent.into(),
                Vector::from_z(-1f64),
            ));
        }
        for (i, (name, sense)) in self.rotations.iter().enumerate() {
            records.push(AxisRecord::rotation(
                name.as_str(),
                Equipment::Detector,
                next(&rotation_names, i).into(),
                Vector::from_x(sense.sign()),
            ));
        }
        records.push(AxisRecord::general(
            "source",
            Equipment::Source,
            Vector::from_z(1f64),
        ));
        records.push(AxisRecord::general(
            "gravity",
            Equipment::Gravity,
            self.gravity().rounded(8),
        ));
        records
    }
    pub fn into_records(self) -> Vec<AxisRecord> {
        self.to_records()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::diagnostic::DiagnosticKind;

    fn ids(chain: &[&AxisRecord]) -> Vec<String> {
        chain.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn axis_senses() -> std::result::Result<(), Box<dyn Error>> {
        let expected = vec![
            ("phi".to_string(), Sense::Clockwise),
            ("kappa".to_string(), Sense::Clockwise),
            ("omega".to_string(), Sense::Anticlockwise),
        ];
        assert_eq!(parse_axis_senses("phi c, kappa c, omega a")?, expected);
        assert_eq!(parse_axis_senses("phi, c, kappa, c, omega, a")?, expected);
        assert!(matches!(
            parse_axis_senses("phi c, omega"),
            Err(AnswerError::Pattern(..))
        ));
        assert!(matches!(
            parse_axis_senses("phi x"),
            Err(AnswerError::Sense(..))
        ));
        assert!(parse_axis_senses("  ").is_err());
        Ok(())
    }

    #[test]
    fn kappa_goniometer() -> std::result::Result<(), Box<dyn Error>> {
        let axes = parse_axis_senses("phi c, kappa c, omega a")?;
        let answers = GoniometerAnswers::new(axes);
        let kappa = RoleDescriptor::parse_kappa("kappa 50 0", &answers.names())?;
        let answers = answers.kappa(kappa);
        assert_eq!(answers.principal_sense(), Some(Sense::Anticlockwise));
        let graph = AxisGraph::build(answers.to_records())?;
        assert!(graph.warnings().is_empty(), "{}", graph.warnings());
        assert_eq!(
            ids(&graph.chain_from_root(Equipment::Goniometer)),
            vec!["omega", "kappa", "phi"]
        );
        let kappa = graph.get("kappa").unwrap().record();
        assert!((kappa.vector.magnitude().unwrap() - 1.).abs() < 1e-12);
        assert_eq!(
            graph.get("phi").unwrap().record().vector,
            Vector::from_x(-1.)
        );
        assert!(answers.check_roles(&graph).is_empty());
        Ok(())
    }

    #[test]
    fn wrong_kappa_base() -> std::result::Result<(), Box<dyn Error>> {
        let answers = GoniometerAnswers::new(parse_axis_senses("phi c, kappa c, omega a")?)
            .kappa(Some(RoleDescriptor::kappa("kappa", 50., 90.)));
        let graph = AxisGraph::build(answers.to_records())?;
        let diagnostics = answers.check_roles(&graph);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidAxisRole);
        Ok(())
    }

    #[test]
    fn chi_goniometer() -> std::result::Result<(), Box<dyn Error>> {
        let answers = GoniometerAnswers::new(parse_axis_senses("phi a, chi a, omega a")?);
        let chi = RoleDescriptor::parse_chi("chi 0", &answers.names())?;
        let answers = answers.chi(chi);
        let graph = AxisGraph::build(answers.into_records())?;
        let chi = graph.get("chi").unwrap().record();
        assert_eq!(chi.vector.rounded(8), Vector::from_z(1.));
        assert_eq!(chi.depends_on, DependsOn::parse("omega"));
        Ok(())
    }

    #[test]
    fn detector_stack() -> std::result::Result<(), Box<dyn Error>> {
        let detector = DetectorAnswers::new(vec!["trans".into()])
            .rotations(vec![("two_theta".into(), Sense::Anticlockwise)]);
        let mut records = GoniometerAnswers::new(parse_axis_senses("omega a")?).into_records();
        records.extend(detector.to_records());
        let graph = AxisGraph::build(records)?;
        assert!(graph.warnings().is_empty(), "{}", graph.warnings());
        assert_eq!(
            ids(&graph.chain_from_root(Equipment::Detector)),
            vec!["two_theta", "trans"]
        );
        assert_eq!(
            graph.get("gravity").unwrap().record().vector,
            Vector::from_y(-1.)
        );
        assert_eq!(
            graph.get("source").unwrap().record().vector,
            Vector::from_z(1.)
        );
        Ok(())
    }

    #[test]
    fn translations_only() -> std::result::Result<(), Box<dyn Error>> {
        let detector = DetectorAnswers::new(vec!["dx".into(), "dz".into()]).principal_angle(90.);
        let graph = AxisGraph::build(detector.into_records())?;
        assert_eq!(
            ids(&graph.chain_from_root(Equipment::Detector)),
            vec!["dz", "dx"]
        );
        assert_eq!(
            graph.get("gravity").unwrap().record().vector,
            Vector::from_x(-1.)
        );
        Ok(())
    }
}
