use std::{
    collections::{BTreeMap, HashMap},
    env::{self, VarError},
    num::ParseFloatError,
};

use itertools::Itertools;

use super::{AxisGraph, AxisNode, GraphError};
use crate::{
    axis::{AxisKind, AxisRecord, DependsOn, Equipment},
    diagnostic::{Diagnostic, DiagnosticKind, Diagnostics},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(r#""{0}" env var is not unicode"#)]
    Env(String, #[source] VarError),
    #[error(r#"{0}={1} is not a boolean, expected 1, 0, true, false, yes or no"#)]
    Flag(String, String),
    #[error(r#"{0}={1} is not a number"#)]
    Tolerance(String, String, #[source] ParseFloatError),
}
type Result<T> = std::result::Result<T, ConfigError>;

const NORMALIZE: &str = "IMGCIF_NORMALIZE";
const FAIL_FAST: &str = "IMGCIF_FAIL_FAST";
const UNIT_TOLERANCE: &str = "IMGCIF_UNIT_TOLERANCE";

fn env_var(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::Env(key.into(), e)),
    }
}
fn env_flag(key: &str) -> Result<Option<bool>> {
    env_var(key)?
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Flag(key.into(), value)),
        })
        .transpose()
}

/// Axis graph validation settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphBuilder {
    normalize: bool,
    report_all: bool,
    unit_tolerance: f64,
}
impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            normalize: false,
            report_all: true,
            unit_tolerance: 1e-3,
        }
    }
}
impl GraphBuilder {
    /// Default settings overridden by the `IMGCIF_NORMALIZE`, `IMGCIF_FAIL_FAST`
    /// and `IMGCIF_UNIT_TOLERANCE` env variables
    pub fn from_env() -> Result<Self> {
        let mut this = Self::default();
        if let Some(normalize) = env_flag(NORMALIZE)? {
            this = this.normalize(normalize);
        }
        if let Some(fail_fast) = env_flag(FAIL_FAST)? {
            this = this.report_all(!fail_fast);
        }
        if let Some(value) = env_var(UNIT_TOLERANCE)? {
            let tol = value
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::Tolerance(UNIT_TOLERANCE.into(), value.clone(), e))?;
            this = this.unit_tolerance(tol);
        }
        Ok(this)
    }
    /// Rescales rotation and translation vectors to unit length
    pub fn normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }
    /// Collects every problem instead of stopping at the first error
    pub fn report_all(self, report_all: bool) -> Self {
        Self { report_all, ..self }
    }
    /// Largest accepted deviation from unit length of rotation vectors
    pub fn unit_tolerance(self, unit_tolerance: f64) -> Self {
        Self {
            unit_tolerance: unit_tolerance.abs(),
            ..self
        }
    }
    /// Builds and validates the axis graph
    ///
    /// Fails if any diagnostic has error severity, warnings are kept in the graph.
    pub fn build<I>(&self, records: I) -> std::result::Result<AxisGraph, GraphError>
    where
        I: IntoIterator<Item = AxisRecord>,
    {
        let records: Vec<AxisRecord> = records.into_iter().collect();
        log::debug!("validating {} axes with {:?}", records.len(), self);
        let mut report = Report {
            diagnostics: Diagnostics::default(),
            fail_fast: !self.report_all,
        };

        let index = index_ids(&records, &mut report)?;
        let parents = resolve_parents(&records, &index, &mut report)?;
        let (depths, broken) = resolve_depths(&records, &parents, &mut report)?;
        check_groups(&records, &parents, &broken, &mut report)?;
        self.check_vectors(&records, &mut report)?;

        let Report { diagnostics, .. } = report;
        if diagnostics.has_errors() {
            log::info!("axis description rejected: {}", diagnostics.summary());
            return Err(GraphError(diagnostics));
        }

        let mut nodes: Vec<AxisNode> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| AxisNode {
                record: self.rescaled(record),
                position: i,
                parent: parents[i],
                depth: depths[i].unwrap_or_default(),
                children: Vec::new(),
            })
            .collect();
        for i in 0..nodes.len() {
            if let Some(p) = nodes[i].parent {
                nodes[p].children.push(i);
            }
        }
        log::info!(
            "axis graph with {} axes: {}",
            nodes.len(),
            diagnostics.summary()
        );
        Ok(AxisGraph {
            nodes,
            index,
            warnings: diagnostics,
        })
    }
    fn rescaled(&self, record: AxisRecord) -> AxisRecord {
        if !self.normalize || record.kind == AxisKind::General {
            return record;
        }
        match record.vector.normalized() {
            Some(vector) => AxisRecord { vector, ..record },
            None => record,
        }
    }
    fn check_vectors(
        &self,
        records: &[AxisRecord],
        report: &mut Report,
    ) -> std::result::Result<(), GraphError> {
        use DiagnosticKind::*;
        for record in records {
            let id = record.id.as_str();
            if !record.offset.is_finite() {
                report.push(Diagnostic::error(
                    DegenerateAxisVector,
                    [id],
                    format!("offset {} is not finite", record.offset),
                ))?;
            }
            match record.kind {
                AxisKind::General => continue,
                kind if !record.vector.is_finite() => report.push(Diagnostic::error(
                    DegenerateAxisVector,
                    [id],
                    format!("{} vector {} is not finite", kind, record.vector),
                ))?,
                kind if record.vector.is_unknown() => report.push(Diagnostic::warning(
                    DegenerateAxisVector,
                    [id],
                    format!("{} vector {} is unknown", kind, record.vector),
                ))?,
                kind if record.vector.is_zero(f64::EPSILON) => report.push(Diagnostic::error(
                    DegenerateAxisVector,
                    [id],
                    format!("{} vector is the zero vector", kind),
                ))?,
                AxisKind::Rotation if !self.normalize => {
                    if let Some(norm) = record.vector.magnitude() {
                        if (norm - 1f64).abs() > self.unit_tolerance {
                            report.push(Diagnostic::warning(
                                NonUnitVector,
                                [id],
                                format!(
                                    "rotation vector {} has length {:.6}",
                                    record.vector, norm
                                ),
                            ))?
                        }
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}

struct Report {
    diagnostics: Diagnostics,
    fail_fast: bool,
}
impl Report {
    fn push(&mut self, diagnostic: Diagnostic) -> std::result::Result<(), GraphError> {
        let stop = self.fail_fast && diagnostic.is_error();
        self.diagnostics.push(diagnostic);
        if stop {
            Err(GraphError(std::mem::take(&mut self.diagnostics)))
        } else {
            Ok(())
        }
    }
}

/// Maps each id to the position of its first definition
fn index_ids(
    records: &[AxisRecord],
    report: &mut Report,
) -> std::result::Result<HashMap<String, usize>, GraphError> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut folded: HashMap<String, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        if let Some(&first) = index.get(&record.id) {
            report.push(Diagnostic::error(
                DiagnosticKind::DuplicateAxisId,
                [record.id.as_str()],
                format!("axis {} redefines axis {}", i + 1, first + 1),
            ))?;
            continue;
        }
        index.insert(record.id.clone(), i);
        let lower = record.id.to_lowercase();
        match folded.get(&lower) {
            Some(&other) => report.push(Diagnostic::warning(
                DiagnosticKind::CaseCollision,
                [records[other].id.as_str(), record.id.as_str()],
                "axis ids only differ by letter case",
            ))?,
            None => {
                folded.insert(lower, i);
            }
        }
    }
    Ok(index)
}

fn resolve_parents(
    records: &[AxisRecord],
    index: &HashMap<String, usize>,
    report: &mut Report,
) -> std::result::Result<Vec<Option<usize>>, GraphError> {
    let mut parents = Vec::with_capacity(records.len());
    for record in records {
        let parent = match &record.depends_on {
            DependsOn::Root => None,
            DependsOn::Axis(parent_id) => match index.get(parent_id) {
                Some(&p) => Some(p),
                None => {
                    let hint = index
                        .keys()
                        .find(|id| id.eq_ignore_ascii_case(parent_id))
                        .map(|id| format!(r#", did you mean "{}"?"#, id))
                        .unwrap_or_default();
                    report.push(Diagnostic::error(
                        DiagnosticKind::UnresolvedParent,
                        [record.id.as_str(), parent_id.as_str()],
                        format!(r#"depends on "{}" which is not defined{}"#, parent_id, hint),
                    ))?;
                    None
                }
            },
        };
        parents.push(parent);
    }
    Ok(parents)
}

/// Walks every axis toward its root
///
/// Returns the depth of each axis and whether the axis is on, or leads into, a cycle.
fn resolve_depths(
    records: &[AxisRecord],
    parents: &[Option<usize>],
    report: &mut Report,
) -> std::result::Result<(Vec<Option<usize>>, Vec<bool>), GraphError> {
    let n = records.len();
    let mut depths: Vec<Option<usize>> = vec![None; n];
    let mut broken = vec![false; n];
    for start in 0..n {
        if depths[start].is_some() || broken[start] {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut on_path: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        // depth of the last axis on the path, `None` if the walk hit a cycle
        let tail = loop {
            if let Some(d) = depths[current] {
                break Some(d + 1);
            }
            if broken[current] {
                break None;
            }
            if let Some(&k) = on_path.get(&current) {
                let mut cycle = path[k..].to_vec();
                if let Some(first) = cycle.iter().position_min() {
                    cycle.rotate_left(first);
                }
                let ids: Vec<&str> = cycle.iter().map(|&i| records[i].id.as_str()).collect();
                report.push(Diagnostic::error(
                    DiagnosticKind::CyclicDependency,
                    ids.clone(),
                    format!(
                        "depends_on links loop back: {} -> {}",
                        ids.join(" -> "),
                        ids[0]
                    ),
                ))?;
                break None;
            }
            on_path.insert(current, path.len());
            path.push(current);
            match parents[current] {
                Some(p) => current = p,
                None => break Some(0),
            }
        };
        match tail {
            Some(mut depth) => {
                for &i in path.iter().rev() {
                    depths[i] = Some(depth);
                    depth += 1;
                }
            }
            None => path.into_iter().for_each(|i| broken[i] = true),
        }
    }
    Ok((depths, broken))
}

/// Every equipment must start at least one chain
fn check_groups(
    records: &[AxisRecord],
    parents: &[Option<usize>],
    broken: &[bool],
    report: &mut Report,
) -> std::result::Result<(), GraphError> {
    let mut groups: BTreeMap<Equipment, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        groups.entry(record.equipment).or_default().push(i);
    }
    for (equipment, members) in groups {
        let mut has_root = false;
        for &i in members.iter() {
            let record = &records[i];
            match parents[i] {
                None if record.depends_on.is_root() => has_root = true,
                Some(p) if records[p].equipment != equipment => {
                    if !broken[p] {
                        has_root = true;
                    }
                    if !equipment.may_depend_on(records[p].equipment) {
                        report.push(Diagnostic::warning(
                            DiagnosticKind::CrossEquipmentDependency,
                            [record.id.as_str(), records[p].id.as_str()],
                            format!(
                                "{} axis depends on {} axis",
                                equipment, records[p].equipment
                            ),
                        ))?;
                    }
                }
                _ => (),
            }
        }
        if !has_root {
            report.push(Diagnostic::error(
                DiagnosticKind::MissingRoot,
                members.iter().map(|&i| records[i].id.as_str()),
                format!(
                    "no {} axis depends on . or on another equipment",
                    equipment
                ),
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::vector::Vector;

    fn records() -> Vec<AxisRecord> {
        vec![
            AxisRecord::rotation(
                "omega",
                Equipment::Goniometer,
                DependsOn::Root,
                Vector::new(2., 0., 0.),
            ),
            AxisRecord::rotation(
                "phi",
                Equipment::Goniometer,
                DependsOn::parse("omega"),
                Vector::new(0., 0.6, 0.8),
            ),
            AxisRecord::translation(
                "trans",
                Equipment::Detector,
                DependsOn::Root,
                Vector::new(0., 0., -3.),
            ),
        ]
    }

    #[test]
    fn non_unit_rotation_vector() -> std::result::Result<(), Box<dyn Error>> {
        let graph = GraphBuilder::default().build(records())?;
        let warnings: Vec<_> = graph.warnings().iter().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, DiagnosticKind::NonUnitVector);
        assert_eq!(warnings[0].axes, vec!["omega"]);
        Ok(())
    }

    #[test]
    fn normalization() -> std::result::Result<(), Box<dyn Error>> {
        let graph = GraphBuilder::default().normalize(true).build(records())?;
        assert!(graph.warnings().is_empty());
        let omega = graph.get("omega").unwrap().record();
        assert_eq!(omega.vector.rounded(12), Vector::from_x(1.));
        let trans = graph.get("trans").unwrap().record();
        assert_eq!(trans.vector.rounded(12), Vector::from_z(-1.));
        Ok(())
    }

    #[test]
    fn non_finite_vectors_are_errors() {
        let records = vec![
            AxisRecord::rotation(
                "omega",
                Equipment::Goniometer,
                DependsOn::Root,
                Vector::new(f64::NAN, 0., 0.),
            ),
            AxisRecord::rotation(
                "phi",
                Equipment::Goniometer,
                DependsOn::parse("omega"),
                Vector::new(f64::INFINITY, 0., 0.),
            ),
            AxisRecord::translation(
                "trans",
                Equipment::Detector,
                DependsOn::Root,
                Vector::from_z(-1.),
            )
            .with_offset(Vector::new(0., f64::NAN, 0.)),
        ];
        let err = GraphBuilder::default().build(records).unwrap_err();
        let degenerate: Vec<_> = err
            .diagnostics()
            .of_kind(DiagnosticKind::DegenerateAxisVector)
            .collect();
        assert_eq!(degenerate.len(), 3);
        assert!(degenerate.iter().all(|d| d.is_error()));
        assert_eq!(
            degenerate.iter().map(|d| d.axes[0].as_str()).collect::<Vec<_>>(),
            vec!["omega", "phi", "trans"]
        );
        assert_eq!(
            err.diagnostics()
                .of_kind(DiagnosticKind::NonUnitVector)
                .count(),
            0
        );
    }

    #[test]
    fn non_finite_csv_vectors_never_reach_the_graph() {
        let csv = "id,type,equipment,depends_on,vector[1],vector[2],vector[3]\n\
                   omega,rotation,goniometer,.,NaN,0,0\n\
                   phi,rotation,goniometer,omega,inf,0,0\n";
        assert!(matches!(
            crate::table::from_reader(csv.as_bytes()),
            Err(crate::table::TableError::Row(1, _))
        ));
    }

    #[test]
    fn fail_fast_stops_at_first_error() {
        let records = vec![
            AxisRecord::rotation("a", Equipment::Goniometer, DependsOn::parse("x"), Vector::from_x(1.)),
            AxisRecord::rotation("a", Equipment::Goniometer, DependsOn::Root, Vector::zero()),
        ];
        let all = GraphBuilder::default().build(records.clone()).unwrap_err();
        assert!(all.diagnostics().errors().count() >= 3);
        let first = GraphBuilder::default()
            .report_all(false)
            .build(records)
            .unwrap_err();
        assert_eq!(first.diagnostics().len(), 1);
        assert_eq!(first.diagnostics()[0].kind, DiagnosticKind::DuplicateAxisId);
    }

    #[test]
    fn group_without_root() {
        let records = vec![
            AxisRecord::rotation("a", Equipment::Goniometer, DependsOn::parse("b"), Vector::from_x(1.)),
            AxisRecord::rotation("b", Equipment::Goniometer, DependsOn::parse("a"), Vector::from_x(1.)),
            AxisRecord::translation("trans", Equipment::Detector, DependsOn::Root, Vector::from_z(-1.)),
        ];
        let err = GraphBuilder::default().build(records).unwrap_err();
        let missing: Vec<_> = err
            .diagnostics()
            .of_kind(DiagnosticKind::MissingRoot)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].axes, vec!["a", "b"]);
    }

    #[test]
    fn dependency_into_a_cycle_is_no_root() {
        let records = vec![
            AxisRecord::rotation("a", Equipment::Goniometer, DependsOn::parse("b"), Vector::from_x(1.)),
            AxisRecord::rotation("b", Equipment::Goniometer, DependsOn::parse("a"), Vector::from_x(1.)),
            AxisRecord::translation("det", Equipment::Detector, DependsOn::parse("a"), Vector::from_z(-1.)),
        ];
        let err = GraphBuilder::default().build(records).unwrap_err();
        let diagnostics = err.diagnostics();
        let cycles: Vec<_> = diagnostics
            .of_kind(DiagnosticKind::CyclicDependency)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].axes, vec!["a", "b"]);
        let mut missing: Vec<_> = diagnostics
            .of_kind(DiagnosticKind::MissingRoot)
            .map(|d| d.axes.clone())
            .collect();
        missing.sort();
        assert_eq!(missing, vec![vec!["a", "b"], vec!["det"]]);
        let cross: Vec<_> = diagnostics
            .of_kind(DiagnosticKind::CrossEquipmentDependency)
            .collect();
        assert_eq!(cross.len(), 1);
        assert!(!cross[0].is_error());
        assert_eq!(cross[0].axes, vec!["det", "a"]);
    }

    #[test]
    fn cross_equipment_warning() -> std::result::Result<(), Box<dyn Error>> {
        let records = vec![
            AxisRecord::rotation("two_theta", Equipment::Detector, DependsOn::Root, Vector::from_x(1.)),
            AxisRecord::rotation(
                "omega",
                Equipment::Goniometer,
                DependsOn::parse("two_theta"),
                Vector::from_x(1.),
            ),
        ];
        let graph = GraphBuilder::default().build(records)?;
        assert_eq!(
            graph.warnings()[0].kind,
            DiagnosticKind::CrossEquipmentDependency
        );
        assert_eq!(
            graph
                .chain_roots(Equipment::Goniometer)
                .map(AxisNode::id)
                .collect::<Vec<_>>(),
            vec!["omega"]
        );
        Ok(())
    }

    #[test]
    fn case_collision_warning() -> std::result::Result<(), Box<dyn Error>> {
        let records = vec![
            AxisRecord::rotation("Phi", Equipment::Goniometer, DependsOn::Root, Vector::from_x(1.)),
            AxisRecord::rotation("phi", Equipment::Goniometer, DependsOn::parse("Phi"), Vector::from_x(1.)),
        ];
        let graph = GraphBuilder::default().build(records)?;
        assert_eq!(graph.warnings()[0].kind, DiagnosticKind::CaseCollision);
        assert_eq!(graph.find("phi").map(AxisNode::id), Some("phi"));
        Ok(())
    }

    #[test]
    fn config_from_env() -> std::result::Result<(), Box<dyn Error>> {
        env::set_var(NORMALIZE, "yes");
        env::set_var(FAIL_FAST, "1");
        env::set_var(UNIT_TOLERANCE, "0.01");
        let builder = GraphBuilder::from_env();
        env::set_var(UNIT_TOLERANCE, "tight");
        let bad = GraphBuilder::from_env();
        env::remove_var(NORMALIZE);
        env::remove_var(FAIL_FAST);
        env::remove_var(UNIT_TOLERANCE);
        assert_eq!(
            builder?,
            GraphBuilder::default()
                .normalize(true)
                .report_all(false)
                .unit_tolerance(0.01)
        );
        assert!(matches!(bad, Err(ConfigError::Tolerance(..))));
        Ok(())
    }
}
