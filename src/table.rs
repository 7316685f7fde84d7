//! The `_axis` relational table
//!
//! Both the CSV and the CIF readers produce [AxisRow]s: one row per axis with the
//! imgCIF column names, every value kept as text. The conversion into [AxisRecord]
//! applies the missing value policy:
//!  - `?` is an unknown component,
//!  - a blank, `.` or missing offset component is 0,
//!  - a blank, `.` or missing vector component is unknown,
//!  - a blank, `.`, `?` or missing type makes a general axis, so vector checks are skipped,
//!  - a standard uncertainty, as in `0.5(2)`, is dropped,
//!  - numbers must be finite.
//!
//! Values quoted in a CIF file, as in `'?'`, are literal text and never null markers.

use serde::{Deserialize, Serialize};
use std::{io, path::Path};

use crate::{
    axis::{AxisError, AxisKind, AxisRecord, DependsOn, Equipment},
    vector::Vector,
};

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("axis id is missing")]
    MissingId,
    #[error("axis {0}: equipment is missing")]
    MissingEquipment(String),
    #[error("axis {0}")]
    Axis(String, #[source] AxisError),
    #[error(r#"axis {0}: {1} value "{2}" is not a finite number"#)]
    Number(String, &'static str, String),
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("axis table CSV error")]
    Csv(#[from] csv::Error),
    #[error("axis table row #{0}")]
    Row(usize, #[source] RowError),
}
type Result<T> = std::result::Result<T, TableError>;

/// One row of the `_axis` table
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct AxisRow {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub equipment: Option<String>,
    pub depends_on: Option<String>,
    #[serde(rename = "vector[1]")]
    pub vector_1: Option<String>,
    #[serde(rename = "vector[2]")]
    pub vector_2: Option<String>,
    #[serde(rename = "vector[3]")]
    pub vector_3: Option<String>,
    #[serde(rename = "offset[1]")]
    pub offset_1: Option<String>,
    #[serde(rename = "offset[2]")]
    pub offset_2: Option<String>,
    #[serde(rename = "offset[3]")]
    pub offset_3: Option<String>,
    /// Columns holding quoted values
    #[serde(skip)]
    quoted: Vec<&'static str>,
}

/// A value seen through the missing value policy
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell<'a> {
    /// Missing, blank or `.`
    Inapplicable,
    /// `?`
    Unknown,
    Text(&'a str),
    /// Quoted text
    Literal(&'a str),
}

impl AxisRow {
    /// Column names, in imgCIF order
    pub const FIELDS: [&'static str; 10] = [
        "id",
        "type",
        "equipment",
        "depends_on",
        "vector[1]",
        "vector[2]",
        "vector[3]",
        "offset[1]",
        "offset[2]",
        "offset[3]",
    ];
    fn slot(&mut self, field: &str) -> Option<(&'static str, &mut Option<String>)> {
        Some(match field.to_lowercase().as_str() {
            "id" => ("id", &mut self.id),
            "type" => ("type", &mut self.kind),
            "equipment" => ("equipment", &mut self.equipment),
            "depends_on" => ("depends_on", &mut self.depends_on),
            "vector[1]" | "vector1" => ("vector[1]", &mut self.vector_1),
            "vector[2]" | "vector2" => ("vector[2]", &mut self.vector_2),
            "vector[3]" | "vector3" => ("vector[3]", &mut self.vector_3),
            "offset[1]" | "offset1" => ("offset[1]", &mut self.offset_1),
            "offset[2]" | "offset2" => ("offset[2]", &mut self.offset_2),
            "offset[3]" | "offset3" => ("offset[3]", &mut self.offset_3),
            _ => return None,
        })
    }
    fn get(&self, column: &str) -> Option<&str> {
        match column {
            "id" => self.id.as_deref(),
            "type" => self.kind.as_deref(),
            "equipment" => self.equipment.as_deref(),
            "depends_on" => self.depends_on.as_deref(),
            "vector[1]" => self.vector_1.as_deref(),
            "vector[2]" => self.vector_2.as_deref(),
            "vector[3]" => self.vector_3.as_deref(),
            "offset[1]" => self.offset_1.as_deref(),
            "offset[2]" => self.offset_2.as_deref(),
            "offset[3]" => self.offset_3.as_deref(),
            _ => None,
        }
    }
    /// Sets the column `field`, returns `false` if the column is not an `_axis` column
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        let Some((column, slot)) = self.slot(field) else {
            return false;
        };
        *slot = Some(value.into());
        self.quoted.retain(|c| *c != column);
        true
    }
    /// Sets the column `field` to a quoted value, taken literally
    pub fn set_quoted(&mut self, field: &str, value: impl Into<String>) -> bool {
        let Some((column, slot)) = self.slot(field) else {
            return false;
        };
        *slot = Some(value.into());
        if !self.quoted.contains(&column) {
            self.quoted.push(column);
        }
        true
    }
    fn cell(&self, column: &'static str) -> Cell<'_> {
        match self.get(column) {
            None => Cell::Inapplicable,
            Some(text) if self.quoted.contains(&column) => Cell::Literal(text),
            Some(text) => match text.trim() {
                "" | "." => Cell::Inapplicable,
                "?" => Cell::Unknown,
                text => Cell::Text(text),
            },
        }
    }
    fn component(
        &self,
        id: &str,
        column: &'static str,
        default: Option<f64>,
    ) -> std::result::Result<Option<f64>, RowError> {
        match self.cell(column) {
            Cell::Inapplicable => Ok(default),
            Cell::Unknown => Ok(None),
            Cell::Text(value) | Cell::Literal(value) => {
                let number = value.split('(').next().unwrap_or(value).trim();
                match number.parse::<f64>() {
                    Ok(number) if number.is_finite() => Ok(Some(number)),
                    _ => Err(RowError::Number(id.into(), column, value.into())),
                }
            }
        }
    }
    /// Values in [AxisRow::FIELDS] order, missing values as `?`
    pub fn values(&self) -> [&str; 10] {
        fn v(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("?")
        }
        [
            v(&self.id),
            v(&self.kind),
            v(&self.equipment),
            v(&self.depends_on),
            v(&self.vector_1),
            v(&self.vector_2),
            v(&self.vector_3),
            v(&self.offset_1),
            v(&self.offset_2),
            v(&self.offset_3),
        ]
    }
}

impl TryFrom<AxisRow> for AxisRecord {
    type Error = RowError;

    fn try_from(row: AxisRow) -> std::result::Result<Self, Self::Error> {
        let id = match row.cell("id") {
            Cell::Text(id) | Cell::Literal(id) if !id.is_empty() => id.to_string(),
            _ => return Err(RowError::MissingId),
        };
        let kind = match row.cell("type") {
            Cell::Text(kind) | Cell::Literal(kind) => kind
                .parse::<AxisKind>()
                .map_err(|e| RowError::Axis(id.clone(), e))?,
            Cell::Inapplicable | Cell::Unknown => AxisKind::General,
        };
        let equipment = match row.cell("equipment") {
            Cell::Text(equipment) | Cell::Literal(equipment) => equipment
                .parse::<Equipment>()
                .map_err(|e| RowError::Axis(id.clone(), e))?,
            Cell::Inapplicable | Cell::Unknown => return Err(RowError::MissingEquipment(id)),
        };
        let depends_on = match row.cell("depends_on") {
            Cell::Text(parent) => DependsOn::parse(parent),
            Cell::Literal(parent) => DependsOn::Axis(parent.to_string()),
            Cell::Inapplicable | Cell::Unknown => DependsOn::Root,
        };
        let vector = Vector {
            x: row.component(&id, "vector[1]", None)?,
            y: row.component(&id, "vector[2]", None)?,
            z: row.component(&id, "vector[3]", None)?,
        };
        let offset = Vector {
            x: row.component(&id, "offset[1]", Some(0f64))?,
            y: row.component(&id, "offset[2]", Some(0f64))?,
            z: row.component(&id, "offset[3]", Some(0f64))?,
        };
        Ok(AxisRecord {
            id,
            kind,
            equipment,
            depends_on,
            vector,
            offset,
        })
    }
}

fn number(value: Option<f64>) -> Option<String> {
    Some(value.map_or_else(|| "?".to_string(), |v| format!("{}", v)))
}
impl From<&AxisRecord> for AxisRow {
    fn from(record: &AxisRecord) -> Self {
        let vector = record.vector.rounded(8);
        let offset = record.offset.rounded(8);
        Self {
            id: Some(record.id.clone()),
            kind: Some(record.kind.to_string()),
            equipment: Some(record.equipment.to_string()),
            depends_on: Some(record.depends_on.to_string()),
            vector_1: number(vector.x),
            vector_2: number(vector.y),
            vector_3: number(vector.z),
            offset_1: number(offset.x),
            offset_2: number(offset.y),
            offset_3: number(offset.z),
            quoted: Vec::new(),
        }
    }
}

/// Converts rows into records, rows being numbered from 1
pub fn into_records<I>(rows: I) -> Result<Vec<AxisRecord>>
where
    I: IntoIterator<Item = AxisRow>,
{
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| AxisRecord::try_from(row).map_err(|e| TableError::Row(i + 1, e)))
        .collect()
}

/// Reads axis records from CSV data with the `_axis` column names as header
pub fn from_reader<R: io::Read>(reader: R) -> Result<Vec<AxisRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::<AxisRow>::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    into_records(rows)
}

/// Loads axis records from a CSV file
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<AxisRecord>> {
    log::info!("Loading {:?}...", path.as_ref());
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut rows = Vec::<AxisRow>::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    into_records(rows)
}

/// Writes the records as CSV
pub fn to_csv<'a, W, I>(writer: W, records: I) -> Result<()>
where
    W: io::Write,
    I: IntoIterator<Item = &'a AxisRecord>,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(AxisRow::from(record))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    const CSV: &str = "\
id,type,equipment,depends_on,vector[1],vector[2],vector[3],offset[1],offset[2],offset[3]
omega,rotation,goniometer,.,1,0,0,,,
two_theta,rotation,detector,.,?,?,?,0,0,0
trans,translation,detector,two_theta,0,0,-1,0,0,?
ele_x,translation,detector_element,trans,1,0,0,-42.15(2),43.1,.
";

    #[test]
    fn read_csv() -> std::result::Result<(), Box<dyn Error>> {
        let records = from_reader(CSV.as_bytes())?;
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].offset, Vector::zero());
        assert!(records[0].is_root());
        assert!(records[1].vector.is_unknown());
        assert_eq!(records[2].offset.z, None);
        assert_eq!(records[2].depends_on, DependsOn::parse("two_theta"));
        assert_eq!(records[3].offset, Vector::new(-42.15, 43.1, 0.));
        assert_eq!(records[3].equipment, Equipment::DetectorElement);
        Ok(())
    }

    #[test]
    fn missing_columns() -> std::result::Result<(), Box<dyn Error>> {
        let records = from_reader("id,equipment\nsource,source\n".as_bytes())?;
        assert_eq!(records[0].kind, AxisKind::General);
        assert!(records[0].vector.is_unknown());
        assert_eq!(records[0].offset, Vector::zero());
        Ok(())
    }

    #[test]
    fn row_errors_are_numbered() {
        let csv = "id,type,equipment\nomega,rotation,goniometer\nphi,spin,goniometer\n";
        match from_reader(csv.as_bytes()) {
            Err(TableError::Row(2, RowError::Axis(id, AxisError::Kind(kind)))) => {
                assert_eq!(id, "phi");
                assert_eq!(kind, "spin");
            }
            other => panic!("unexpected {:?}", other),
        }
        let csv = "id,type,equipment,vector[1]\nomega,rotation,goniometer,one\n";
        assert!(matches!(
            from_reader(csv.as_bytes()),
            Err(TableError::Row(1, RowError::Number(..)))
        ));
        let csv = "id,type\nomega,rotation\n";
        assert!(matches!(
            from_reader(csv.as_bytes()),
            Err(TableError::Row(1, RowError::MissingEquipment(..)))
        ));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        for value in ["NaN", "inf", "-infinity", "1e400"] {
            let csv = format!(
                "id,type,equipment,depends_on,vector[1],vector[2],vector[3]\n\
                 omega,rotation,goniometer,.,{},0,0\n",
                value
            );
            match from_reader(csv.as_bytes()) {
                Err(TableError::Row(1, RowError::Number(id, column, text))) => {
                    assert_eq!(id, "omega");
                    assert_eq!(column, "vector[1]");
                    assert_eq!(text, value);
                }
                other => panic!("{} accepted: {:?}", value, other),
            }
        }
        let csv = "id,type,equipment,offset[3]\ntrans,translation,detector,nan(2)\n";
        assert!(matches!(
            from_reader(csv.as_bytes()),
            Err(TableError::Row(1, RowError::Number(_, "offset[3]", _)))
        ));
    }

    #[test]
    fn quoted_values_are_literal() {
        let mut row = AxisRow::default();
        row.set("id", "omega");
        row.set("type", "rotation");
        row.set("equipment", "goniometer");
        row.set_quoted("depends_on", ".");
        row.set_quoted("vector[1]", "?");
        let err = AxisRecord::try_from(row.clone()).unwrap_err();
        assert!(matches!(err, RowError::Number(_, "vector[1]", _)));
        row.set("vector[1]", "?");
        let record = AxisRecord::try_from(row).unwrap();
        assert!(record.vector.is_unknown());
        assert_eq!(record.depends_on, DependsOn::Axis(".".into()));
    }

    #[test]
    fn untyped_axes_are_general() -> std::result::Result<(), Box<dyn Error>> {
        let csv = "id,type,equipment,vector[1],vector[2],vector[3]\n\
                   gravity,,gravity,0,-1,0\n\
                   source,?,source,0,0,1\n";
        let records = from_reader(csv.as_bytes())?;
        assert!(records.iter().all(|r| r.kind == AxisKind::General));
        Ok(())
    }

    #[test]
    fn write_then_read() -> std::result::Result<(), Box<dyn Error>> {
        let records = from_reader(CSV.as_bytes())?;
        let mut buffer = Vec::new();
        to_csv(&mut buffer, records.iter())?;
        let text = String::from_utf8(buffer)?;
        assert!(text.starts_with("id,type,equipment,depends_on,vector[1]"));
        assert_eq!(from_reader(text.as_bytes())?, records);
        Ok(())
    }
}
