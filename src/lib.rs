//! # imgCIF axis geometry
//!
//! Builds and validates the dependency forest of the imgCIF `_axis` table.
//!
//! Axes are read from a CIF file or a CSV table into [AxisRecord]s, then
//! [AxisGraph::build] (or a configured [GraphBuilder]) checks the description and
//! reports every problem as a [Diagnostic]:
//! ```no_run
//! use imgcif_geometry::{cif, AxisGraph, Equipment};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for block in cif::load("beamline.cif")? {
//!     let graph = AxisGraph::build(block.axis_records()?)?;
//!     for axis in graph.chain_from_root(Equipment::Goniometer) {
//!         println!("{}", axis);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod axis;
pub mod cif;
pub mod creator;
pub mod diagnostic;
mod error;
pub mod graph;
pub mod role;
pub mod table;
pub mod vector;

pub use axis::{AxisKind, AxisRecord, DependsOn, Equipment, Sense};
pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::Error;
pub use graph::{AxisGraph, AxisNode, GraphBuilder, GraphError};
pub use role::{AxisRole, RoleDescriptor};
pub use vector::Vector;
