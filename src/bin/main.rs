use glob::glob;
use imgcif_geometry::{cif, table, AxisGraph, AxisRecord, Equipment, GraphBuilder};
use indicatif::{ParallelProgressIterator, ProgressBar};
use itertools::Itertools;
use rayon::prelude::*;
use std::{
    error::Error,
    path::{Path, PathBuf},
    process,
};
use structopt::StructOpt;
use strum::IntoEnumIterator;

#[derive(Debug, StructOpt)]
#[structopt(name = "axis-check", about = "Validating imgCIF axis descriptions")]
struct Opt {
    /// Files or glob patterns of the files to check
    #[structopt(required = true)]
    patterns: Vec<String>,
    /// Rescales axis vectors to unit length
    #[structopt(short, long)]
    normalize: bool,
    /// Stops at the first error of each data block
    #[structopt(long)]
    fail_fast: bool,
    /// Prints the axis chains of valid descriptions
    #[structopt(short, long)]
    chains: bool,
    /// Reads CSV `_axis` tables instead of CIF files
    #[structopt(long)]
    csv: bool,
}

/// Printed lines of one file
#[derive(Default)]
struct Report {
    lines: Vec<String>,
    errors: usize,
}
impl Report {
    fn failure(line: String) -> Self {
        Self {
            lines: vec![line],
            errors: 1,
        }
    }
    fn merge(mut self, other: Report) -> Self {
        self.lines.extend(other.lines);
        self.errors += other.errors;
        self
    }
}

/// Error message followed by its causes
fn error_chain(e: &dyn Error) -> String {
    let mut message = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        message.push_str(&format!(": {}", cause));
        current = cause.source();
    }
    message
}

fn chains(graph: &AxisGraph) -> Vec<String> {
    Equipment::iter()
        .filter_map(|equipment| {
            let chain = graph.chain_from_root(equipment);
            (!chain.is_empty()).then(|| {
                format!(
                    "{}: {}",
                    equipment,
                    chain.iter().map(|axis| axis.id.as_str()).join(" -> ")
                )
            })
        })
        .collect()
}

fn check_records(
    label: &str,
    records: Vec<AxisRecord>,
    builder: &GraphBuilder,
    with_chains: bool,
) -> Report {
    match builder.build(records) {
        Ok(graph) => {
            let mut lines: Vec<String> = graph
                .warnings()
                .iter()
                .map(|d| format!("{}: {}", label, d))
                .collect();
            if with_chains {
                lines.extend(chains(&graph).into_iter().map(|c| format!("{}: {}", label, c)));
            }
            Report { lines, errors: 0 }
        }
        Err(e) => Report {
            lines: e
                .diagnostics()
                .iter()
                .map(|d| format!("{}: {}", label, d))
                .collect(),
            errors: e.diagnostics().errors().count(),
        },
    }
}

fn check_file(path: &Path, opt: &Opt, builder: &GraphBuilder) -> Report {
    let file = path.display().to_string();
    if opt.csv {
        return match table::load_csv(path) {
            Ok(records) => check_records(&file, records, builder, opt.chains),
            Err(e) => Report::failure(format!("{}: {}", file, error_chain(&e))),
        };
    }
    let blocks = match cif::load(path) {
        Ok(blocks) => blocks,
        Err(e) => return Report::failure(format!("{}: {}", file, error_chain(&e))),
    };
    blocks
        .into_iter()
        .map(|block| {
            let label = format!("{}:{}", file, block.name);
            match block.axis_records() {
                Ok(records) if records.is_empty() => {
                    log::warn!("{}: no _axis table", label);
                    Report::default()
                }
                Ok(records) => check_records(&label, records, builder, opt.chains),
                Err(e) => Report::failure(format!("{}: {}", label, error_chain(&e))),
            }
        })
        .fold(Report::default(), Report::merge)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut builder = GraphBuilder::from_env()?;
    if opt.normalize {
        builder = builder.normalize(true);
    }
    if opt.fail_fast {
        builder = builder.report_all(false);
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for pattern in opt.patterns.iter() {
        let matches = glob(pattern)?.collect::<Result<Vec<PathBuf>, _>>()?;
        if matches.is_empty() {
            log::warn!("no file matches {}", pattern);
        }
        paths.extend(matches);
    }
    log::info!("checking {} file(s)", paths.len());

    let pb = if paths.len() > 1 {
        ProgressBar::new(paths.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    let reports: Vec<Report> = paths
        .par_iter()
        .progress_with(pb)
        .map(|path| check_file(path, &opt, &builder))
        .collect();

    let mut errors = 0;
    for report in reports {
        report.lines.iter().for_each(|line| println!("{}", line));
        errors += report.errors;
    }
    if errors > 0 {
        eprintln!("{} error(s) in {} file(s)", errors, paths.len());
        process::exit(1);
    }
    Ok(())
}
