use anyhow::{bail, Context};
use imgcif_geometry::{
    cif,
    creator::{parse_axis_senses, DetectorAnswers, GoniometerAnswers},
    AxisGraph, RoleDescriptor,
};
use std::{
    fmt::Display,
    io::{self, BufRead, Write},
    process,
};

/// Asks `question` until the answer is accepted by `parse`
fn ask<T, E, F>(
    lines: &mut impl Iterator<Item = io::Result<String>>,
    question: &str,
    parse: F,
) -> anyhow::Result<T>
where
    E: Display,
    F: Fn(&str) -> Result<T, E>,
{
    loop {
        print!("\n{}\n > ", question);
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            bail!("no answer to: {}", question);
        };
        let line = line.context("failed to read the answer")?;
        log::debug!("answer: {:?}", line);
        match parse(line.trim()) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("rejected answer {:?}: {}", line, e);
                println!("Invalid answer: {}", e);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!(
        "Answer the goniometer questions for all axes in zero position. \
Rotations are, when looking from the crystal in the direction of the goniometer, \
c=clockwise or a=anticlockwise."
    );
    let goniometer = GoniometerAnswers::new(ask(
        &mut lines,
        "Goniometer axes and senses, from closest to furthest from the crystal \
(e.g. phi c, kappa c, omega a):",
        parse_axis_senses,
    )?);
    let names: Vec<String> = goniometer.names().into_iter().map(String::from).collect();
    let kappa = ask(
        &mut lines,
        "Kappa axis, kappa angle and optional base angle (e.g. kappa 50 0), none if there is no kappa axis:",
        |answer| RoleDescriptor::parse_kappa(answer, &names),
    )?;
    let chi = ask(
        &mut lines,
        "Chi axis and the omega angle at which it is parallel to the beam (e.g. chi 0), \
none if there is no chi axis:",
        |answer| RoleDescriptor::parse_chi(answer, &names),
    )?;
    let goniometer = goniometer.kappa(kappa).chi(chi);
    log::info!("goniometer answers: {:?}", goniometer);

    let principal_angle: f64 = ask(
        &mut lines,
        "Angle of the principal goniometer axis from the horizontal, in degree:",
        |answer| answer.parse::<f64>(),
    )?;
    let rotations = ask(
        &mut lines,
        "Detector rotation axes and senses (e.g. two_theta a), blank if there is none:",
        |answer| {
            if answer.is_empty() {
                Ok(Vec::new())
            } else {
                parse_axis_senses(answer)
            }
        },
    )?;
    let translations: Vec<String> = ask(
        &mut lines,
        "Detector translation axes, from the detector face outwards (e.g. trans):",
        |answer| -> Result<Vec<String>, &'static str> {
            let axes: Vec<String> = answer
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect();
            if axes.is_empty() {
                Err("at least one translation axis is expected")
            } else {
                Ok(axes)
            }
        },
    )?;
    let detector = DetectorAnswers::new(translations)
        .rotations(rotations)
        .principal_angle(principal_angle);

    log::info!("detector answers: {:?}", detector);

    let mut records = goniometer.to_records();
    records.extend(detector.into_records());
    log::info!("validating {} axes", records.len());
    let graph = match AxisGraph::build(records) {
        Ok(graph) => graph,
        Err(e) => {
            eprint!("{}", e.diagnostics());
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let roles = goniometer.check_roles(&graph);
    if roles.has_errors() {
        eprint!("{}", roles);
        process::exit(1);
    }
    eprint!("{}", graph.warnings());
    log::info!("axis description accepted: {}", graph.warnings().summary());

    println!();
    print!("{}", cif::write_axes(&graph)?);
    Ok(())
}
