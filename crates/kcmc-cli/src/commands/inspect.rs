use std::io::{self, Write};

use anyhow::{Context, Result};
use kcmc_core::{
    degree_profile, sink_reachability, topology_stats, DegreeProfile, Diagnostics, Instance,
    InstanceParser, IssueKind, SinkReachability, TopologySource, TopologyStats,
};
use serde::Serialize;
use tabwriter::TabWriter;

use super::util::{loose_acceptance, read_instance, regenerator};
use kcmc_cli::cli::{InstanceArgs, OutputFormat};

#[derive(Debug, Serialize)]
struct InspectReport {
    key: String,
    pois: u32,
    sensors: u32,
    active_sensors: u32,
    sinks: u32,
    stats: TopologyStats,
    reachability: SinkReachability,
    degrees: DegreeProfile,
    diagnostics: Diagnostics,
}

pub fn handle(input: &InstanceArgs, format: OutputFormat) -> Result<()> {
    let raw = read_instance(&input.instance)?;
    let topology = regenerator(input)?;
    let mut parser = InstanceParser::new().loose(loose_acceptance(&input.loose));
    if let Some(source) = &topology {
        parser = parser.topology_source(source as &dyn TopologySource);
    }
    let (instance, diagnostics) = parser
        .parse_with_diagnostics(raw.trim())
        .context("parsing instance")?;

    let report = build_report(&instance, diagnostics);
    match format {
        OutputFormat::Plain => print_plain(&report),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(io::stdout(), &report)
                .context("serializing inspect report to JSON")?;
            println!();
            Ok(())
        }
    }
}

fn build_report(instance: &Instance, mut diagnostics: Diagnostics) -> InspectReport {
    let reachability = sink_reachability(instance);
    for poi in &reachability.stranded_pois {
        diagnostics.error_about(
            IssueKind::Reachability,
            "no covering sensor reaches a sink",
            &poi.to_string(),
        );
    }
    InspectReport {
        key: instance.key().to_string(),
        pois: instance.num_pois(),
        sensors: instance.num_sensors(),
        active_sensors: instance.num_active_sensors(),
        sinks: instance.num_sinks(),
        stats: topology_stats(instance),
        degrees: degree_profile(instance),
        reachability,
        diagnostics,
    }
}

fn print_plain(report: &InspectReport) -> Result<()> {
    let stats = &report.stats;
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "METRIC\tVALUE")?;
    writeln!(writer, "key\t{}", report.key)?;
    writeln!(writer, "pois\t{}", report.pois)?;
    writeln!(
        writer,
        "sensors\t{} ({} active)",
        report.sensors, report.active_sensors
    )?;
    writeln!(writer, "sinks\t{}", report.sinks)?;
    writeln!(writer, "nodes\t{}", stats.node_count)?;
    writeln!(writer, "edges\t{}", stats.edge_count)?;
    writeln!(writer, "components\t{}", stats.connected_components)?;
    writeln!(
        writer,
        "degree min/avg/max\t{}/{:.2}/{}",
        stats.min_degree, stats.avg_degree, stats.max_degree
    )?;
    writeln!(writer, "coverage density\t{:.4}", stats.coverage_density)?;
    writeln!(
        writer,
        "communication density\t{:.4}",
        stats.communication_density
    )?;
    writeln!(
        writer,
        "sink-reachable sensors\t{}",
        report.reachability.reachable_sensors.len()
    )?;
    writeln!(
        writer,
        "stranded pois\t{}",
        report.reachability.stranded_pois.len()
    )?;
    writer.flush()?;

    print!("{}", report.diagnostics);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stranded_pois_become_reachability_errors() {
        // i1 covers p1 but has no route to the sink
        let raw = "KCMC;2 2 1;10 5 5;1;PI 0 0;PI 1 1;IS 0 0;END";
        let instance = Instance::parse(raw).unwrap();
        let report = build_report(&instance, Diagnostics::new());

        assert_eq!(report.reachability.stranded_pois.len(), 1);
        assert_eq!(report.diagnostics.error_count(), 1);
        assert_eq!(
            report.diagnostics.issues[0].entity.as_deref(),
            Some("p1")
        );
    }
}
