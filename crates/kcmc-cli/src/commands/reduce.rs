use anyhow::{Context, Result};
use kcmc_core::{InstanceParser, TopologySource};
use tracing::info;

use super::util::{loose_acceptance, read_instance, regenerator};
use kcmc_cli::cli::InstanceArgs;

pub fn handle(input: &InstanceArgs, max_m: u32) -> Result<()> {
    let raw = read_instance(&input.instance)?;
    let topology = regenerator(input)?;
    let mut parser = InstanceParser::new().loose(loose_acceptance(&input.loose));
    if let Some(source) = &topology {
        parser = parser.topology_source(source as &dyn TopologySource);
    }
    let instance = parser.parse(raw.trim()).context("parsing instance")?;
    let reduced = instance
        .to_single_sink(max_m)
        .with_context(|| format!("reducing {} to a single sink", instance.key()))?;

    if let Some(expansion) = reduced.expansion() {
        info!(
            sinks = instance.num_sinks(),
            virtual_sinks = reduced.num_sensors() - expansion.original_sensors(),
            "reduced to a single sink"
        );
    }
    println!("{}", reduced.serialize());
    Ok(())
}
