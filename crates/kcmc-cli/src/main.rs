use clap::Parser;
use kcmc_cli::cli::{build_cli_command, Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    // stdout carries the result record only
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Some(Commands::Solve(args)) => commands::solve::handle(args),
        Some(Commands::Inspect { input, format }) => commands::inspect::handle(input, *format),
        Some(Commands::Reduce { input, max_m }) => commands::reduce::handle(input, *max_m),
        Some(Commands::Completions { shell, out }) => {
            commands::completions::handle(*shell, out.as_deref())
        }
        None => build_cli_command().print_help().map_err(Into::into),
    };

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}
