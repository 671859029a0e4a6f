use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use fnport_core::{Config, GlobalOptions};

mod aws;
mod cli;
mod dispatch;
mod output;
mod progress;
mod prompt;
mod style;

use cli::FnportCli;
use output::OutputOptions;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = FnportCli::parse();
    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };
    init_tracing(&global);

    let config = Config::from_env()
        .map_err(|err| eyre!("{err:#}"))?
        .with_temp_root(cli.temp_root.clone())
        .with_timeout(cli.timeout)
        .with_build_program(cli.sam_cli.clone());
    tracing::debug!(temp_root = %config.temp.root.display(), "configuration loaded");

    let outcome = dispatch::run(&cli, &config).map_err(|err| eyre!("{err:?}"))?;
    let opts = OutputOptions {
        quiet: global.quiet,
        json: global.json,
        no_color: cli.no_color,
    };
    let code = output::emit_output(&opts, cli.command.name(), &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOptions) {
    let level = if global.trace {
        "trace"
    } else {
        match global.verbose {
            0 if global.quiet || global.json => "warn",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("fnport={level},fnport_core={level},fnport_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
