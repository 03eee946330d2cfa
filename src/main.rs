use std::process;

use anyhow::Result;
use enginestrap::cli::{self, Commands};
use tracing::error;

fn run(args: &cli::Cli) -> Result<()> {
    match &args.command {
        Commands::Detect(opts) => {
            let profile = enginestrap::load_validated_profile(&opts.common)?;
            let executor = enginestrap::ssh_executor(&profile, opts.dry_run);
            let detection = enginestrap::run_detect(&profile, executor)?;
            println!("{}", detection.variant.name);
        }
        Commands::Provision(opts) => {
            let profile = enginestrap::load_validated_profile(&opts.common)?;
            let executor = enginestrap::ssh_executor(&profile, opts.dry_run);
            enginestrap::run_provision(&profile, executor)?;
        }
        Commands::Render(opts) => {
            let options = enginestrap::run_render(opts)?;
            print!("{}", options.content);
        }
        Commands::Validate(opts) => enginestrap::run_validate(opts)?,
        Commands::Completions(opts) => enginestrap::run_completions(opts)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    if let Some(log_level) = args.command.log_level() {
        enginestrap::init_logging(log_level)?;
    }

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}
