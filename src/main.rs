//! churnpipe - Main Entry Point

use clap::Parser;
use churnpipe::cli::{cmd_train, cmd_validate, Cli, Commands, LogFormat};
use churnpipe::error::PipelineError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "churnpipe=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PipelineError>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
        .clamp(1, 255) as u8
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let result = match &cli.command {
        Commands::Train { config, data, output_dir, run_id } => {
            cmd_train(config, data.as_deref(), output_dir.as_deref(), run_id.as_deref())
        }
        Commands::Validate { config, data } => cmd_validate(config, data.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
