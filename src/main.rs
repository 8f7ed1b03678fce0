use std::process::ExitCode;

use clap::Parser;

mod cmd;
mod tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cmd::Cli::parse();
    crate::tracing::setup_tracing(cli.global_args.structured_logging);

    match cli.run().await {
        Ok(status) => status.into(),
        Err(err) => {
            ::tracing::debug!("command failed: {:?}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
