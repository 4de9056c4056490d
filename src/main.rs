mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_export, run_preview, ExportArgs};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = cli::parse();

    match args.command {
        Commands::Export {
            record,
            requester,
            sections,
            force,
            mode,
            artifact_dir,
            timeout,
            concurrency,
            stats,
            format,
            output,
        } => {
            run_export(
                &raw_args,
                args.config,
                args.verbose,
                ExportArgs {
                    record,
                    requester,
                    sections,
                    force,
                    mode: mode.map(Into::into),
                    artifact_dir,
                    timeout,
                    concurrency,
                    stats,
                    format,
                    output,
                },
            )
            .await
        }
        Commands::Preview {
            record,
            section,
            mode,
            html_dir,
            format,
            output,
        } => {
            run_preview(
                args.config,
                args.verbose,
                record,
                section,
                mode.map(Into::into),
                html_dir,
                format,
                output,
            )
            .await
        }
    }
}
