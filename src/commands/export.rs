use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tpx_lib::{
    logging, DocumentRecord, ExportCoordinator, ExportError, ExportOptions, ExportOutput,
    JobState, ProgressCallback, RenderMode, TpxOutput, TPX_OUTPUT_VERSION,
};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{
    apply_export_overrides, format_effective_config, load_config, log_level, validate_config,
    ExportFlagSources, ExportOverrides,
};

/// Arguments of the export command after CLI parsing.
pub struct ExportArgs {
    pub record: PathBuf,
    pub requester: String,
    pub sections: Option<Vec<String>>,
    pub force: bool,
    pub mode: Option<RenderMode>,
    pub artifact_dir: Option<PathBuf>,
    pub timeout: u64,
    pub concurrency: usize,
    pub stats: bool,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

/// Run the export command.
pub async fn run_export(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    verbose: bool,
    args: ExportArgs,
) -> ExitCode {
    let format = args.format;
    let output = args.output.clone();

    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    apply_export_overrides(
        &mut config,
        ExportOverrides {
            mode: args.mode,
            artifact_dir: args.artifact_dir,
            timeout_secs: args.timeout,
            concurrency: args.concurrency,
        },
        &ExportFlagSources::from_args(raw_args),
    );
    if let Err(err) = validate_config(&config, config_path.as_deref()) {
        return render_error(err, format, output);
    }

    config.logging.level = log_level(&config, verbose);
    // A subscriber installed by an embedding process is fine.
    let _ = logging::init(&config.logging);
    if verbose {
        eprintln!("{}", format_effective_config(&config, config_path.as_deref()));
    }

    let record = match DocumentRecord::from_path(&args.record) {
        Ok(record) => Arc::new(record),
        Err(err) => return render_error(err, format, output),
    };

    let progress: Option<ProgressCallback> = verbose.then(|| {
        Arc::new(|job_id: &str, state: &JobState| eprintln!("[{job_id}] {state}"))
            as ProgressCallback
    });
    let coordinator = match ExportCoordinator::from_config(&config, progress) {
        Ok(c) => c,
        Err(err) => return render_error(err, format, output),
    };

    let result = coordinator
        .get_or_create_artifact(
            record,
            &args.requester,
            ExportOptions {
                sections: args.sections,
                force: args.force,
                mode: None,
            },
        )
        .await;
    coordinator.shutdown().await;

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(err) => return render_error(err, format, output),
    };
    let body = TpxOutput::Export(ExportOutput {
        version: TPX_OUTPUT_VERSION.to_string(),
        requester: args.requester,
        artifact,
        stats: args.stats.then(|| coordinator.stats()),
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ExportError::Io(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
