use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tpx_lib::{ErrorOutput, ExportError, TpxOutput, TPX_OUTPUT_VERSION};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &TpxOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: ExportError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let code = exit_code_for_error(&err);
    let error_payload = err.to_payload();
    let payload = TpxOutput::Error(ErrorOutput {
        version: TPX_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    code
}

/// Exit code 1 for failures worth retrying (timeouts, lock conflicts), 2 for
/// everything else.
pub fn exit_code_for_error(err: &ExportError) -> ExitCode {
    if err.is_retryable() {
        ExitCode::from(1)
    } else {
        ExitCode::from(2)
    }
}

/// Write JSON output to file or stdout.
fn write_json_output(body: &TpxOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &TpxOutput, output: Option<&Path>) -> io::Result<()> {
    let use_human = output.is_none() && std::io::stdout().is_terminal();

    if use_human {
        println!("{}", format_pretty(body, true));
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &TpxOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        TpxOutput::Export(out) => {
            let art = &out.artifact;
            let status = if art.cached { "CACHED" } else { "GENERATED" };
            let status = color(status, if art.cached { "36" } else { "32" }, colorize);
            writeln!(buf, "{} Export of record {}", status, art.record_id).ok();
            writeln!(buf, "File: {}", art.path.display()).ok();
            writeln!(
                buf,
                "Size: {} ({} pages)",
                human_size(art.size),
                art.page_count
            )
            .ok();
            writeln!(buf, "Generated: {} by {}", art.generated_at.to_rfc3339(), out.requester).ok();
            if !art.sections.is_empty() {
                writeln!(buf, "Sections: {}", art.sections.join(", ")).ok();
            }
            if !art.skipped_sections.is_empty() {
                let skipped = format!("Skipped: {}", art.skipped_sections.join(", "));
                writeln!(buf, "{}", color(&skipped, "33", colorize)).ok();
            }
            if let Some(stats) = &out.stats {
                writeln!(
                    buf,
                    "Stats: cache {}/{} hit/miss, {} coalesced, {} started, {} failed, {} timed out, peak workers {}",
                    stats.cache_hits,
                    stats.cache_misses,
                    stats.coalesced,
                    stats.jobs_started,
                    stats.jobs_failed,
                    stats.jobs_timed_out,
                    stats.queue.peak
                )
                .ok();
            }
        }
        TpxOutput::Preview(out) => {
            let header = color("[PREVIEW]", "34", colorize);
            writeln!(buf, "{} Record {}", header, out.record_id).ok();
            for section in &out.sections {
                match &section.path {
                    Some(path) => writeln!(
                        buf,
                        "- {:14} {} ({})",
                        section.name,
                        path.display(),
                        human_size(section.bytes as u64)
                    ),
                    None => writeln!(
                        buf,
                        "- {:14} {}",
                        section.name,
                        human_size(section.bytes as u64)
                    ),
                }
                .ok();
            }
        }
        TpxOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            if out.error.retryable {
                writeln!(buf, "(retryable)").ok();
            }
        }
    }
    buf
}

fn human_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MiB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KiB", b as f64 / 1024.0),
        b => format!("{b} B"),
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}
