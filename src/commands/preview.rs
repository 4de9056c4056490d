use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tpx_lib::{
    logging, DocumentRecord, ExportCoordinator, ExportError, PreviewOutput, PreviewSection,
    RenderMode, TpxOutput, TPX_OUTPUT_VERSION,
};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{load_config, log_level, validate_config};

/// Run the preview command.
#[allow(clippy::too_many_arguments)]
pub async fn run_preview(
    config_path: Option<PathBuf>,
    verbose: bool,
    record: PathBuf,
    section: String,
    mode: Option<RenderMode>,
    html_dir: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    if let Err(err) = validate_config(&config, config_path.as_deref()) {
        return render_error(err, format, output);
    }
    config.logging.level = log_level(&config, verbose);
    let _ = logging::init(&config.logging);

    let record = match DocumentRecord::from_path(&record) {
        Ok(record) => Arc::new(record),
        Err(err) => return render_error(err, format, output),
    };
    let filter = section_filter(&section);

    let coordinator = match ExportCoordinator::from_config(&config, None) {
        Ok(c) => c,
        Err(err) => return render_error(err, format, output),
    };
    let rendered = match coordinator
        .preview(&record, "preview", filter.as_deref(), mode)
        .await
    {
        Ok(rendered) => rendered,
        Err(err) => return render_error(err, format, output),
    };
    if verbose {
        eprintln!("Rendered {} section(s) for {}", rendered.len(), record.id);
    }

    let sections = match html_dir {
        Some(dir) => match write_sections(&dir, rendered) {
            Ok(sections) => sections,
            Err(err) => return render_error(err, format, output),
        },
        None => rendered
            .into_iter()
            .map(|(name, html)| PreviewSection {
                name,
                path: None,
                bytes: html.len(),
                html: Some(html),
            })
            .collect(),
    };

    let body = TpxOutput::Preview(PreviewOutput {
        version: TPX_OUTPUT_VERSION.to_string(),
        record_id: record.id.clone(),
        sections,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(ExportError::Io(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}

/// `all` (any case) means no filter.
fn section_filter(section: &str) -> Option<Vec<String>> {
    let trimmed = section.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(vec![trimmed.to_string()])
    }
}

fn write_sections(
    dir: &Path,
    rendered: Vec<(String, String)>,
) -> Result<Vec<PreviewSection>, ExportError> {
    std::fs::create_dir_all(dir)?;
    rendered
        .into_iter()
        .map(|(name, html)| {
            let path = dir.join(format!("{}.html", slug::slugify(&name)));
            std::fs::write(&path, &html)?;
            Ok(PreviewSection {
                name,
                path: Some(path),
                html: None,
                bytes: html.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn all_means_no_filter() {
        assert!(section_filter("all").is_none());
        assert!(section_filter("ALL").is_none());
        assert_eq!(section_filter(" bom "), Some(vec!["bom".to_string()]));
    }

    #[test]
    fn sections_are_written_as_html_files() {
        let dir = TempDir::new().unwrap();
        let written = write_sections(
            dir.path(),
            vec![
                ("cover".to_string(), "<p>c</p>".to_string()),
                ("bom+care".to_string(), "<p>b</p>".to_string()),
            ],
        )
        .unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("cover.html").is_file());
        assert!(dir.path().join("bom-care.html").is_file());
        assert_eq!(written[1].bytes, 8);
        assert!(written[0].html.is_none());
    }
}
