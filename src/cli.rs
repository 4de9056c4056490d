use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tpx_lib::RenderMode;

#[derive(Parser)]
#[command(name = "tpx")]
#[command(
    version,
    about = "Tech-pack export - render product specification records to PDF",
    long_about = "Tech-pack export (TPX)\n\nModes:\n- export: render a record to a PDF artifact (served from cache when unchanged).\n- preview: render the section HTML without launching a browser.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with browser/render/image/export defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Produce (or fetch from cache) the PDF artifact for a record
    Export {
        #[arg(long, value_name = "FILE", help = "Record file (JSON or YAML)")]
        record: PathBuf,

        #[arg(
            long,
            default_value = "tpx",
            help = "Name printed in the document footer"
        )]
        requester: String,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Sections to include (cover,bom,measurements,fit,colorways,construction,care)"
        )]
        sections: Option<Vec<String>>,

        #[arg(long, help = "Regenerate even when a cached artifact is valid")]
        force: bool,

        #[arg(long, value_enum, help = "Render mode (defaults to config)")]
        mode: Option<CliRenderMode>,

        #[arg(
            long,
            value_name = "PATH",
            help = "Directory for generated PDFs; created if missing"
        )]
        artifact_dir: Option<PathBuf>,

        #[arg(
            long,
            default_value = "120",
            help = "Overall generation timeout (seconds)"
        )]
        timeout: u64,

        #[arg(long, default_value = "2", help = "Concurrent export jobs")]
        concurrency: usize,

        #[arg(long, help = "Include coordinator statistics in the output")]
        stats: bool,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    /// Render section HTML without a browser
    Preview {
        #[arg(long, value_name = "FILE", help = "Record file (JSON or YAML)")]
        record: PathBuf,

        #[arg(
            long,
            default_value = "all",
            help = "Section to render, or 'all' for every section with content"
        )]
        section: String,

        #[arg(long, value_enum, help = "Render mode (defaults to config)")]
        mode: Option<CliRenderMode>,

        #[arg(
            long,
            value_name = "PATH",
            help = "Write one <section>.html per section here instead of inlining the markup"
        )]
        html_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliRenderMode {
    Single,
    Multi,
}

impl From<CliRenderMode> for RenderMode {
    fn from(mode: CliRenderMode) -> Self {
        match mode {
            CliRenderMode::Single => RenderMode::SingleDocument,
            CliRenderMode::Multi => RenderMode::MultiSection,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliRenderMode, Commands, OutputFormat};
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn export_command_uses_defaults() {
        let cli = Cli::parse_from(["tpx", "export", "--record", "record.json"]);

        assert!(!cli.verbose);
        assert!(cli.config.is_none());

        match cli.command {
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
                assert_eq!(record, Path::new("record.json"));
                assert_eq!(requester, "tpx");
                assert!(sections.is_none());
                assert!(!force);
                assert!(mode.is_none());
                assert!(artifact_dir.is_none());
                assert_eq!(timeout, 120);
                assert_eq!(concurrency, 2);
                assert!(!stats);
                assert!(matches!(format, OutputFormat::Json));
                assert!(output.is_none());
            }
            _ => panic!("expected export command"),
        }
    }

    #[test]
    fn export_command_respects_overrides() {
        let cli = Cli::parse_from([
            "tpx",
            "export",
            "--record",
            "r.yaml",
            "--requester",
            "jane",
            "--sections",
            "bom,care",
            "--force",
            "--mode",
            "single",
            "--artifact-dir",
            "out",
            "--timeout",
            "30",
            "--format",
            "pretty",
            "-o",
            "result.json",
            "--config",
            "tpx.toml",
        ]);

        assert_eq!(cli.config.as_deref(), Some(Path::new("tpx.toml")));
        match cli.command {
            Commands::Export {
                requester,
                sections,
                force,
                mode,
                artifact_dir,
                timeout,
                format,
                output,
                ..
            } => {
                assert_eq!(requester, "jane");
                assert_eq!(
                    sections,
                    Some(vec![String::from("bom"), String::from("care")])
                );
                assert!(force);
                assert!(matches!(mode, Some(CliRenderMode::Single)));
                assert_eq!(artifact_dir.as_deref(), Some(Path::new("out")));
                assert_eq!(timeout, 30);
                assert!(matches!(format, OutputFormat::Pretty));
                assert_eq!(output.as_deref(), Some(Path::new("result.json")));
            }
            _ => panic!("expected export command with overrides"),
        }
    }

    #[test]
    fn preview_command_sets_verbose() {
        let cli = Cli::parse_from([
            "tpx",
            "--verbose",
            "preview",
            "--record",
            "record.json",
            "--section",
            "bom",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Preview {
                section, html_dir, ..
            } => {
                assert_eq!(section, "bom");
                assert!(html_dir.is_none());
            }
            _ => panic!("expected preview command"),
        }
    }
}
