//! `feedmatch run|validate|config`: feed reconciliation against a catalog.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::Subcommand;
use feedmatch_recon::{CsvStream, FeedType, ReconConfig, ReconError, ReconInput, ReconResult};

use crate::exit_codes::{recon_exit_code, EXIT_IO_READ, EXIT_IO_WRITE};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Match a feed against the primary and secondary catalog datasets
    #[command(after_help = "\
Examples:
  feedmatch run --feed xbox.csv --primary movies.csv --secondary people.csv
  feedmatch run --feed vudu.csv --primary movies.csv --secondary people.csv --feed-type vudu
  feedmatch run --feed feed.csv --primary movies.csv --secondary people.csv --config recon.toml --json
  feedmatch run --feed feed.csv --primary movies.csv --secondary people.csv --output links.csv")]
    Run {
        /// Feed to link (driving side of both joins)
        #[arg(long)]
        feed: PathBuf,

        /// Primary catalog dataset (candidates of the first join)
        #[arg(long)]
        primary: PathBuf,

        /// Secondary catalog dataset (candidates of the second join)
        #[arg(long)]
        secondary: PathBuf,

        /// Source of the feed: xbox, google_play, vudu, amazon_instant
        #[arg(long, short = 't', default_value = "xbox")]
        feed_type: FeedType,

        /// Join configuration (TOML). Defaults to the built-in movie catalog config
        #[arg(long, env = "FEEDMATCH_CONFIG")]
        config: Option<PathBuf>,

        /// Emit the full JSON report instead of internal_id,external_id CSV
        #[arg(long)]
        json: bool,

        /// Write output to file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a join config without running
    #[command(after_help = "\
Examples:
  feedmatch validate recon.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },

    /// Print the built-in movie catalog config as TOML
    #[command(after_help = "\
Examples:
  feedmatch config > recon.toml")]
    Config,
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { feed, primary, secondary, feed_type, config, json, output } => {
            let paths = RunPaths { feed, primary, secondary };
            cmd_recon_run(&paths, feed_type, config.as_deref(), json, output.as_deref())
        }
        ReconCommands::Validate { config } => cmd_recon_validate(&config),
        ReconCommands::Config => cmd_recon_config(),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(err: ReconError) -> CliError {
    let code = recon_exit_code(&err);
    let hint = match &err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
            Some("run `feedmatch config` to print a working config")
        }
        ReconError::MissingColumn { .. } => {
            Some("config column names are matched case-insensitively against each file's header line")
        }
        ReconError::DateParse { .. } => {
            Some("add the format to [keys].date_formats, or set on_bad_date = \"skip\"")
        }
        _ => None,
    };
    let cli_err = recon_err(code, err.to_string());
    match hint {
        Some(hint) => cli_err.with_hint(hint),
        None => cli_err,
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunPaths {
    feed: PathBuf,
    primary: PathBuf,
    secondary: PathBuf,
}

fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let Some(path) = path else {
        log::info!("using built-in config");
        return Ok(ReconConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        recon_err(EXIT_IO_READ, format!("cannot read config {}: {e}", path.display()))
    })?;
    let config = ReconConfig::from_toml(&text).map_err(engine_err)?;
    log::info!("using config '{}' from {}", config.name, path.display());
    Ok(config)
}

fn open_stream(role: &str, path: &Path) -> Result<CsvStream, CliError> {
    let file = File::open(path).map_err(|e| {
        recon_err(EXIT_IO_READ, format!("cannot read {role} {}: {e}", path.display()))
    })?;
    CsvStream::from_reader(BufReader::new(file)).map_err(|e| {
        recon_err(recon_exit_code(&e), format!("{role} {}: {e}", path.display()))
    })
}

fn cmd_recon_run(
    paths: &RunPaths,
    feed_type: FeedType,
    config_path: Option<&Path>,
    json_output: bool,
    output_file: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    let input = ReconInput {
        feed: open_stream("feed", &paths.feed)?,
        primary: open_stream("primary", &paths.primary)?,
        secondary: open_stream("secondary", &paths.secondary)?,
    };

    let result = feedmatch_recon::run(&config, feed_type, input).map_err(engine_err)?;

    let rendered = if json_output { render_json(&result)? } else { render_csv(&result)? };

    match output_file {
        Some(path) => {
            std::fs::write(path, &rendered).map_err(|e| {
                recon_err(EXIT_IO_WRITE, format!("cannot write {}: {e}", path.display()))
            })?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            io::stdout()
                .lock()
                .write_all(&rendered)
                .map_err(|e| recon_err(EXIT_IO_WRITE, format!("cannot write output: {e}")))?;
        }
    }

    print_summary(&result);
    Ok(())
}

fn render_csv(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let write_err = |e: csv::Error| recon_err(EXIT_IO_WRITE, format!("CSV write error: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["internal_id", "external_id"]).map_err(write_err)?;
    for mapping in &result.mappings {
        writer
            .write_record([mapping.internal_id.to_string().as_str(), mapping.external_id.as_str()])
            .map_err(write_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| recon_err(EXIT_IO_WRITE, format!("CSV write error: {e}")))
}

fn render_json(result: &ReconResult) -> Result<Vec<u8>, CliError> {
    let mut json = serde_json::to_vec_pretty(result)
        .map_err(|e| recon_err(EXIT_IO_WRITE, format!("JSON serialization error: {e}")))?;
    json.push(b'\n');
    Ok(json)
}

/// Human summary on stderr, so stdout stays machine-readable.
fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "{} feed: {} records, {} mappings",
        result.meta.feed_type, s.feed.records, s.total_mappings,
    );
    for (dataset, join) in [&s.primary, &s.secondary].into_iter().zip(&s.joins) {
        eprintln!(
            "  {}: {} records ({} chunks skipped), {} candidates checked, {} mappings",
            join.name, dataset.records, dataset.skipped_chunks, join.candidates_evaluated, join.mappings,
        );
    }
    if s.feed.skipped_chunks > 0 {
        eprintln!("  feed: {} chunks skipped", s.feed.skipped_chunks);
    }
    if s.union_collisions > 0 {
        eprintln!(
            "  {} external ids linked differently by the two joins; primary kept",
            s.union_collisions
        );
    }
}

// ---------------------------------------------------------------------------
// validate + config
// ---------------------------------------------------------------------------

fn cmd_recon_validate(config_path: &Path) -> Result<(), CliError> {
    let text = std::fs::read_to_string(config_path).map_err(|e| {
        recon_err(EXIT_IO_READ, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    let config = ReconConfig::from_toml(&text).map_err(engine_err)?;
    eprintln!(
        "valid: '{}' with {} primary and {} secondary column pair(s)",
        config.name,
        config.primary.column_pairs().count(),
        config.secondary.column_pairs().count(),
    );
    Ok(())
}

fn cmd_recon_config() -> Result<(), CliError> {
    let text = ReconConfig::default().to_toml().map_err(engine_err)?;
    io::stdout()
        .lock()
        .write_all(text.as_bytes())
        .map_err(|e| recon_err(EXIT_IO_WRITE, format!("cannot write output: {e}")))
}
