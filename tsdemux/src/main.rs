//! tsdemux - PSI/SI table extraction from MPEG transport streams.
//!
//! Commands:
//! - `tables`: demultiplex a TS file and print, or save, the tables found
//! - `decompile`: convert a binary section file to JSON or XML
//! - `compile`: convert a JSON section file back to binary sections

mod config;
mod error;
mod logging;
mod output;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use colored::Colorize;
use tracing::{debug, info};
use tsdemux_core::{
    pid, DemuxConfig, Registry, SectionDemux, SectionFile, Standards, TreeContext, TS_PACKET_SIZE,
};

use crate::config::{find_config, load_config, ConfigFile};
use crate::error::CliError;
use crate::output::{OutputFormat, TableCollector};

/// Packets read from the input file at a time.
const READ_PACKETS: usize = 512;

/// Default log retention in days.
const DEFAULT_RETENTION_DAYS: u64 = 7;

#[derive(Parser, Debug)]
#[command(name = "tsdemux")]
#[command(about = "Extract, decompile and compile PSI/SI tables of MPEG transport streams")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML format).{n}
    /// Defaults to tsdemux.toml in the current directory when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Standards used to interpret tables, e.g. "dvb" or "isdb,mpeg".
    #[arg(short, long, global = true)]
    standards: Option<Standards>,

    /// Directory for log files. Logs go to stderr only when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Demultiplex the tables of a transport stream file.
    Tables {
        /// Input TS file.
        input: PathBuf,

        /// PID to watch, decimal or 0x-prefixed hex. May be repeated.{n}
        /// By default the PAT, CAT, NIT, SDT, TDT and BIT PIDs are
        /// watched and PMT PIDs are added as they are found in the PAT.
        #[arg(short, long, value_parser = maybe_hex::<u16>)]
        pid: Vec<u16>,

        /// Output format.
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Also save the tables as a binary section file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report each repetition of a table.
        #[arg(long)]
        repeats: bool,
    },

    /// Convert a binary section file to a text tree.
    Decompile {
        /// Input binary section file.
        input: PathBuf,

        /// Output format (json or xml).
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Xml)]
        format: OutputFormat,

        /// Output file, stdout when unset.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a JSON text tree to a binary section file.
    Compile {
        /// Input JSON file.
        input: PathBuf,

        /// Output binary section file.
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match find_config(cli.config.as_deref()) {
        Some(path) => load_config(&path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?,
        None => ConfigFile::default(),
    };

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.logging.log_dir.as_ref().map(PathBuf::from));
    logging::init_logging(
        log_dir.as_deref(),
        config.logging.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        cli.verbose,
        config.logging.level.as_deref(),
    )?;

    let demux_config = config.demux_config(cli.standards);
    let registry = Arc::new(Registry::with_default_catalog());
    debug!("standards: {}", demux_config.standards);

    match cli.command {
        Commands::Tables {
            input,
            pid,
            format,
            output,
            repeats,
        } => {
            let format = format.or(config.output.format).unwrap_or_default();
            let demux_config = DemuxConfig {
                notify_repeats: repeats || demux_config.notify_repeats,
                ..demux_config
            };
            run_tables(&input, &pid, format, output.as_deref(), demux_config, registry)?;
        }
        Commands::Decompile {
            input,
            format,
            output,
        } => {
            run_decompile(&input, format, output.as_deref(), &demux_config, &registry)?;
        }
        Commands::Compile { input, output } => {
            run_compile(&input, &output, demux_config.standards, &registry)?;
        }
    }

    Ok(())
}

fn run_tables(
    input: &Path,
    pids: &[u16],
    format: OutputFormat,
    output: Option<&Path>,
    config: DemuxConfig,
    registry: Arc<Registry>,
) -> Result<(), CliError> {
    let follow_pmt = pids.is_empty();
    let collector =
        TableCollector::new(registry.clone(), config.standards, format).follow_pmt(follow_pmt);
    let mut demux = SectionDemux::new(registry, config, collector);

    if follow_pmt {
        for pid in [pid::PAT, pid::CAT, pid::NIT, pid::SDT, pid::TDT, pid::BIT] {
            demux.add_pid(pid);
        }
    } else {
        for &pid in pids {
            demux.add_pid(pid);
        }
    }

    info!("Reading {}", input.display());
    let mut reader = BufReader::new(File::open(input)?);
    let mut buffer = vec![0u8; TS_PACKET_SIZE * READ_PACKETS];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        demux.feed(&buffer[..read]);
        for pid in demux.handler_mut().take_new_pids() {
            demux.add_pid(pid);
        }
    }

    let status = demux.status();
    info!(
        "{} packets, {} sections, {} invalid, {} discontinuities",
        status.packets, status.sections, status.invalid_sections, status.discontinuities
    );

    if let Some(tree) = demux.handler().render_tree()? {
        println!("{}", tree);
    } else {
        let tables = status.tables + status.short_sections;
        eprintln!(
            "{} {} table(s) from {} packet(s), {} invalid section(s), {} discontinuit{}",
            "done:".bold(),
            tables.to_string().green(),
            status.packets,
            if status.invalid_sections > 0 {
                status.invalid_sections.to_string().red()
            } else {
                status.invalid_sections.to_string().normal()
            },
            status.discontinuities,
            if status.discontinuities == 1 { "y" } else { "ies" }
        );
    }

    if let Some(path) = output {
        let file = demux.into_handler().into_file();
        file.save(path)?;
        info!("Saved {} table(s) to {}", file.tables().len(), path.display());
    }
    Ok(())
}

fn run_decompile(
    input: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    config: &DemuxConfig,
    registry: &Registry,
) -> Result<(), CliError> {
    let file = SectionFile::load(input, config.check_crc)?;
    if file.orphan_count() > 0 {
        tracing::warn!(
            "{}: {} section(s) outside complete tables are skipped",
            input.display(),
            file.orphan_count()
        );
    }

    let ctx = TreeContext {
        registry,
        standards: config.standards,
    };
    let text = match format {
        OutputFormat::Json => file.to_json(&ctx)?,
        OutputFormat::Xml => file.to_xml(&ctx),
        OutputFormat::Summary => {
            return Err(CliError::UnsupportedFormat {
                command: "decompile",
                format,
            })
        }
    };

    match output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{}", text),
    }
    Ok(())
}

fn run_compile(
    input: &Path,
    output: &Path,
    standards: Standards,
    registry: &Registry,
) -> Result<(), CliError> {
    let json = std::fs::read_to_string(input)?;
    let ctx = TreeContext {
        registry,
        standards,
    };
    let file = SectionFile::from_json(&json, &ctx)?;
    file.save(output)?;
    info!(
        "{}: {} table(s) written to {}",
        input.display(),
        file.tables().len(),
        output.display()
    );
    Ok(())
}
