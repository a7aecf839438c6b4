//! Command-line entry point for the uvex-qc batch jobs.
//!
//! # Usage
//!
//! ```bash
//! # Exposure tables from the raw sources
//! uvex-qc parse-dqc --input uvex-casu-dqc.txt --output uvex-casu-dqc.csv
//! uvex-qc parse-seeing --input seeing-logs/ --output seeing.csv
//! uvex-qc parse-intlogs --input int-logs/ --nights nights.csv --runs runs.csv
//!
//! # Per-field table, quality control and todo lists
//! uvex-qc coordinates --planner planner.csv --output field-coordinates.csv
//! uvex-qc aggregate --source dqc-report --input uvex-casu-dqc.txt \
//!     --coordinates field-coordinates.csv --output uvex-casu-dqc-by-field.csv
//! uvex-qc evaluate --fields uvex-casu-dqc-by-field.csv --policy dqc-late-ra --output good.txt
//! uvex-qc todo --attempted attempted.txt --acceptable good.txt --outdir todo/
//! uvex-qc ra-bins --todo-dir todo/ --coordinates field-coordinates.csv --outdir output/
//!
//! # Quicklooks
//! uvex-qc build-index --root /data/iphas --run-index run2path.json --conf-index dir2conf.json
//! uvex-qc check-index --fields uvex-casu-dqc-by-field.csv
//! uvex-qc quicklook-dirs --fields uvex-casu-dqc-by-field.csv
//! uvex-qc quicklook --fields uvex-casu-dqc-by-field.csv --dir uvex_sep2007
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use std::path::{Path, PathBuf};

use uvex_qc::config::QcConfig;
use uvex_qc::core::domain::FieldId;
use uvex_qc::parsing::{
    csv_parser, dqc_parser, field_list, int_log_parser, seeing_log_parser, ParseReport,
};
use uvex_qc::planning::{RaBinPlanner, TodoBuilder};
use uvex_qc::preprocessing::enricher::{read_planner_csv, CoordinateCatalog};
use uvex_qc::preprocessing::{build_field_table, ExposureSource, PipelineConfig};
use uvex_qc::qc::QualityFilter;
use uvex_qc::quicklook::lookup::{self, ConfMapIndex, RunPathIndex};
use uvex_qc::quicklook::{data_directories, ProcessRunner, QuicklookDriver};

#[derive(Parser)]
#[command(author, version, about = "UVEX/IPHAS quality control and planning", long_about = None)]
struct Cli {
    /// Configuration file (default: uvex-qc.toml in ., config/ or ..)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or flexi_logger spec; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also write logs to files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a CASU data-quality report into an exposure table
    ParseDqc {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert a directory of seeing logs into an exposure table
    ParseSeeing {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert a directory of INT observing logs into night and run tables
    ParseIntlogs {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        nights: PathBuf,
        #[arg(long)]
        runs: PathBuf,
        /// Also write the survey fields with at least one exposure
        #[arg(long)]
        attempted: Option<PathBuf>,
    },

    /// Build the field coordinate table from the survey planner's pointings
    Coordinates {
        #[arg(long)]
        planner: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Aggregate exposures into one row per field
    Aggregate {
        /// dqc-report, seeing-logs, int-logs or exposure-csv
        #[arg(long, default_value = "dqc-report", value_parser = parse_source)]
        source: ExposureSource,
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Field coordinate table to join
        #[arg(long)]
        coordinates: Option<PathBuf>,
        /// Skip the exposure sanity checks
        #[arg(long)]
        no_validate: bool,
    },

    /// Apply a quality policy to a field table
    Evaluate {
        #[arg(short, long)]
        fields: PathBuf,
        #[arg(short, long, default_value = "dqc")]
        policy: String,
        /// Acceptable fields, one per line
        #[arg(short, long)]
        output: PathBuf,
        /// Rejected fields, one per line
        #[arg(long)]
        rejected: Option<PathBuf>,
    },

    /// List the built-in and configured policies
    Policies,

    /// Split the field catalog into never-attempted and failed todo lists
    Todo {
        #[arg(long)]
        attempted: PathBuf,
        #[arg(long)]
        acceptable: PathBuf,
        #[arg(long, default_value = ".")]
        outdir: PathBuf,
    },

    /// Write RA-binned todo files and fields.done
    RaBins {
        /// Directory holding the todo lists written by `todo`
        #[arg(long, default_value = ".")]
        todo_dir: PathBuf,
        #[arg(long)]
        coordinates: PathBuf,
        /// Fields observed since the quality data was compiled
        #[arg(long)]
        recent: Option<PathBuf>,
        #[arg(long, default_value = "output")]
        outdir: PathBuf,
    },

    /// Build the run and confidence-map indices
    BuildIndex {
        /// Data directory to walk for FITS files
        #[arg(long, conflicts_with = "listing")]
        root: Option<PathBuf>,
        /// Existing list of FITS paths
        #[arg(long)]
        listing: Option<PathBuf>,
        /// Write the walked file list here
        #[arg(long)]
        save_listing: Option<PathBuf>,
        #[arg(long)]
        run_index: Option<PathBuf>,
        #[arg(long)]
        conf_index: Option<PathBuf>,
    },

    /// Check that every quicklook run is in the run index
    CheckIndex {
        #[arg(short, long)]
        fields: PathBuf,
        #[arg(long)]
        run_index: Option<PathBuf>,
    },

    /// Print the data directories of a field table, one per line
    QuicklookDirs {
        #[arg(short, long)]
        fields: PathBuf,
    },

    /// Create quicklook JPEGs for the fields of one data directory
    Quicklook {
        #[arg(short, long)]
        fields: PathBuf,
        #[arg(short, long)]
        dir: String,
        #[arg(long)]
        outdir: Option<PathBuf>,
    },
}

fn parse_source(s: &str) -> Result<ExposureSource, String> {
    match s {
        "dqc-report" => Ok(ExposureSource::DqcReport),
        "seeing-logs" => Ok(ExposureSource::SeeingLogs),
        "int-logs" => Ok(ExposureSource::IntLogs),
        "exposure-csv" => Ok(ExposureSource::ExposureCsv),
        other => Err(format!(
            "unknown source '{}' (dqc-report, seeing-logs, int-logs, exposure-csv)",
            other
        )),
    }
}

fn init_logging(level: Option<&str>, log_dir: Option<&Path>) -> Result<LoggerHandle> {
    let logger = match level {
        Some(level) => Logger::try_with_str(level),
        None => Logger::try_with_env_or_str("info"),
    }
    .context("Invalid log specification")?;

    let logger = match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .duplicate_to_stderr(Duplicate::Info),
        None => logger.log_to_stderr(),
    };

    logger.start().context("Failed to start logger")
}

fn report_parse(report: &ParseReport) {
    println!(
        "Read {} lines: {} rows, {} skipped",
        report.lines_read, report.parsed, report.skipped
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.log_level.as_deref(), cli.log_dir.as_deref())?;
    let config = QcConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ParseDqc { input, output } => {
            let outcome = dqc_parser::parse_dqc_file(&input)?;
            csv_parser::write_exposures_csv(&outcome.rows, &output)?;
            report_parse(&outcome.report);
        }

        Commands::ParseSeeing { input, output } => {
            let outcome = seeing_log_parser::parse_seeing_log_dir(&input)?;
            csv_parser::write_exposures_csv(&outcome.rows, &output)?;
            report_parse(&outcome.report);
        }

        Commands::ParseIntlogs {
            input,
            nights,
            runs,
            attempted,
        } => {
            let outcome = int_log_parser::parse_int_log_dir(&input)?;
            csv_parser::write_int_log_tables(&outcome.rows, &nights, &runs)?;
            if let Some(path) = attempted {
                let exposures: Vec<_> = outcome.rows.iter().flat_map(|log| log.exposures()).collect();
                let prefix = config.pipeline.name_prefix();
                let fields = int_log_parser::attempted_fields(&exposures, prefix.as_deref());
                field_list::write_field_list(&fields, &path)?;
            }
            report_parse(&outcome.report);
        }

        Commands::Coordinates { planner, output } => {
            let pointings = read_planner_csv(&planner)?;
            let catalog = CoordinateCatalog::from_planner(&pointings);
            csv_parser::write_coordinates_csv(catalog.rows(), &output)?;
            println!("Wrote {} field positions to {}", catalog.len(), output.display());
        }

        Commands::Aggregate {
            source,
            input,
            output,
            coordinates,
            no_validate,
        } => {
            let pipeline_config = PipelineConfig {
                source,
                validate: config.pipeline.validate && !no_validate,
                name_prefix: config.pipeline.name_prefix(),
                coordinates,
            };
            let result = build_field_table(&input, &output, pipeline_config)?;
            report_parse(&result.parse_report);
            println!(
                "{} exposures -> {} fields ({} records skipped)",
                result.aggregation.records_in,
                result.fields.len(),
                result.aggregation.skipped()
            );
            if let Some(enrichment) = result.enrichment {
                println!(
                    "Coordinates: {} joined, {} missing",
                    enrichment.enriched, enrichment.missing
                );
            }
        }

        Commands::Evaluate {
            fields,
            policy,
            output,
            rejected,
        } => {
            let policies = config.policy_set()?;
            let filter = QualityFilter::new(policies.get(&policy)?.clone());
            let aggregates = csv_parser::read_aggregates_csv(&fields)?;
            let summary = filter.filter_fields(&aggregates);

            field_list::write_field_list(&summary.accepted, &output)?;
            if let Some(path) = rejected {
                field_list::write_field_list(&summary.rejected_fields(), &path)?;
            }
            println!(
                "Policy '{}': {} acceptable fields ({} by override), {} rejected",
                policy,
                summary.accepted_count(),
                summary.accepted_by_override,
                summary.rejected_fields().len()
            );
        }

        Commands::Policies => {
            for (name, policy) in config.policy_set()?.iter() {
                println!("{:<24} {}", name, policy.description.as_deref().unwrap_or(""));
            }
        }

        Commands::Todo {
            attempted,
            acceptable,
            outdir,
        } => {
            let attempted = field_list::read_field_list(&attempted)?;
            let acceptable = field_list::read_field_list(&acceptable)?;
            let lists = TodoBuilder::new(config.catalog()).build(&attempted, &acceptable);
            lists.write(
                &outdir.join(&config.planning.never_attempted_file),
                &outdir.join(&config.planning.failed_file),
            )?;
            println!(
                "{} fields left to do: {} never attempted, {} failed",
                lists.todo_count(),
                lists.never_attempted.len(),
                lists.failed.len()
            );
        }

        Commands::RaBins {
            todo_dir,
            coordinates,
            recent,
            outdir,
        } => {
            let coords = CoordinateCatalog::from_csv(&coordinates)?;
            let recent: Vec<FieldId> = match recent {
                Some(path) => field_list::read_field_list(&path)?,
                None => Vec::new(),
            };

            let mut planner = RaBinPlanner::with_bins(&coords, &config.planning.ra_bins)
                .with_recently_observed(&recent);
            for name in [
                &config.planning.never_attempted_file,
                &config.planning.failed_file,
            ] {
                planner.add_fields(&field_list::read_field_list(&todo_dir.join(name))?);
            }

            let report = planner.write_files(&config.catalog(), &outdir)?;
            for (hour, fields) in planner.plan().bins() {
                println!("{:02}h: {}", hour, fields.len());
            }
            println!(
                "Total: {} fields to do, {} done, {} unplaced",
                report.todo, report.done, report.unplaced
            );
        }

        Commands::BuildIndex {
            root,
            listing,
            save_listing,
            run_index,
            conf_index,
        } => {
            let entries: Vec<String> = match (root, listing) {
                (Some(root), _) => {
                    let files = lookup::list_fits_files(&root)?;
                    if let Some(path) = &save_listing {
                        lookup::write_file_list(&files, path)?;
                    }
                    files.iter().map(|p| p.display().to_string()).collect()
                }
                (None, Some(listing)) => lookup::read_file_list(&listing)?,
                (None, None) => bail!("Either --root or --listing is required"),
            };

            let runs = RunPathIndex::from_listing(&entries, &config.index.ignored_markers);
            runs.to_json_file(run_index.as_deref().unwrap_or(&config.quicklook.run_index))?;
            let confs = ConfMapIndex::from_listing(&entries);
            confs.to_json_file(conf_index.as_deref().unwrap_or(&config.quicklook.conf_index))?;
            println!(
                "Indexed {} runs and confidence maps of {} directories",
                runs.len(),
                confs.len()
            );
        }

        Commands::CheckIndex { fields, run_index } => {
            let aggregates = csv_parser::read_aggregates_csv(&fields)?;
            let index = RunPathIndex::from_json_file(
                run_index.as_deref().unwrap_or(&config.quicklook.run_index),
            )?;
            let check = lookup::check_index(&aggregates, &index, &config.index.missing_dirs);
            for missing in &check.missing {
                println!("{}", missing.run);
            }
            if !check.is_complete() {
                bail!("{} runs are missing from the index", check.missing.len());
            }
        }

        Commands::QuicklookDirs { fields } => {
            let aggregates = csv_parser::read_aggregates_csv(&fields)?;
            for dir in data_directories(&aggregates) {
                println!("{}", dir);
            }
        }

        Commands::Quicklook {
            fields,
            dir,
            outdir,
        } => {
            let aggregates = csv_parser::read_aggregates_csv(&fields)?;
            let runs = RunPathIndex::from_json_file(&config.quicklook.run_index)?;
            let confs = ConfMapIndex::from_json_file(&config.quicklook.conf_index)?;
            let outdir = outdir.unwrap_or_else(|| config.quicklook.outdir.clone());

            let mut driver =
                QuicklookDriver::new(ProcessRunner, &runs, &confs, config.quicklook.settings());
            let summary = driver.run_directory(&aggregates, &dir, &outdir);
            println!(
                "{}: {} quicklooks created, {} failed",
                dir,
                summary.succeeded.len(),
                summary.failed.len()
            );
        }
    }

    Ok(())
}
