//! tablesync CLI
//!
//! Credentials and warehouse connection parameters come from the environment (a `.env` file in
//! the working directory is loaded first).

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use tablesync::config::{CodaConfig, SyncConfig, WarehouseConfig};
use tablesync::export::{export_csv_to_path, write_csv};
use tablesync::extract::Extractor;
use tablesync::failures;
use tablesync::logging::{self, Profile};
use tablesync::observability::{CompositeObserver, FileObserver, SyncObserver, TracingObserver};
use tablesync::page::{self, HtmlPageReader, JsonApiReader, PageReader};
use tablesync::pipeline::{Pipeline, TableOutcome};
use tablesync::query::{DEFAULT_PROVISIONING_TABLE, fetch_active_provisioning_lines};
use tablesync::source::{CodaSource, DocumentSource, FileSource};
use tablesync::warehouse::{Connector, TableName};
use tablesync::{SyncError, SyncResult};

#[derive(Debug, Parser)]
#[command(name = "tablesync")]
#[command(about = "Sync document tables into a SQL warehouse", long_about = None)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Coda REST API (`CODA_TOKEN`)
    Coda,
    /// CSV / JSON files under `--root`
    Files,
}

#[derive(Debug, clap::Args)]
struct SourceArgs {
    /// Where tables are read from.
    #[arg(long, value_enum, default_value_t = SourceKind::Coda)]
    source: SourceKind,
    /// Root directory for `--source files` (`<root>/<document>/<table>.csv`).
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract and upsert every table listed in a TOML config
    Sync {
        #[arg(long)]
        config: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        /// Also append sync events to this file.
        #[arg(long)]
        events_log: Option<PathBuf>,
    },
    /// Extract one table and write it as CSV
    Export {
        #[arg(long)]
        document: String,
        #[arg(long)]
        table: String,
        /// Output file; stdout when absent.
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the active provisioning lines of a brand as CSV
    Provisioning {
        #[arg(long)]
        brand_id: String,
        #[arg(long, default_value = DEFAULT_PROVISIONING_TABLE)]
        table: String,
    },
    /// Read fields off pages and print one JSON object per page
    Page {
        /// JSON API base URL, or with `--ticket` an HTML page URL containing `{id}`.
        #[arg(long)]
        base_url: String,
        /// Bearer token sent with each request.
        #[arg(long)]
        token: Option<String>,
        /// Read data center and brand id off ticket pages.
        #[arg(long)]
        ticket: bool,
        /// Page identifiers.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List product codes (or package-code lists) reported in a failure log
    Failures {
        #[arg(long)]
        input: PathBuf,
        /// Only codes containing whitespace.
        #[arg(long)]
        blank: bool,
        /// Bracketed package-code lists instead of product codes.
        #[arg(long, conflicts_with = "blank")]
        packages: bool,
    },
}

fn document_source(args: &SourceArgs) -> SyncResult<Box<dyn DocumentSource>> {
    match args.source {
        SourceKind::Files => Ok(Box::new(FileSource::new(&args.root))),
        SourceKind::Coda => {
            let config = CodaConfig::from_env()?;
            let source = CodaSource::new(config).map_err(|e| SyncError::Config {
                message: format!("cannot build coda client: {e}"),
            })?;
            Ok(Box::new(source))
        }
    }
}

fn run(cli: Cli) -> SyncResult<ExitCode> {
    match cli.command {
        Commands::Sync {
            config,
            source,
            events_log,
        } => {
            let config = SyncConfig::load(&config)?;
            let warehouse = WarehouseConfig::from_env()?;

            let mut pipeline = Pipeline::new(document_source(&source)?, warehouse);
            if let Some(path) = events_log {
                let observers: Vec<Arc<dyn SyncObserver>> =
                    vec![Arc::new(TracingObserver), Arc::new(FileObserver::new(path))];
                pipeline = pipeline.with_observer(Arc::new(CompositeObserver::new(observers)));
            }

            let report = pipeline.run(&config)?;
            for table in &report.tables {
                let status = match &table.outcome {
                    TableOutcome::Synced(r) => format!(
                        "synced (staged {}, replaced {}, inserted {})",
                        r.rows_staged, r.rows_deleted, r.rows_inserted
                    ),
                    TableOutcome::Skipped { reason } => format!("skipped ({reason})"),
                    TableOutcome::Failed { error } => format!("FAILED: {error}"),
                };
                println!("{}: {status}", table.context.target);
            }
            Ok(if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Export {
            document,
            table,
            output,
            source,
        } => {
            let extractor = Extractor::new(document_source(&source)?);
            let snapshot = extractor.extract(&document, &table)?;
            match output {
                Some(path) => export_csv_to_path(&snapshot, path)?,
                None => write_csv(&snapshot, io::stdout().lock())?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Provisioning { brand_id, table } => {
            let mut warehouse = WarehouseConfig::from_env()?
                .connect()
                .map_err(SyncError::Connection)?;
            let result =
                fetch_active_provisioning_lines(warehouse.as_mut(), &TableName::parse(&table), &brand_id);
            if let Err(e) = warehouse.close() {
                tracing::warn!(error = %e, "closing warehouse connection failed");
            }
            write_csv(&result?, io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Page {
            base_url,
            token,
            ticket,
            ids,
        } => {
            let reader: Box<dyn PageReader> = if ticket {
                let reader = HtmlPageReader::ticket(base_url)?;
                Box::new(match token {
                    Some(token) => reader.with_token(token),
                    None => reader,
                })
            } else {
                Box::new(JsonApiReader::new(&base_url, token)?)
            };

            let mut failed = false;
            for read in page::read_all(reader.as_ref(), ids.as_slice()) {
                let line = match read.result {
                    Ok(fields) => serde_json::json!({ "id": read.page_id, "fields": fields }),
                    Err(e) => {
                        failed = true;
                        serde_json::json!({ "id": read.page_id, "error": e.to_string() })
                    }
                };
                println!("{line}");
            }
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Failures {
            input,
            blank,
            packages,
        } => {
            let text = fs::read_to_string(&input)?;
            let found = if packages {
                failures::package_code_lists(&text)
            } else if blank {
                failures::blank_product_code_failures(&text)
            } else {
                failures::product_code_failures(&text)
            };
            for item in &found {
                println!("{item}");
            }
            println!("\nTotal occurrences: {}", found.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(match cli.log_format {
        LogFormat::Text => Profile::Development,
        LogFormat::Json => Profile::Production,
    });

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
