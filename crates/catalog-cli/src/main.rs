// crates/catalog-cli/src/main.rs
// ============================================================================
// Binary: catalog-cli
// Description: Operator command-line entry point: serve the control plane,
// or drive the normalizer/classifier/quality/snapshot jobs offline against
// the stores directly, without going through the HTTP surface.
// Purpose: Give an operator a way to run the pipeline's long jobs from a
// terminal or a cron entry, and to seed/inspect the service store, without
// standing up `catalog-service` (spec §6, §4.11; SPEC_FULL §0 "operator CLI").
// Dependencies: clap, catalog-broker, catalog-classify, catalog-config,
// catalog-core, catalog-normalize, catalog-service, catalog-store-sqlite,
// serde_json, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! Every subcommand loads an [`catalog_config::AppConfig`] (defaulting to
//! `catalog.toml`, overridable with `--config`), builds the same
//! [`catalog_service::AppState`]-equivalent wiring the HTTP server uses via
//! [`catalog_service::build_state`], and drives exactly one job to
//! completion before exiting. There is no separate "CLI state machine": the
//! CLI is a thin front end over the library crates, matching the control
//! plane's own `start`/`status` shapes wherever the operation has one.

pub mod i18n;

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use catalog_broker::QualityAnalyzer;
use catalog_config::AppConfig;
use catalog_config::ClassifierConfig;
use catalog_config::NormalizationConfig;
use catalog_config::classifier_tree::load_classifier_tree_file;
use catalog_core::domain::Snapshot;
use catalog_core::domain::SnapshotType;
use catalog_core::identifiers::ClientId;
use catalog_core::identifiers::ProjectId;
use catalog_core::identifiers::SnapshotId;
use catalog_core::identifiers::UploadUuid;
use catalog_core::interfaces::CatalogStore;
use catalog_store_sqlite::SqliteServiceStore;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use crate::i18n::Locale;
use crate::i18n::set_locale;
use crate::t;

/// Name of the source rows table the normalizer reads from (mirrors
/// `catalog_service::state::SOURCE_TABLE_NAME`, duplicated here rather than
/// made public API surface since it is an implementation default, not a
/// contract the CLI caller should rely on beyond its `--table` override).
const DEFAULT_SOURCE_TABLE: &str = "normalized_source";

/// Output rendering requested for commands that produce structured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text via the i18n catalog.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Catalog pipeline operator CLI.
#[derive(Debug, Parser)]
#[command(name = "catalog-cli", version, about = "Operator CLI for the catalog normalization & classification pipeline")]
struct Cli {
    /// UI locale (`en` or `ca`); falls back to English for unknown values.
    #[arg(long, global = true, env = "CATALOG_CLI_LANG")]
    lang: Option<String>,
    /// Output format for commands that produce structured data.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP control plane until a shutdown signal arrives.
    Serve {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
    },
    /// Validate a config file without starting anything.
    ConfigValidate {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
    },
    /// Load the authoritative IC classifier tree file into the service
    /// store, replacing its current contents wholesale.
    ClassifierTreeLoad {
        /// Path to the TSV classifier tree file.
        path: PathBuf,
        /// Path to the TOML config file (for store paths).
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
    },
    /// Run the normalizer job to completion over one source table.
    NormalizeRun {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
        /// Source rows table to read from.
        #[arg(long, default_value = DEFAULT_SOURCE_TABLE)]
        table: String,
        /// Tenancy scope for the client benchmark store lookup.
        #[arg(long, default_value_t = 1)]
        client_id: i64,
    },
    /// Run the IC classification job to completion over pending groups.
    ClassifyRun {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
        /// Maximum groups to classify; `0` means all pending groups.
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Re-run the post-ingestion quality check for one upload.
    QualityShow {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
        /// Upload UUID to check.
        upload_uuid: String,
    },
    /// Snapshot CRUD against the unified catalog store.
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Debug, Subcommand)]
enum SnapshotCommand {
    /// Create a named snapshot over a fixed set of upload row ids.
    Create {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
        /// Snapshot display name.
        name: String,
        /// Upload row ids to include, in order.
        #[arg(long = "upload", required = true)]
        uploads: Vec<i64>,
        /// Owning project, if scoped.
        #[arg(long)]
        project_id: Option<i64>,
        /// Owning client, if scoped.
        #[arg(long)]
        client_id: Option<i64>,
    },
    /// List every snapshot.
    List {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
    },
    /// Get one snapshot by id.
    Get {
        /// Path to the TOML config file.
        #[arg(long, default_value = "catalog.toml")]
        config: PathBuf,
        /// Snapshot row id.
        id: i64,
    },
}

/// Parses arguments, selects a locale, and dispatches to the requested
/// subcommand on a fresh multi-threaded runtime.
fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let locale = cli.lang.as_deref().and_then(Locale::parse).unwrap_or(Locale::En);
    set_locale(locale);
    if locale != Locale::En {
        write_stderr(&t!("i18n.disclaimer.machine_translated"));
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return emit_error(&format!("failed to start async runtime: {error}")),
    };
    runtime.block_on(dispatch(cli))
}

/// Dispatches to the requested subcommand, returning the process exit code.
async fn dispatch(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Serve { config } => run_serve(&config).await,
        Command::ConfigValidate { config } => run_config_validate(&config),
        Command::ClassifierTreeLoad { path, config } => run_classifier_tree_load(&path, &config),
        Command::NormalizeRun { config, table, client_id } => run_normalize(&config, &table, client_id).await,
        Command::ClassifyRun { config, limit } => run_classify(&config, limit).await,
        Command::QualityShow { config, upload_uuid } => run_quality_show(&config, &upload_uuid, cli.format),
        Command::Snapshot(command) => run_snapshot(command, cli.format),
    }
}

/// Loads config from `path`, overlaying environment variables and
/// validating, reporting a localized error on failure.
fn load_config(path: &Path) -> Result<AppConfig, ExitCode> {
    AppConfig::load(path).map_err(|error| emit_error(&t!("config.load_failed", path = path.display(), error = error)))
}

/// `catalog-cli serve`.
async fn run_serve(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    write_stdout(&t!("serve.starting", port = config.port));
    match catalog_service::run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => emit_error(&t!("serve.failed", error = error)),
    }
}

/// `catalog-cli config-validate`.
fn run_config_validate(config_path: &Path) -> ExitCode {
    match load_config(config_path) {
        Ok(config) => {
            if config.has_ai_key() {
                write_stdout(&t!("config.validate.ok", path = config_path.display()));
            } else {
                write_stdout(&t!("config.validate.no_ai_key"));
            }
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

/// `catalog-cli classifier-tree-load`.
fn run_classifier_tree_load(tree_path: &Path, config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let nodes = match load_classifier_tree_file(tree_path) {
        Ok(nodes) => nodes,
        Err(error) => return emit_error(&t!("classifier_tree.load.read_failed", path = tree_path.display(), error = error)),
    };
    let service_store = match SqliteServiceStore::open(&config.service_database_path, config.max_open_conns, config.max_idle_conns, config.conn_max_lifetime) {
        Ok(store) => store,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };
    match service_store.replace_classifier_tree(&nodes) {
        Ok(()) => {
            write_stdout(&t!("classifier_tree.load.ok", count = nodes.len(), path = tree_path.display()));
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("classifier_tree.load.store_failed", error = error)),
    }
}

/// `catalog-cli normalize-run`.
async fn run_normalize(config_path: &Path, table: &str, client_id: i64) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let state = match catalog_service::build_state(&config, NormalizationConfig::default(), ClassifierConfig::default()) {
        Ok(state) => state,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };

    write_stdout(&t!("normalize.run.start", table = table));
    match state.normalizer.run(table, ClientId(client_id)).await {
        Ok(summary) => {
            write_stdout(&t!("normalize.run.done", success = summary.success, errors = summary.errors, groups = summary.groups));
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("normalize.run.failed", error = error)),
    }
}

/// `catalog-cli classify-run`.
async fn run_classify(config_path: &Path, limit: usize) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let state = match catalog_service::build_state(&config, NormalizationConfig::default(), ClassifierConfig::default()) {
        Ok(state) => state,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };

    write_stdout(&t!("classify.run.start", limit = limit));
    match state.classifier.run(limit, false).await {
        Ok(summary) => {
            write_stdout(&t!("classify.run.done", message = summary.message));
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("classify.run.failed", error = error)),
    }
}

/// `catalog-cli quality-show`.
fn run_quality_show(config_path: &Path, upload_uuid: &str, format: OutputFormat) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let uuid = match UploadUuid::parse(upload_uuid) {
        Ok(uuid) => uuid,
        Err(error) => return emit_error(&t!("quality.show.invalid_uuid", uuid = upload_uuid, error = error)),
    };
    let catalog_store = match catalog_store_sqlite::SqliteCatalogStore::open(&config.unified_catalogs_db_path, config.max_open_conns, config.max_idle_conns, config.conn_max_lifetime) {
        Ok(store) => store,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };
    let analyzer = QualityAnalyzer::new(std::sync::Arc::new(catalog_store));
    match analyzer.analyze(uuid) {
        Ok(report) => {
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => write_stdout(&t!(
                    "quality.show.text",
                    reported_constants = report.reported_constants,
                    actual_constants = report.actual_constants,
                    reported_items = report.reported_items,
                    actual_items = report.actual_items,
                    mismatch = report.has_mismatch(),
                )),
            }
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("quality.show.failed", error = error)),
    }
}

/// `catalog-cli snapshot <create|list|get>`.
fn run_snapshot(command: SnapshotCommand, format: OutputFormat) -> ExitCode {
    match command {
        SnapshotCommand::Create { config, name, uploads, project_id, client_id } => run_snapshot_create(&config, name, uploads, project_id, client_id, format),
        SnapshotCommand::List { config } => run_snapshot_list(&config, format),
        SnapshotCommand::Get { config, id } => run_snapshot_get(&config, id, format),
    }
}

/// Opens the unified catalog store at the path `config` names.
fn open_catalog_store(config: &AppConfig) -> Result<catalog_store_sqlite::SqliteCatalogStore, String> {
    catalog_store_sqlite::SqliteCatalogStore::open(&config.unified_catalogs_db_path, config.max_open_conns, config.max_idle_conns, config.conn_max_lifetime).map_err(|error| error.to_string())
}

/// `catalog-cli snapshot create`.
fn run_snapshot_create(config_path: &Path, name: String, uploads: Vec<i64>, project_id: Option<i64>, client_id: Option<i64>, format: OutputFormat) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let store = match open_catalog_store(&config) {
        Ok(store) => store,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };
    let snapshot = Snapshot {
        id: SnapshotId(0),
        name,
        r#type: SnapshotType::Manual,
        project_id: project_id.map(ProjectId),
        client_id: client_id.map(ClientId),
        included_uploads: uploads.into_iter().map(Into::into).collect(),
    };
    match store.create_snapshot(snapshot) {
        Ok(created) => {
            print_snapshot(&created, format);
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("snapshot.create.failed", error = error)),
    }
}

/// `catalog-cli snapshot list`.
fn run_snapshot_list(config_path: &Path, format: OutputFormat) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let store = match open_catalog_store(&config) {
        Ok(store) => store,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };
    match store.list_snapshots() {
        Ok(snapshots) => {
            match format {
                OutputFormat::Json => print_json(&snapshots),
                OutputFormat::Text => {
                    write_stdout(&t!("snapshot.text.header"));
                    for snapshot in &snapshots {
                        write_stdout(&snapshot_text_entry(snapshot));
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(error) => emit_error(&t!("snapshot.list.failed", error = error)),
    }
}

/// `catalog-cli snapshot get`.
fn run_snapshot_get(config_path: &Path, id: i64, format: OutputFormat) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let store = match open_catalog_store(&config) {
        Ok(store) => store,
        Err(error) => return emit_error(&t!("store.open_failed", error = error)),
    };
    let snapshots = match store.list_snapshots() {
        Ok(snapshots) => snapshots,
        Err(error) => return emit_error(&t!("snapshot.get.failed", error = error)),
    };
    match snapshots.into_iter().find(|snapshot| snapshot.id.get() == id) {
        Some(snapshot) => {
            print_snapshot(&snapshot, format);
            ExitCode::SUCCESS
        }
        None => emit_error(&t!("snapshot.get.not_found", id = id)),
    }
}

/// Renders one snapshot in the requested format.
fn print_snapshot(snapshot: &Snapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(snapshot),
        OutputFormat::Text => write_stdout(&snapshot_text_entry(snapshot)),
    }
}

/// Renders one snapshot as a localized text line.
fn snapshot_text_entry(snapshot: &Snapshot) -> String {
    let kind = match snapshot.r#type {
        SnapshotType::Manual => t!("snapshot.kind.manual"),
        SnapshotType::AutoLatest => t!("snapshot.kind.auto_latest"),
    };
    t!("snapshot.text.entry", id = snapshot.id, name = snapshot.name, kind = kind, count = snapshot.included_uploads.len())
}

/// Prints `value` as pretty JSON, falling back to a localized error message
/// if serialization itself somehow fails (it cannot for these value types,
/// but the fallback keeps this function total rather than panicking).
fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => write_stdout(&text),
        Err(error) => write_stderr(&format!("failed to render JSON: {error}")),
    }
}

/// Writes a line to stdout, ignoring a broken pipe rather than panicking.
fn write_stdout(message: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{message}");
}

/// Writes a line to stderr, ignoring a broken pipe rather than panicking.
fn write_stderr(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{message}");
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    write_stderr(message);
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use catalog_core::identifiers::UploadRowId;

    use super::*;

    #[test]
    fn renders_a_manual_snapshot_as_text() {
        let snapshot = Snapshot {
            id: SnapshotId(7),
            name: "Q3 comparison".to_string(),
            r#type: SnapshotType::Manual,
            project_id: None,
            client_id: None,
            included_uploads: vec![UploadRowId(1), UploadRowId(2), UploadRowId(3)],
        };
        let line = snapshot_text_entry(&snapshot);
        assert!(line.contains("Q3 comparison"));
        assert!(line.contains('7'));
        assert!(line.contains('3'));
    }

    #[test]
    fn cli_parses_normalize_run_with_defaults() {
        let cli = Cli::parse_from(["catalog-cli", "normalize-run"]);
        match cli.command {
            Command::NormalizeRun { table, client_id, .. } => {
                assert_eq!(table, DEFAULT_SOURCE_TABLE);
                assert_eq!(client_id, 1);
            }
            other => panic!("expected NormalizeRun, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_snapshot_create_with_repeated_upload_flags() {
        let cli = Cli::parse_from(["catalog-cli", "snapshot", "create", "release-1", "--upload", "1", "--upload", "2"]);
        match cli.command {
            Command::Snapshot(SnapshotCommand::Create { uploads, name, .. }) => {
                assert_eq!(name, "release-1");
                assert_eq!(uploads, vec![1, 2]);
            }
            other => panic!("expected Snapshot(Create), got {other:?}"),
        }
    }
}
