use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use bionty_registry::catalog::FileCatalog;
use bionty_registry::config::{ConfigLoader, ResolvedConfig};
use bionty_registry::error::RegistryError;
use bionty_registry::output::{JsonOutput, OutputMode, TextOutput};
use bionty_registry::registry::{Registry, ResolveOptions};
use bionty_registry::store::JsonStore;

#[derive(Parser)]
#[command(name = "bionty-reg")]
#[command(about = "Resolve biological labels against a local registry and reference catalogs")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Get or create records for a list of values")]
    Resolve(ResolveArgs),
    #[command(about = "List known record types")]
    Types,
}

#[derive(Args)]
struct ResolveArgs {
    record_type: String,

    field: String,

    values: Vec<String>,

    #[arg(long, help = "Read additional values from a file, one per line")]
    values_file: Option<String>,

    #[arg(long)]
    organism: Option<String>,

    #[arg(long)]
    from_catalog: bool,

    #[arg(long, help = "Persist created records to the store")]
    save: bool,

    #[arg(long)]
    store: Option<String>,

    #[arg(long)]
    catalog_dir: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RegistryError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RegistryError) -> u8 {
    match error {
        RegistryError::Validation(_)
        | RegistryError::UnknownRecordType(_)
        | RegistryError::AmbiguousScope { .. }
        | RegistryError::MissingConfig => 2,
        RegistryError::StoreQuery(_) | RegistryError::StoreConflict { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve(args) => run_resolve(args, config, output_mode),
        Commands::Types => {
            let mut types = config.types.iter().collect::<Vec<_>>();
            types.sort_by(|a, b| a.name.cmp(&b.name));
            match output_mode {
                OutputMode::Json => JsonOutput::print_types(&types).into_diagnostic(),
                OutputMode::Text => TextOutput::print_types(&types).into_diagnostic(),
            }
        }
    }
}

fn load_config(path: Option<&str>) -> miette::Result<ResolvedConfig> {
    match ConfigLoader::resolve(path) {
        Ok(config) => Ok(config),
        Err(RegistryError::MissingConfig) => {
            ConfigLoader::resolve_config(Default::default()).map_err(Into::into)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_resolve(
    args: ResolveArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let store_path = match args.store.map(Utf8PathBuf::from).or(config.store_path) {
        Some(path) => path,
        None => JsonStore::default_path()?,
    };
    let catalog_dir = args
        .catalog_dir
        .map(Utf8PathBuf::from)
        .or(config.catalog_dir)
        .unwrap_or_else(|| Utf8PathBuf::from("catalogs"));

    let store = JsonStore::open(&store_path)?;
    let mut registry = Registry::new(store, FileCatalog::new(catalog_dir))
        .with_types(config.types)
        .with_default_scope(config.organism)
        .with_settings(config.settings);

    let mut values = args.values.into_iter().map(Some).collect::<Vec<_>>();
    if let Some(path) = args.values_file {
        let content = fs::read_to_string(&path)
            .map_err(|err| RegistryError::Filesystem(format!("{path}: {err}")))?;
        values.extend(content.lines().map(|line| Some(line.trim().to_string())));
    }

    let field = registry.field(&args.record_type, &args.field)?;
    let mut options = ResolveOptions::new();
    options.from_catalog = args.from_catalog;
    options.scope = args.organism;

    let mut outcome = registry.get_or_create_records(values, &field, &options)?;
    if args.save {
        outcome.records = registry.save(outcome.records)?;
    }

    match output_mode {
        OutputMode::Json => JsonOutput::print_outcome(&outcome).into_diagnostic(),
        OutputMode::Text => TextOutput::print_outcome(&outcome).into_diagnostic(),
    }
}
