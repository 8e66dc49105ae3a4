pub mod cli;
pub mod decoder;
pub mod error;
pub mod export;
pub mod headers;
pub mod hierarchy;
pub mod model;
pub mod repair;
pub mod row;
pub mod store;
pub mod upsert;

use std::{
    env, fs,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    export::ExportRequest,
    headers::AliasTable,
    store::MemoryStore,
    upsert::ImportRequest,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("territory_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Commands::Import(args) => handle_import(&args).await,
            Commands::Export(args) => handle_export(&args).await,
            Commands::Repair(args) => handle_repair(&args).await,
        }
    })
}

fn load_aliases(path: Option<&Path>) -> Result<AliasTable> {
    match path {
        Some(path) => AliasTable::load(path),
        None => Ok(AliasTable::builtin()),
    }
}

fn write_json<T: serde::Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => fs::write(path, rendered + "\n")
            .with_context(|| format!("Writing summary to {path:?}")),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}")?;
            Ok(())
        }
    }
}

async fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let bytes = fs::read(&args.input).with_context(|| format!("Reading input {:?}", args.input))?;
    let store = MemoryStore::load_json(&args.store.store)?;
    let request = ImportRequest::new(args.store.scope.clone().unwrap_or_default())
        .simulate(args.simulate)
        .strict(!args.lenient)
        .aliases(load_aliases(args.aliases.as_deref())?)
        .encoding(decoder::resolve_encoding(args.input_encoding.as_deref())?);
    debug!("Import options: {:?}", request.options);

    let source = args.input.display().to_string();
    let summary = upsert::import_csv(&store, &bytes, &source, &request)
        .await
        .with_context(|| format!("Importing {:?}", args.input))?;
    if args.simulate {
        info!("Simulation only; store {:?} left untouched", args.store.store);
    } else {
        store.save_json(&args.store.store)?;
    }
    write_json(&summary, args.summary.as_deref())
}

async fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let store = MemoryStore::load_json(&args.store.store)?;
    let mut request = ExportRequest::new(args.store.scope.clone().unwrap_or_default());
    request.sub_area_id = args.sub_area.clone();
    request.region_id = args.region.clone();

    let bytes = export::export_csv(&store, &request)
        .await
        .context("Exporting addresses")?;
    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Writing export to {path:?}"))?;
            info!("Export written to {path:?}");
        }
        None => io::stdout().lock().write_all(&bytes)?,
    }
    Ok(())
}

async fn handle_repair(args: &cli::RepairArgs) -> Result<()> {
    let store = MemoryStore::load_json(&args.store.store)?;
    let scope = args.store.scope.clone().unwrap_or_default();
    let report = repair::merge_duplicate_sub_areas(&store, &scope)
        .await
        .context("Repairing duplicate sub-areas")?;
    store.save_json(&args.store.store)?;
    write_json(&report, None)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
