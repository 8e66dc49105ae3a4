use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Reconcile territory spreadsheets against a document store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a CSV export, creating or updating regions, sub-areas and addresses
    Import(ImportArgs),
    /// Export addresses as a CSV file the importer accepts
    Export(ExportArgs),
    /// Merge single-digit sub-areas into their zero-padded siblings
    Repair(RepairArgs),
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// JSON snapshot of the document store (created when missing)
    #[arg(long = "store")]
    pub store: PathBuf,
    /// Owner scope all reads and writes are confined to
    #[arg(long = "scope")]
    pub scope: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file to import
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub store: StoreArgs,
    /// Run every lookup and decision without writing to the store
    #[arg(long)]
    pub simulate: bool,
    /// Record failing rows and keep going instead of aborting on the first one
    #[arg(long)]
    pub lenient: bool,
    /// YAML file with additional header aliases (`canonicalKey: [alias, ...]`)
    #[arg(long)]
    pub aliases: Option<PathBuf>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write the JSON summary to this file instead of stdout
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Only export addresses of this sub-area id
    #[arg(long = "sub-area")]
    pub sub_area: Option<String>,
    /// Only export addresses of this region id (ignored when --sub-area is given)
    #[arg(long = "region")]
    pub region: Option<String>,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RepairArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
