use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kinspect::Session;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "kinspect")]
#[command(about = "Kernel memory image inspector")]
struct Args {
    /// Raw memory dump
    #[arg(short, long)]
    image: PathBuf,

    /// Segment map describing which addresses the dump covers
    #[arg(short, long)]
    map: PathBuf,

    /// Symbol and struct-layout file for the imaged kernel
    #[arg(short, long)]
    symbols: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered character devices
    Dev,
    /// Look up one task by pid
    Task { pid: i32 },
    /// List every task in the image
    Ps,
    /// Resolve a per-cpu variable to each CPU's instance
    Percpu {
        symbol: String,
        /// Resolve for a single CPU instead of all of them
        #[arg(short, long)]
        cpu: Option<u32>,
    },
    /// Show a symbol's address, type, and per-cpu classification
    Sym { name: String },
    /// Dump raw image bytes
    Hexdump {
        #[arg(value_parser = commands::parse_addr)]
        address: u64,
        size: usize,
        /// Append an ASCII gutter to each line
        #[arg(short, long)]
        ascii: bool,
    },
    /// Report which subsystems have their symbols and layouts available
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kinspect=info".parse()?))
        .init();

    let args = Args::parse();

    info!("opening image {:?}", args.image);
    let session = Session::open(&args.image, &args.map, &args.symbols)?;

    match args.command {
        Command::Dev => commands::dev::run(&session),
        Command::Task { pid } => commands::task::run(&session, pid),
        Command::Ps => commands::ps::run(&session),
        Command::Percpu { symbol, cpu } => commands::percpu::run(&session, &symbol, cpu),
        Command::Sym { name } => commands::sym::run(&session, &name),
        Command::Hexdump {
            address,
            size,
            ascii,
        } => commands::hexdump::run(&session, address, size, ascii),
        Command::Check => commands::check::run(&session),
    }
}
