mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{cmd_build, cmd_inspect, cmd_query, BuildArgs};

#[derive(Parser)]
#[command(name = "sing-geoip")]
#[command(
    about = "Build and query country-code GeoIP databases",
    long_about = "sing-geoip - Build compact MMDB country-code databases\n\n\
    Reads a country list (CSV 'cidr,code' rows or a JSON {code: [cidr]} object,\n\
    optionally gzip-compressed) and writes a memory-mappable MMDB file whose\n\
    values are lower-case country codes. An existing output is loaded and\n\
    extended; later entries replace overlapping earlier ones.\n\n\
    Examples:\n\
      sing-geoip build country.csv geoip.db\n\
      sing-geoip build country.json.gz geoip.db --variant geoip-only-cn-private.db=cn,private\n\
      sing-geoip query geoip.db 1.1.1.1 2001:db8::1\n\
      sing-geoip inspect geoip.db --json"
)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or extend a database from a country list
    Build {
        /// Country list, or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Database to write; extended when it already exists
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Country codes to include (default: all)
        #[arg(value_name = "CODE")]
        codes: Vec<String>,

        /// Input format: csv or json (default: from the file name)
        #[arg(long)]
        format: Option<String>,

        /// Extra fresh output as PATH or PATH=code,code (repeatable)
        #[arg(long = "variant", value_name = "PATH[=CODES]")]
        variants: Vec<String>,

        /// Database type written to metadata and required of existing outputs
        #[arg(long, default_value = "sing-geoip", env = "SING_GEOIP_DATABASE_TYPE")]
        database_type: String,

        /// Record size in bits for fresh outputs
        #[arg(long, default_value = "24", value_parser = ["24", "28", "32"])]
        record_size: String,

        /// Fixed build time in seconds since the Unix epoch
        #[arg(long, env = "SOURCE_DATE_EPOCH")]
        build_epoch: Option<u64>,
    },

    /// Look up addresses in a database
    Query {
        /// Database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 addresses
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<IpAddr>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// No output, exit status only
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show database metadata
    Inspect {
        /// Database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sing_geoip={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Build {
            input,
            output,
            codes,
            format,
            variants,
            database_type,
            record_size,
            build_epoch,
        } => cmd_build(BuildArgs {
            input,
            output,
            codes,
            format,
            variants,
            database_type,
            record_size,
            build_epoch,
        }),
        Commands::Query {
            database,
            addresses,
            json,
            quiet,
        } => cmd_query(database, addresses, json, quiet),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
    }
}
