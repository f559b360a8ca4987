use anyhow::{Context, Result};
use sing_geoip::input::InputFormat;
use sing_geoip::{build_database, BuildConfig, RecordSize, Variant};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Arguments of the `build` subcommand
pub struct BuildArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codes: Vec<String>,
    pub format: Option<String>,
    pub variants: Vec<String>,
    pub database_type: String,
    pub record_size: String,
    pub build_epoch: Option<u64>,
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
    let mut config = BuildConfig::new(&args.input, &args.output).with_codes(&args.codes);
    config.database_type = args.database_type;
    config.build_epoch = args.build_epoch;

    config.input_format = args
        .format
        .as_deref()
        .map(str::parse::<InputFormat>)
        .transpose()
        .context("Invalid --format")?;

    let bits: u64 = args
        .record_size
        .parse()
        .with_context(|| format!("Invalid record size: {}", args.record_size))?;
    config.record_size = RecordSize::from_bits(bits)?;

    for raw in &args.variants {
        let variant: Variant = raw
            .parse()
            .with_context(|| format!("Invalid --variant: {}", raw))?;
        config = config.with_variant(variant);
    }

    debug!(?config, "build configuration");
    info!("Reading {}", args.input.display());

    let start = Instant::now();
    let reports = build_database(&config)
        .with_context(|| format!("Failed to build {}", args.output.display()))?;

    for report in &reports {
        info!(
            path = %report.path.display(),
            incremental = report.incremental,
            prefixes = report.inserted,
            forks = report.forks,
            bytes = report.bytes,
            "wrote database"
        );
        debug!("  codes:     {}", report.codes.join(","));
        debug!("  languages: {}", report.languages.join(","));
    }
    info!("Done in {:.2?}", start.elapsed());

    Ok(())
}
