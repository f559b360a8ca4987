use anyhow::{Context, Result};
use serde_json::json;
use sing_geoip::Database;
use std::path::PathBuf;

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let metadata = db.metadata();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "size": db.size(),
            "data_section_size": db.data_section_size(),
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database:        {}", database.display());
    println!("Size:            {} bytes", db.size());
    println!();
    println!("Metadata:");
    println!("  Database type: {}", metadata.database_type);
    println!(
        "  Format:        {}.{}",
        metadata.binary_format_major_version, metadata.binary_format_minor_version
    );
    println!("  Build epoch:   {}", metadata.build_epoch);
    println!("  IP version:    IPv{}", metadata.ip_version);
    println!("  Node count:    {}", metadata.node_count);
    println!("  Record size:   {} bits", metadata.record_size);
    println!("  Data section:  {} bytes", db.data_section_size());
    println!("  Languages:     {}", metadata.languages.join(", "));
    if !metadata.description.is_empty() {
        println!("  Description:");
        for (lang, text) in &metadata.description {
            println!("    {}: {}", lang, text);
        }
    }

    Ok(())
}
