use anyhow::{Context, Result};
use serde_json::json;
use sing_geoip::Database;
use std::net::IpAddr;
use std::path::PathBuf;

pub fn cmd_query(database: PathBuf, addresses: Vec<IpAddr>, json_output: bool, quiet: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let mut results = Vec::with_capacity(addresses.len());
    let mut found = true;
    for addr in &addresses {
        let hit = db
            .lookup(*addr)
            .with_context(|| format!("Query failed for: {}", addr))?;
        found &= hit.is_some();
        results.push((addr, hit));
    }

    if quiet {
        std::process::exit(if found { 0 } else { 1 });
    }

    if json_output {
        let items: Vec<_> = results
            .iter()
            .map(|(addr, hit)| match hit {
                Some(hit) => json!({
                    "address": addr.to_string(),
                    "code": hit.value,
                    "network": hit.network(),
                }),
                None => json!({
                    "address": addr.to_string(),
                    "code": null,
                    "network": null,
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for (addr, hit) in &results {
            match hit {
                Some(hit) => {
                    let code = hit.value.as_str().map(str::to_string).unwrap_or_else(|| {
                        serde_json::to_string(&hit.value).unwrap_or_default()
                    });
                    println!("{}\t{}\t{}", addr, code, hit.network());
                }
                None => println!("{}\t-\t-", addr),
            }
        }
    }

    // Any unassigned address makes the exit status non-zero
    std::process::exit(if found { 0 } else { 1 });
}
