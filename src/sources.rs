use anyhow::Result;

use crate::config::Config;

pub fn list_sources(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!("{:<10} {:<8} {:<10} CATALOG URL", "ACRONYM", "TRACKED", "COMPLIANCE");
    for source in &config.sources {
        let overall = catalog_harvester_core::compliance::overall_compliance(&source.requirements);
        println!(
            "{:<10} {:<8} {:<10.3} {}",
            source.acronym, source.compliance_tracked, overall, source.catalog_url
        );
    }
    println!("{} source(s)", config.sources.len());

    Ok(())
}
