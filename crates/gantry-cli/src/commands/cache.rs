use gantry_build::CacheStore;
use gantry_core::GantryConfig;
use std::path::PathBuf;

fn store() -> anyhow::Result<CacheStore> {
    let project_dir = PathBuf::from(".");
    let config = GantryConfig::load(&project_dir)?;
    Ok(CacheStore::new(project_dir.join(&config.cache.dir)))
}

pub fn cache_list() -> anyhow::Result<()> {
    let store = store()?;
    let entries = store.entries()?;
    if entries.is_empty() {
        println!("No cache entries in {}", store.root().display());
        return Ok(());
    }
    println!("Cache entries in {}:", store.root().display());
    for entry in &entries {
        println!("  {}", entry.key);
    }
    Ok(())
}

pub fn cache_clear() -> anyhow::Result<()> {
    let store = store()?;
    store.clear()?;
    println!("Cleared {}", store.root().display());
    Ok(())
}
