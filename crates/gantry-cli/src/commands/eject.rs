use gantry_build::DockerfileGenerator;
use gantry_build::template::DEFAULT_TEMPLATE;
use gantry_core::{DependencyManifest, GantryConfig};
use std::path::PathBuf;

pub async fn eject() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let config = GantryConfig::load(&project_dir)?;
    let manifest = DependencyManifest::load(&project_dir, &config.build.manifest)?;

    let dockerfile = DockerfileGenerator::new(&config, &manifest).render()?;
    let written = gantry_build::eject::eject(&project_dir, &dockerfile, DEFAULT_TEMPLATE)?;

    for path in &written {
        println!("Ejected {}", path.display());
    }
    println!("Edit them directly. gantry build and gantry deploy will use these files.");
    Ok(())
}
