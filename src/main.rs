use anyhow::{Context, Result};
use dsv_to_sqlite::{
    cli::{Cli, Commands, PolicyArgs},
    ingest::ImportOptions,
    manifest::Manifest,
    report::{import_summary, render_table},
    Store,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn open_store(manifest: &Manifest, db: Option<&Path>, fresh: bool) -> Result<Store> {
    let catalog = manifest.catalog()?;
    let store = match db {
        Some(path) if fresh => Store::create(path, catalog),
        Some(path) => Store::open(path, catalog),
        None => Store::open_in_memory(catalog),
    };
    store.context("Failed to open store")
}

fn import(manifest: &Manifest, store: &mut Store, policy: &PolicyArgs) -> Result<()> {
    let options: ImportOptions = policy.apply(manifest.options);
    let results = manifest.import_all(store, &options)?;
    println!("Imported {} sources:", results.len());
    print!("{}", import_summary(&results));
    Ok(())
}

fn run(manifest_path: PathBuf, db: Option<PathBuf>, fresh: bool, policy: PolicyArgs) -> Result<()> {
    let start = Instant::now();
    let manifest = Manifest::load(&manifest_path)?;
    let mut store = open_store(&manifest, db.as_deref(), fresh)?;

    import(&manifest, &mut store, &policy)?;

    for (report, rows) in manifest.run_reports(&store)? {
        println!();
        print!("{}", render_table(&report.title, &rows));
    }

    store.finalize()?;
    println!("\nDone in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Run {
            manifest,
            db,
            fresh,
            policy,
        } => run(manifest, db, fresh, policy)?,

        Commands::Import {
            manifest,
            db,
            fresh,
            policy,
        } => {
            let start = Instant::now();
            let loaded = Manifest::load(&manifest)?;
            let mut store = open_store(&loaded, Some(db.as_path()), fresh)?;
            import(&loaded, &mut store, &policy)?;
            store.finalize()?;
            println!("\nWrote {:?} in {:.1}s", db, start.elapsed().as_secs_f64());
        }

        Commands::Check { manifest } => {
            let loaded = Manifest::load(&manifest)?;
            let catalog = loaded.catalog()?;
            loaded.check_reports(&catalog)?;
            loaded.ordered_sources(&catalog)?;

            println!("Entities in load order:\n");
            for entity in catalog.dependency_order()? {
                println!("  {} ({} attributes)", entity.name, entity.attributes.len());
            }
            println!(
                "\n{} sources, {} reports OK",
                loaded.sources.len(),
                loaded.reports.len()
            );
        }
    }

    Ok(())
}
