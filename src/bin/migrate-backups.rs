use clap::Parser;
use log::{error, info};

use bridgevault::{
    cli::{archive_client, archive_store, load_config, CommonArgs},
    layout::parse_day_stamp,
    migrate::{MigrationOptions, MigrationPlanner, DEFAULT_MIGRATION_STORAGE_CLASS},
    utils::s3::create_runtime,
    vault_error, Result,
};

#[derive(Parser)]
#[command(
    name = "migrate-backups",
    version,
    author,
    about = "Copy legacy archived backups into the v2 layout."
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Only migrate this cluster.
    #[arg(long = "cluster")]
    cluster: Option<String>,

    /// Only migrate the backup taken on this day (YYYYMMDD).
    #[arg(long = "target", value_name = "YYYYMMDD")]
    target: Option<String>,

    #[arg(long = "storage-class", default_value = DEFAULT_MIGRATION_STORAGE_CLASS)]
    storage_class: String,

    /// Print the copies instead of performing them.
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let args = Args::parse();
    let config = load_config(&args.common)?;
    let target = args.target.as_deref().map(parse_day_stamp).transpose()?;
    let options = MigrationOptions {
        cluster: args.cluster,
        target,
        storage_class: args.storage_class,
        dry_run: args.dry_run,
    };

    let runtime = create_runtime()?;
    let client = archive_client(&config.storage, &runtime)?;

    let mut failed = Vec::new();
    for bucket in config.archive.migration_buckets() {
        info!("Migrating backups in s3://{bucket}");
        let store = archive_store(&client, &bucket, &runtime);
        let planner = MigrationPlanner::new(&store, config.archive.key_layout());
        let report = planner.migrate(&options)?;
        info!(
            "s3://{bucket}: {} days, {} copies",
            report.days, report.copies
        );
        failed.extend(report.failed);
    }

    if !failed.is_empty() {
        for prefix in &failed {
            error!("Not migrated: {prefix}");
        }
        return Err(vault_error!(MalformedManifest {
            description: format!("{} backup days could not be migrated", failed.len()),
        }));
    }

    Ok(())
}
