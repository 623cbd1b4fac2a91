use clap::Parser;
use log::info;

use bridgevault::{
    cli::{archive_client, archive_store, load_config, provider_client, provider_store, CommonArgs},
    ingest::{resolve_target, CopyOrchestrator, CopyOutcome, CopyRequest},
    provider::BackupToken,
    snitch::Snitch,
    storage::ObjectStore,
    utils::s3::create_runtime,
    Result, VaultError,
};

#[derive(Parser)]
#[command(
    name = "copy-backup",
    version,
    author,
    about = "Copy a cluster's first/third-Saturday backup into the archive.",
    long_about = r#"Copy a cluster's first/third-Saturday backup from the provider into the archive.

The backup is written to {namespace}/v2/{cluster}/{YYYYMMDD}/ with a three year
expiry. Days other than the first and third Saturday of a month are skipped.

Examples:
  # Copy today's backup
  copy-backup -f vault.yaml -c aspireprod

  # Show what a past day would copy
  copy-backup -f vault.yaml -c aspireprod -t 20230916 --dry-run"#
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(short = 'c', long = "cluster")]
    cluster: String,

    /// Backup day to copy (YYYYMMDD). Defaults to today.
    #[arg(short = 't', long = "target", value_name = "YYYYMMDD")]
    target: Option<String>,

    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let args = Args::parse();
    let config = load_config(&args.common)?;

    let today = chrono::Utc::now().date_naive();
    let target = match resolve_target(args.target.as_deref(), today) {
        Ok(target) => target,
        Err(VaultError::NotEligibleDay { date, .. }) => {
            info!("{date} is not a first or third Saturday, nothing to copy");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let runtime = create_runtime()?;
    let client = archive_client(&config.storage, &runtime)?;
    let bucket = config.archive.bucket_for(&args.cluster);
    let destination = archive_store(&client, bucket, &runtime);
    let provider = provider_client(&config)?;
    let snitch = Snitch::new(
        config.monitoring.snitches.clone(),
        config.monitoring.staging_clusters.clone(),
    )?;

    let region = config.provider()?.s3_region.clone();
    let open_source = |token: &BackupToken| -> Result<Box<dyn ObjectStore>> {
        Ok(Box::new(provider_store(token, region.as_deref(), &runtime)?))
    };

    let orchestrator = CopyOrchestrator::new(
        &provider,
        &destination,
        &open_source,
        config.archive.key_layout(),
        Some(&snitch),
    );
    let outcome = orchestrator.run(&CopyRequest {
        cluster: args.cluster,
        target,
        storage_class: config.archive.storage_class.clone(),
        staging_dir: config.archive.staging_dir.clone(),
        dry_run: args.dry_run,
    })?;
    if let CopyOutcome::Copied { objects, .. } = outcome {
        info!("Copied {objects} objects to s3://{bucket}");
    }

    Ok(())
}
