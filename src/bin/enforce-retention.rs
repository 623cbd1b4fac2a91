use clap::Parser;
use log::info;

use bridgevault::{
    cli::{archive_client, archive_store, load_config, CommonArgs},
    layout::Layout,
    retention::{RetentionEnforcer, RetentionOptions, MAX_UNATTENDED_DELETIONS},
    utils::s3::create_runtime,
    Result,
};

#[derive(Parser)]
#[command(
    name = "enforce-retention",
    version,
    author,
    about = "Delete archived backup days that fall outside the retention policy.",
    long_about = r#"Delete archived backup days that fall outside the retention policy.

Only the first and third Saturday of each month within the last three years
are kept. A run refuses to delete more than three directories of one stanza
unless --clean-up is given.

Examples:
  # Show what would be deleted
  enforce-retention -f vault.yaml --dry-run

  # Prune one cluster in the v2 layout
  enforce-retention -f vault.yaml --layout v2 --cluster aspireprod"#
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Bucket to prune. Defaults to archive.bucket from the config.
    #[arg(long = "bucket")]
    bucket: Option<String>,

    /// Only prune this cluster.
    #[arg(long = "cluster")]
    cluster: Option<String>,

    /// Allow more than three deletions per stanza.
    #[arg(long = "clean-up", default_value_t = false)]
    clean_up: bool,

    /// Print the prefixes that would be deleted.
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,

    #[arg(long = "layout", value_enum, default_value_t = Layout::Legacy)]
    layout: Layout,
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let args = Args::parse();
    let config = load_config(&args.common)?;
    let bucket = args.bucket.as_deref().unwrap_or(&config.archive.bucket);

    let runtime = create_runtime()?;
    let client = archive_client(&config.storage, &runtime)?;
    let store = archive_store(&client, bucket, &runtime);

    let today = chrono::Utc::now().date_naive();
    info!(
        "Enforcing retention on s3://{bucket}/{} (limit {MAX_UNATTENDED_DELETIONS} per stanza)",
        config.archive.namespace
    );
    let enforcer = RetentionEnforcer::new(&store, config.archive.key_layout(), args.layout, today);
    let report = enforcer.enforce(&RetentionOptions {
        cluster: args.cluster,
        clean_up: args.clean_up,
        dry_run: args.dry_run,
    })?;
    info!(
        "Removed {} directories ({} objects)",
        report.directories, report.objects
    );

    Ok(())
}
