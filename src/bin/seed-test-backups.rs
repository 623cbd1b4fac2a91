use clap::Parser;
use log::info;

use bridgevault::{
    cli::{archive_client, archive_store, load_config, CommonArgs},
    seed::seed_legacy_backups,
    utils::s3::create_runtime,
    Result,
};

#[derive(Parser)]
#[command(
    name = "seed-test-backups",
    version,
    author,
    about = "Fill a test bucket with synthetic legacy backup days."
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long = "bucket")]
    bucket: String,

    /// Cluster to seed. A sibling `{cluster}_retain` is seeded as well.
    #[arg(long = "cluster")]
    cluster: String,
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let args = Args::parse();
    let config = load_config(&args.common)?;

    let runtime = create_runtime()?;
    let client = archive_client(&config.storage, &runtime)?;
    let store = archive_store(&client, &args.bucket, &runtime);

    let today = chrono::Utc::now().date_naive();
    let written = seed_legacy_backups(&store, &config.archive.key_layout(), &args.cluster, today)?;
    info!("Wrote {written} objects to s3://{}", args.bucket);

    Ok(())
}
