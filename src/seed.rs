//! Synthetic legacy-layout fixtures for exercising retention runs.

use chrono::{Months, NaiveDate};
use log::info;

use crate::{
    layout::{format_day_stamp, KeyLayout, BACKUP_SEGMENT},
    storage::ObjectStore,
    vault_error, Result,
};

pub const SEED_STANZA: &str = "abc123";
pub const SEED_FILE: &str = "test.txt";
/// Suffix of the sibling cluster that a filtered run must leave alone.
pub const RETAIN_SUFFIX: &str = "_retain";

const SEED_MONTHS: u32 = 38;
const SEED_BODY: &[u8] = b"test";

/// First day written: three years and two months before `today`.
pub fn seed_start(today: NaiveDate) -> Result<NaiveDate> {
    today
        .checked_sub_months(Months::new(SEED_MONTHS))
        .ok_or_else(|| {
            vault_error!(InvalidParameter {
                description: format!("{today} is too early to seed from"),
            })
        })
}

/// Writes one day directory for every day in `[seed_start(today), today]`
/// for `cluster` and `{cluster}_retain`, plus each stanza's ancillary
/// files. Returns the number of objects written.
pub fn seed_legacy_backups(
    store: &dyn ObjectStore,
    key_layout: &KeyLayout,
    cluster: &str,
    today: NaiveDate,
) -> Result<usize> {
    let start = seed_start(today)?;
    let mut written = 0;
    for name in [cluster.to_string(), format!("{cluster}{RETAIN_SUFFIX}")] {
        let stanza_prefix = format!(
            "{}{name}/{BACKUP_SEGMENT}/{SEED_STANZA}/",
            key_layout.root_prefix()
        );
        for ancillary in [
            format!("backup.history/{SEED_FILE}"),
            "backup.info".to_string(),
            "backup.info.copy".to_string(),
        ] {
            store.put_object(&format!("{stanza_prefix}{ancillary}"), SEED_BODY.to_vec(), None)?;
            written += 1;
        }
        for day in start.iter_days().take_while(|day| *day <= today) {
            let key = format!(
                "{stanza_prefix}{}-000000F/{SEED_FILE}",
                format_day_stamp(day)
            );
            store.put_object(&key, SEED_BODY.to_vec(), None)?;
            written += 1;
        }
        info!("Seeded {stanza_prefix} from {start} to {today}");
    }
    Ok(written)
}
