//! Moving vault references between devices: single-vault links and backups.

pub mod backup;
pub mod link;

pub use backup::{plan_restore, restore, BackupContents, RestorePlan, RestoreSummary};
pub use link::{backup_url, decode_access_token, encode_access_token, share_url};
