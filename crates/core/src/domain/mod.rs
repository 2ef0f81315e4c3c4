pub mod credit;
pub mod customer;
pub mod pricing;
pub mod product;

use chrono::{DateTime, Utc};

/// Tombstone convention shared by every persisted record that is never hard-deleted.
///
/// Stores filter on this in one place so individual read paths never repeat the check.
pub trait SoftDelete {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_live(&self) -> bool {
        self.deleted_at().is_none()
    }
}
