use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const REFERENCE_PREFIX: &str = "CM";

/// Human-facing order reference, e.g. `CM-20240611-3FA85F64`.
/// Uniqueness is ultimately enforced by the `orders.reference` index.
pub fn generate_reference(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}-{}", REFERENCE_PREFIX, now.format("%Y%m%d"), suffix)
}
