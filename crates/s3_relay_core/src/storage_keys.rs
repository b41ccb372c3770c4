/// Formats a partition date as `YYYY/MM/DD`.
pub fn date_partition(year: i32, month: u32, day: u32) -> String {
    format!("{year:04}/{month:02}/{day:02}")
}

/// `{target_prefix}/{YYYY/MM/DD}/{source_key}`. The full source key is kept so
/// distinct sources never collide on the same destination.
pub fn destination_object_key(target_prefix: &str, date_partition: &str, source_key: &str) -> String {
    let trimmed = target_prefix.trim_end_matches('/');
    format!("{trimmed}/{date_partition}/{source_key}")
}
