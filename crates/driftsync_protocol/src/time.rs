//! Wall-clock helpers.

use chrono::Utc;

/// Returns the current wall-clock time in epoch milliseconds.
///
/// All local timestamps (`created_at`, `updated_at`, `last_accessed_at`,
/// operation enqueue times) use this representation.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2024() {
        // 2024-01-01T00:00:00Z
        assert!(now_ms() > 1_704_067_200_000);
    }
}
