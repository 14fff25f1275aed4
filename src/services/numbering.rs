//! Document number generation.
//!
//! Numbers follow `{PREFIX}.{company:02}{branch:03}.{yy}.{seq:04}`, with the
//! sequence parsed from the trailing segment of the latest number issued for
//! the same branch and year. The sequence is not gap-free and carries no
//! cryptographic meaning; a unique index on the number column backs up
//! concurrent creation, and the caller retries on a duplicate-key failure.

use chrono::{DateTime, Datelike, Utc};

pub const PURCHASE_ORDER_PREFIX: &str = "PO";
pub const PURCHASE_INVOICE_PREFIX: &str = "PI";
pub const PURCHASE_RETURN_PREFIX: &str = "PR";
pub const GOODS_RECEIPT_PREFIX: &str = "GR";

/// Series shared by all documents of one type, branch and year, e.g.
/// `PI.01001.26.`. Used both for formatting and as a `LIKE`-prefix filter
/// when looking up the latest issued number.
pub fn series_prefix(
    doc_prefix: &str,
    company_id: i32,
    branch_id: i32,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{doc_prefix}.{:02}{:03}.{:02}.",
        company_id,
        branch_id,
        at.year() % 100
    )
}

/// Next number in the series given the latest existing one (if any).
///
/// The trailing segment of `latest` is parsed as the sequence; anything
/// unparsable falls back to restarting the series at 1.
pub fn next_in_series(series: &str, latest: Option<&str>) -> String {
    let next = latest
        .and_then(|number| number.rsplit('.').next())
        .and_then(|segment| segment.parse::<u32>().ok())
        .map(|seq| seq + 1)
        .unwrap_or(1);
    format!("{series}{next:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn series_prefix_pads_company_and_branch() {
        let at = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        assert_eq!(series_prefix("PO", 1, 1, at), "PO.01001.26.");
        assert_eq!(series_prefix("PI", 12, 345, at), "PI.12345.26.");
    }

    #[test]
    fn sequence_starts_at_one_and_increments() {
        assert_eq!(next_in_series("PO.01001.26.", None), "PO.01001.26.0001");
        assert_eq!(
            next_in_series("PO.01001.26.", Some("PO.01001.26.0041")),
            "PO.01001.26.0042"
        );
    }

    #[test]
    fn garbage_latest_restarts_the_series() {
        assert_eq!(
            next_in_series("PO.01001.26.", Some("PO.01001.26.xx")),
            "PO.01001.26.0001"
        );
    }

    proptest! {
        #[test]
        fn next_always_parses_back(seq in 1u32..999_999) {
            let series = "PR.02007.26.";
            let latest = format!("{series}{seq:04}");
            let next = next_in_series(series, Some(&latest));
            let parsed: u32 = next.rsplit('.').next().unwrap().parse().unwrap();
            prop_assert_eq!(parsed, seq + 1);
        }
    }
}
