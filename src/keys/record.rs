// src/keys/record.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// On-disk timestamp layout of the key file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the key file: `access_key,timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub access_key: String,
    pub timestamp: String,
}

impl Record {
    pub fn new(access_key: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            access_key: access_key.into(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Key cut to `width` characters with an ellipsis, for compact listings.
    pub fn short_key(&self, width: usize) -> String {
        if self.access_key.chars().count() <= width {
            return self.access_key.clone();
        }
        let head: String = self.access_key.chars().take(width).collect();
        format!("{}...", head)
    }
}

/// Newest first. The fixed-width timestamp layout sorts correctly as text.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    #[test]
    fn formats_timestamp() {
        let r = Record::new("123", at(7, 5, 3));
        assert_eq!(r.timestamp, "2024-03-09 07:05:03");
    }

    #[test]
    fn short_key_abbreviates_long_keys_only() {
        let r = Record::new("1".repeat(44), at(0, 0, 0));
        assert_eq!(r.short_key(20), format!("{}...", "1".repeat(20)));
        let r = Record::new("abc", at(0, 0, 0));
        assert_eq!(r.short_key(20), "abc");
    }

    #[test]
    fn sorts_newest_first() {
        let mut rs = vec![
            Record::new("a", at(9, 0, 0)),
            Record::new("b", at(11, 0, 0)),
            Record::new("c", at(10, 0, 0)),
        ];
        sort_newest_first(&mut rs);
        let keys: Vec<_> = rs.iter().map(|r| r.access_key.as_str()).collect();
        assert_eq!(keys, ["b", "c", "a"]);
    }
}
