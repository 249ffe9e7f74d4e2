// src/keys/extract.rs

use once_cell::sync::Lazy;
use regex::Regex;

/// Standard NF-e / NFC-e access key length.
pub const ACCESS_KEY_DIGITS: usize = 44;
/// Alternative length used by some fiscal systems.
pub const ALT_ACCESS_KEY_DIGITS: usize = 47;
/// Shortest digit run still treated as an identifier.
pub const MIN_LONG_RUN_DIGITS: usize = 20;
/// Decoded text up to this many characters is kept verbatim when no digit run matches.
pub const MAX_VERBATIM_CHARS: usize = 100;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("static regex"));

/// Pull a candidate access key out of the text carried by one QR symbol.
///
/// Rules, first hit wins:
///  1. a maximal run of exactly 44 digits
///  2. a maximal run of exactly 47 digits
///  3. any maximal run of 20 or more digits
///  4. the trimmed text itself, if it is at most 100 characters
///
/// Runs are matched on their full length, so a 45-digit run never satisfies
/// rule 1 but does satisfy rule 3.
pub fn extract_access_key(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let runs: Vec<&str> = DIGIT_RUN.find_iter(trimmed).map(|m| m.as_str()).collect();

    let exact = |len: usize| runs.iter().find(|r| r.len() == len);
    if let Some(run) = exact(ACCESS_KEY_DIGITS).or_else(|| exact(ALT_ACCESS_KEY_DIGITS)) {
        return Some(run.to_string());
    }
    if let Some(run) = runs.iter().find(|r| r.len() >= MIN_LONG_RUN_DIGITS) {
        return Some(run.to_string());
    }

    // no lower bound: short URLs and the like are kept as keys too
    if trimmed.chars().count() <= MAX_VERBATIM_CHARS {
        return Some(trimmed.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(n: usize) -> String {
        (0..n).map(|i| char::from(b'0' + (i % 10) as u8)).collect()
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        assert_eq!(extract_access_key(""), None);
        assert_eq!(extract_access_key("   \n\t "), None);
    }

    #[test]
    fn picks_44_digit_key_from_nfce_url() {
        let key = "35240612345678000190650010000123451234567890";
        assert_eq!(key.len(), 44);
        let url = format!(
            "https://www.nfce.fazenda.sp.gov.br/qrcode?p={}|2|1|1|ABCDEF0123",
            key
        );
        assert_eq!(extract_access_key(&url).as_deref(), Some(key));
    }

    #[test]
    fn exact_44_beats_earlier_longer_runs() {
        let long = digits(30);
        let key = digits(44);
        let text = format!("id={} chave={}", long, key);
        assert_eq!(extract_access_key(&text), Some(key));
    }

    #[test]
    fn exact_47_used_when_no_44() {
        let key = digits(47);
        let text = format!("ref {} end", key);
        assert_eq!(extract_access_key(&text), Some(key));
    }

    #[test]
    fn forty_five_digits_fall_through_to_long_run_rule() {
        let run = digits(45);
        let text = format!("x{}x", run);
        assert_eq!(extract_access_key(&text), Some(run));
    }

    #[test]
    fn first_long_run_wins_not_longest() {
        let first = digits(21);
        let second = digits(40);
        let text = format!("{} / {}", first, second);
        assert_eq!(extract_access_key(&text), Some(first));
    }

    #[test]
    fn short_text_returned_trimmed() {
        assert_eq!(
            extract_access_key("  https://example.com/r/42  ").as_deref(),
            Some("https://example.com/r/42")
        );
        // 19 digits is not a long run, so the whole text is kept
        assert_eq!(
            extract_access_key("1234567890123456789").as_deref(),
            Some("1234567890123456789")
        );
    }

    #[test]
    fn long_text_without_digit_run_yields_nothing() {
        let text = "a".repeat(MAX_VERBATIM_CHARS + 1);
        assert_eq!(extract_access_key(&text), None);
        let text = "a".repeat(MAX_VERBATIM_CHARS);
        assert_eq!(extract_access_key(&text), Some(text.clone()));
    }

    #[test]
    fn verbatim_limit_counts_characters_not_bytes() {
        let text = "ç".repeat(MAX_VERBATIM_CHARS);
        assert!(text.len() > MAX_VERBATIM_CHARS);
        assert_eq!(extract_access_key(&text), Some(text.clone()));
    }
}
