//! Receipt text normalization and item extraction
//!
//! The OCR collaborator returns either a single undivided text block or
//! pre-split lines; both shapes are reduced to the same `Vec<LineItem>`.
//! A line or match whose amount fails numeric parsing is a non-match,
//! not an error.

use regex::Regex;

use crate::models::LineItem;

/// Noise tokens that disqualify a line (case-insensitive substring match):
/// totals, tax markers, payment-method markers, courtesy phrases, date and
/// ticket markers.
const BLACKLIST: &[&str] = &["total", "tva", "cb", "carte", "merci", "date", "ticket"];

/// Filter raw OCR lines down to candidate item lines.
///
/// Order-preserving and pure: drops lines with no digit and lines
/// containing a blacklisted token.
pub fn normalize_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| l.chars().any(|c| c.is_ascii_digit()))
        .filter(|l| {
            let lower = l.to_lowercase();
            !BLACKLIST.iter().any(|word| lower.contains(word))
        })
        .map(str::to_string)
        .collect()
}

/// Extract items from pre-split lines: a trailing-price pattern
/// `<label> <digits>[.,]<two digits>` with an optional currency symbol.
pub fn extract_from_lines(lines: &[String]) -> Vec<LineItem> {
    let re = Regex::new(r"^(?P<label>.+?)\s+(?P<amount>\d+[.,]\d{2})\s*€?$").expect("valid regex");

    lines
        .iter()
        .filter_map(|line| {
            let caps = re.captures(line.trim())?;
            let amount = parse_amount(&caps["amount"])?;
            Some(LineItem {
                label: caps["label"].trim().to_string(),
                amount,
            })
        })
        .collect()
}

/// Extract items from one undivided text block: repeated
/// `<quantity> <uppercase/accented description> <amount.2dp>` runs.
/// The quantity field is discarded.
pub fn extract_from_block(text: &str) -> Vec<LineItem> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let re = Regex::new(r"(\d+)\s+([A-ZÀ-ÿ0-9\s]+?)\s+(\d+[.,]\d{2})").expect("valid regex");

    re.captures_iter(text)
        .filter_map(|caps| {
            let amount = parse_amount(&caps[3])?;
            Some(LineItem {
                label: caps[2].trim().to_string(),
                amount,
            })
        })
        .collect()
}

/// Parse an amount string, normalizing the decimal comma.
/// Returns None on malformed input (the caller skips the match).
fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_drops_lines_without_digits() {
        assert!(normalize_lines(&lines(&["no digits here"])).is_empty());
        assert_eq!(
            normalize_lines(&lines(&["Lait 1.20"])),
            vec!["Lait 1.20".to_string()]
        );
    }

    #[test]
    fn test_normalize_drops_blacklisted_lines() {
        let input = lines(&[
            "Pain 2.50",
            "TOTAL: 7.10",
            "TVA 20% 1.42",
            "CARTE BANCAIRE 7.10",
            "Merci de votre visite 123",
            "Lait 1.20",
        ]);
        assert_eq!(
            normalize_lines(&input),
            vec!["Pain 2.50".to_string(), "Lait 1.20".to_string()]
        );
    }

    #[test]
    fn test_normalize_preserves_order() {
        let input = lines(&["Lait 1.20", "Pain 2.50"]);
        assert_eq!(normalize_lines(&input), input);
    }

    #[test]
    fn test_extract_line_with_currency_symbol() {
        let items = extract_from_lines(&lines(&["Pain 2.50€"]));
        assert_eq!(
            items,
            vec![LineItem {
                label: "Pain".into(),
                amount: 2.50
            }]
        );
    }

    #[test]
    fn test_extract_line_comma_decimal() {
        let items = extract_from_lines(&lines(&["Café au lait 3,40"]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "Café au lait");
        assert_eq!(items[0].amount, 3.40);
    }

    #[test]
    fn test_extract_line_requires_two_decimals() {
        assert!(extract_from_lines(&lines(&["Pain 2.5"])).is_empty());
        assert!(extract_from_lines(&lines(&["Pain 2"])).is_empty());
    }

    #[test]
    fn test_blacklisted_total_yields_nothing_after_normalization() {
        let cleaned = normalize_lines(&lines(&["TOTAL: 7.10€"]));
        assert!(extract_from_lines(&cleaned).is_empty());
    }

    #[test]
    fn test_extract_block_discards_quantity() {
        let items = extract_from_block("1 PAIN COMPLET 2.50 2 LAIT DEMI 1,20");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "PAIN COMPLET");
        assert_eq!(items[0].amount, 2.50);
        assert_eq!(items[1].label, "LAIT DEMI");
        assert_eq!(items[1].amount, 1.20);
    }

    #[test]
    fn test_extract_block_accented_labels() {
        let items = extract_from_block("3 CRÈME FRAÎCHE 4,95");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "CRÈME FRAÎCHE");
    }

    #[test]
    fn test_extract_block_empty_text() {
        assert!(extract_from_block("").is_empty());
        assert!(extract_from_block("   ").is_empty());
    }
}
