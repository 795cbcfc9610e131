//! Regex-based extraction of raw counter values from tool output.

use regex::Regex;

/// Extract an integer from the first capture group of `pattern`.
///
/// Dots are removed from the text before matching and every non-digit of the
/// captured group is dropped, so `1.234.567` and `1,234,567` both read as
/// `1234567`.
pub fn parse_int(pattern: &str, text: &str) -> Option<u64> {
    let regex = Regex::new(pattern).ok()?;
    let text = text.replace('.', "");
    let group = regex.captures(&text)?.get(1)?;
    let digits: String = group
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Extract a float from the first capture group of `pattern`.
///
/// A comma is read as the decimal separator.
pub fn parse_float(pattern: &str, text: &str) -> Option<f64> {
    let regex = Regex::new(pattern).ok()?;
    let group = regex.captures(text)?.get(1)?;
    group.as_str().trim().replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_perf_line() {
        let text = "\n Performance counter stats for './a.out':\n\n     1,234,567      cycles\n";
        assert_eq!(parse_int("(.*)cycles", text), Some(1_234_567));
    }

    #[test]
    fn test_parse_int_dotted_thousands() {
        assert_eq!(parse_int("(.*)slots", "   9.876.543   slots"), Some(9_876_543));
    }

    #[test]
    fn test_parse_int_missing() {
        assert_eq!(parse_int("(.*)topdown-retiring", "nothing here"), None);
        assert_eq!(parse_int("(.*)cycles", "   cycles"), None, "no digits captured");
    }

    #[test]
    fn test_parse_int_gus_format() {
        let text = "EXECUTION TIME: 4242 cycles\n";
        assert_eq!(parse_int("EXECUTION TIME:(.*)cycles", text), Some(4242));
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("IPC:(.*)", "IPC: 1,5"), Some(1.5));
        assert_eq!(parse_float("IPC:(.*)", "IPC: 2.25"), Some(2.25));
        assert_eq!(parse_float("IPC:(.*)", "IPC: n/a"), None);
    }
}
