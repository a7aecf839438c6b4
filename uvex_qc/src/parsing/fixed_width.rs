//! Helpers for slicing fixed-width text records.

/// Returns the trimmed text of `line[start..end]`, clamped to the line length.
///
/// Slicing works on bytes so that a stray non-UTF-8 byte in a log never
/// shifts the columns; invalid sequences are replaced.
pub fn slice(line: &str, start: usize, end: usize) -> String {
    let bytes = line.as_bytes();
    let end = end.min(bytes.len());
    if start >= end {
        return String::new();
    }
    String::from_utf8_lossy(&bytes[start..end]).trim().to_string()
}

/// Like [`slice`] with an inclusive end column.
pub fn slice_inclusive(line: &str, first: usize, last: usize) -> String {
    slice(line, first, last + 1)
}

/// Text from `start` to the end of the line.
pub fn slice_from(line: &str, start: usize) -> String {
    slice(line, start, usize::MAX)
}

/// `None` for an empty cell.
pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parses an optional float, treating empty cells and `nan` as missing.
pub fn parse_opt_f64(value: &str) -> Result<Option<f64>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|e| format!("Invalid number '{}': {}", trimmed, e))
}

/// Parses an optional unsigned count; a float such as `12.0` is accepted.
pub fn parse_opt_u32(value: &str) -> Result<Option<u32>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(n) = trimmed.parse::<u32>() {
        return Ok(Some(n));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(Some(f as u32)),
        _ => Err(format!("Invalid count '{}'", trimmed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_clamps_to_line() {
        assert_eq!(slice("abc  def", 3, 100), "def");
        assert_eq!(slice("abc", 5, 8), "");
        assert_eq!(slice_inclusive("  12345  ", 0, 4), "123");
        assert_eq!(slice_from("run 42 comment", 7), "comment");
    }

    #[test]
    fn test_parse_optional_numbers() {
        assert_eq!(parse_opt_f64(" 1.25 "), Ok(Some(1.25)));
        assert_eq!(parse_opt_f64(""), Ok(None));
        assert_eq!(parse_opt_f64("NaN"), Ok(None));
        assert!(parse_opt_f64("1.2.3").is_err());

        assert_eq!(parse_opt_u32("12"), Ok(Some(12)));
        assert_eq!(parse_opt_u32("12.0"), Ok(Some(12)));
        assert!(parse_opt_u32("-1").is_err());
        assert!(parse_opt_u32("1.5").is_err());
    }
}
