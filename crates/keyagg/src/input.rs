//! Reading `key,value` records from text.

use keyagg_core::scalar::ScalarValue;
use keyagg_core::source::Record;
use keyagg_error::{AggError, ErrorKind, Result};

/// Parse records from `key,value` lines.
///
/// The value is everything after the first comma, with its type inferred.
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_records(content: &str) -> Result<Vec<Record<String, ScalarValue>>> {
    let mut records = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once(',').ok_or_else(|| {
            AggError::new("Expected a line in the form 'key,value'")
                .with_kind(ErrorKind::InvalidArgument)
                .with_field("line", line_idx + 1)
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(AggError::new("Record key cannot be empty")
                .with_kind(ErrorKind::InvalidArgument)
                .with_field("line", line_idx + 1));
        }

        records.push(Record::new(key.to_string(), ScalarValue::parse_inferred(value)));
    }

    Ok(records)
}

/// Small dataset used when no input file is given.
pub fn sample_records() -> Vec<Record<String, ScalarValue>> {
    [
        ("k1", 1),
        ("k1", 2),
        ("k1", 3),
        ("k1", 4),
        ("k1", 5),
        ("k2", 1),
        ("k2", 2),
        ("k2", 6),
        ("k2", 7),
        ("k2", 8),
        ("k3", 10),
        ("k3", 12),
        ("k3", 30),
        ("k3", 32),
    ]
    .into_iter()
    .map(|(key, value)| Record::new(key.to_string(), ScalarValue::Int64(value)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_comments_and_blanks() {
        let content = "# header\n\nk1, 4\nk2,2.5\n  k1,-7  \n";
        let records = parse_records(content).unwrap();

        let expected = vec![
            Record::new("k1".to_string(), ScalarValue::Int64(4)),
            Record::new("k2".to_string(), ScalarValue::Float64(2.5)),
            Record::new("k1".to_string(), ScalarValue::Int64(-7)),
        ];
        assert_eq!(expected, records);
    }

    #[test]
    fn non_numeric_value_kept_as_string() {
        let records = parse_records("k1,abc").unwrap();
        assert_eq!(ScalarValue::Utf8("abc".to_string()), records[0].value);
    }

    #[test]
    fn missing_comma() {
        let err = parse_records("k1,1\nk2 2\n").unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
        assert_eq!(Some("2"), err.get_field("line"));
    }

    #[test]
    fn empty_key() {
        let err = parse_records(" ,1").unwrap_err();
        assert_eq!(ErrorKind::InvalidArgument, err.kind());
    }

    #[test]
    fn sample_has_three_keys() {
        let records = sample_records();
        assert_eq!(14, records.len());
        let mut keys: Vec<_> = records.iter().map(|r| r.key.as_str()).collect();
        keys.dedup();
        assert_eq!(vec!["k1", "k2", "k3"], keys);
    }
}
