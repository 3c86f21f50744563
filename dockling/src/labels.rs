//! Parsing of "KEY=VALUE" labels.

use dockling_shared::DocklingError;
use std::collections::HashMap;
use thiserror::Error;

/// Labels as key-value pairs.
pub type Labels = HashMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("label must be in format \"KEY=\" or \"KEY=VALUE\", got {0:?}")]
pub struct LabelError(pub String);

impl From<LabelError> for DocklingError {
    fn from(err: LabelError) -> Self {
        DocklingError::Config(err.to_string())
    }
}

/// Split a label into key and (possibly empty) value.
pub fn parse_label(label: &str) -> Result<(String, String), LabelError> {
    match label.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(LabelError(label.to_string())),
    }
}

/// Add a single label, replacing an existing value for the same key.
pub fn add_label(labels: &mut Labels, label: &str) -> Result<(), LabelError> {
    let (key, value) = parse_label(label)?;
    labels.insert(key, value);
    Ok(())
}

/// Build a label map, failing on the first invalid label.
pub fn make_labels<I, S>(labels: I) -> Result<Labels, LabelError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = Labels::new();
    for label in labels {
        add_label(&mut map, label.as_ref())?;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("foo=bar", "foo", "bar")]
    #[case("foo=", "foo", "")]
    #[case("foo=bar=baz", "foo", "bar=baz")]
    #[case("dockling.test=", "dockling.test", "")]
    fn accepts_valid_labels(#[case] label: &str, #[case] key: &str, #[case] value: &str) {
        assert_eq!(
            parse_label(label).unwrap(),
            (key.to_string(), value.to_string())
        );
    }

    #[rstest]
    #[case("")]
    #[case("=")]
    #[case("=bar")]
    #[case("foo")]
    fn rejects_invalid_labels(#[case] label: &str) {
        assert_eq!(parse_label(label), Err(LabelError(label.to_string())));
    }

    #[test]
    fn later_labels_win() {
        let labels = make_labels(["foo=bar", "baz=", "foo=qux"]).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["foo"], "qux");
        assert_eq!(labels["baz"], "");
    }

    #[test]
    fn invalid_label_becomes_config_error() {
        let err: DocklingError = make_labels(["ok=", "broken"]).unwrap_err().into();
        assert!(matches!(err, DocklingError::Config(msg) if msg.contains("\"broken\"")));
    }
}
