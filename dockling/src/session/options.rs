//! Session configuration.

use crate::labels::{self, Labels};
use dockling_shared::{DocklingError, DocklingResult, Transport};
use serde::{Deserialize, Serialize};

// ============================================================================
// Session Options
// ============================================================================

/// Configuration of a test session.
///
/// Labels are kept in their "KEY=VALUE" form and only checked when the
/// session gets created, so options loaded from a file are validated the same
/// way as options built in code.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Engine endpoint.
    ///
    /// Default: `DOCKER_HOST` when set, otherwise the local engine socket.
    #[serde(default)]
    pub transport: Option<Transport>,

    /// Labels attached to every container and network created in the
    /// session, in "KEY=VALUE" or "KEY=" form.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Label identifying containers and networks to remove before and after
    /// the session, in "KEY=VALUE" or "KEY=" form.
    ///
    /// This label is also attached to everything created in the session.
    #[serde(default)]
    pub auto_cleaning: Option<String>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to the engine at the given endpoint.
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Add a label to attach to containers and networks.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Remove left-over containers and networks carrying `label` when the
    /// session is created and closed.
    pub fn auto_cleaning(mut self, label: impl Into<String>) -> Self {
        self.auto_cleaning = Some(label.into());
        self
    }

    /// Check the options, returning the effective session labels and
    /// auto-cleaning filter.
    pub(crate) fn resolve(&self) -> DocklingResult<ResolvedOptions> {
        let mut labels = labels::make_labels(&self.labels)?;

        let auto_cleaning = match &self.auto_cleaning {
            Some(label) => {
                let (key, value) = labels::parse_label(label).map_err(|_| {
                    DocklingError::Config(format!(
                        "auto cleaning label must be in format \"KEY=\" or \"KEY=VALUE\", got {:?}",
                        label
                    ))
                })?;
                // Filter on just the key when there is no value.
                let filter = if value.is_empty() {
                    key.clone()
                } else {
                    format!("{}={}", key, value)
                };
                labels.insert(key, value);
                Some(filter)
            }
            None => None,
        };

        Ok(ResolvedOptions {
            labels,
            auto_cleaning,
        })
    }
}

/// Validated session options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ResolvedOptions {
    pub labels: Labels,
    /// Label filter selecting entities to auto-clean.
    pub auto_cleaning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_cleaning_label_is_added_to_session_labels() {
        let resolved = SessionOptions::new()
            .label("foo=bar")
            .auto_cleaning("dockling.test=")
            .resolve()
            .unwrap();

        assert_eq!(resolved.labels.len(), 2);
        assert_eq!(resolved.labels["dockling.test"], "");
        assert_eq!(resolved.auto_cleaning.as_deref(), Some("dockling.test"));
    }

    #[test]
    fn auto_cleaning_filter_keeps_value() {
        let resolved = SessionOptions::new()
            .auto_cleaning("suite=run-42")
            .resolve()
            .unwrap();
        assert_eq!(resolved.auto_cleaning.as_deref(), Some("suite=run-42"));
    }

    #[test]
    fn invalid_labels_are_rejected() {
        let err = SessionOptions::new()
            .labels(["ok=", "=nope"])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, DocklingError::Config(_)));

        let err = SessionOptions::new()
            .auto_cleaning("nope")
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("auto cleaning label"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: SessionOptions = serde_json::from_str(
            r#"{"labels": ["team=qa"], "transport": {"Unix": {"socket_path": "/run/docker.sock"}}}"#,
        )
        .unwrap();
        assert_eq!(opts.labels, vec!["team=qa".to_string()]);
        assert!(opts.auto_cleaning.is_none());
        assert_eq!(opts.transport, Some(Transport::unix("/run/docker.sock")));
    }
}
