use std::path::PathBuf;
use std::str::FromStr;

use voice_journal_schemas::defaults;

use crate::error::{JournalError, Result};

/// Policy knobs for batch extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionConfig {
    /// Rescale 0-100 confidences into [0, 1]
    pub normalize_confidence: bool,
    /// Segments below this confidence get `needs_review`
    pub review_threshold: f64,
    /// Segments below this confidence are dropped
    pub min_confidence: f64,
    /// Order by type priority, then confidence descending
    pub sort_by_type: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            normalize_confidence: true,
            review_threshold: defaults::REVIEW_THRESHOLD,
            min_confidence: defaults::MIN_CONFIDENCE,
            sort_by_type: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    pub max_transcript_length: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_transcript_length: defaults::MAX_TRANSCRIPT_LENGTH,
        }
    }
}

/// Service configuration assembled from `JOURNAL_*` environment variables
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub listen_addr: String,
    pub extraction: ExtractionConfig,
    pub storage: StorageConfig,
    pub max_retries: u32,
}

impl ServiceConfig {
    pub const DEFAULT_ADDR: &'static str = "127.0.0.1:21960";
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup("JOURNAL_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path(lookup("HOME"))?,
        };

        let listen_addr = lookup("JOURNAL_ADDR").unwrap_or_else(|| Self::DEFAULT_ADDR.to_string());

        let mut extraction = ExtractionConfig::default();
        if let Some(threshold) = parse_var::<f64>(&lookup, "JOURNAL_REVIEW_THRESHOLD")? {
            extraction.review_threshold = threshold;
        }
        if let Some(min) = parse_var::<f64>(&lookup, "JOURNAL_MIN_CONFIDENCE")? {
            extraction.min_confidence = min;
        }
        if let Some(sort) = parse_var::<bool>(&lookup, "JOURNAL_SORT_BY_TYPE")? {
            extraction.sort_by_type = sort;
        }

        let mut storage = StorageConfig::default();
        if let Some(max) = parse_var::<usize>(&lookup, "JOURNAL_MAX_TRANSCRIPT_LEN")? {
            storage.max_transcript_length = max;
        }

        let max_retries = parse_var::<u32>(&lookup, "JOURNAL_MAX_RETRIES")?
            .unwrap_or(Self::DEFAULT_MAX_RETRIES);

        Ok(Self {
            db_path,
            listen_addr,
            extraction,
            storage,
            max_retries,
        })
    }
}

fn default_db_path(home: Option<String>) -> Result<PathBuf> {
    let home = home.ok_or_else(|| {
        JournalError::Validation("JOURNAL_DB_PATH or HOME must be set".to_string())
    })?;
    Ok(PathBuf::from(home).join(".local/share/voice-journal/journal.db"))
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| JournalError::Validation(format!("{} has invalid value {:?}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[("HOME", "/home/jo")])).unwrap();

        assert_eq!(
            config.db_path,
            PathBuf::from("/home/jo/.local/share/voice-journal/journal.db")
        );
        assert_eq!(config.listen_addr, ServiceConfig::DEFAULT_ADDR);
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(config.storage.max_transcript_length, 10_000);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("JOURNAL_DB_PATH", "/tmp/j.db"),
            ("JOURNAL_ADDR", "0.0.0.0:8080"),
            ("JOURNAL_REVIEW_THRESHOLD", "0.7"),
            ("JOURNAL_MIN_CONFIDENCE", "0.2"),
            ("JOURNAL_SORT_BY_TYPE", "true"),
            ("JOURNAL_MAX_TRANSCRIPT_LEN", "500"),
            ("JOURNAL_MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/j.db"));
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.extraction.review_threshold, 0.7);
        assert_eq!(config.extraction.min_confidence, 0.2);
        assert!(config.extraction.sort_by_type);
        assert!(config.extraction.normalize_confidence);
        assert_eq!(config.storage.max_transcript_length, 500);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ServiceConfig::from_lookup(lookup_from(&[
            ("HOME", "/home/jo"),
            ("JOURNAL_MAX_RETRIES", "lots"),
        ]))
        .unwrap_err();

        assert!(matches!(err, JournalError::Validation(_)));
    }

    #[test]
    fn test_missing_home_without_db_path() {
        let err = ServiceConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, JournalError::Validation(_)));
    }
}
