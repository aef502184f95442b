use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use voice_journal_schemas::{ConfidenceLevel, ProcessedSegment, RawSegment, SegmentType};

use crate::classifier::process_segment;
use crate::config::ExtractionConfig;
use crate::error::{JournalError, Result};

/// Classifier output in either of the shapes callers hand us
#[derive(Debug, Clone)]
pub enum ClassifierResponse<'a> {
    /// Still-encoded JSON text
    Encoded(&'a str),
    /// Already-decoded JSON value
    Decoded(Value),
}

impl<'a> From<&'a str> for ClassifierResponse<'a> {
    fn from(raw: &'a str) -> Self {
        ClassifierResponse::Encoded(raw)
    }
}

impl From<Value> for ClassifierResponse<'_> {
    fn from(value: Value) -> Self {
        ClassifierResponse::Decoded(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub todo: usize,
    pub idea: usize,
    pub learning: usize,
    pub accomplishment: usize,
}

impl TypeCounts {
    pub fn get(&self, segment_type: SegmentType) -> usize {
        match segment_type {
            SegmentType::Todo => self.todo,
            SegmentType::Idea => self.idea,
            SegmentType::Learning => self.learning,
            SegmentType::Accomplishment => self.accomplishment,
        }
    }

    fn bump(&mut self, segment_type: SegmentType) {
        match segment_type {
            SegmentType::Todo => self.todo += 1,
            SegmentType::Idea => self.idea += 1,
            SegmentType::Learning => self.learning += 1,
            SegmentType::Accomplishment => self.accomplishment += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregate view over a batch of processed segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total: usize,
    pub by_type: TypeCounts,
    pub by_confidence_level: ConfidenceCounts,
    pub needs_review: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub segments: Vec<ProcessedSegment>,
    pub stats: ExtractionStats,
    /// Fragments dropped because they were malformed or had an unknown type
    pub skipped: usize,
    /// Fragments dropped for falling under the minimum confidence
    pub filtered: usize,
    /// Transcript carried alongside the segments, when the payload had one
    pub transcript: Option<String>,
}

/// Turns a batch of loosely-typed classifier fragments into canonical segments
#[derive(Debug, Clone, Default)]
pub struct SegmentExtractor {
    config: ExtractionConfig,
}

impl SegmentExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process every fragment independently; bad fragments are skipped
    pub fn extract_segments(&self, raws: &[RawSegment]) -> ExtractionResult {
        let mut segments = Vec::with_capacity(raws.len());
        let mut skipped = 0;
        let mut filtered = 0;

        for (index, raw) in raws.iter().enumerate() {
            let processed = match process_segment(raw, &self.config) {
                Ok(processed) => processed,
                Err(e) => {
                    warn!("Skipping segment {}: {}", index, e);
                    skipped += 1;
                    continue;
                }
            };

            if processed.confidence < self.config.min_confidence {
                debug!(
                    "Filtering segment {} ({}): confidence {:.2} below {:.2}",
                    index, processed.segment_type, processed.confidence, self.config.min_confidence
                );
                filtered += 1;
                continue;
            }

            segments.push(processed);
        }

        if self.config.sort_by_type {
            sort_by_type_then_confidence(&mut segments);
        }

        let stats = calculate_stats(&segments);

        debug!(
            "Extracted {} segments ({} skipped, {} filtered)",
            stats.total, skipped, filtered
        );

        ExtractionResult {
            segments,
            stats,
            skipped,
            filtered,
            transcript: None,
        }
    }

    /// Validate a classifier payload's shape, then extract its segments.
    ///
    /// The payload must be an object with a `segments` array. Elements that
    /// don't decode as a segment are skipped like any other bad fragment.
    pub fn parse_and_extract<'a>(
        &self,
        input: impl Into<ClassifierResponse<'a>>,
    ) -> Result<ExtractionResult> {
        let value = match input.into() {
            ClassifierResponse::Encoded(raw) => {
                serde_json::from_str::<Value>(raw).map_err(JournalError::Parse)?
            }
            ClassifierResponse::Decoded(value) => value,
        };

        let object = value.as_object().ok_or_else(|| {
            JournalError::InvalidResponseStructure("payload is not an object".to_string())
        })?;

        let items = match object.get("segments") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(JournalError::InvalidResponseStructure(
                    "\"segments\" is not an array".to_string(),
                ))
            }
            None => {
                return Err(JournalError::InvalidResponseStructure(
                    "missing \"segments\" field".to_string(),
                ))
            }
        };

        let mut raws = Vec::with_capacity(items.len());
        let mut malformed = 0;
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value::<RawSegment>(item.clone()) {
                Ok(raw) => raws.push(raw),
                Err(e) => {
                    warn!("Skipping malformed segment {}: {}", index, e);
                    malformed += 1;
                }
            }
        }

        let mut result = self.extract_segments(&raws);
        result.skipped += malformed;
        result.transcript = object
            .get("transcript")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(result)
    }
}

/// Pure aggregation; an empty batch yields all-zero counts
pub fn calculate_stats(segments: &[ProcessedSegment]) -> ExtractionStats {
    let mut stats = ExtractionStats {
        total: segments.len(),
        ..Default::default()
    };

    for segment in segments {
        stats.by_type.bump(segment.segment_type);
        match segment.confidence_level {
            ConfidenceLevel::High => stats.by_confidence_level.high += 1,
            ConfidenceLevel::Medium => stats.by_confidence_level.medium += 1,
            ConfidenceLevel::Low => stats.by_confidence_level.low += 1,
        }
        if segment.needs_review {
            stats.needs_review += 1;
        }
    }

    stats
}

fn sort_by_type_then_confidence(segments: &mut [ProcessedSegment]) {
    segments.sort_by(|a, b| {
        a.segment_type
            .sort_rank()
            .cmp(&b.segment_type.sort_rank())
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(segment_type: &str, text: &str, confidence: Option<f64>) -> RawSegment {
        RawSegment {
            segment_type: segment_type.to_string(),
            text: text.to_string(),
            confidence,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_types_are_skipped_not_fatal() {
        let extractor = SegmentExtractor::default();
        let result = extractor.extract_segments(&[
            raw("todo", "Buy milk", Some(0.9)),
            raw("meeting", "Standup", Some(0.9)),
            raw("idea", "Solar roof", Some(0.7)),
        ]);

        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.segments[0].text, "Buy milk");
        assert_eq!(result.segments[1].text, "Solar roof");
    }

    #[test]
    fn test_min_confidence_filters_after_normalization() {
        let extractor = SegmentExtractor::new(ExtractionConfig {
            min_confidence: 0.6,
            ..Default::default()
        });
        let result = extractor.extract_segments(&[
            raw("todo", "keep", Some(65.0)),
            raw("todo", "drop", Some(40.0)),
            raw("todo", "neutral", None),
        ]);

        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "keep");
        assert_eq!(result.filtered, 2);
    }

    #[test]
    fn test_original_order_preserved_without_sorting() {
        let extractor = SegmentExtractor::default();
        let result = extractor.extract_segments(&[
            raw("accomplishment", "a", Some(0.9)),
            raw("todo", "b", Some(0.2)),
            raw("learning", "c", Some(0.5)),
        ]);

        let texts: Vec<&str> = result.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_by_type_then_confidence_desc() {
        let extractor = SegmentExtractor::new(ExtractionConfig {
            sort_by_type: true,
            ..Default::default()
        });
        let result = extractor.extract_segments(&[
            raw("accomplishment", "acc", Some(0.9)),
            raw("learning", "lrn", Some(0.9)),
            raw("todo", "todo-low", Some(0.4)),
            raw("idea", "idea", Some(0.6)),
            raw("todo", "todo-high", Some(0.95)),
        ]);

        let texts: Vec<&str> = result.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["todo-high", "todo-low", "idea", "lrn", "acc"]);
    }

    #[test]
    fn test_stats_on_empty_batch() {
        let stats = calculate_stats(&[]);
        assert_eq!(stats, ExtractionStats::default());
        for segment_type in SegmentType::ALL {
            assert_eq!(stats.by_type.get(segment_type), 0);
        }
    }

    #[test]
    fn test_stats_counts() {
        let extractor = SegmentExtractor::default();
        let result = extractor.extract_segments(&[
            raw("todo", "a", Some(0.9)),
            raw("todo", "b", Some(0.6)),
            raw("idea", "c", Some(0.3)),
            raw("note", "d", None),
        ]);

        let stats = result.stats;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_type.todo, 2);
        assert_eq!(stats.by_type.idea, 1);
        assert_eq!(stats.by_type.learning, 1);
        assert_eq!(stats.by_type.accomplishment, 0);
        assert_eq!(stats.by_confidence_level.high, 1);
        assert_eq!(stats.by_confidence_level.medium, 2);
        assert_eq!(stats.by_confidence_level.low, 1);
        assert_eq!(stats.needs_review, 1);
    }

    #[test]
    fn test_parse_and_extract_from_text() {
        let extractor = SegmentExtractor::default();
        let result = extractor
            .parse_and_extract(
                r#"{"transcript": "Finish report", "segments": [{"type": "todo", "text": "Finish report", "priority": "high"}]}"#,
            )
            .unwrap();

        assert_eq!(result.transcript.as_deref(), Some("Finish report"));
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].priority.as_deref(), Some("high"));
    }

    #[test]
    fn test_parse_and_extract_from_value_skips_malformed_items() {
        let extractor = SegmentExtractor::default();
        let result = extractor
            .parse_and_extract(json!({
                "segments": [
                    {"type": "idea", "text": "Garden app"},
                    {"type": "todo"},
                    42,
                    {"type": "unknown", "text": "?"}
                ]
            }))
            .unwrap();

        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.skipped, 3);
        assert!(result.transcript.is_none());
    }

    #[test]
    fn test_parse_and_extract_structure_errors() {
        let extractor = SegmentExtractor::default();

        let err = extractor.parse_and_extract(json!({"transcript": "x"})).unwrap_err();
        assert!(matches!(err, JournalError::InvalidResponseStructure(_)));

        let err = extractor.parse_and_extract(json!({"segments": "todo"})).unwrap_err();
        assert!(matches!(err, JournalError::InvalidResponseStructure(_)));

        let err = extractor.parse_and_extract(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, JournalError::InvalidResponseStructure(_)));
    }

    #[test]
    fn test_parse_and_extract_malformed_text_is_parse_error() {
        let extractor = SegmentExtractor::default();
        let err = extractor.parse_and_extract("{\"segments\": [").unwrap_err();
        assert!(matches!(err, JournalError::Parse(_)));
    }
}
