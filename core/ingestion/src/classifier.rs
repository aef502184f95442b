use chrono::Utc;
use voice_journal_schemas::{defaults, ConfidenceLevel, ProcessedSegment, RawSegment, SegmentType};

use crate::config::ExtractionConfig;
use crate::error::{JournalError, Result};

/// Resolve a free-form classifier label to its canonical segment type.
///
/// Matching is case-insensitive and ignores surrounding whitespace.
pub fn validate_segment_type(raw: &str) -> Result<SegmentType> {
    let label = raw.trim().to_lowercase();
    match label.as_str() {
        "todo" | "todos" | "task" => Ok(SegmentType::Todo),
        "idea" | "ideas" => Ok(SegmentType::Idea),
        "learning" | "learnings" | "note" => Ok(SegmentType::Learning),
        "accomplishment" => Ok(SegmentType::Accomplishment),
        _ => Err(JournalError::InvalidSegmentType(raw.to_string())),
    }
}

/// Bring a classifier confidence onto the [0, 1] scale.
///
/// Values already inside [0, 1] pass through untouched; anything else is read
/// as a percentage. Missing or NaN confidences become the neutral default.
pub fn normalize_confidence(raw: Option<f64>) -> f64 {
    let value = match raw {
        Some(v) if !v.is_nan() => v,
        _ => return defaults::NEUTRAL_CONFIDENCE,
    };

    if (0.0..=1.0).contains(&value) {
        return value;
    }

    (value / 100.0).clamp(0.0, 1.0)
}

pub fn confidence_level(confidence: f64) -> ConfidenceLevel {
    if confidence > defaults::HIGH_CONFIDENCE_THRESHOLD {
        ConfidenceLevel::High
    } else if confidence >= defaults::MEDIUM_CONFIDENCE_THRESHOLD {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Normalize a single raw fragment. Fails only when the type is unknown.
pub fn process_segment(raw: &RawSegment, config: &ExtractionConfig) -> Result<ProcessedSegment> {
    let segment_type = validate_segment_type(&raw.segment_type)?;

    let confidence = if config.normalize_confidence {
        normalize_confidence(raw.confidence)
    } else {
        match raw.confidence {
            Some(v) if !v.is_nan() => v.clamp(0.0, 1.0),
            _ => defaults::NEUTRAL_CONFIDENCE,
        }
    };

    Ok(ProcessedSegment {
        segment_type,
        text: raw.text.trim().to_string(),
        confidence,
        confidence_level: confidence_level(confidence),
        needs_review: confidence < config.review_threshold,
        timestamp: raw
            .timestamp
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
        priority: raw.priority.clone(),
        category: raw.category.clone(),
        topic: raw.topic.clone(),
        due_date: raw.due_date.clone(),
        metadata: raw.metadata.clone(),
    })
}
