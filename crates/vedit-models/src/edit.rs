//! Edit operations applied to a video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when an edit request is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("Time values must be finite and non-negative")]
    NegativeTime,

    #[error("End time must be greater than start time (start={start}, end={end})")]
    EndNotAfterStart { start: f64, end: f64 },

    #[error("Subtitle text must not be empty")]
    EmptyText,
}

/// A validated `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Validate and build a window. `end` must be strictly after `start`.
    pub fn new(start: f64, end: f64) -> Result<Self, EditError> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < 0.0 {
            return Err(EditError::NegativeTime);
        }
        if end <= start {
            return Err(EditError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One transcode operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    /// Keep only the given window of the input.
    Trim { window: TimeWindow },
    /// Burn `text` into the picture while the window is active.
    OverlayText { text: String, window: TimeWindow },
    /// Transcode into the deliverable format.
    FinalRender,
}

impl EditOperation {
    /// Build a validated trim.
    pub fn trim(start: f64, end: f64) -> Result<Self, EditError> {
        Ok(Self::Trim {
            window: TimeWindow::new(start, end)?,
        })
    }

    /// Build a validated text overlay. Surrounding whitespace is dropped.
    pub fn overlay_text(text: impl Into<String>, start: f64, end: f64) -> Result<Self, EditError> {
        let text = text.into();
        let text = text.trim();
        if text.is_empty() {
            return Err(EditError::EmptyText);
        }
        Ok(Self::OverlayText {
            text: text.to_string(),
            window: TimeWindow::new(start, end)?,
        })
    }

    /// Operation name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Trim { .. } => "trim",
            EditOperation::OverlayText { .. } => "overlay_text",
            EditOperation::FinalRender => "final_render",
        }
    }

    /// File name prefix of the artifact this operation produces.
    pub fn artifact_prefix(&self) -> &'static str {
        match self {
            EditOperation::Trim { .. } => "trimmed",
            EditOperation::OverlayText { .. } => "subtitled",
            EditOperation::FinalRender => "final",
        }
    }

    /// The time window, for operations that have one.
    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            EditOperation::Trim { window } | EditOperation::OverlayText { window, .. } => Some(window),
            EditOperation::FinalRender => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_equal_bounds() {
        assert_eq!(
            TimeWindow::new(10.0, 10.0),
            Err(EditError::EndNotAfterStart { start: 10.0, end: 10.0 })
        );
    }

    #[test]
    fn window_rejects_reversed_and_negative() {
        assert!(TimeWindow::new(15.0, 5.0).is_err());
        assert_eq!(TimeWindow::new(-1.0, 5.0), Err(EditError::NegativeTime));
        assert_eq!(TimeWindow::new(0.0, f64::NAN), Err(EditError::NegativeTime));
    }

    #[test]
    fn window_duration() {
        let window = TimeWindow::new(5.0, 15.0).unwrap();
        assert!((window.duration() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlay_requires_text() {
        assert_eq!(
            EditOperation::overlay_text("   ", 0.0, 1.0),
            Err(EditError::EmptyText)
        );
        let op = EditOperation::overlay_text("  Hello  ", 0.0, 1.0).unwrap();
        assert!(matches!(op, EditOperation::OverlayText { ref text, .. } if text == "Hello"));
    }

    #[test]
    fn artifact_prefixes() {
        assert_eq!(EditOperation::trim(0.0, 1.0).unwrap().artifact_prefix(), "trimmed");
        assert_eq!(
            EditOperation::overlay_text("x", 0.0, 1.0).unwrap().artifact_prefix(),
            "subtitled"
        );
        assert_eq!(EditOperation::FinalRender.artifact_prefix(), "final");
    }

    #[test]
    fn operation_is_tagged() {
        let json = serde_json::to_value(EditOperation::FinalRender).unwrap();
        assert_eq!(json["op"], "final_render");
    }
}
