use serde::Serialize;
use std::fmt;

use crate::table::MalformedBuffer;

/// One decoded object detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    /// Confidence, nominally 0.0..=1.0.
    pub score: f32,
    /// Present only when the record tagged the box as a 2D box.
    pub bounding_box: Option<BoundingBox>,
}

/// Box edges in pixel coordinates of the source image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Union discriminant of the per-object bounding-box field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundingBoxType {
    None,
    BoundingBox2d,
    Other(u8),
}

impl From<u8> for BoundingBoxType {
    fn from(tag: u8) -> Self {
        match tag {
            0 => BoundingBoxType::None,
            1 => BoundingBoxType::BoundingBox2d,
            other => BoundingBoxType::Other(other),
        }
    }
}

/// Non-fatal observations made while decoding one record.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    NoPerception,
    NoDetectedObjects,
    ObjectCount(usize),
    EntrySkipped {
        index: usize,
        error: MalformedBuffer,
    },
    NoInferenceResults,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NoPerception => write!(f, "no perception data"),
            Diagnostic::NoDetectedObjects => write!(f, "no detected objects"),
            Diagnostic::ObjectCount(count) => write!(f, "detected object count: {}", count),
            Diagnostic::EntrySkipped { index, error } => {
                write!(f, "error while processing object {}: {}", index, error)
            }
            Diagnostic::NoInferenceResults => write!(f, "no inference results"),
        }
    }
}

/// Result of decoding one detection record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedRecord {
    /// Detections in record order.
    pub detections: Vec<Detection>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedRecord {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
