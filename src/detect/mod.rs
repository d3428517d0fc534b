mod decoder;
mod result;

pub use decoder::{decode_base64_record, decode_detections};
pub use result::{BoundingBox, BoundingBoxType, DecodedRecord, Detection, Diagnostic};
