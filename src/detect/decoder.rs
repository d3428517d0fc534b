//! Detection record decoder.
//!
//! Record shape:
//!
//! ```text
//! Root        { 0: perception -> Perception }
//! Perception  { 0: object_detection_list -> [GeneralObject] }
//! GeneralObject {
//!     0: class_id          u32   (default 0)
//!     1: bounding_box_type u8    (default 0, 1 = BoundingBox2d)
//!     2: bounding_box      union (table reference)
//!     3: score             f32   (default 0.0)
//! }
//! BoundingBox2d { 0: left, 1: top, 2: right, 3: bottom  i32 (default 0) }
//! ```

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::result::{BoundingBox, BoundingBoxType, DecodedRecord, Detection, Diagnostic};
use crate::table::{self, Table, TableResult};

mod slot {
    pub const ROOT_PERCEPTION: usize = 0;
    pub const PERCEPTION_OBJECT_LIST: usize = 0;

    pub const OBJECT_CLASS_ID: usize = 0;
    pub const OBJECT_BBOX_TYPE: usize = 1;
    pub const OBJECT_BBOX: usize = 2;
    pub const OBJECT_SCORE: usize = 3;

    pub const BOX_LEFT: usize = 0;
    pub const BOX_TOP: usize = 1;
    pub const BOX_RIGHT: usize = 2;
    pub const BOX_BOTTOM: usize = 3;
}

/// Decodes one serialized detection record.
///
/// Fails only when the root or list structure itself cannot be read. A corrupt object
/// entry is logged, recorded as [`Diagnostic::EntrySkipped`] and left out; an empty
/// result is a normal outcome.
pub fn decode_detections(buf: &[u8]) -> TableResult<DecodedRecord> {
    let mut record = DecodedRecord::default();
    let root = table::root(buf)?;

    let perception_offset = root.field_offset(slot::ROOT_PERCEPTION)?;
    let Some(perception) = root.read_indirect_table(perception_offset)? else {
        record.diagnostics.push(Diagnostic::NoPerception);
        return Ok(record);
    };

    let list = perception.field_offset(slot::PERCEPTION_OBJECT_LIST)?;
    if list.is_absent() {
        record.diagnostics.push(Diagnostic::NoDetectedObjects);
        return Ok(record);
    }

    let count = perception.read_vector_len(list)?;
    record.diagnostics.push(Diagnostic::ObjectCount(count));

    for index in 0..count {
        let entry = perception
            .read_vector_element(list, index)
            .and_then(|object| decode_object(&object));
        match entry {
            Ok(detection) => record.detections.push(detection),
            Err(error) => {
                log::warn!("skipping detection entry {}: {}", index, error);
                record
                    .diagnostics
                    .push(Diagnostic::EntrySkipped { index, error });
            }
        }
    }

    if record.detections.is_empty() {
        record.diagnostics.push(Diagnostic::NoInferenceResults);
    }
    Ok(record)
}

/// Decodes the base64 "O" field of an inference record.
pub fn decode_base64_record(encoded: &str) -> Result<DecodedRecord> {
    let buf = BASE64
        .decode(encoded.trim())
        .context("decode base64 inference payload")?;
    let record = decode_detections(&buf)?;
    Ok(record)
}

fn decode_object(object: &Table<'_>) -> TableResult<Detection> {
    let class_id = object.get::<u32>(slot::OBJECT_CLASS_ID, 0)?;
    let score = object.get::<f32>(slot::OBJECT_SCORE, 0.0)?;
    let bbox_type = BoundingBoxType::from(object.get::<u8>(slot::OBJECT_BBOX_TYPE, 0)?);

    let bounding_box = match bbox_type {
        BoundingBoxType::BoundingBox2d => {
            let offset = object.field_offset(slot::OBJECT_BBOX)?;
            match object.read_union(offset)? {
                Some(bbox) => Some(decode_box(&bbox)?),
                None => None,
            }
        }
        BoundingBoxType::None | BoundingBoxType::Other(_) => None,
    };

    Ok(Detection {
        class_id,
        score,
        bounding_box,
    })
}

fn decode_box(bbox: &Table<'_>) -> TableResult<BoundingBox> {
    Ok(BoundingBox {
        left: bbox.get::<i32>(slot::BOX_LEFT, 0)?,
        top: bbox.get::<i32>(slot::BOX_TOP, 0)?,
        right: bbox.get::<i32>(slot::BOX_RIGHT, 0)?,
        bottom: bbox.get::<i32>(slot::BOX_BOTTOM, 0)?,
    })
}
