//! Detection overlay rendering.

mod glyphs;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{Rgb, RgbImage};

use crate::detect::{BoundingBox, Detection};
use glyphs::{glyph_bits, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Label list reported when a frame has nothing to annotate.
pub const NO_RESULTS_LABEL: &str = "no inference results";

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
/// Text baseline relative to the box's top-left corner.
const LABEL_OFFSET: (i32, i32) = (2, 20);

/// Per-axis factor applied to decoded coordinates before drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Default for Scale {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

impl Scale {
    fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: (bbox.left as f32 * self.x) as i32,
            top: (bbox.top as f32 * self.y) as i32,
            right: (bbox.right as f32 * self.x) as i32,
            bottom: (bbox.bottom as f32 * self.y) as i32,
        }
    }
}

/// Class table lookup with `Unknown-<id>` for ids outside the table.
pub fn class_name(class_id: u32, classes: &[String]) -> String {
    classes
        .get(class_id as usize)
        .cloned()
        .unwrap_or_else(|| format!("Unknown-{}", class_id))
}

pub fn detection_label(detection: &Detection, classes: &[String]) -> String {
    format!(
        "Class: {}, Score: {:.2}",
        class_name(detection.class_id, classes),
        detection.score
    )
}

/// Draws every boxed detection onto a copy of `image` and returns it with one label per
/// detection, in detection order. Detections without a box contribute a label only.
pub fn annotate(
    image: &RgbImage,
    detections: &[Detection],
    classes: &[String],
    scale: Scale,
) -> (RgbImage, Vec<String>) {
    let mut canvas = image.clone();
    if detections.is_empty() {
        return (canvas, vec![NO_RESULTS_LABEL.to_string()]);
    }

    let mut labels = Vec::with_capacity(detections.len());
    for detection in detections {
        let label = detection_label(detection, classes);
        if let Some(bbox) = detection.bounding_box.as_ref() {
            let bbox = scale.apply(bbox);
            for inset in 0..BOX_THICKNESS {
                draw_rectangle(
                    &mut canvas,
                    bbox.left.saturating_add(inset),
                    bbox.top.saturating_add(inset),
                    bbox.right.saturating_sub(inset),
                    bbox.bottom.saturating_sub(inset),
                    BOX_COLOR,
                );
            }
            draw_text(
                &mut canvas,
                bbox.left.saturating_add(LABEL_OFFSET.0),
                bbox.top.saturating_add(LABEL_OFFSET.1 - GLYPH_HEIGHT),
                &label,
                BOX_COLOR,
            );
        }
        labels.push(label);
    }
    (canvas, labels)
}

/// Black canvas used when the device streams detections without images.
pub fn blank_canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

/// Decodes a base64 image payload (any format the `image` crate was built with).
pub fn decode_image(encoded: &str) -> Result<RgbImage> {
    let bytes = BASE64
        .decode(encoded.trim())
        .context("decode base64 image contents")?;
    let image = image::load_from_memory(&bytes).context("decode image")?;
    Ok(image.to_rgb8())
}

fn put_pixel(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

// Edges are arbitrary device-reported i32 values; arithmetic on them saturates and
// anything outside the image is simply not drawn.
fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if right < left || bottom < top {
        return;
    }
    let x_range = left.max(-1)..=right.min(image.width() as i32);
    for x in x_range {
        put_pixel(image, x, top, color);
        put_pixel(image, x, bottom, color);
    }
    let y_range = top.max(-1)..=bottom.min(image.height() as i32);
    for y in y_range {
        put_pixel(image, left, y, color);
        put_pixel(image, right, y, color);
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars() {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        put_pixel(image, x.saturating_add(col), y.saturating_add(row as i32), color);
                    }
                }
            }
        }
        x = x.saturating_add(ADVANCE);
    }
}
