#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use aitrios_monitor::remote::{CommandOutcome, ImageEntry, Inference};
use aitrios_monitor::{ConnectionState, DeviceService, OperationState};

// -------------------- record fixtures --------------------

/// Field value of a fixture table. `None` slots are left out of the offset index.
pub enum Value {
    U8(u8),
    U32(u32),
    I32(i32),
    F32(f32),
    Table(TableSpec),
    Vector(Vec<TableSpec>),
}

#[derive(Default)]
pub struct TableSpec {
    pub slots: Vec<Option<Value>>,
}

impl TableSpec {
    pub fn new(slots: Vec<Option<Value>>) -> Self {
        Self { slots }
    }
}

/// Serialized fixture plus the positions of every vector element offset, so tests can
/// corrupt individual entries.
pub struct EncodedRecord {
    pub bytes: Vec<u8>,
    pub element_slots: Vec<usize>,
}

/// Writes tables parent-first; reference fields are patched once the child is placed.
struct Writer {
    buf: Vec<u8>,
    element_slots: Vec<usize>,
}

impl Writer {
    fn pad_to(&mut self, align: usize) {
        while self.buf.len() % align != 0 {
            self.buf.push(0);
        }
    }

    fn patch_uoffset(&mut self, at: usize, target: usize) {
        let rel = (target - at) as u32;
        self.buf[at..at + 4].copy_from_slice(&rel.to_le_bytes());
    }

    fn write_table(&mut self, spec: &TableSpec) -> usize {
        let mut field_offsets = Vec::with_capacity(spec.slots.len());
        let mut cursor = 4usize;
        for slot in &spec.slots {
            match slot {
                None => field_offsets.push(0u16),
                Some(value) => {
                    field_offsets.push(cursor as u16);
                    cursor += match value {
                        Value::U8(_) => 1,
                        _ => 4,
                    };
                }
            }
        }

        self.pad_to(2);
        let vtable = self.buf.len();
        let index_len = (4 + 2 * spec.slots.len()) as u16;
        self.buf.extend_from_slice(&index_len.to_le_bytes());
        self.buf.extend_from_slice(&(cursor as u16).to_le_bytes());
        for offset in &field_offsets {
            self.buf.extend_from_slice(&offset.to_le_bytes());
        }

        self.pad_to(4);
        let table = self.buf.len();
        self.buf
            .extend_from_slice(&((table - vtable) as i32).to_le_bytes());

        let mut pending = Vec::new();
        for slot in spec.slots.iter().flatten() {
            match slot {
                Value::U8(v) => self.buf.push(*v),
                Value::U32(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
                Value::I32(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
                Value::F32(v) => self.buf.extend_from_slice(&v.to_le_bytes()),
                Value::Table(_) | Value::Vector(_) => {
                    pending.push((self.buf.len(), slot));
                    self.buf.extend_from_slice(&[0; 4]);
                }
            }
        }

        for (at, child) in pending {
            let target = match child {
                Value::Table(spec) => self.write_table(spec),
                Value::Vector(items) => self.write_vector(items),
                _ => unreachable!(),
            };
            self.patch_uoffset(at, target);
        }
        table
    }

    fn write_vector(&mut self, items: &[TableSpec]) -> usize {
        self.pad_to(4);
        let start = self.buf.len();
        self.buf
            .extend_from_slice(&(items.len() as u32).to_le_bytes());
        let first = self.buf.len();
        self.buf.resize(first + 4 * items.len(), 0);
        for (index, item) in items.iter().enumerate() {
            let at = first + 4 * index;
            self.element_slots.push(at);
            let target = self.write_table(item);
            self.patch_uoffset(at, target);
        }
        start
    }
}

pub fn encode(root: &TableSpec) -> EncodedRecord {
    let mut writer = Writer {
        buf: vec![0; 4],
        element_slots: Vec::new(),
    };
    let root_pos = writer.write_table(root);
    writer.patch_uoffset(0, root_pos);
    EncodedRecord {
        bytes: writer.buf,
        element_slots: writer.element_slots,
    }
}

/// One detected object as the device would encode it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectSpec {
    pub class_id: Option<u32>,
    pub bbox_type: Option<u8>,
    pub bbox: Option<[i32; 4]>,
    pub score: Option<f32>,
}

impl ObjectSpec {
    pub fn new(class_id: u32, score: f32) -> Self {
        Self {
            class_id: Some(class_id),
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn with_box(mut self, bbox: [i32; 4]) -> Self {
        self.bbox_type = Some(1);
        self.bbox = Some(bbox);
        self
    }

    fn to_table(self) -> TableSpec {
        let bbox = self.bbox.map(|[l, t, r, b]| {
            Value::Table(TableSpec::new(vec![
                Some(Value::I32(l)),
                Some(Value::I32(t)),
                Some(Value::I32(r)),
                Some(Value::I32(b)),
            ]))
        });
        TableSpec::new(vec![
            self.class_id.map(Value::U32),
            self.bbox_type.map(Value::U8),
            bbox,
            self.score.map(Value::F32),
        ])
    }
}

pub fn encode_record(objects: &[ObjectSpec]) -> EncodedRecord {
    let list = objects.iter().map(|o| o.to_table()).collect();
    let perception = TableSpec::new(vec![Some(Value::Vector(list))]);
    encode(&TableSpec::new(vec![Some(Value::Table(perception))]))
}

pub fn encode_record_base64(objects: &[ObjectSpec]) -> String {
    BASE64.encode(encode_record(objects).bytes)
}

// -------------------- images --------------------

pub fn png_base64(width: u32, height: u32, color: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png fixture");
    BASE64.encode(bytes)
}

pub fn inference(t: &str, payload: Option<String>) -> Inference {
    Inference {
        timestamp: Some(t.to_string()),
        payload,
    }
}

// -------------------- fake service --------------------

#[derive(Default)]
pub struct CallCounts {
    pub device_state: AtomicUsize,
    pub image_directories: AtomicUsize,
    pub latest_image: AtomicUsize,
    pub inference_results: AtomicUsize,
    pub start_inference: AtomicUsize,
    pub stop_inference: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        [
            &self.device_state,
            &self.image_directories,
            &self.latest_image,
            &self.inference_results,
            &self.start_inference,
            &self.stop_inference,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// In-memory `DeviceService` with scripted answers.
pub struct FakeService {
    pub state: Mutex<std::result::Result<(ConnectionState, OperationState), String>>,
    pub directories: Mutex<Vec<String>>,
    pub image: Mutex<Option<ImageEntry>>,
    pub inferences: Mutex<Vec<Inference>>,
    pub command: Mutex<CommandOutcome>,
    pub last_batch: AtomicUsize,
    pub last_sub_directory: Mutex<Option<String>>,
    pub calls: CallCounts,
}

impl FakeService {
    pub fn new(connection: ConnectionState, operation: OperationState) -> Self {
        Self {
            state: Mutex::new(Ok((connection, operation))),
            directories: Mutex::new(Vec::new()),
            image: Mutex::new(None),
            inferences: Mutex::new(Vec::new()),
            command: Mutex::new(CommandOutcome {
                result: "SUCCESS".into(),
                message: "accepted".into(),
            }),
            last_batch: AtomicUsize::new(0),
            last_sub_directory: Mutex::new(None),
            calls: CallCounts::default(),
        }
    }

    pub fn fail_state(&self, message: &str) {
        *self.state.lock().unwrap() = Err(message.to_string());
    }

    pub fn set_state(&self, connection: ConnectionState, operation: OperationState) {
        *self.state.lock().unwrap() = Ok((connection, operation));
    }
}

impl DeviceService for FakeService {
    fn device_state(&self) -> Result<(ConnectionState, OperationState)> {
        self.calls.device_state.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    fn image_directories(&self) -> Result<Vec<String>> {
        self.calls.image_directories.fetch_add(1, Ordering::SeqCst);
        Ok(self.directories.lock().unwrap().clone())
    }

    fn latest_image(&self, sub_directory: &str) -> Result<Option<ImageEntry>> {
        self.calls.latest_image.fetch_add(1, Ordering::SeqCst);
        *self.last_sub_directory.lock().unwrap() = Some(sub_directory.to_string());
        Ok(self.image.lock().unwrap().clone())
    }

    fn inference_results(&self, count: usize) -> Result<Vec<Inference>> {
        self.calls.inference_results.fetch_add(1, Ordering::SeqCst);
        self.last_batch.store(count, Ordering::SeqCst);
        Ok(self.inferences.lock().unwrap().clone())
    }

    fn start_inference(&self) -> Result<CommandOutcome> {
        self.calls.start_inference.fetch_add(1, Ordering::SeqCst);
        Ok(self.command.lock().unwrap().clone())
    }

    fn stop_inference(&self) -> Result<CommandOutcome> {
        self.calls.stop_inference.fetch_add(1, Ordering::SeqCst);
        Ok(self.command.lock().unwrap().clone())
    }
}
