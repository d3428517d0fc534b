//! Offset-indexed binary table reader.
//!
//! Reads the little-endian table layout produced by the device firmware without any
//! generated schema code. A buffer starts with a 4-byte offset to its root table. Every
//! table starts with a signed 4-byte offset back to its offset index (the "vtable"):
//!
//! ```text
//! vtable:  u16 index_len | u16 table_len | u16 slot_0 | u16 slot_1 | ...
//! table:   i32 (table_pos - vtable_pos)  | inline field bytes ...
//! ```
//!
//! A slot value of zero, or a slot beyond `index_len`, means the field was not written and
//! the caller's default applies. Nested tables, vectors and unions are reached through
//! unsigned 4-byte offsets relative to the position they are stored at.
//!
//! The reader knows nothing about the record schema; `crate::detect` wraps it in typed
//! accessors.

use std::fmt;

/// Width of an unsigned offset (`uoffset`) in bytes.
const UOFFSET_WIDTH: usize = 4;
/// Width of one offset-index slot in bytes.
const VOFFSET_WIDTH: usize = 2;
/// Bytes preceding the first slot of an offset index (index length + table length).
const VTABLE_HEADER: usize = 4;

pub type TableResult<T> = std::result::Result<T, MalformedBuffer>;

/// Format or bounds violation found while reading a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MalformedBuffer {
    /// A read of `width` bytes at `position` would extend past the end of the buffer.
    Truncated {
        position: usize,
        width: usize,
        buffer_len: usize,
    },
    /// An offset stored at `position` resolves outside the addressable range.
    BadOffset { position: usize, offset: i64 },
}

impl fmt::Display for MalformedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedBuffer::Truncated {
                position,
                width,
                buffer_len,
            } => write!(
                f,
                "malformed buffer: {}-byte read at {} exceeds buffer length {}",
                width, position, buffer_len
            ),
            MalformedBuffer::BadOffset { position, offset } => write!(
                f,
                "malformed buffer: offset {} stored at {} points outside the buffer",
                offset, position
            ),
        }
    }
}

impl std::error::Error for MalformedBuffer {}

/// Table-relative byte offset of a field. Zero means the field is absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldOffset(u16);

impl FieldOffset {
    pub const ABSENT: FieldOffset = FieldOffset(0);

    pub fn is_absent(self) -> bool {
        self.0 == 0
    }

    /// Offset value, or `None` when the field was not written.
    pub fn get(self) -> Option<u16> {
        if self.is_absent() {
            None
        } else {
            Some(self.0)
        }
    }
}

/// Fixed-width little-endian values stored inline in a table.
pub trait Scalar: Copy {
    const WIDTH: usize;
    fn from_le(bytes: &[u8]) -> Self;
}

impl Scalar for u8 {
    const WIDTH: usize = 1;
    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Scalar for u16 {
    const WIDTH: usize = 2;
    fn from_le(bytes: &[u8]) -> Self {
        u16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl Scalar for u32 {
    const WIDTH: usize = 4;
    fn from_le(bytes: &[u8]) -> Self {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl Scalar for i32 {
    const WIDTH: usize = 4;
    fn from_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl Scalar for f32 {
    const WIDTH: usize = 4;
    fn from_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Bounds-checked scalar read at an absolute buffer position.
pub fn read_at<T: Scalar>(buf: &[u8], position: usize) -> TableResult<T> {
    let end = position
        .checked_add(T::WIDTH)
        .filter(|end| *end <= buf.len())
        .ok_or(MalformedBuffer::Truncated {
            position,
            width: T::WIDTH,
            buffer_len: buf.len(),
        })?;
    Ok(T::from_le(&buf[position..end]))
}

/// Follows the unsigned offset stored at `position`.
fn follow_uoffset(buf: &[u8], position: usize) -> TableResult<usize> {
    let offset = read_at::<u32>(buf, position)?;
    position
        .checked_add(offset as usize)
        .filter(|target| *target < buf.len())
        .ok_or(MalformedBuffer::BadOffset {
            position,
            offset: offset as i64,
        })
}

/// Resolves the root table of a buffer.
pub fn root(buf: &[u8]) -> TableResult<Table<'_>> {
    let position = read_at::<u32>(buf, 0)? as usize;
    if position >= buf.len() {
        return Err(MalformedBuffer::BadOffset {
            position: 0,
            offset: position as i64,
        });
    }
    Ok(Table { buf, position })
}

/// View of one table inside a borrowed buffer.
#[derive(Clone, Copy, Debug)]
pub struct Table<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> Table<'a> {
    /// Creates a view at an absolute position. No validation happens until a field is read.
    pub fn at(buf: &'a [u8], position: usize) -> Self {
        Self { buf, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn vtable_position(&self) -> TableResult<usize> {
        let soffset = read_at::<i32>(self.buf, self.position)? as i64;
        let vtable = self.position as i64 - soffset;
        if vtable < 0 || vtable as usize >= self.buf.len() {
            return Err(MalformedBuffer::BadOffset {
                position: self.position,
                offset: soffset,
            });
        }
        Ok(vtable as usize)
    }

    /// Looks up `slot` in the table's offset index.
    ///
    /// Slots past the end of the index belong to fields added after this table was
    /// written and resolve to [`FieldOffset::ABSENT`].
    pub fn field_offset(&self, slot: usize) -> TableResult<FieldOffset> {
        let vtable = self.vtable_position()?;
        let index_len = read_at::<u16>(self.buf, vtable)? as usize;
        let entry = VTABLE_HEADER + slot * VOFFSET_WIDTH;
        if entry + VOFFSET_WIDTH > index_len {
            return Ok(FieldOffset::ABSENT);
        }
        Ok(FieldOffset(read_at::<u16>(self.buf, vtable + entry)?))
    }

    /// Reads an inline scalar at a resolved field offset.
    pub fn read_scalar<T: Scalar>(&self, offset: FieldOffset, default: T) -> TableResult<T> {
        match offset.get() {
            Some(offset) => read_at(self.buf, self.position + offset as usize),
            None => Ok(default),
        }
    }

    /// Convenience for `field_offset` followed by `read_scalar`.
    pub fn get<T: Scalar>(&self, slot: usize, default: T) -> TableResult<T> {
        let offset = self.field_offset(slot)?;
        self.read_scalar(offset, default)
    }

    /// Resolves a nested table reference. `None` when the field is absent.
    pub fn read_indirect_table(&self, offset: FieldOffset) -> TableResult<Option<Table<'a>>> {
        let Some(offset) = offset.get() else {
            return Ok(None);
        };
        let position = follow_uoffset(self.buf, self.position + offset as usize)?;
        Ok(Some(Table::at(self.buf, position)))
    }

    /// Start position and element count of a vector, with the element slots checked
    /// against the buffer end.
    fn vector_extent(&self, offset: u16) -> TableResult<(usize, usize)> {
        let start = follow_uoffset(self.buf, self.position + offset as usize)?;
        let len = read_at::<u32>(self.buf, start)? as usize;
        let first = start + UOFFSET_WIDTH;
        match len
            .checked_mul(UOFFSET_WIDTH)
            .and_then(|bytes| bytes.checked_add(first))
        {
            Some(end) if end <= self.buf.len() => Ok((start, len)),
            _ => Err(MalformedBuffer::Truncated {
                position: first,
                width: len.saturating_mul(UOFFSET_WIDTH),
                buffer_len: self.buf.len(),
            }),
        }
    }

    /// Number of elements in a vector field; zero when the field is absent.
    pub fn read_vector_len(&self, offset: FieldOffset) -> TableResult<usize> {
        let Some(offset) = offset.get() else {
            return Ok(0);
        };
        let (_, len) = self.vector_extent(offset)?;
        Ok(len)
    }

    /// Resolves element `index` of a vector of table references.
    pub fn read_vector_element(&self, offset: FieldOffset, index: usize) -> TableResult<Table<'a>> {
        let Some(offset) = offset.get() else {
            return Err(MalformedBuffer::BadOffset {
                position: self.position,
                offset: 0,
            });
        };
        let (start, len) = self.vector_extent(offset)?;
        if index >= len {
            return Err(MalformedBuffer::BadOffset {
                position: start,
                offset: index as i64,
            });
        }
        let element = start + UOFFSET_WIDTH + index * UOFFSET_WIDTH;
        let position = follow_uoffset(self.buf, element)?;
        Ok(Table::at(self.buf, position))
    }

    /// Resolves a union member table.
    ///
    /// Which layout the returned table has is decided by a discriminant field the caller
    /// read beforehand; the reader does not interpret it.
    pub fn read_union(&self, offset: FieldOffset) -> TableResult<Option<Table<'a>>> {
        self.read_indirect_table(offset)
    }
}
