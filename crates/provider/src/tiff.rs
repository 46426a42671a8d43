//! TIFF container parsing: header, first IFD, tag values.
//!
//! Handles classic TIFF and BigTIFF in either byte order. Only the first
//! image file directory is read; for a cloud-optimized GeoTIFF that is the
//! full-resolution image and it sits at the front of the file.

use crate::ByteSource;
use exposure_core::error::{ExposureError, ExposureResult};
use std::collections::HashMap;

pub mod tag {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIGURATION: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_DOUBLE_PARAMS: u16 = 34736;
    pub const GDAL_NODATA: u16 = 42113;

    /// Tags whose values are resolved when the directory is read.
    pub const KNOWN: &[u16] = &[
        IMAGE_WIDTH,
        IMAGE_LENGTH,
        BITS_PER_SAMPLE,
        COMPRESSION,
        STRIP_OFFSETS,
        SAMPLES_PER_PIXEL,
        ROWS_PER_STRIP,
        STRIP_BYTE_COUNTS,
        PLANAR_CONFIGURATION,
        PREDICTOR,
        TILE_WIDTH,
        TILE_LENGTH,
        TILE_OFFSETS,
        TILE_BYTE_COUNTS,
        SAMPLE_FORMAT,
        MODEL_PIXEL_SCALE,
        MODEL_TIEPOINT,
        MODEL_TRANSFORMATION,
        GEO_KEY_DIRECTORY,
        GEO_DOUBLE_PARAMS,
        GDAL_NODATA,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn u64(self, b: &[u8]) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(a),
            ByteOrder::Big => u64::from_be_bytes(a),
        }
    }

    fn f32(self, b: &[u8]) -> f32 {
        f32::from_bits(self.u32(b))
    }

    fn f64(self, b: &[u8]) -> f64 {
        f64::from_bits(self.u64(b))
    }
}

/// Parsed 8- or 16-byte file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub order: ByteOrder,
    pub big: bool,
    pub first_ifd: u64,
}

impl TiffHeader {
    pub fn parse(b: &[u8]) -> ExposureResult<Self> {
        if b.len() < 8 {
            return Err(ExposureError::Format("file too short for a TIFF header".into()));
        }
        let order = match &b[..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            other => {
                return Err(ExposureError::Format(format!(
                    "not a TIFF file (byte order mark {other:02x?})"
                )))
            }
        };
        match order.u16(&b[2..]) {
            42 => Ok(Self {
                order,
                big: false,
                first_ifd: u64::from(order.u32(&b[4..])),
            }),
            43 => {
                if b.len() < 16 {
                    return Err(ExposureError::Format("truncated BigTIFF header".into()));
                }
                if order.u16(&b[4..]) != 8 {
                    return Err(ExposureError::Format("unsupported BigTIFF offset size".into()));
                }
                Ok(Self {
                    order,
                    big: true,
                    first_ifd: order.u64(&b[8..]),
                })
            }
            version => Err(ExposureError::Format(format!(
                "unknown TIFF version {version}"
            ))),
        }
    }

    fn count_size(&self) -> usize {
        if self.big {
            8
        } else {
            2
        }
    }

    fn entry_size(&self) -> usize {
        if self.big {
            20
        } else {
            12
        }
    }

    /// Bytes available for an inline value.
    fn inline_size(&self) -> usize {
        if self.big {
            8
        } else {
            4
        }
    }
}

/// A resolved tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Unsigned(Vec<u64>),
    Float(Vec<f64>),
    Ascii(String),
}

impl TagValue {
    pub fn as_unsigned(&self) -> Option<&[u64]> {
        match self {
            TagValue::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            TagValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

/// Directory entry as stored, before its value is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawEntry {
    tag: u16,
    field_type: u16,
    count: u64,
    /// Inline value bytes, or the value's file offset.
    value: [u8; 8],
}

fn type_size(field_type: u16) -> Option<usize> {
    Some(match field_type {
        1 | 2 | 7 => 1,
        3 => 2,
        4 | 11 | 13 => 4,
        5 | 12 | 16 | 18 => 8,
        _ => return None,
    })
}

fn decode_value(
    field_type: u16,
    count: usize,
    b: &[u8],
    order: ByteOrder,
) -> ExposureResult<TagValue> {
    let value = match field_type {
        1 | 7 => TagValue::Unsigned(b[..count].iter().map(|&v| u64::from(v)).collect()),
        2 => {
            let text = String::from_utf8_lossy(&b[..count]);
            TagValue::Ascii(text.trim_end_matches('\0').to_string())
        }
        3 => TagValue::Unsigned(
            b.chunks_exact(2)
                .take(count)
                .map(|c| u64::from(order.u16(c)))
                .collect(),
        ),
        4 | 13 => TagValue::Unsigned(
            b.chunks_exact(4)
                .take(count)
                .map(|c| u64::from(order.u32(c)))
                .collect(),
        ),
        16 | 18 => TagValue::Unsigned(b.chunks_exact(8).take(count).map(|c| order.u64(c)).collect()),
        11 => TagValue::Float(
            b.chunks_exact(4)
                .take(count)
                .map(|c| f64::from(order.f32(c)))
                .collect(),
        ),
        12 => TagValue::Float(b.chunks_exact(8).take(count).map(|c| order.f64(c)).collect()),
        5 => TagValue::Float(
            b.chunks_exact(8)
                .take(count)
                .map(|c| {
                    let (num, den) = (order.u32(c), order.u32(&c[4..]));
                    if den == 0 {
                        f64::NAN
                    } else {
                        f64::from(num) / f64::from(den)
                    }
                })
                .collect(),
        ),
        other => {
            return Err(ExposureError::Format(format!(
                "unsupported TIFF field type {other}"
            )))
        }
    };
    Ok(value)
}

/// The first image file directory with its known tags resolved.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    values: HashMap<u16, TagValue>,
}

impl Directory {
    pub fn get(&self, tag: u16) -> Option<&TagValue> {
        self.values.get(&tag)
    }

    /// First unsigned value of a tag.
    pub fn unsigned(&self, tag: u16) -> Option<u64> {
        self.get(tag)?.as_unsigned()?.first().copied()
    }

    pub fn unsigned_array(&self, tag: u16) -> Option<&[u64]> {
        self.get(tag)?.as_unsigned()
    }

    pub fn float_array(&self, tag: u16) -> Option<&[f64]> {
        self.get(tag)?.as_float()
    }

    pub fn ascii(&self, tag: u16) -> Option<&str> {
        self.get(tag)?.as_ascii()
    }

    /// Required unsigned tag.
    pub fn require(&self, tag: u16, name: &str) -> ExposureResult<u64> {
        self.unsigned(tag)
            .ok_or_else(|| ExposureError::Format(format!("missing required tag {name} ({tag})")))
    }
}

/// Header bytes fetched up front, with on-demand reads past them.
struct Prefix<'a> {
    source: &'a dyn ByteSource,
    head: Vec<u8>,
}

impl Prefix<'_> {
    async fn read(&self, offset: u64, len: usize) -> ExposureResult<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| ExposureError::Format("TIFF offset overflow".into()))?;
        if end <= self.head.len() as u64 {
            return Ok(self.head[offset as usize..end as usize].to_vec());
        }
        if end > self.source.size() {
            return Err(ExposureError::Format(format!(
                "TIFF structure at {offset}+{len} runs past end of file ({} bytes)",
                self.source.size()
            )));
        }
        let bytes = self.source.read_range(offset, len).await?;
        if bytes.len() < len {
            return Err(ExposureError::Format(format!(
                "short read at {offset}: wanted {len}, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// Reads the header and first IFD.
///
/// `header_bytes` are fetched speculatively in one request; anything that
/// lives past them (large offset arrays) is fetched on demand.
pub async fn read_directory(
    source: &dyn ByteSource,
    header_bytes: usize,
) -> ExposureResult<(TiffHeader, Directory)> {
    let want = header_bytes.max(16).min(source.size() as usize);
    let head = source.read_range(0, want).await?;
    let header = TiffHeader::parse(&head)?;
    let prefix = Prefix { source, head };

    let count_bytes = prefix.read(header.first_ifd, header.count_size()).await?;
    let entry_count = if header.big {
        header.order.u64(&count_bytes)
    } else {
        u64::from(header.order.u16(&count_bytes))
    };
    if entry_count == 0 || entry_count > 4096 {
        return Err(ExposureError::Format(format!(
            "implausible IFD entry count {entry_count}"
        )));
    }

    let entries_at = header.first_ifd + header.count_size() as u64;
    let raw = prefix
        .read(entries_at, entry_count as usize * header.entry_size())
        .await?;

    let mut directory = Directory::default();
    for chunk in raw.chunks_exact(header.entry_size()) {
        let entry = parse_entry(chunk, &header);
        if !tag::KNOWN.contains(&entry.tag) {
            continue;
        }
        let Some(size) = type_size(entry.field_type) else {
            tracing::debug!(tag = entry.tag, field_type = entry.field_type, "skipping tag");
            continue;
        };
        let total = size
            .checked_mul(entry.count as usize)
            .ok_or_else(|| ExposureError::Format(format!("tag {} too large", entry.tag)))?;

        let value = if total <= header.inline_size() {
            decode_value(entry.field_type, entry.count as usize, &entry.value, header.order)?
        } else {
            let offset = if header.big {
                header.order.u64(&entry.value)
            } else {
                u64::from(header.order.u32(&entry.value))
            };
            let bytes = prefix.read(offset, total).await?;
            decode_value(entry.field_type, entry.count as usize, &bytes, header.order)?
        };
        directory.values.insert(entry.tag, value);
    }

    tracing::debug!(
        entries = entry_count,
        resolved = directory.values.len(),
        big = header.big,
        "read TIFF directory"
    );
    Ok((header, directory))
}

fn parse_entry(b: &[u8], header: &TiffHeader) -> RawEntry {
    let order = header.order;
    let mut value = [0u8; 8];
    let (count, inline) = if header.big {
        (order.u64(&b[4..]), &b[12..20])
    } else {
        (u64::from(order.u32(&b[4..])), &b[8..12])
    };
    value[..inline.len()].copy_from_slice(inline);
    RawEntry {
        tag: order.u16(b),
        field_type: order.u16(&b[2..]),
        count,
        value,
    }
}
