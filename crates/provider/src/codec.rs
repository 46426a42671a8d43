//! Tile decompression and sample unpacking.
//!
//! Runs on the blocking pool; everything here is synchronous and CPU-bound.

use crate::tiff::ByteOrder;
use exposure_core::error::{ExposureError, ExposureResult};
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
    PackBits,
}

impl Compression {
    pub fn from_tag(value: u64) -> ExposureResult<Self> {
        match value {
            1 => Ok(Compression::None),
            5 => Ok(Compression::Lzw),
            8 | 32946 => Ok(Compression::Deflate),
            32773 => Ok(Compression::PackBits),
            other => Err(ExposureError::Format(format!(
                "unsupported TIFF compression {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    /// Horizontal differencing (TIFF predictor 2).
    Horizontal,
}

impl Predictor {
    pub fn from_tag(value: u64) -> ExposureResult<Self> {
        match value {
            1 => Ok(Predictor::None),
            2 => Ok(Predictor::Horizontal),
            other => Err(ExposureError::Format(format!(
                "unsupported TIFF predictor {other}"
            ))),
        }
    }
}

/// Everything needed to turn stored tile bytes into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCodec {
    pub compression: Compression,
    pub predictor: Predictor,
    pub bits_per_sample: u16,
    pub order: ByteOrder,
}

impl TileCodec {
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Decodes one tile of `width * rows` samples.
    pub fn decode(&self, data: &[u8], width: usize, rows: usize) -> ExposureResult<Vec<u16>> {
        let sample_count = width * rows;
        let expected = sample_count * self.bytes_per_sample();

        let mut raw = decompress(self.compression, data, expected)?;
        if raw.len() < expected {
            return Err(ExposureError::Format(format!(
                "tile decoded to {} bytes, expected {expected}",
                raw.len()
            )));
        }
        raw.truncate(expected);

        let mut samples: Vec<u16> = match self.bits_per_sample {
            8 => raw.into_iter().map(u16::from).collect(),
            16 => raw.chunks_exact(2).map(|c| self.order.u16(c)).collect(),
            other => {
                return Err(ExposureError::Format(format!(
                    "unsupported bits per sample {other}"
                )))
            }
        };

        if self.predictor == Predictor::Horizontal {
            let mask = if self.bits_per_sample == 8 { 0xFF } else { 0xFFFF };
            for row in samples.chunks_mut(width) {
                for i in 1..row.len() {
                    row[i] = row[i].wrapping_add(row[i - 1]) & mask;
                }
            }
        }
        Ok(samples)
    }
}

/// Decompresses a tile or strip. `expected` is a capacity hint.
pub fn decompress(
    compression: Compression,
    data: &[u8],
    expected: usize,
) -> ExposureResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Deflate => {
            let mut out = Vec::with_capacity(expected);
            flate2::read::ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| ExposureError::Format(format!("deflate: {e}")))?;
            Ok(out)
        }
        Compression::Lzw => {
            let mut out = Vec::with_capacity(expected);
            let mut decoder =
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            let result = decoder.into_vec(&mut out).decode(data);
            result
                .status
                .map_err(|e| ExposureError::Format(format!("lzw: {e}")))?;
            Ok(out)
        }
        Compression::PackBits => unpack_bits(data, expected),
    }
}

fn unpack_bits(data: &[u8], expected: usize) -> ExposureResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < data.len() && out.len() < expected {
        let n = data[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let len = n as usize + 1;
                let run = data.get(i..i + len).ok_or_else(|| {
                    ExposureError::Format("packbits literal runs past end of data".into())
                })?;
                out.extend_from_slice(run);
                i += len;
            }
            -127..=-1 => {
                let byte = *data.get(i).ok_or_else(|| {
                    ExposureError::Format("packbits repeat runs past end of data".into())
                })?;
                out.resize(out.len() + (1 - n as isize) as usize, byte);
                i += 1;
            }
            // -128 is a no-op.
            _ => {}
        }
    }
    Ok(out)
}
