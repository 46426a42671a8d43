//! Synthetic GeoTIFF writer for integration tests.
//!
//! Produces 8-bit single band TIFFs, classic or BigTIFF in either byte
//! order, tiled or stripped, uncompressed or deflate/LZW/PackBits,
//! georeferenced with a tiepoint and pixel scale or a model transformation.

#![allow(dead_code)]

use std::io::Write;

pub const ORIGIN_X: f64 = 1_000_000.0;
pub const ORIGIN_Y: f64 = 2_000_000.0;
pub const PIXEL: f64 = 30.0;

/// GeoKeys of the user-defined Albers CRS NLCD ships with: model type
/// projected, ProjectedCSType user-defined, ProjCoordTrans Albers, and the
/// six parameters stored in GeoDoubleParams in the order of
/// [`NLCD_ALBERS_DOUBLES`].
pub const NLCD_ALBERS_KEYS: [u16; 40] = [
    1, 1, 0, 9, //
    1024, 0, 1, 1, //
    1025, 0, 1, 1, //
    3072, 0, 1, 32767, //
    3075, 0, 1, 11, //
    3078, 34736, 1, 0, //
    3079, 34736, 1, 1, //
    3084, 34736, 1, 3, //
    3085, 34736, 1, 2, //
    3086, 34736, 1, 4, //
];

/// Standard parallels, latitude and longitude of origin, false easting.
pub const NLCD_ALBERS_DOUBLES: [f64; 5] = [29.5, 45.5, 23.0, -96.0, 0.0];

#[derive(Clone, Copy, PartialEq)]
enum Order {
    Little,
    Big,
}

#[derive(Clone, Copy, PartialEq)]
enum Codec {
    None,
    Deflate,
    Lzw,
    PackBits,
}

impl Codec {
    fn tag(self) -> u16 {
        match self {
            Codec::None => 1,
            Codec::Lzw => 5,
            Codec::Deflate => 8,
            Codec::PackBits => 32773,
        }
    }
}

enum Field {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(String),
}

impl Field {
    fn type_code(&self) -> u16 {
        match self {
            Field::Short(_) => 3,
            Field::Long(_) => 4,
            Field::Double(_) => 12,
            Field::Ascii(_) => 2,
        }
    }

    fn count(&self) -> u64 {
        match self {
            Field::Short(v) => v.len() as u64,
            Field::Long(v) => v.len() as u64,
            Field::Double(v) => v.len() as u64,
            Field::Ascii(s) => s.len() as u64 + 1,
        }
    }

    fn bytes(&self, order: Order) -> Vec<u8> {
        match (self, order) {
            (Field::Short(v), Order::Little) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            (Field::Short(v), Order::Big) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Field::Long(v), Order::Little) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            (Field::Long(v), Order::Big) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Field::Double(v), Order::Little) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            (Field::Double(v), Order::Big) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Field::Ascii(s), _) => {
                let mut b = s.as_bytes().to_vec();
                b.push(0);
                b
            }
        }
    }
}

pub struct GeoTiffBuilder {
    width: u32,
    height: u32,
    data: Vec<u8>,
    tile: Option<(u32, u32)>,
    rows_per_strip: u32,
    codec: Codec,
    nodata: Option<u8>,
    geokeys: Vec<u16>,
    geo_doubles: Vec<f64>,
    order: Order,
    big: bool,
    transformation: bool,
}

impl GeoTiffBuilder {
    /// `value` gives the class at `(row, col)`.
    pub fn new(width: u32, height: u32, value: impl Fn(u32, u32) -> u8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                data.push(value(row, col));
            }
        }
        Self {
            width,
            height,
            data,
            tile: None,
            rows_per_strip: height,
            codec: Codec::None,
            nodata: None,
            // Version 1.1.0, two keys: ProjectedCSTypeGeoKey = 5070,
            // GTRasterTypeGeoKey = PixelIsArea.
            geokeys: vec![1, 1, 0, 2, 1025, 0, 1, 1, 3072, 0, 1, 5070],
            geo_doubles: Vec::new(),
            order: Order::Little,
            big: false,
            transformation: false,
        }
    }

    pub fn tiled(mut self, tile_width: u32, tile_height: u32) -> Self {
        self.tile = Some((tile_width, tile_height));
        self
    }

    pub fn strips(mut self, rows_per_strip: u32) -> Self {
        self.tile = None;
        self.rows_per_strip = rows_per_strip;
        self
    }

    pub fn deflate(mut self) -> Self {
        self.codec = Codec::Deflate;
        self
    }

    pub fn lzw(mut self) -> Self {
        self.codec = Codec::Lzw;
        self
    }

    pub fn packbits(mut self) -> Self {
        self.codec = Codec::PackBits;
        self
    }

    pub fn nodata(mut self, value: u8) -> Self {
        self.nodata = Some(value);
        self
    }

    pub fn geokeys(mut self, keys: Vec<u16>) -> Self {
        self.geokeys = keys;
        self
    }

    pub fn geo_doubles(mut self, values: Vec<f64>) -> Self {
        self.geo_doubles = values;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.order = Order::Big;
        self
    }

    pub fn bigtiff(mut self) -> Self {
        self.big = true;
        self
    }

    /// Georeference with ModelTransformation instead of tiepoint + scale.
    pub fn transformation(mut self) -> Self {
        self.transformation = true;
        self
    }

    fn sample(&self, row: u32, col: u32) -> u8 {
        if row < self.height && col < self.width {
            self.data[(row * self.width + col) as usize]
        } else {
            self.nodata.unwrap_or(0)
        }
    }

    fn encode(&self, raw: Vec<u8>) -> Vec<u8> {
        match self.codec {
            Codec::None => raw,
            Codec::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&raw).unwrap();
                encoder.finish().unwrap()
            }
            Codec::Lzw => weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
                .encode(&raw)
                .unwrap(),
            Codec::PackBits => pack_bits(&raw),
        }
    }

    fn chunks(&self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        match self.tile {
            Some((tw, th)) => {
                for tr in 0..self.height.div_ceil(th) {
                    for tc in 0..self.width.div_ceil(tw) {
                        let mut raw = Vec::with_capacity((tw * th) as usize);
                        for r in 0..th {
                            for c in 0..tw {
                                raw.push(self.sample(tr * th + r, tc * tw + c));
                            }
                        }
                        chunks.push(self.encode(raw));
                    }
                }
            }
            None => {
                let mut row = 0;
                while row < self.height {
                    let end = (row + self.rows_per_strip).min(self.height);
                    let raw =
                        self.data[(row * self.width) as usize..(end * self.width) as usize].to_vec();
                    chunks.push(self.encode(raw));
                    row = end;
                }
            }
        }
        chunks
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        match self.order {
            Order::Little => out.extend_from_slice(&v.to_le_bytes()),
            Order::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(&self, out: &mut Vec<u8>, v: u32) {
        match self.order {
            Order::Little => out.extend_from_slice(&v.to_le_bytes()),
            Order::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u64(&self, out: &mut Vec<u8>, v: u64) {
        match self.order {
            Order::Little => out.extend_from_slice(&v.to_le_bytes()),
            Order::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let chunks = self.chunks();
        let (offsets_tag, counts_tag) = if self.tile.is_some() { (324, 325) } else { (273, 279) };

        let mut fields: Vec<(u16, Field)> = vec![
            (256, Field::Long(vec![self.width])),
            (257, Field::Long(vec![self.height])),
            (258, Field::Short(vec![8])),
            (259, Field::Short(vec![self.codec.tag()])),
            (277, Field::Short(vec![1])),
            (284, Field::Short(vec![1])),
            (339, Field::Short(vec![1])),
            (offsets_tag, Field::Long(vec![0; chunks.len()])),
            (
                counts_tag,
                Field::Long(chunks.iter().map(|c| c.len() as u32).collect()),
            ),
            (34735, Field::Short(self.geokeys.clone())),
        ];
        if self.transformation {
            #[rustfmt::skip]
            let matrix = vec![
                PIXEL, 0.0, 0.0, ORIGIN_X,
                0.0, -PIXEL, 0.0, ORIGIN_Y,
                0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ];
            fields.push((34264, Field::Double(matrix)));
        } else {
            fields.push((33550, Field::Double(vec![PIXEL, PIXEL, 0.0])));
            fields.push((
                33922,
                Field::Double(vec![0.0, 0.0, 0.0, ORIGIN_X, ORIGIN_Y, 0.0]),
            ));
        }
        if !self.geo_doubles.is_empty() {
            fields.push((34736, Field::Double(self.geo_doubles.clone())));
        }
        match self.tile {
            Some((tw, th)) => {
                fields.push((322, Field::Long(vec![tw])));
                fields.push((323, Field::Long(vec![th])));
            }
            None => fields.push((278, Field::Long(vec![self.rows_per_strip]))),
        }
        if let Some(nodata) = self.nodata {
            fields.push((42113, Field::Ascii(nodata.to_string())));
        }
        fields.sort_by_key(|(tag, _)| *tag);

        let (header_len, count_len, entry_len, next_len, inline) = if self.big {
            (16, 8, 20, 8, 8)
        } else {
            (8, 2, 12, 4, 4)
        };
        let ifd_len = count_len + entry_len * fields.len() + next_len;
        let ext_start = header_len + ifd_len;
        let external = |f: &Field| {
            let len = f.bytes(self.order).len();
            if len <= inline {
                0
            } else {
                len + len % 2
            }
        };
        let ext_len: usize = fields.iter().map(|(_, f)| external(f)).sum();

        let mut at = (ext_start + ext_len) as u32;
        let chunk_offsets: Vec<u32> = chunks
            .iter()
            .map(|c| {
                let offset = at;
                at += c.len() as u32;
                offset
            })
            .collect();
        for (tag, field) in fields.iter_mut() {
            if *tag == offsets_tag {
                *field = Field::Long(chunk_offsets.clone());
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(match self.order {
            Order::Little => b"II",
            Order::Big => b"MM",
        });
        if self.big {
            self.put_u16(&mut out, 43);
            self.put_u16(&mut out, 8);
            self.put_u16(&mut out, 0);
            self.put_u64(&mut out, header_len as u64);
            self.put_u64(&mut out, fields.len() as u64);
        } else {
            self.put_u16(&mut out, 42);
            self.put_u32(&mut out, header_len as u32);
            self.put_u16(&mut out, fields.len() as u16);
        }

        let mut ext = Vec::new();
        for (tag, field) in &fields {
            self.put_u16(&mut out, *tag);
            self.put_u16(&mut out, field.type_code());
            if self.big {
                self.put_u64(&mut out, field.count());
            } else {
                self.put_u32(&mut out, field.count() as u32);
            }
            let bytes = field.bytes(self.order);
            if bytes.len() <= inline {
                let mut value = vec![0u8; inline];
                value[..bytes.len()].copy_from_slice(&bytes);
                out.extend_from_slice(&value);
            } else {
                let offset = (ext_start + ext.len()) as u64;
                if self.big {
                    self.put_u64(&mut out, offset);
                } else {
                    self.put_u32(&mut out, offset as u32);
                }
                ext.extend_from_slice(&bytes);
                if bytes.len() % 2 == 1 {
                    ext.push(0);
                }
            }
        }
        out.extend_from_slice(&vec![0u8; next_len]);
        assert_eq!(out.len(), ext_start);
        out.extend_from_slice(&ext);
        for chunk in &chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// PackBits: replicate runs of 3+ equal bytes, literals otherwise.
fn pack_bits(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let flush = |literal: &mut Vec<u8>, out: &mut Vec<u8>| {
        for chunk in literal.chunks(128) {
            out.push((chunk.len() - 1) as u8);
            out.extend_from_slice(chunk);
        }
        literal.clear();
    };

    let mut i = 0;
    while i < raw.len() {
        let run = raw[i..].iter().take(128).take_while(|b| **b == raw[i]).count();
        if run >= 3 {
            flush(&mut literal, &mut out);
            out.push((1 - run as i16) as i8 as u8);
            out.push(raw[i]);
            i += run;
        } else {
            literal.push(raw[i]);
            i += 1;
        }
    }
    flush(&mut literal, &mut out);
    out
}

/// Map coordinates of the centre of `(row, col)`.
pub fn pixel_centre(row: u32, col: u32) -> (f64, f64) {
    (
        ORIGIN_X + (f64::from(col) + 0.5) * PIXEL,
        ORIGIN_Y - (f64::from(row) + 0.5) * PIXEL,
    )
}
