//! Minimal reader for MATLAB level-5 `.mat` files.
//!
//! Only what is needed to pull numeric arrays out of a file is supported:
//! little-endian files, numeric `miMATRIX` elements (optionally wrapped in
//! `miCOMPRESSED`), and the small data element tag format.
//!
//! Reference: "MAT-File Format", MathWorks, chapter 1 (Level 5 MAT-files).

use crate::error::MatError;
use flate2::read::ZlibDecoder;
use num_traits::AsPrimitive;
use std::io::Read;

pub const HEADER_LEN: usize = 128;

/// Data element types (`mi*`).
mod mi {
    pub const INT8: u32 = 1;
    pub const UINT8: u32 = 2;
    pub const INT16: u32 = 3;
    pub const UINT16: u32 = 4;
    pub const INT32: u32 = 5;
    pub const UINT32: u32 = 6;
    pub const SINGLE: u32 = 7;
    pub const DOUBLE: u32 = 9;
    pub const INT64: u32 = 12;
    pub const UINT64: u32 = 13;
    pub const MATRIX: u32 = 14;
    pub const COMPRESSED: u32 = 15;
}

/// Array classes (`mx*_CLASS`) that hold plain numeric data.
const NUMERIC_CLASSES: std::ops::RangeInclusive<u32> = 6..=15;

/// Numeric content of an array, kept in its on-disk storage type.
///
/// MATLAB stores values with the smallest type that fits them, so a `double`
/// array of small integers is commonly stored as `UINT8`.
#[derive(Debug, Clone, PartialEq)]
pub enum MatData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl MatData {
    pub fn len(&self) -> usize {
        match self {
            MatData::I8(v) => v.len(),
            MatData::U8(v) => v.len(),
            MatData::I16(v) => v.len(),
            MatData::U16(v) => v.len(),
            MatData::I32(v) => v.len(),
            MatData::U32(v) => v.len(),
            MatData::I64(v) => v.len(),
            MatData::U64(v) => v.len(),
            MatData::F32(v) => v.len(),
            MatData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn convert<T>(&self) -> Vec<T>
    where
        T: Copy + 'static,
        i8: AsPrimitive<T>,
        u8: AsPrimitive<T>,
        i16: AsPrimitive<T>,
        u16: AsPrimitive<T>,
        i32: AsPrimitive<T>,
        u32: AsPrimitive<T>,
        i64: AsPrimitive<T>,
        u64: AsPrimitive<T>,
        f32: AsPrimitive<T>,
        f64: AsPrimitive<T>,
    {
        match self {
            MatData::I8(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::U8(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::I16(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::U16(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::I32(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::U32(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::I64(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::U64(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::F32(v) => v.iter().map(|x| x.as_()).collect(),
            MatData::F64(v) => v.iter().map(|x| x.as_()).collect(),
        }
    }

    /// Values converted with `as` semantics (saturating for floats).
    pub fn to_u8(&self) -> Vec<u8> {
        self.convert()
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.convert()
    }

    /// Like [`Self::to_u8`], without copying when already stored as `UINT8`.
    pub fn into_u8(self) -> Vec<u8> {
        match self {
            MatData::U8(v) => v,
            other => other.to_u8(),
        }
    }
}

/// A named numeric array.
///
/// `data` is in column-major (Fortran) order, as MATLAB stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: MatData,
}

#[derive(Debug, Clone, Default)]
pub struct MatFile {
    pub arrays: Vec<MatArray>,
}

impl MatFile {
    /// Decodes all numeric arrays of a file. Non-numeric variables are skipped.
    pub fn parse(bytes: &[u8]) -> Result<Self, MatError> {
        if bytes.len() < HEADER_LEN {
            return Err(MatError::MissingHeader { len: bytes.len() });
        }
        let endian = [bytes[126], bytes[127]];
        if &endian != b"IM" {
            return Err(MatError::UnsupportedEndian(endian));
        }

        let mut arrays = vec![];
        let mut offset = HEADER_LEN;
        while offset < bytes.len() {
            let (element, next) = read_element(bytes, offset)?;
            match element.data_type {
                mi::COMPRESSED => {
                    let mut inflated = vec![];
                    ZlibDecoder::new(element.payload)
                        .read_to_end(&mut inflated)
                        .map_err(MatError::Inflate)?;
                    let (inner, _) = read_element(&inflated, 0)?;
                    if inner.data_type == mi::MATRIX {
                        arrays.extend(parse_matrix(inner.payload)?);
                    }
                }
                mi::MATRIX => arrays.extend(parse_matrix(element.payload)?),
                _ => {}
            }
            offset = next;
        }

        Ok(Self { arrays })
    }

    pub fn get(&self, name: &str) -> Option<&MatArray> {
        self.arrays.iter().find(|array| array.name == name)
    }

    /// Moves the array out of the file.
    pub fn take(&mut self, name: &str) -> Option<MatArray> {
        let index = self.arrays.iter().position(|array| array.name == name)?;
        Some(self.arrays.swap_remove(index))
    }
}

struct Element<'a> {
    data_type: u32,
    payload: &'a [u8],
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Reads the data element starting at `offset`, returning it and the offset of
/// the following element.
fn read_element(bytes: &[u8], offset: usize) -> Result<(Element<'_>, usize), MatError> {
    let tag = bytes
        .get(offset..offset + 8)
        .ok_or(MatError::Truncated { offset })?;
    let first = le_u32(&tag[0..4]);

    // small data element: size in the upper half, data packed in the tag
    let small_size = (first >> 16) as usize;
    if small_size != 0 {
        if small_size > 4 {
            return Err(MatError::Truncated { offset });
        }
        let element = Element {
            data_type: first & 0xffff,
            payload: &tag[4..4 + small_size],
        };
        return Ok((element, offset + 8));
    }

    let data_type = first;
    let size = le_u32(&tag[4..8]) as usize;
    let start = offset + 8;
    let payload = bytes
        .get(start..start + size)
        .ok_or(MatError::Truncated { offset })?;
    // compressed elements are not padded
    let next = if data_type == mi::COMPRESSED {
        start + size
    } else {
        (start + size.next_multiple_of(8)).min(bytes.len())
    };

    Ok((Element { data_type, payload }, next))
}

fn expect_type(
    element: &Element<'_>,
    offset: usize,
    expected: u32,
    name: &'static str,
) -> Result<(), MatError> {
    if element.data_type != expected {
        return Err(MatError::UnexpectedType {
            offset,
            expected: name,
            found: element.data_type,
        });
    }
    Ok(())
}

fn parse_matrix(payload: &[u8]) -> Result<Option<MatArray>, MatError> {
    // empty arrays are written as a bare tag
    if payload.is_empty() {
        return Ok(None);
    }

    let (flags, offset) = read_element(payload, 0)?;
    expect_type(&flags, 0, mi::UINT32, "UINT32 array flags")?;
    if flags.payload.len() < 4 {
        return Err(MatError::Truncated { offset: 0 });
    }
    let class = le_u32(flags.payload) & 0xff;

    let dims_offset = offset;
    let (dims, offset) = read_element(payload, dims_offset)?;
    expect_type(&dims, dims_offset, mi::INT32, "INT32 dimensions")?;
    let dims: Vec<usize> = dims
        .payload
        .chunks_exact(4)
        .map(|chunk| le_u32(chunk) as usize)
        .collect();

    let name_offset = offset;
    let (name, offset) = read_element(payload, name_offset)?;
    expect_type(&name, name_offset, mi::INT8, "INT8 array name")?;
    let name = String::from_utf8_lossy(name.payload).into_owned();

    if !NUMERIC_CLASSES.contains(&class) {
        log::debug!("skipping non-numeric variable '{name}' (class {class})");
        return Ok(None);
    }

    let (real, _) = read_element(payload, offset)?;
    let data = decode_numeric(real.data_type, real.payload)?;

    let expected: usize = dims.iter().product();
    if data.len() != expected {
        return Err(MatError::LengthMismatch {
            name,
            expected,
            found: data.len(),
        });
    }

    Ok(Some(MatArray { name, dims, data }))
}

macro_rules! decode_le {
    ($payload:expr, $ty:ty) => {{
        const SIZE: usize = std::mem::size_of::<$ty>();
        if $payload.len() % SIZE != 0 {
            return Err(MatError::Truncated { offset: 0 });
        }
        $payload
            .chunks_exact(SIZE)
            .map(|chunk| {
                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(chunk);
                <$ty>::from_le_bytes(raw)
            })
            .collect()
    }};
}

fn decode_numeric(data_type: u32, payload: &[u8]) -> Result<MatData, MatError> {
    let data = match data_type {
        mi::INT8 => MatData::I8(payload.iter().map(|b| *b as i8).collect()),
        mi::UINT8 => MatData::U8(payload.to_vec()),
        mi::INT16 => MatData::I16(decode_le!(payload, i16)),
        mi::UINT16 => MatData::U16(decode_le!(payload, u16)),
        mi::INT32 => MatData::I32(decode_le!(payload, i32)),
        mi::UINT32 => MatData::U32(decode_le!(payload, u32)),
        mi::INT64 => MatData::I64(decode_le!(payload, i64)),
        mi::UINT64 => MatData::U64(decode_le!(payload, u64)),
        mi::SINGLE => MatData::F32(decode_le!(payload, f32)),
        mi::DOUBLE => MatData::F64(decode_le!(payload, f64)),
        other => return Err(MatError::UnsupportedStorage(other)),
    };
    Ok(data)
}

/// Writers producing MAT bytes, for building test inputs.
#[cfg(test)]
pub(crate) mod fixtures {
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    pub const CLASS_CHAR: u32 = 4;
    pub const CLASS_DOUBLE: u32 = 6;
    pub const CLASS_UINT8: u32 = 9;

    pub fn header() -> Vec<u8> {
        let mut bytes = vec![b' '; 116];
        bytes[..18].copy_from_slice(b"MATLAB 5.0 MAT-fil");
        bytes.extend([0u8; 8]);
        bytes.extend(0x0100u16.to_le_bytes());
        bytes.extend(b"IM");
        bytes
    }

    pub fn element(data_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        if !payload.is_empty() && payload.len() <= 4 && data_type != super::mi::MATRIX {
            bytes.extend(((payload.len() as u32) << 16 | data_type).to_le_bytes());
            let mut packed = [0u8; 4];
            packed[..payload.len()].copy_from_slice(payload);
            bytes.extend(packed);
            return bytes;
        }
        bytes.extend(data_type.to_le_bytes());
        bytes.extend((payload.len() as u32).to_le_bytes());
        bytes.extend(payload);
        bytes.resize(8 + payload.len().next_multiple_of(8), 0);
        bytes
    }

    pub fn matrix(name: &str, class: u32, dims: &[usize], data_type: u32, data: &[u8]) -> Vec<u8> {
        let mut payload = vec![];
        let mut flags = vec![];
        flags.extend(class.to_le_bytes());
        flags.extend(0u32.to_le_bytes());
        payload.extend(element(super::mi::UINT32, &flags));
        let dims: Vec<u8> = dims
            .iter()
            .flat_map(|d| (*d as i32).to_le_bytes())
            .collect();
        payload.extend(element(super::mi::INT32, &dims));
        payload.extend(element(super::mi::INT8, name.as_bytes()));
        payload.extend(element(data_type, data));
        element(super::mi::MATRIX, &payload)
    }

    pub fn compressed(element: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(vec![], Compression::default());
        encoder.write_all(element).unwrap();
        let deflated = encoder.finish().unwrap();
        let mut bytes = vec![];
        bytes.extend(super::mi::COMPRESSED.to_le_bytes());
        bytes.extend((deflated.len() as u32).to_le_bytes());
        bytes.extend(deflated);
        bytes
    }

    pub fn file(elements: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = header();
        for element in elements {
            bytes.extend(element);
        }
        bytes
    }
}
