// 24-bit uncompressed BMP reading and writing.
//
// The headers are checked here so unsupported files fail with a precise
// error; the pixel data itself goes through the image crate's BMP codec,
// which takes care of row padding, BGR ordering and bottom-up storage.

use std::fs;
use std::path::{Path, PathBuf};

use discrete_convolution::{ConvolutionError, Image};
use image::{ColorType, ImageFormat, codecs::bmp::BmpEncoder};
use log::debug;
use thiserror::Error;

const MAGIC: &[u8; 2] = b"BM";
const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_LEN: usize = 40;

// offsets into the file, BITMAPFILEHEADER followed by BITMAPINFOHEADER
const INFO_SIZE_OFFSET: usize = 14;
const BIT_COUNT_OFFSET: usize = 28;
const COMPRESSION_OFFSET: usize = 30;

const SUPPORTED_BIT_COUNT: u16 = 24;
const BI_RGB: u32 = 0;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Not a BMP file, or a damaged one.
    #[error("invalid BMP data: {0}")]
    Format(String),

    /// A BMP, but not a 24-bit uncompressed one.
    #[error("unsupported BMP: {0}")]
    UnsupportedFormat(String),

    #[error("failed to encode BMP: {0}")]
    Encode(#[from] image::ImageError),

    #[error(transparent)]
    InvalidImage(#[from] ConvolutionError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decodes a 24-bit uncompressed BMP into RGB rows, top row first, whatever
/// the row order stored in the file.
pub fn decode(bytes: &[u8]) -> Result<Image> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::Format("missing BM signature".into()));
    }
    if bytes.len() < FILE_HEADER_LEN + INFO_HEADER_LEN {
        return Err(CodecError::Format(format!(
            "{} bytes is too short for the BMP headers",
            bytes.len()
        )));
    }

    let info_size = read_u32(bytes, INFO_SIZE_OFFSET);
    if (info_size as usize) < INFO_HEADER_LEN {
        return Err(CodecError::UnsupportedFormat(format!(
            "{info_size} byte core header"
        )));
    }

    let bit_count = read_u16(bytes, BIT_COUNT_OFFSET);
    if bit_count != SUPPORTED_BIT_COUNT {
        return Err(CodecError::UnsupportedFormat(format!(
            "{bit_count} bits per pixel, only {SUPPORTED_BIT_COUNT} is supported"
        )));
    }

    let compression = read_u32(bytes, COMPRESSION_OFFSET);
    if compression != BI_RGB {
        return Err(CodecError::UnsupportedFormat(format!(
            "compression type {compression}, only uncompressed data is supported"
        )));
    }

    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Bmp)
        .map_err(|e| CodecError::Format(e.to_string()))?
        .to_rgb8();

    let (width, height) = decoded.dimensions();
    debug!("decoded {width}x{height} BMP");

    Ok(Image::new(
        width as usize,
        height as usize,
        decoded.into_raw(),
    )?)
}

/// Encodes an image as a 24-bit uncompressed BMP.
pub fn encode(image: &Image) -> Result<Vec<u8>> {
    let width = u32::try_from(image.width())
        .map_err(|_| CodecError::UnsupportedFormat(format!("width {}", image.width())))?;
    let height = u32::try_from(image.height())
        .map_err(|_| CodecError::UnsupportedFormat(format!("height {}", image.height())))?;

    let mut bytes = Vec::new();
    BmpEncoder::new(&mut bytes).encode(image.pixels(), width, height, ColorType::Rgb8)?;

    Ok(bytes)
}

pub fn load_bmp(path: impl AsRef<Path>) -> Result<Image> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    decode(&bytes)
}

pub fn save_bmp(path: impl AsRef<Path>, image: &Image) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode(image)?;

    fs::write(path, bytes).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}
