//! # Canonical Image Form
//!
//! Every image that enters the relay, whatever its container or color mode,
//! is normalized to an 8-bit, 3-channel RGB buffer before anyone else sees
//! it. Consumers therefore never branch on the source format.
//!
//! The node graph does not consume [`Image`] directly. It exchanges
//! [`ImageTensor`] values: batched `[batch, height, width, channels]` float
//! buffers scaled to `0.0..=1.0`.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format tag assumed when a sender does not name one.
pub const DEFAULT_FORMAT: &str = "png";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Codec(#[from] ::image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image tensor: {0}")]
    InvalidTensor(String),
}

/// Raster formats a producer may put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Png,
    Jpeg,
}

impl WireFormat {
    /// The tag sent in the `format` field.
    pub fn tag(self) -> &'static str {
        match self {
            WireFormat::Png => "png",
            WireFormat::Jpeg => "jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            WireFormat::Png => "png",
            WireFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            WireFormat::Png => "image/png",
            WireFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(WireFormat::Png),
            "jpg" | "jpeg" => Ok(WireFormat::Jpeg),
            other => Err(format!("unsupported wire format '{other}' (expected png or jpeg)")),
        }
    }
}

/// Maps a format tag (`"png"`, `".JPG"`, `"webp"`, ...) to a codec.
/// An empty tag means [`DEFAULT_FORMAT`].
pub fn parse_format_tag(tag: &str) -> Option<ImageFormat> {
    let tag = tag.trim().trim_start_matches('.');
    let tag = if tag.is_empty() { DEFAULT_FORMAT } else { tag };
    ImageFormat::from_extension(tag.to_ascii_lowercase())
}

/// Decodes an image file from disk without normalizing it.
pub fn load_dynamic(path: &Path) -> Result<DynamicImage, ImageError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// # Image
///
/// A normalized 8-bit RGB raster with explicit dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pixels: RgbImage,
}

impl Image {
    /// Normalizes any decoded image to RGB. Alpha is dropped, gray is
    /// expanded, deeper bit depths are scaled down to 8 bits.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: image.into_rgb8(),
        }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Solid-color image.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    /// Solid-black image, used as the pull placeholder.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::solid(width, height, [0, 0, 0])
    }

    /// Decodes an encoded raster.
    ///
    /// The container is sniffed from the leading bytes first. `format_hint`
    /// is only consulted when sniffing fails, which keeps a mislabelled
    /// payload (a JPEG tagged `"png"`) decodable.
    pub fn decode(bytes: &[u8], format_hint: &str) -> Result<Self, ImageError> {
        let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        if reader.format().is_none() {
            match parse_format_tag(format_hint) {
                Some(format) => reader.set_format(format),
                None => return Err(ImageError::UnsupportedFormat(format_hint.to_string())),
            }
        }
        Ok(Self::from_dynamic(reader.decode()?))
    }

    /// Loads and normalizes an image file.
    pub fn open(path: &Path) -> Result<Self, ImageError> {
        load_dynamic(path).map(Self::from_dynamic)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Row-major `RGBRGB...` samples.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Encodes the image with the given wire format. `quality` only affects JPEG.
    pub fn encode(&self, format: WireFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
        encode_wire(&DynamicImage::ImageRgb8(self.pixels.clone()), format, quality)
    }

    /// Tensor view for the node graph: batch of one, samples scaled to `0.0..=1.0`.
    pub fn to_tensor(&self) -> ImageTensor {
        let (width, height) = self.dimensions();
        let data = self
            .as_raw()
            .iter()
            .map(|&sample| f32::from(sample) / 255.0)
            .collect();
        ImageTensor {
            shape: [1, height as usize, width as usize, 3],
            data,
        }
    }
}

/// # Image Tensor
///
/// The node graph's image value: `[batch, height, width, channels]` floats,
/// row-major, nominally in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, ImageError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| ImageError::InvalidTensor(format!("shape {shape:?} overflows")))?;
        if expected != data.len() {
            return Err(ImageError::InvalidTensor(format!(
                "shape {:?} needs {} samples, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn channels(&self) -> usize {
        self.shape[3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Converts the first batch element back to a canonical [`Image`].
    ///
    /// Samples are scaled by 255, clamped and truncated. One- and
    /// two-channel tensors are read as gray (plus alpha), four-channel
    /// tensors lose their alpha.
    pub fn to_image(&self) -> Result<Image, ImageError> {
        let [batch, height, width, channels] = self.shape;
        if batch == 0 {
            return Err(ImageError::InvalidTensor("empty batch".to_string()));
        }
        if !matches!(channels, 1..=4) {
            return Err(ImageError::InvalidTensor(format!(
                "unsupported channel count {channels}"
            )));
        }
        let (w, h) = (
            u32::try_from(width).map_err(|_| ImageError::InvalidTensor("width overflow".into()))?,
            u32::try_from(height).map_err(|_| ImageError::InvalidTensor("height overflow".into()))?,
        );

        let first = &self.data[..height * width * channels];
        let mut raw = Vec::with_capacity(height * width * 3);
        for px in first.chunks_exact(channels) {
            let rgb = match channels {
                1 | 2 => [px[0]; 3],
                _ => [px[0], px[1], px[2]],
            };
            raw.extend(rgb.iter().map(|&v| to_u8(v)));
        }

        RgbImage::from_raw(w, h, raw)
            .map(Image::from_rgb)
            .ok_or_else(|| ImageError::InvalidTensor("buffer does not match dimensions".to_string()))
    }
}

/// Encodes any decoded image for the wire. PNG keeps an alpha channel if
/// there is one; JPEG has no alpha, so the image is flattened to RGB first.
pub fn encode_wire(image: &DynamicImage, format: WireFormat, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        WireFormat::Png => image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?,
        WireFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&rgb)?;
        }
    }
    Ok(buf)
}

fn to_u8(sample: f32) -> u8 {
    // `as` saturates and maps NaN to 0
    (sample * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GrayImage, Luma, Rgba, RgbaImage};

    fn encode_dynamic(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn test_decode_normalizes_rgba_to_rgb() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128]));
        let bytes = encode_dynamic(&DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let image = Image::decode(&bytes, "png").unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.as_raw().len(), 4 * 3 * 3);
        assert_eq!(image.pixels().get_pixel(2, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_decode_expands_grayscale() {
        let gray = GrayImage::from_pixel(2, 2, Luma([77]));
        let bytes = encode_dynamic(&DynamicImage::ImageLuma8(gray), ImageFormat::Png);

        let image = Image::decode(&bytes, "").unwrap();
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_decode_sniffs_mislabelled_payload() {
        let bytes = Image::solid(8, 8, [200, 10, 10]).encode(WireFormat::Png, 95).unwrap();
        let image = Image::decode(&bytes, "jpeg").unwrap();
        assert_eq!(image.pixels().get_pixel(3, 3), &Rgb([200, 10, 10]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Image::decode(b"definitely not an image", "png").unwrap_err();
        assert!(matches!(err, ImageError::Codec(_)), "got {err:?}");

        let err = Image::decode(b"definitely not an image", "nonsense").unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedFormat(_)), "got {err:?}");
    }

    #[test]
    fn test_png_encoding_is_lossless() {
        let mut pixels = RgbImage::new(5, 4);
        for (x, y, px) in pixels.enumerate_pixels_mut() {
            *px = Rgb([(x * 40) as u8, (y * 60) as u8, 7]);
        }
        let original = Image::from_rgb(pixels);
        let bytes = original.encode(WireFormat::Png, 0).unwrap();
        assert_eq!(Image::decode(&bytes, "png").unwrap(), original);
    }

    #[test]
    fn test_tensor_scaling() {
        let tensor = Image::solid(2, 1, [255, 0, 51]).to_tensor();
        assert_eq!(tensor.shape(), [1, 1, 2, 3]);
        assert_eq!(&tensor.data()[..3], &[1.0, 0.0, 0.2]);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_tensor_to_image_drops_alpha_and_clamps() {
        let tensor = ImageTensor::new([1, 1, 2, 4], vec![1.5, 0.5, -1.0, 0.3, 0.0, 1.0, 0.0, 1.0]).unwrap();
        let image = tensor.to_image().unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.pixels().get_pixel(0, 0), &Rgb([255, 127, 0]));
        assert_eq!(image.pixels().get_pixel(1, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_png_encoding_keeps_alpha() {
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128])));
        let bytes = encode_wire(&frame, WireFormat::Png, 95).unwrap();
        let back = ::image::load_from_memory(&bytes).unwrap();
        assert!(back.color().has_alpha());
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[test]
    fn test_jpeg_encoding_drops_alpha() {
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128])));
        let bytes = encode_wire(&frame, WireFormat::Jpeg, 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let back = ::image::load_from_memory(&bytes).unwrap();
        assert!(!back.color().has_alpha());

        let rgb = Image::solid(4, 3, [10, 20, 30]).encode(WireFormat::Jpeg, 80).unwrap();
        assert_eq!(&rgb[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_tensor_shape_overflow_is_an_error() {
        let err = ImageTensor::new([usize::MAX, 2, 1, 3], Vec::new()).unwrap_err();
        assert!(matches!(err, ImageError::InvalidTensor(_)), "got {err:?}");
    }

    #[test]
    fn test_tensor_shape_mismatch() {
        assert!(ImageTensor::new([1, 2, 2, 3], vec![0.0; 5]).is_err());
        let empty = ImageTensor::new([0, 2, 2, 3], Vec::new()).unwrap();
        assert!(empty.to_image().is_err());
    }

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("PNG".parse::<WireFormat>().unwrap(), WireFormat::Png);
        assert_eq!("jpg".parse::<WireFormat>().unwrap(), WireFormat::Jpeg);
        assert!("tiff".parse::<WireFormat>().is_err());
        assert_eq!(parse_format_tag(".JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(parse_format_tag(""), Some(ImageFormat::Png));
    }
}
