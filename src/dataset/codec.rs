//! Image Codec
//!
//! The single preprocessing contract shared by training and serving:
//! decode, convert to RGB8, resize with Lanczos3 to the model input size,
//! scale to `[0, 1]` and add a leading batch axis (NHWC layout).
//!
//! Training and serving must produce identical tensors for identical bytes,
//! so every path that turns an image into model input goes through here.

use std::path::Path;

use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};

use crate::utils::error::{JaundiceError, Result};

/// File extensions accepted by the codec (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// Resampling filter used for every resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Normalized image tensor with shape `[1, height, width, 3]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// Scale an RGB8 image to `[0, 1]` floats in HWC order
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

        Self {
            data,
            height: height as usize,
            width: width as usize,
        }
    }

    /// Shape including the leading batch axis
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, 3]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Flat NHWC values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// RGB values at (y, x)
    pub fn pixel(&self, y: usize, x: usize) -> [f32; 3] {
        let offset = (y * self.width + x) * 3;
        [self.data[offset], self.data[offset + 1], self.data[offset + 2]]
    }
}

/// Decoder bound to a fixed target size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCodec {
    height: u32,
    width: u32,
}

impl ImageCodec {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Codec for square model inputs
    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Target size as (height, width)
    pub fn target_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Reject filenames whose extension is not in [`ALLOWED_EXTENSIONS`]
    pub fn check_extension(filename: &str) -> Result<()> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            Some(ext) => Err(JaundiceError::invalid_image(format!(
                "unsupported file type '{}'. Allowed: {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            ))
            .with_filename(filename)),
            None => Err(JaundiceError::invalid_image(format!(
                "missing file extension. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
            .with_filename(filename)),
        }
    }

    /// True for paths the dataset enumerator should pick up
    pub fn is_supported_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Decode bytes and resize to the target size, without normalizing
    pub fn decode_resized(&self, bytes: &[u8]) -> Result<RgbImage> {
        let format = image::guess_format(bytes)
            .map_err(|e| JaundiceError::invalid_image(format!("unrecognized image data: {}", e)))?;

        if !matches!(
            format,
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Gif
        ) {
            return Err(JaundiceError::invalid_image(format!(
                "unsupported image format {:?}",
                format
            )));
        }

        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| JaundiceError::invalid_image(format!("failed to decode: {}", e)))?;

        // Grayscale, palette and alpha layouts are all flattened to RGB8 here
        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(JaundiceError::invalid_image("image has no pixels"));
        }

        Ok(image::imageops::resize(&rgb, self.width, self.height, RESIZE_FILTER))
    }

    /// Scale an already-resized RGB image into a tensor
    pub fn normalize(&self, image: &RgbImage) -> ImageTensor {
        ImageTensor::from_rgb(image)
    }

    /// Full contract: optional extension check, decode, resize, normalize
    pub fn decode_and_normalize(&self, bytes: &[u8], filename: Option<&str>) -> Result<ImageTensor> {
        if let Some(name) = filename {
            Self::check_extension(name)?;
        }

        let resized = match filename {
            Some(name) => self.decode_resized(bytes).map_err(|e| e.with_filename(name))?,
            None => self.decode_resized(bytes)?,
        };

        Ok(self.normalize(&resized))
    }

    /// Read and decode a file from disk, resized but not normalized
    pub fn decode_file(&self, path: &Path) -> Result<RgbImage> {
        let name = path.to_string_lossy();
        Self::check_extension(&name)?;
        let bytes = std::fs::read(path)?;
        self.decode_resized(&bytes).map_err(|e| e.with_filename(&name))
    }
}

/// Decode raw bytes into a `[1, H, W, 3]` tensor in `[0, 1]`
pub fn decode_and_normalize(raw_bytes: &[u8], target_size: (u32, u32)) -> Result<ImageTensor> {
    ImageCodec::new(target_size.0, target_size.1).decode_and_normalize(raw_bytes, None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn gradient_rgb(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    pub(crate) fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn gif_bytes(frame: RgbaImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut encoder = image::codecs::gif::GifEncoder::new(&mut buffer);
            encoder.encode_frame(image::Frame::new(frame)).unwrap();
        }
        buffer
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(gradient_rgb(width, height)), ImageFormat::Png)
    }

    fn assert_valid_tensor(tensor: &ImageTensor, size: usize) {
        assert_eq!(tensor.shape(), [1, size, size, 3]);
        assert_eq!(tensor.data().len(), size * size * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_all_formats_and_layouts_produce_rgb_tensor() {
        let codec = ImageCodec::square(24);

        let rgb = DynamicImage::ImageRgb8(gradient_rgb(40, 30));
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(33, 17, |x, y| Luma([((x * y) % 256) as u8])));
        let rgba: RgbaImage = ImageBuffer::from_fn(20, 28, |x, y| Rgba([x as u8 * 9, y as u8 * 3, 77, 128]));
        let gif = gif_bytes(rgba.clone());
        let rgba = DynamicImage::ImageRgba8(rgba);

        let cases = vec![
            encode(rgb.clone(), ImageFormat::Png),
            encode(gray.clone(), ImageFormat::Png),
            encode(rgba.clone(), ImageFormat::Png),
            encode(rgb.clone(), ImageFormat::Jpeg),
            encode(gray, ImageFormat::Jpeg),
            encode(rgb, ImageFormat::Bmp),
            encode(rgba, ImageFormat::Bmp),
            gif,
        ];

        for bytes in cases {
            let tensor = codec.decode_and_normalize(&bytes, None).unwrap();
            assert_valid_tensor(&tensor, 24);
        }
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let bytes = encode(DynamicImage::ImageRgb8(gradient_rgb(97, 61)), ImageFormat::Jpeg);
        let first = decode_and_normalize(&bytes, (32, 32)).unwrap();
        let second = decode_and_normalize(&bytes, (32, 32)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_square_target() {
        let codec = ImageCodec::new(10, 20);
        let tensor = codec.decode_and_normalize(&png_bytes(64, 64), None).unwrap();
        assert_eq!(tensor.shape(), [1, 10, 20, 3]);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = decode_and_normalize(b"definitely not an image", (8, 8)).unwrap_err();
        assert!(matches!(err, JaundiceError::InvalidImage { .. }));

        let err = decode_and_normalize(&[], (8, 8)).unwrap_err();
        assert!(matches!(err, JaundiceError::InvalidImage { .. }));
    }

    #[test]
    fn test_truncated_png_rejected() {
        let bytes = png_bytes(32, 32);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode_and_normalize(truncated, (8, 8)).is_err());
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(ImageCodec::check_extension("photo.JPG").is_ok());
        assert!(ImageCodec::check_extension("photo.jpeg").is_ok());
        assert!(ImageCodec::check_extension("scan.gif").is_ok());

        let err = ImageCodec::check_extension("scan.tiff").unwrap_err();
        match err {
            JaundiceError::InvalidImage { filename, .. } => assert_eq!(filename.as_deref(), Some("scan.tiff")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(ImageCodec::check_extension("no_extension").is_err());
    }

    #[test]
    fn test_extension_checked_before_decode() {
        let codec = ImageCodec::square(8);
        // Valid PNG bytes, but the caller-supplied name is not allowed
        let err = codec.decode_and_normalize(&png_bytes(8, 8), Some("image.webp")).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_pixel_scaling() {
        let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(4, 4, Rgb([255, 0, 255])));
        let tensor = decode_and_normalize(&encode(white, ImageFormat::Png), (4, 4)).unwrap();
        assert_eq!(tensor.pixel(0, 0), [1.0, 0.0, 1.0]);
        assert_eq!(tensor.pixel(3, 3), [1.0, 0.0, 1.0]);
    }
}
