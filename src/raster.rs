use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Pixel};
use nalgebra::DMatrix;

use crate::error::Error;
use crate::Result;

pub mod reader;
pub mod writer;

pub const IMAGE_EXTENSIONS: [&str; 14] = [
    // Windows bitmaps
    "bmp", "dib", //
    // JPEG files
    "jpeg", "jpg", "jpe", //
    // JPEG 2000 files
    "jp2", //
    // Portable Network Graphics
    "png", //
    // Portable image format
    "pbm", "pgm", "ppm", //
    // Sun rasters
    "sr", "ras", //
    // TIFF files
    "tiff", "tif",
];

/// Plane `k` holds pixel component `ORDER[k]`, so color images are split into
/// blue, green, red (and alpha).
const BGR_ORDER: [usize; 3] = [2, 1, 0];
const BGRA_ORDER: [usize; 4] = [2, 1, 0, 3];
const GRAY_ORDER: [usize; 1] = [0];
const GRAY_ALPHA_ORDER: [usize; 2] = [0, 1];

const BLUE_WEIGHT: f64 = 0.114;
const GREEN_WEIGHT: f64 = 0.587;
const RED_WEIGHT: f64 = 0.299;
const BILEVEL_THRESHOLD: u8 = 128;

/// Codec the `image` crate uses for a recognized extension. `None` for
/// recognized extensions without an available codec (JPEG 2000, Sun raster).
pub fn image_format(extension: &str) -> Option<ImageFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "bmp" | "dib" => Some(ImageFormat::Bmp),
        "jpeg" | "jpg" | "jpe" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "pbm" | "pgm" | "ppm" => Some(ImageFormat::Pnm),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Saturating conversion to an 8-bit sample.
pub fn narrow(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn split<P>(buffer: &ImageBuffer<P, Vec<P::Subpixel>>, order: &[usize]) -> Vec<DMatrix<f64>>
where
    P: Pixel,
    f64: From<P::Subpixel>,
{
    let (width, height) = buffer.dimensions();
    order
        .iter()
        .map(|&component| {
            DMatrix::from_fn(height as usize, width as usize, |row, col| {
                f64::from(buffer.get_pixel(col as u32, row as u32).channels()[component])
            })
        })
        .collect()
}

/// Image as a stack of equally sized floating point planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    planes: Vec<DMatrix<f64>>,
}

impl Raster {
    pub fn from_planes(planes: Vec<DMatrix<f64>>) -> Result<Self> {
        let first = planes
            .first()
            .ok_or(Error::UnsupportedPlaneCount(0))?
            .shape();
        if let Some(plane) = planes.iter().find(|plane| plane.shape() != first) {
            return Err(Error::MismatchOfPlaneShapes(first, plane.shape()));
        }
        Ok(Self { planes })
    }

    /// Splits a decoded image into gray, gray+alpha, BGR or BGRA planes. The
    /// samples keep their native range, a 16-bit image yields values up to
    /// 65535.
    pub fn from_image(image: &DynamicImage) -> Self {
        let planes = match image {
            DynamicImage::ImageLuma8(buffer) => split(buffer, &GRAY_ORDER),
            DynamicImage::ImageLumaA8(buffer) => split(buffer, &GRAY_ALPHA_ORDER),
            DynamicImage::ImageRgb8(buffer) => split(buffer, &BGR_ORDER),
            DynamicImage::ImageRgba8(buffer) => split(buffer, &BGRA_ORDER),
            DynamicImage::ImageLuma16(buffer) => split(buffer, &GRAY_ORDER),
            DynamicImage::ImageLumaA16(buffer) => split(buffer, &GRAY_ALPHA_ORDER),
            DynamicImage::ImageRgb16(buffer) => split(buffer, &BGR_ORDER),
            DynamicImage::ImageRgba16(buffer) => split(buffer, &BGRA_ORDER),
            DynamicImage::ImageRgb32F(buffer) => split(buffer, &BGR_ORDER),
            DynamicImage::ImageRgba32F(buffer) => split(buffer, &BGRA_ORDER),
            other => split(&other.to_rgba32f(), &BGRA_ORDER),
        };
        Self { planes }
    }

    pub fn planes(&self) -> &[DMatrix<f64>] {
        &self.planes
    }

    pub fn into_planes(self) -> Vec<DMatrix<f64>> {
        self.planes
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn height(&self) -> usize {
        self.planes[0].nrows()
    }

    pub fn width(&self) -> usize {
        self.planes[0].ncols()
    }

    fn dimensions(&self) -> Result<(u32, u32)> {
        let too_large = || Error::ImageTooLarge(self.height(), self.width());
        let width = u32::try_from(self.width()).map_err(|_| too_large())?;
        let height = u32::try_from(self.height()).map_err(|_| too_large())?;
        Ok((width, height))
    }

    fn interleave(&self, order: &[usize]) -> Vec<u8> {
        let (height, width) = (self.height(), self.width());
        let components = order.len();
        let mut samples = vec![0; height * width * components];
        for (plane, &component) in self.planes.iter().zip(order) {
            for row in 0..height {
                for col in 0..width {
                    samples[(row * width + col) * components + component] =
                        narrow(plane[(row, col)]);
                }
            }
        }
        samples
    }

    fn buffer<P>(&self, order: &[usize]) -> Result<ImageBuffer<P, Vec<u8>>>
    where
        P: Pixel<Subpixel = u8>,
    {
        let (width, height) = self.dimensions()?;
        ImageBuffer::from_raw(width, height, self.interleave(order))
            .ok_or_else(|| Error::ImageTooLarge(self.height(), self.width()))
    }

    /// Merges the planes back into an 8-bit image, the inverse of
    /// [`Raster::from_image`].
    pub fn to_image(&self) -> Result<DynamicImage> {
        let image = match self.plane_count() {
            1 => DynamicImage::ImageLuma8(self.buffer(&GRAY_ORDER)?),
            2 => DynamicImage::ImageLumaA8(self.buffer(&GRAY_ALPHA_ORDER)?),
            3 => DynamicImage::ImageRgb8(self.buffer(&BGR_ORDER)?),
            4 => DynamicImage::ImageRgba8(self.buffer(&BGRA_ORDER)?),
            count => return Err(Error::UnsupportedPlaneCount(count)),
        };
        Ok(image)
    }

    /// Luminance of the narrowed planes: weighted for three or more planes,
    /// the plain mean for one or two.
    pub fn to_grayscale(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions()?;
        let planes = &self.planes;
        let image = GrayImage::from_fn(width, height, |col, row| {
            let sample = |plane: usize| f64::from(narrow(planes[plane][(row as usize, col as usize)]));
            let gray = if planes.len() >= 3 {
                BLUE_WEIGHT * sample(0) + GREEN_WEIGHT * sample(1) + RED_WEIGHT * sample(2)
            } else {
                (0..planes.len()).map(sample).sum::<f64>() / planes.len() as f64
            };
            image::Luma([narrow(gray)])
        });
        Ok(image)
    }

    /// Black and white version of [`Raster::to_grayscale`], samples above 128
    /// become white.
    pub fn to_bilevel(&self) -> Result<GrayImage> {
        let mut image = self.to_grayscale()?;
        for pixel in image.pixels_mut() {
            pixel.0[0] = if pixel.0[0] > BILEVEL_THRESHOLD { 255 } else { 0 };
        }
        Ok(image)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        writer::write_raster(self, path)
    }
}
