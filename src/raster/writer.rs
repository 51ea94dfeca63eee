use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, ImageError, ImageFormat};

use super::{image_format, Raster};
use crate::error::Error;
use crate::{lowercase_extension, open_output_file, Result};

pub trait RasterWriter {
    fn write_raster(&mut self, raster: &Raster) -> Result<()>;
}

/// Binary `.pbm` bitmap or `.pgm` graymap output.
pub struct PnmRasterWriter<W: Write> {
    writer: W,
    subtype: PnmSubtype,
    path: String,
}

impl<W: Write> PnmRasterWriter<W> {
    pub fn bitmap(writer: W, path: String) -> Self {
        Self {
            writer,
            subtype: PnmSubtype::Bitmap(SampleEncoding::Binary),
            path,
        }
    }

    pub fn graymap(writer: W, path: String) -> Self {
        Self {
            writer,
            subtype: PnmSubtype::Graymap(SampleEncoding::Binary),
            path,
        }
    }

    fn samples(&self, raster: &Raster) -> Result<GrayImage> {
        match self.subtype {
            PnmSubtype::Bitmap(_) => {
                // a bitmap has a maximum sample value of 1, zero is black
                let mut bilevel = raster.to_bilevel()?;
                for pixel in bilevel.pixels_mut() {
                    pixel.0[0] = u8::from(pixel.0[0] != 0);
                }
                Ok(bilevel)
            }
            _ => raster.to_grayscale(),
        }
    }
}

impl<W: Write> RasterWriter for PnmRasterWriter<W> {
    fn write_raster(&mut self, raster: &Raster) -> Result<()> {
        let samples = self.samples(raster)?;
        PnmEncoder::new(&mut self.writer)
            .with_subtype(self.subtype)
            .write_image(
                samples.as_raw(),
                samples.width(),
                samples.height(),
                ExtendedColorType::L8,
            )
            .map_err(|e| Error::UnableToEncodeImage(self.path.clone(), e))?;
        self.writer
            .flush()
            .map_err(|e| Error::FailedToWriteImage(self.path.clone(), e))
    }
}

/// Any other format the `image` crate can encode, in the native plane count.
pub struct CodecRasterWriter<W: Write> {
    writer: W,
    format: ImageFormat,
    path: String,
}

impl<W: Write> CodecRasterWriter<W> {
    pub fn new(writer: W, format: ImageFormat, path: String) -> Self {
        Self {
            writer,
            format,
            path,
        }
    }

    fn encode(&self, image: &DynamicImage) -> std::result::Result<Vec<u8>, ImageError> {
        let mut encoded = Cursor::new(Vec::new());
        image.write_to(&mut encoded, self.format)?;
        Ok(encoded.into_inner())
    }
}

fn without_alpha(image: &DynamicImage) -> DynamicImage {
    if image.color().has_color() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

impl<W: Write> RasterWriter for CodecRasterWriter<W> {
    fn write_raster(&mut self, raster: &Raster) -> Result<()> {
        let image = raster.to_image()?;
        let encoded = match self.encode(&image) {
            Err(ImageError::Unsupported(reason)) if image.color().has_alpha() => {
                log::warn!(
                    "{:?} can not store '{}' with alpha ({}), dropping the alpha plane",
                    self.format,
                    self.path,
                    reason
                );
                self.encode(&without_alpha(&image))
            }
            result => result,
        }
        .map_err(|e| Error::UnableToEncodeImage(self.path.clone(), e))?;
        self.writer
            .write_all(&encoded)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::FailedToWriteImage(self.path.clone(), e))
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(open_output_file(path)?))
}

/// Writes `raster` in the format given by the extension of `path`. `.pbm`
/// and `.pgm` are converted to black and white and grayscale first.
pub fn write_raster(raster: &Raster, path: &Path) -> Result<()> {
    let display = path.display().to_string();
    let extension = lowercase_extension(path).unwrap_or_default();
    match extension.as_str() {
        "pbm" => PnmRasterWriter::bitmap(create(path)?, display.clone()).write_raster(raster)?,
        "pgm" => PnmRasterWriter::graymap(create(path)?, display.clone()).write_raster(raster)?,
        _ => {
            let format = image_format(&extension)
                .ok_or_else(|| Error::NoCodecForOutputFormat(display.clone()))?;
            CodecRasterWriter::new(create(path)?, format, display.clone()).write_raster(raster)?
        }
    }
    log::info!(
        "Wrote {}x{} image with {} planes to '{}'",
        raster.width(),
        raster.height(),
        raster.plane_count(),
        display
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use nalgebra::DMatrix;

    use super::{write_raster, PnmRasterWriter, RasterWriter};
    use crate::error::ErrorKind;
    use crate::raster::Raster;

    fn color_raster() -> Raster {
        Raster::from_planes(vec![
            DMatrix::from_element(2, 3, 30.0),
            DMatrix::from_element(2, 3, 130.0),
            DMatrix::from_element(2, 3, 230.0),
        ])
        .unwrap()
    }

    #[test]
    fn write_graymap_header() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("gray.pgm");
        write_raster(&color_raster(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P5"), "not a binary graymap");
        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        // 0.114 * 30 + 0.587 * 130 + 0.299 * 230 = 148.38
        assert!(decoded.pixels().all(|pixel| pixel.0 == [148]));
    }

    #[test]
    fn pack_bitmap_pixels_into_bits() {
        let plane = DMatrix::from_row_slice(
            2,
            10,
            &[
                0.0, 255.0, 0.0, 255.0, 0.0, 255.0, 0.0, 255.0, 0.0, 255.0, //
                255.0, 255.0, 255.0, 255.0, 255.0, 255.0, 255.0, 255.0, 129.0, 128.0,
            ],
        );
        let raster = Raster::from_planes(vec![plane]).unwrap();
        let mut buffer = Vec::new();
        PnmRasterWriter::bitmap(&mut buffer, "test.pbm".to_owned())
            .write_raster(&raster)
            .unwrap();
        assert!(buffer.starts_with(b"P4"), "not a binary bitmap");
        assert_eq!(
            &buffer[buffer.len() - 4..],
            &[0b1010_1010, 0b1000_0000, 0b0000_0000, 0b0100_0000]
        );
    }

    #[test]
    fn write_png_with_native_planes() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("color.png");
        write_raster(&color_raster(), &path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert!(decoded.pixels().all(|pixel| pixel.0 == [230, 130, 30]));
    }

    #[test]
    fn drop_alpha_for_jpeg() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("alpha.jpg");
        let mut planes = color_raster().into_planes();
        planes.push(DMatrix::from_element(2, 3, 255.0));
        let raster = Raster::from_planes(planes).unwrap();
        write_raster(&raster, &path).unwrap();
        let decoded = image::open(&path).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn report_format_without_encoder() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("image.ras");
        let error = write_raster(&color_raster(), &path).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(!path.exists());
    }

    #[test]
    fn report_unwritable_target() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("missing").join("image.png");
        let error = write_raster(&color_raster(), &path).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Io);
    }
}
