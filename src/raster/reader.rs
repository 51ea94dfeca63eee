use std::io::BufReader;
use std::path::Path;

use image::ImageReader;

use super::{image_format, Raster};
use crate::error::Error;
use crate::{lowercase_extension, open_input_file, Result};

/// Decodes the image at `path` with the codec selected by its extension.
pub fn read_raster(path: &Path) -> Result<Raster> {
    let display = path.display().to_string();
    let format = lowercase_extension(path)
        .and_then(|extension| image_format(&extension))
        .ok_or_else(|| Error::NoCodecForImageFormat(display.clone()))?;
    let file = open_input_file(path)?;
    let image = ImageReader::with_format(BufReader::new(file), format)
        .decode()
        .map_err(|e| Error::UnableToDecodeImage(display.clone(), e))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::EmptyImage(display));
    }
    log::info!(
        "Read {}x{} image '{}' ({:?})",
        image.width(),
        image.height(),
        display,
        image.color()
    );
    Ok(Raster::from_image(&image))
}
