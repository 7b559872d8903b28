//! Contains the types and functions for the high level pipeline builder API.

mod analysis_pipeline;

pub use analysis_pipeline::{AnalysisPipeline, DEFAULT_PHYSICAL_SIZE_MM};

#[cfg(feature = "image")]
use {crate::AnalysisError, image::RgbaImage, std::path::Path};

/// Opens and decodes an image file into RGBA pixels.
///
/// Which formats are supported depends on the `image` crate features that are enabled.
///
/// # Errors
/// Returns [`AnalysisError::InputDecode`] with the decoder's message
/// if the file cannot be read or decoded.
#[cfg(feature = "image")]
pub fn decode_image(path: impl AsRef<Path>) -> crate::Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|err| AnalysisError::InputDecode(err.to_string()))?;
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "decoded image"
    );
    Ok(image.into_rgba8())
}
