//! Contains the pixel grid type and the size-limit error shared across the crate.

use crate::{AnalysisError, MAX_PIXELS};
use std::{
    error::Error,
    fmt::{Debug, Display},
};
#[cfg(feature = "image")]
use image::{RgbImage, RgbaImage};

/// An error type for when the length of an input (e.g., the number of pixels in an image)
/// is above the maximum supported value.
///
/// The inner value is the maximum supported value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AboveMaxLen<T>(pub T);

impl<T: Display> Display for AboveMaxLen<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "above the maximum length of {}", self.0)
    }
}

impl<T: Debug + Display> Error for AboveMaxLen<T> {}

/// The channel layout of the bytes in a [`PixelGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channels {
    /// Three bytes per pixel. Every pixel is treated as fully opaque.
    Rgb,
    /// Four bytes per pixel, the last being straight (non-premultiplied) alpha.
    Rgba,
}

impl Channels {
    /// The number of bytes per pixel.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Channels::Rgb => 3,
            Channels::Rgba => 4,
        }
    }
}

/// A borrowed, row-major grid of 8-bit pixels with either three or four channels.
///
/// The grid upholds two invariants: the byte buffer is exactly
/// `width * height * channels` long, and the number of pixels is not greater than [`MAX_PIXELS`].
///
/// # Examples
/// From a raw buffer:
/// ```
/// # use inkmeter::{Channels, PixelGrid};
/// # fn main() -> Result<(), inkmeter::AnalysisError> {
/// let data = [255, 0, 0, 255, 0, 0, 255, 255];
/// let grid = PixelGrid::new(&data, 2, 1, Channels::Rgba)?;
/// assert_eq!(grid.num_pixels(), 2);
/// # Ok(())
/// # }
/// ```
///
/// From an image (needs the `image` feature to be enabled):
/// ```no_run
/// # use inkmeter::PixelGrid;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("some image")?.into_rgba8();
/// let grid = PixelGrid::try_from(&img)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelGrid<'a> {
    /// The raw channel bytes.
    data: &'a [u8],
    /// The width of the grid in pixels.
    width: u32,
    /// The height of the grid in pixels.
    height: u32,
    /// The channel layout of `data`.
    channels: Channels,
}

impl<'a> PixelGrid<'a> {
    /// Creates a new [`PixelGrid`] over the given buffer.
    ///
    /// # Errors
    /// Returns [`AnalysisError::InvalidGrid`] if `data` is not exactly
    /// `width * height * channels` bytes long, or [`AnalysisError::TooLarge`]
    /// if the grid has more than [`MAX_PIXELS`] pixels.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        channels: Channels,
    ) -> Result<Self, AnalysisError> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > u64::from(MAX_PIXELS) {
            return Err(AboveMaxLen(MAX_PIXELS).into());
        }

        #[allow(clippy::cast_possible_truncation)]
        let expected = pixels as usize * channels.len();
        if data.len() == expected {
            Ok(Self { data, width, height, channels })
        } else {
            Err(AnalysisError::InvalidGrid { expected, actual: data.len() })
        }
    }

    /// The width of the grid in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// The height of the grid in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The channel layout of the grid.
    #[must_use]
    pub const fn channels(&self) -> Channels {
        self.channels
    }

    /// The total number of pixels (opaque or not) in the grid.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn num_pixels(&self) -> u32 {
        (self.data.len() / self.channels.len()) as u32
    }

    /// Whether the grid has zero pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw channel bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the pixel at the given flat index as RGBA.
    /// Pixels of an [`Channels::Rgb`] grid are returned with an alpha of `255`.
    ///
    /// # Panics
    /// Panics if `index` is not less than [`PixelGrid::num_pixels`].
    #[must_use]
    #[inline]
    pub fn rgba(&self, index: usize) -> [u8; 4] {
        let n = self.channels.len();
        let px = &self.data[(index * n)..((index + 1) * n)];
        rgba_of(px)
    }

    /// An iterator over every pixel as RGBA, in row-major order.
    pub fn pixels(&self) -> impl ExactSizeIterator<Item = [u8; 4]> + 'a {
        self.data.chunks_exact(self.channels.len()).map(rgba_of)
    }
}

/// Widens a 3 or 4 byte pixel to RGBA.
#[inline]
pub(crate) fn rgba_of(px: &[u8]) -> [u8; 4] {
    match *px {
        [r, g, b, a] => [r, g, b, a],
        [r, g, b] => [r, g, b, u8::MAX],
        _ => [0; 4],
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbaImage> for PixelGrid<'a> {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &'a RgbaImage) -> Result<Self, Self::Error> {
        let pixels = image.pixels().len();
        if pixels <= MAX_PIXELS as usize {
            Ok(Self {
                data: &image.as_raw()[..(pixels * 4)],
                width: image.width(),
                height: image.height(),
                channels: Channels::Rgba,
            })
        } else {
            Err(AboveMaxLen(MAX_PIXELS))
        }
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbImage> for PixelGrid<'a> {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &'a RgbImage) -> Result<Self, Self::Error> {
        let pixels = image.pixels().len();
        if pixels <= MAX_PIXELS as usize {
            Ok(Self {
                data: &image.as_raw()[..(pixels * 3)],
                width: image.width(),
                height: image.height(),
                channels: Channels::Rgb,
            })
        } else {
            Err(AboveMaxLen(MAX_PIXELS))
        }
    }
}
