//! A library for producing color separation reports for print production.
//!
//! Given a decoded image and its physical size, `inkmeter` removes the background,
//! reduces the remaining pixels to a handful of representative ink colors by clustering in CIELAB,
//! matches each ink to the closest swatch of a reference table using CIEDE2000,
//! and reports the area and paint mass for every ink.
//!
//! # Features
//! To reduce dependencies and compile times, `inkmeter` has several `cargo` features
//! that can be turned off or on:
//! - `threads`: exposes parallel versions of most functions via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//! - `cli`: builds the `inkmeter` command line tool.
//!
//! # High-Level API
//! To get started with the high-level API, see [`AnalysisPipeline`].
//! Here is an example:
//! ```no_run
//! # use inkmeter::{AnalysisPipeline, BackgroundOptions, ReferenceTable};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = image::open("some image")?.into_rgba8();
//! let table = ReferenceTable::load("swatches.json")?;
//!
//! let report = AnalysisPipeline::try_from(&img)?
//!     .physical_size(300.0, 200.0) // in millimeters
//!     .weight_multiplier(0.5) // grams of paint per square millimeter
//!     .background(BackgroundOptions::new().ignore_background(true))
//!     .analyze_par(&table)?;
//!
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```
//!
//! Note that some of the options and functions above require certain features to be enabled.
//!
//! # Low-Level API
//! Each stage of the pipeline is also exposed on its own:
//! [`ColorHistogram`], [`remove_background`], [`build_samples`], [`select_k`],
//! and [`match_color`].

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod api;
mod background;
mod color_counts;
mod error;
mod reference;
mod report;
mod sampling;
mod selection;
mod traits;
mod types;

pub mod colorspace;
pub mod kmeans;

pub use api::*;
pub use background::{
    drop_near_black, remove_background, rgb_distance, statistical_background, BackgroundOptions,
    BackgroundOutcome, IgnoredColor, StatisticalThresholds, DEFAULT_FLOOD_TOLERANCE,
    DEFAULT_NEAR_BLACK_MAX_CHANNEL,
};
pub use color_counts::*;
pub use error::*;
pub use kmeans::KmeansOptions;
pub use reference::*;
pub use report::*;
pub use sampling::*;
pub use selection::*;
pub use traits::*;
pub use types::*;

#[cfg(feature = "threads")]
pub use background::remove_background_par;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

#[cfg(test)]
pub(crate) mod tests {
    use rand::{seq::SliceRandom, Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    /// Random colors for a flat illustration: a few hundred pixels of each of 16 colors.
    fn test_palette(rng: &mut Xoroshiro128PlusPlus) -> Vec<[u8; 3]> {
        (0..16).map(|_| [rng.gen(), rng.gen(), rng.gen()]).collect()
    }

    /// A `width * height` RGB grid drawn from a seeded 16 color palette.
    pub fn test_grid_rgb(width: u32, height: u32, seed: u64) -> (Vec<u8>, u32, u32) {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        let palette = test_palette(&mut rng);
        let data = (0..width * height)
            .flat_map(|_| *palette.choose(&mut rng).unwrap_or(&[0; 3]))
            .collect();
        (data, width, height)
    }

    /// A `width * height` RGBA grid drawn from a seeded 16 color palette,
    /// with alpha values on both sides of the transparency threshold.
    pub fn test_grid_rgba(width: u32, height: u32, seed: u64) -> (Vec<u8>, u32, u32) {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        let palette = test_palette(&mut rng);
        let alphas = [0, 127, 128, 255, 255, 255];
        let data = (0..width * height)
            .flat_map(|_| {
                let [r, g, b] = *palette.choose(&mut rng).unwrap_or(&[0; 3]);
                let a = *alphas.choose(&mut rng).unwrap_or(&255);
                [r, g, b, a]
            })
            .collect();
        (data, width, height)
    }
}
