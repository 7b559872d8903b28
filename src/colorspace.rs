//! Conversions between 8-bit sRGB and CIELAB under the D50 reference white.
//!
//! sRGB is defined against D65, so XYZ values are chromatically adapted to D50
//! with the Bradford transform before the L\*a\*b\* transfer functions are applied.

use palette::{
    convert::FromColorUnclamped,
    white_point::{D50, D65},
    Lab, LinSrgb, Srgb, Xyz,
};
#[cfg(feature = "threads")]
use rayon::prelude::*;

/// A CIELAB color relative to the D50 white point.
pub type LabD50 = Lab<D50, f64>;

/// Bradford adaptation from D65 to D50.
#[allow(clippy::excessive_precision)]
const BRADFORD_D65_TO_D50: [[f64; 3]; 3] = [
    [1.0478112, 0.0228866, -0.0501270],
    [0.0295424, 0.9904844, -0.0170491],
    [-0.0092345, 0.0150436, 0.7521316],
];

/// Bradford adaptation from D50 to D65, the inverse of [`BRADFORD_D65_TO_D50`].
#[allow(clippy::excessive_precision)]
const BRADFORD_D50_TO_D65: [[f64; 3]; 3] = [
    [0.9555766, -0.0230393, 0.0631636],
    [-0.0282895, 1.0099416, 0.0210077],
    [0.0122982, -0.0204830, 1.3299098],
];

#[inline]
fn transform(m: &[[f64; 3]; 3], [x, y, z]: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * x + m[0][1] * y + m[0][2] * z,
        m[1][0] * x + m[1][1] * y + m[1][2] * z,
        m[2][0] * x + m[2][1] * y + m[2][2] * z,
    ]
}

/// Converts an 8-bit sRGB color to D50 CIELAB.
#[must_use]
pub fn rgb_to_lab(color: Srgb<u8>) -> LabD50 {
    let linear: LinSrgb<f64> = color.into_format::<f64>().into_linear();
    let xyz = Xyz::<D65, f64>::from_color_unclamped(linear);
    let [x, y, z] = transform(&BRADFORD_D65_TO_D50, [xyz.x, xyz.y, xyz.z]);
    Lab::from_color_unclamped(Xyz::<D50, f64>::new(x, y, z))
}

/// Converts a D50 CIELAB color back to 8-bit sRGB.
///
/// Colors outside of the sRGB gamut are clamped channel-wise, then rounded to the nearest integer.
#[must_use]
pub fn lab_to_rgb(lab: LabD50) -> Srgb<u8> {
    let xyz = Xyz::<D50, f64>::from_color_unclamped(lab);
    let [x, y, z] = transform(&BRADFORD_D50_TO_D65, [xyz.x, xyz.y, xyz.z]);
    let linear = LinSrgb::<f64>::from_color_unclamped(Xyz::<D65, f64>::new(x, y, z));
    let srgb = Srgb::<f64>::from_linear(linear);
    Srgb::new(
        to_channel(srgb.red),
        to_channel(srgb.green),
        to_channel(srgb.blue),
    )
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Formats a color as an upper-case `#RRGGBB` string.
#[must_use]
pub fn hex(color: Srgb<u8>) -> String {
    let (r, g, b) = color.into_components();
    format!("#{r:02X}{g:02X}{b:02X}")
}

/// Converts each color to D50 CIELAB.
pub(crate) fn convert_to_lab(colors: &[Srgb<u8>]) -> Vec<LabD50> {
    colors.iter().copied().map(rgb_to_lab).collect()
}

/// Converts each color to D50 CIELAB in parallel.
#[cfg(feature = "threads")]
pub(crate) fn convert_to_lab_par(colors: &[Srgb<u8>]) -> Vec<LabD50> {
    colors.par_iter().copied().map(rgb_to_lab).collect()
}
