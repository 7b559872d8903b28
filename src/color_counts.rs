//! Contains the color histogram: deduplicated opaque pixel colors and their frequency counts.

use crate::PixelGrid;
use bitvec::slice::BitSlice;
use palette::Srgb;
#[cfg(feature = "threads")]
use rayon::prelude::*;
use std::cmp::Reverse;

/// Pixels with an alpha below this value are excluded from the histogram entirely.
pub const ALPHA_THRESHOLD: u8 = 128;

/// Packs an RGB triple into a sortable 24-bit key.
#[inline]
fn pack([r, g, b, _]: [u8; 4]) -> u32 {
    u32::from_be_bytes([0, r, g, b])
}

/// Unpacks a key produced by [`pack`].
#[inline]
fn unpack(key: u32) -> Srgb<u8> {
    let [_, r, g, b] = key.to_be_bytes();
    Srgb::new(r, g, b)
}

/// Returns the key for the pixel if it is opaque enough and not masked out.
#[inline]
fn opaque_key(rgba: [u8; 4], masked: bool) -> Option<u32> {
    (!masked && rgba[3] >= ALPHA_THRESHOLD).then(|| pack(rgba))
}

/// Sums counts, saturating at `u32::MAX`.
#[inline]
fn saturating_total(counts: &[u32]) -> u32 {
    counts.iter().fold(0, |sum, &count| sum.saturating_add(count))
}

/// Deduplicated opaque colors and their frequency counts.
///
/// The unique colors are stored in ascending order of their 24-bit RGB key,
/// so the histogram (and every ordering derived from it) is deterministic
/// regardless of whether it was built sequentially or in parallel.
///
/// Invariants: every count is nonzero, and the counts sum to [`ColorHistogram::total_count`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorHistogram {
    /// The unique colors, sorted by key.
    colors: Vec<Srgb<u8>>,
    /// The number of pixels with each color.
    counts: Vec<u32>,
    /// The number of opaque pixels counted.
    total_count: u32,
}

impl ColorHistogram {
    /// Builds the histogram for every pixel of the grid.
    ///
    /// Pixels with alpha below [`ALPHA_THRESHOLD`] are skipped, and alpha is discarded for the rest.
    #[must_use]
    pub fn new(grid: &PixelGrid) -> Self {
        let keys = grid
            .pixels()
            .filter_map(|rgba| opaque_key(rgba, false))
            .collect();
        Self::from_keys(keys)
    }

    /// Builds the histogram, additionally skipping every pixel whose bit is set in `excluded`.
    ///
    /// `excluded` is indexed by flat pixel index and must have at least
    /// [`PixelGrid::num_pixels`] bits.
    #[must_use]
    pub fn masked(grid: &PixelGrid, excluded: &BitSlice) -> Self {
        let keys = grid
            .pixels()
            .zip(excluded.iter().by_vals())
            .filter_map(|(rgba, masked)| opaque_key(rgba, masked))
            .collect();
        Self::from_keys(keys)
    }

    /// Run-length encodes a list of pixel keys.
    fn from_keys(mut keys: Vec<u32>) -> Self {
        keys.sort_unstable();
        Self::from_sorted_keys(&keys)
    }

    /// Run-length encodes a sorted list of pixel keys.
    fn from_sorted_keys(keys: &[u32]) -> Self {
        let mut colors = Vec::new();
        let mut counts = Vec::new();

        for run in keys.chunk_by(|a, b| a == b) {
            #[allow(clippy::cast_possible_truncation)]
            let count = run.len() as u32;
            colors.push(unpack(run[0]));
            counts.push(count);
        }

        #[allow(clippy::cast_possible_truncation)]
        let total_count = keys.len() as u32;

        Self { colors, counts, total_count }
    }

    /// Creates a histogram directly from parallel color and count vectors.
    ///
    /// Entries with a zero count are dropped and duplicate colors are merged.
    /// Merged counts and the total saturate at `u32::MAX`.
    #[must_use]
    pub fn from_counts(entries: impl IntoIterator<Item = (Srgb<u8>, u32)>) -> Self {
        let mut entries = entries
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(color, count)| {
                let (r, g, b) = color.into_components();
                (pack([r, g, b, 0]), count)
            })
            .collect::<Vec<_>>();
        entries.sort_unstable_by_key(|&(key, _)| key);

        let mut colors = Vec::with_capacity(entries.len());
        let mut counts = Vec::with_capacity(entries.len());
        for run in entries.chunk_by(|a, b| a.0 == b.0) {
            colors.push(unpack(run[0].0));
            counts.push(
                run.iter()
                    .fold(0u32, |sum, &(_, count)| sum.saturating_add(count)),
            );
        }
        let total_count = saturating_total(&counts);

        Self { colors, counts, total_count }
    }

    /// Returns the slice of unique colors in ascending key order.
    #[must_use]
    pub fn colors(&self) -> &[Srgb<u8>] {
        &self.colors
    }

    /// Returns the number of pixels with each color in [`ColorHistogram::colors`].
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Returns the number of opaque pixels counted (the sum of all counts).
    #[must_use]
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    /// Returns the number of distinct colors.
    #[must_use]
    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    /// Whether the histogram has no colors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// An iterator over `(color, count)` pairs in ascending key order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (Srgb<u8>, u32)> + '_ {
        self.colors.iter().copied().zip(self.counts.iter().copied())
    }

    /// Returns the count for the given color, or `0` if it is not present.
    #[must_use]
    pub fn count_of(&self, color: Srgb<u8>) -> u32 {
        let (r, g, b) = color.into_components();
        let key = pack([r, g, b, 0]);
        self.colors
            .binary_search_by_key(&key, |&c| {
                let (r, g, b) = c.into_components();
                pack([r, g, b, 0])
            })
            .map_or(0, |i| self.counts[i])
    }

    /// Returns the `(color, count)` pairs sorted by descending count.
    /// Ties are broken by ascending key.
    #[must_use]
    pub fn by_frequency(&self) -> Vec<(Srgb<u8>, u32)> {
        let mut entries = self.iter().collect::<Vec<_>>();
        // the sort is stable and entries start in key order
        entries.sort_by_key(|&(_, count)| Reverse(count));
        entries
    }

    /// Returns a new histogram keeping only the colors for which `keep` returns `true`.
    #[must_use]
    pub fn retain(&self, mut keep: impl FnMut(Srgb<u8>, u32) -> bool) -> Self {
        let (colors, counts): (Vec<_>, Vec<_>) =
            self.iter().filter(|&(color, count)| keep(color, count)).unzip();
        let total_count = saturating_total(&counts);
        Self { colors, counts, total_count }
    }
}

#[cfg(feature = "threads")]
impl ColorHistogram {
    /// Builds the histogram in parallel. The result is identical to [`ColorHistogram::new`].
    #[must_use]
    pub fn new_par(grid: &PixelGrid) -> Self {
        let keys = grid
            .as_bytes()
            .par_chunks_exact(grid.channels().len())
            .filter_map(|px| opaque_key(crate::types::rgba_of(px), false))
            .collect();
        Self::from_keys_par(keys)
    }

    /// Builds the masked histogram in parallel. The result is identical to [`ColorHistogram::masked`].
    #[must_use]
    pub fn masked_par(grid: &PixelGrid, excluded: &BitSlice) -> Self {
        let keys = grid
            .as_bytes()
            .par_chunks_exact(grid.channels().len())
            .enumerate()
            .filter_map(|(i, px)| opaque_key(crate::types::rgba_of(px), excluded[i]))
            .collect();
        Self::from_keys_par(keys)
    }

    /// Run-length encodes a list of pixel keys after sorting them in parallel.
    fn from_keys_par(mut keys: Vec<u32>) -> Self {
        keys.par_sort_unstable();
        Self::from_sorted_keys(&keys)
    }
}
