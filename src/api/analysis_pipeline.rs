//! Contains the [`AnalysisPipeline`] builder struct for the high level API.

use crate::{
    background::{self, BackgroundOptions},
    report::{paint_grams, round2, AnalysisReport, ColorReportEntry},
    reference::{self, ReferenceEntry},
    selection::{self, ClusterRange, ClusterSelection, Elbow},
    AnalysisError, ClusterCountStrategy, ColorHistogram, KmeansOptions, PixelGrid, ReferenceTable,
    Result, SampleSet, SamplingOptions,
};
use palette::Srgb;
#[cfg(feature = "threads")]
use rayon::prelude::*;
use std::sync::Arc;
#[cfg(feature = "image")]
use {
    crate::AboveMaxLen,
    image::{RgbImage, RgbaImage},
};

/// The default physical width and height of the image, in millimeters.
pub const DEFAULT_PHYSICAL_SIZE_MM: f64 = 100.0;

/// Whether a pipeline stage runs on the current thread or across the rayon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Single threaded.
    Sequential,
    /// Multi threaded.
    #[cfg(feature = "threads")]
    Parallel,
}

/// A builder struct to specify options for analyzing an image and to run the analysis.
///
/// # Examples
/// To start, create an [`AnalysisPipeline`] from a [`RgbaImage`] (needs the `image` feature):
/// ```no_run
/// # use inkmeter::AnalysisPipeline;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("some image")?.into_rgba8();
/// let mut pipeline = AnalysisPipeline::try_from(&img)?;
/// # Ok(())
/// # }
/// ```
///
/// Then, set the physical dimensions and other options:
/// ```
/// # use inkmeter::{AnalysisPipeline, BackgroundOptions, Channels, PixelGrid};
/// # fn main() -> Result<(), inkmeter::AnalysisError> {
/// # let data = [255, 0, 0, 255];
/// # let grid = PixelGrid::new(&data, 1, 1, Channels::Rgba)?;
/// let mut pipeline = AnalysisPipeline::new(grid);
/// pipeline
///     .physical_size(210.0, 297.0)
///     .weight_multiplier(0.8)
///     .cluster_range(3, 8)
///     .background(BackgroundOptions::new().ignore_background(true));
/// # Ok(())
/// # }
/// ```
///
/// Finally, run the analysis against a reference table:
/// ```
/// # use inkmeter::{AnalysisPipeline, Channels, PixelGrid, ReferenceTable};
/// # fn main() -> Result<(), inkmeter::AnalysisError> {
/// # let data = [255, 0, 0, 255];
/// # let grid = PixelGrid::new(&data, 1, 1, Channels::Rgba)?;
/// # let pipeline = AnalysisPipeline::new(grid);
/// let report = pipeline.analyze(&ReferenceTable::fallback())?;
/// # Ok(())
/// # }
/// ```
///
/// Or, in parallel across multiple threads (needs the `threads` feature):
/// ```
/// # use inkmeter::{AnalysisPipeline, Channels, PixelGrid, ReferenceTable};
/// # fn main() -> Result<(), inkmeter::AnalysisError> {
/// # let data = [255, 0, 0, 255];
/// # let grid = PixelGrid::new(&data, 1, 1, Channels::Rgba)?;
/// # let pipeline = AnalysisPipeline::new(grid);
/// let report = pipeline.analyze_par(&ReferenceTable::fallback())?;
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct AnalysisPipeline<'a> {
    /// The input pixels.
    pub(crate) grid: PixelGrid<'a>,
    /// The physical width and height of the image in millimeters.
    pub(crate) physical_size: (f64, f64),
    /// Grams of paint per square millimeter.
    pub(crate) weight_multiplier: f64,
    /// The range of cluster counts to try.
    pub(crate) cluster_range: ClusterRange,
    /// Background removal options.
    pub(crate) background: BackgroundOptions,
    /// Sampling options.
    pub(crate) sampling: SamplingOptions,
    /// Clustering options.
    pub(crate) kmeans: KmeansOptions,
    /// How the number of clusters is chosen.
    pub(crate) strategy: Arc<dyn ClusterCountStrategy>,
}

impl<'a> AnalysisPipeline<'a> {
    /// Creates a new [`AnalysisPipeline`] with default options.
    pub fn new(grid: PixelGrid<'a>) -> Self {
        Self {
            grid,
            physical_size: (DEFAULT_PHYSICAL_SIZE_MM, DEFAULT_PHYSICAL_SIZE_MM),
            weight_multiplier: 1.0,
            cluster_range: ClusterRange::default(),
            background: BackgroundOptions::new(),
            sampling: SamplingOptions::new(),
            kmeans: KmeansOptions::new(),
            strategy: Arc::new(Elbow),
        }
    }

    /// Sets the physical width and height of the image in millimeters.
    ///
    /// The default is [`DEFAULT_PHYSICAL_SIZE_MM`] for both.
    pub fn physical_size(&mut self, width_mm: f64, height_mm: f64) -> &mut Self {
        self.physical_size = (width_mm, height_mm);
        self
    }

    /// Sets the paint mass in grams per square millimeter of area.
    ///
    /// The default is `1.0`.
    pub fn weight_multiplier(&mut self, multiplier: f64) -> &mut Self {
        self.weight_multiplier = multiplier;
        self
    }

    /// Sets the inclusive range of cluster counts to consider.
    ///
    /// The minimum may be raised further if the image has more significant colors.
    /// The default range is `2..=10`.
    pub fn cluster_range(&mut self, k_min: usize, k_max: usize) -> &mut Self {
        self.cluster_range = ClusterRange::new(k_min, k_max);
        self
    }

    /// Sets the background removal options.
    ///
    /// See [`BackgroundOptions`] for more details. By default, nothing is removed.
    pub fn background(&mut self, options: BackgroundOptions) -> &mut Self {
        self.background = options;
        self
    }

    /// Sets the sampling options.
    ///
    /// See [`SamplingOptions`] for more details.
    pub fn sampling(&mut self, options: SamplingOptions) -> &mut Self {
        self.sampling = options;
        self
    }

    /// Sets the k-means options.
    ///
    /// See [`KmeansOptions`] for more details.
    pub fn kmeans(&mut self, options: KmeansOptions) -> &mut Self {
        self.kmeans = options;
        self
    }

    /// Sets the criterion used to pick the number of clusters.
    ///
    /// The default is [`Elbow`].
    pub fn strategy(&mut self, strategy: impl ClusterCountStrategy + 'static) -> &mut Self {
        self.strategy = Arc::new(strategy);
        self
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbaImage> for AnalysisPipeline<'a> {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &'a RgbaImage) -> Result<Self, Self::Error> {
        Ok(Self::new(image.try_into()?))
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbImage> for AnalysisPipeline<'a> {
    type Error = AboveMaxLen<u32>;

    fn try_from(image: &'a RgbImage) -> Result<Self, Self::Error> {
        Ok(Self::new(image.try_into()?))
    }
}

impl<'a> AnalysisPipeline<'a> {
    /// Runs the analysis and returns the report.
    ///
    /// # Errors
    /// Returns [`AnalysisError::NoColorsFound`] if no colors remain after filtering,
    /// [`AnalysisError::NoSamplesAvailable`] if sampling produced nothing,
    /// or [`AnalysisError::NoReferenceData`] if `table` is empty.
    pub fn analyze(&self, table: &ReferenceTable) -> Result<AnalysisReport> {
        self.run(table, Mode::Sequential)
    }

    /// Runs the analysis in parallel. The report is identical to [`AnalysisPipeline::analyze`].
    ///
    /// # Errors
    /// See [`AnalysisPipeline::analyze`].
    #[cfg(feature = "threads")]
    pub fn analyze_par(&self, table: &ReferenceTable) -> Result<AnalysisReport> {
        self.run(table, Mode::Parallel)
    }

    /// Builds the histogram and applies the enabled background filters.
    fn filtered_histogram(&self, mode: Mode) -> ColorHistogram {
        let grid = &self.grid;
        let histogram = match mode {
            Mode::Sequential => ColorHistogram::new(grid),
            #[cfg(feature = "threads")]
            Mode::Parallel => ColorHistogram::new_par(grid),
        };
        tracing::debug!(
            colors = histogram.num_colors(),
            opaque_pixels = histogram.total_count(),
            "built color histogram"
        );

        let histogram = if self.background.ignore_background {
            let options = &self.background;
            let outcome = match mode {
                Mode::Sequential => background::remove_background(grid, &histogram, options),
                #[cfg(feature = "threads")]
                Mode::Parallel => background::remove_background_par(grid, &histogram, options),
            };
            outcome.into_histogram()
        } else {
            histogram
        };

        if self.background.ignore_black {
            background::drop_near_black(&histogram, self.background.near_black_max_channel)
        } else {
            histogram
        }
    }

    /// Clusters the samples.
    fn select(&self, samples: &SampleSet, range: ClusterRange, mode: Mode) -> ClusterSelection {
        let strategy = self.strategy.as_ref();
        match mode {
            Mode::Sequential => selection::select_k(samples, range, &self.kmeans, strategy),
            #[cfg(feature = "threads")]
            Mode::Parallel => selection::select_k_par(samples, range, &self.kmeans, strategy),
        }
    }

    /// Matches each non-empty cluster against the reference table, keeping cluster order.
    fn entries(
        &self,
        selection: &ClusterSelection,
        entries: &[ReferenceEntry],
        total_area: f64,
        mode: Mode,
    ) -> Result<Vec<ColorReportEntry>> {
        let clusters = selection
            .centroids
            .iter()
            .copied()
            .zip(selection.shares.iter().copied())
            .filter(|&(_, share)| share > 0.0)
            .collect::<Vec<_>>();

        let entry = |&(color, share): &(Srgb<u8>, f64)| -> Result<ColorReportEntry> {
            let matched = reference::match_color(color, entries)?;
            Ok(ColorReportEntry::new(color, share, matched, total_area, self.weight_multiplier))
        };

        match mode {
            Mode::Sequential => clusters.iter().map(entry).collect(),
            #[cfg(feature = "threads")]
            Mode::Parallel => clusters.par_iter().map(entry).collect(),
        }
    }

    /// Runs every stage of the analysis.
    fn run(&self, table: &ReferenceTable, mode: Mode) -> Result<AnalysisReport> {
        let histogram = self.filtered_histogram(mode);
        if histogram.is_empty() {
            return Err(AnalysisError::NoColorsFound);
        }
        if table.is_empty() {
            return Err(AnalysisError::NoReferenceData);
        }

        let range = self.cluster_range.raise_floor(&histogram);
        let samples = crate::build_samples(&histogram, &self.sampling)?;
        let selection = self.select(&samples, range, mode);

        let (width_mm, height_mm) = self.physical_size;
        let total_area = width_mm * height_mm;
        let colors = self.entries(&selection, table.entries(), total_area, mode)?;

        Ok(AnalysisReport {
            total_area_mm2: round2(total_area),
            unique_colors_count: histogram.num_colors(),
            optimal_k: selection.k,
            colors,
            total_paint_grams: paint_grams(total_area, self.weight_multiplier),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{tests::*, Channels};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        color.repeat((width * height) as usize)
    }

    #[test]
    fn empty_table_fails_whole_call() {
        let data = solid(4, 4, [255, 0, 0, 255]);
        let grid = PixelGrid::new(&data, 4, 4, Channels::Rgba).unwrap();
        let err = AnalysisPipeline::new(grid)
            .analyze(&ReferenceTable::new(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoReferenceData));
    }

    #[test]
    fn near_black_filter_can_empty_the_image() {
        let data = solid(4, 4, [10, 10, 10, 255]);
        let grid = PixelGrid::new(&data, 4, 4, Channels::Rgba).unwrap();
        let err = AnalysisPipeline::new(grid)
            .background(BackgroundOptions::new().ignore_black(true))
            .analyze(&ReferenceTable::fallback())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoColorsFound));
    }

    /// A 60x60 blue frame around a 10px wide near-black stripe and a red body.
    fn framed_stripe() -> Vec<u8> {
        (0..60 * 60)
            .flat_map(|i| {
                let (x, y) = (i % 60, i / 60);
                if !(10..50).contains(&x) || !(10..50).contains(&y) {
                    [0, 0, 255, 255]
                } else if x < 20 {
                    [20, 20, 20, 255]
                } else {
                    [255, 0, 0, 255]
                }
            })
            .collect()
    }

    fn colors_for(options: BackgroundOptions) -> (usize, Vec<([u8; 3], f64)>) {
        let data = framed_stripe();
        let grid = PixelGrid::new(&data, 60, 60, Channels::Rgba).unwrap();
        let report = AnalysisPipeline::new(grid)
            .background(options)
            .analyze(&ReferenceTable::fallback())
            .unwrap();
        let mut colors = report
            .colors
            .iter()
            .map(|c| (c.rgb, c.percentage))
            .collect::<Vec<_>>();
        colors.sort_by_key(|&(rgb, _)| rgb);
        (report.unique_colors_count, colors)
    }

    #[test]
    fn background_and_near_black_filters_compose() {
        let both = BackgroundOptions::new().ignore_background(true).ignore_black(true);
        assert_eq!(colors_for(both), (1, vec![([255, 0, 0], 100.0)]));

        let background = BackgroundOptions::new().ignore_background(true);
        assert_eq!(
            colors_for(background),
            (2, vec![([20, 20, 20], 25.0), ([255, 0, 0], 75.0)])
        );

        let black = BackgroundOptions::new().ignore_black(true);
        assert_eq!(
            colors_for(black),
            (2, vec![([0, 0, 255], 62.5), ([255, 0, 0], 37.5)])
        );
    }

    #[test]
    fn tiny_image_reports_no_clusters() {
        let data = [0, 200, 0, 255];
        let grid = PixelGrid::new(&data, 1, 1, Channels::Rgba).unwrap();
        let report = AnalysisPipeline::new(grid)
            .physical_size(10.0, 10.0)
            .analyze(&ReferenceTable::fallback())
            .unwrap();
        assert_eq!(report.optimal_k, 2);
        assert!(report.colors.is_empty());
        assert_eq!(report.unique_colors_count, 1);
        assert_eq!(report.total_paint_grams, 100.0);
    }

    #[test]
    fn shares_cover_the_whole_image() {
        let (data, width, height) = test_grid_rgba(64, 64, 3);
        let grid = PixelGrid::new(&data, width, height, Channels::Rgba).unwrap();
        let report = AnalysisPipeline::new(grid)
            .analyze(&ReferenceTable::fallback())
            .unwrap();
        let percentage = report.colors.iter().map(|c| c.percentage).sum::<f64>();
        assert!((percentage - 100.0).abs() < 0.1, "{percentage}");
        assert!(report.colors.len() <= report.optimal_k);
    }

    #[cfg(feature = "threads")]
    #[test]
    fn single_and_multi_threaded_match() {
        let (data, width, height) = test_grid_rgba(64, 48, 5);
        let grid = PixelGrid::new(&data, width, height, Channels::Rgba).unwrap();
        let mut pipeline = AnalysisPipeline::new(grid);
        pipeline.background(BackgroundOptions::new().ignore_background(true));
        let table = ReferenceTable::fallback();
        assert_eq!(pipeline.analyze(&table).unwrap(), pipeline.analyze_par(&table).unwrap());
    }
}
