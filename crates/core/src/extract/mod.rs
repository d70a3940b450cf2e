//! Per-region colour extraction.
//!
//! Frames are decoded into 16-bit RGBA so both extraction modes accumulate at
//! full sample precision before quantising down to 8 bits per channel.

use std::{collections::BTreeMap, str::FromStr};

use image::{imageops, imageops::FilterType, DynamicImage, ImageBuffer, Rgba};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    region::{PixelRect, Region, RegionId},
    ChromaticError, Color, Result,
};

/// Decoded frame, one per capture tick.
pub type Frame = ImageBuffer<Rgba<u16>, Vec<u16>>;

/// Extracted colour per region, keyed by region id.
pub type ColorSample = BTreeMap<RegionId, Color>;

/// Width the dominant mode scales region crops down to.
pub const DEFAULT_DOWNSAMPLE_WIDTH: u32 = 50;

/// Fraction of points allowed to change cluster in a k-means pass before the
/// partition counts as converged.
const KMEANS_TOLERANCE: f64 = 0.001;
const KMEANS_MAX_ITERATIONS: usize = 96;

/// Scale between a 16-bit and an 8-bit channel.
const CHANNEL_SCALE: u64 = 0x101;

/// Decodes raw captured bytes (JPEG, PNG, ...) into a [`Frame`].
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.into_rgba16())
}

/// Converts an already decoded image into a [`Frame`].
pub fn frame_from_image(image: DynamicImage) -> Frame {
    image.into_rgba16()
}

/// How a region is reduced to a single colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Mean of every pixel in the region.
    #[default]
    Average,
    /// Centroid of the more populous of two k-means clusters, computed on a
    /// downsampled copy of the region.
    Dominant,
}

impl FromStr for ExtractMode {
    type Err = ChromaticError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "average" => Ok(ExtractMode::Average),
            "dominant" => Ok(ExtractMode::Dominant),
            other => Err(ChromaticError::invalid(format!(
                "unknown extraction mode `{other}`"
            ))),
        }
    }
}

/// Whether regions of one frame are processed on the rayon pool or in order
/// on the calling thread. Both produce identical samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fanout {
    Sequential,
    #[default]
    Parallel,
}

/// Computes one representative colour per configured region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorExtractor {
    mode: ExtractMode,
    fanout: Fanout,
    downsample_width: u32,
}

impl Default for ColorExtractor {
    fn default() -> Self {
        Self::new(ExtractMode::default(), Fanout::default())
    }
}

impl ColorExtractor {
    pub fn new(mode: ExtractMode, fanout: Fanout) -> Self {
        Self {
            mode,
            fanout,
            downsample_width: DEFAULT_DOWNSAMPLE_WIDTH,
        }
    }

    pub fn with_downsample_width(mut self, width: u32) -> Self {
        self.downsample_width = width.max(1);
        self
    }

    pub fn mode(&self) -> ExtractMode {
        self.mode
    }

    pub fn fanout(&self) -> Fanout {
        self.fanout
    }

    /// Extracts the colour of a single region.
    ///
    /// Fails with [`ChromaticError::EmptyRegion`] when the region maps to a
    /// rectangle without pixels on this frame.
    pub fn extract(&self, frame: &Frame, region: &Region) -> Result<Color> {
        let rect = region.rectangle(frame.width(), frame.height());
        if rect.is_empty() {
            return Err(ChromaticError::EmptyRegion(region.id()));
        }

        let color = match self.mode {
            ExtractMode::Average => average(frame, rect),
            ExtractMode::Dominant => dominant(frame, rect, self.downsample_width),
        };

        Ok(color)
    }

    /// Extracts every region of the frame and joins the results.
    ///
    /// Regions that cover no pixels are left out of the sample so the light
    /// keeps whatever colour it last received.
    pub fn sample(&self, frame: &Frame, regions: &[Region]) -> ColorSample {
        let extract = |region: &Region| (region.id(), self.extract(frame, region));

        let results: Vec<(RegionId, Result<Color>)> = match self.fanout {
            Fanout::Sequential => regions.iter().map(extract).collect(),
            Fanout::Parallel => regions.par_iter().map(extract).collect(),
        };

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(color) => Some((id, color)),
                Err(err) => {
                    tracing::debug!(region = id, %err, "skipping region");
                    None
                }
            })
            .collect()
    }
}

/// Mean colour of `rect`, which must be non-empty.
fn average(frame: &Frame, rect: PixelRect) -> Color {
    let mut sums = [0u64; 4];

    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            let Rgba(channels) = frame.get_pixel(x, y);
            for (sum, channel) in sums.iter_mut().zip(channels) {
                *sum += u64::from(*channel);
            }
        }
    }

    let pixels = rect.area();
    quantize(sums.map(|sum| (sum / pixels) as f64))
}

/// Dominant colour of `rect`, which must be non-empty.
fn dominant(frame: &Frame, rect: PixelRect, downsample_width: u32) -> Color {
    let mut crop =
        imageops::crop_imm(frame, rect.left, rect.top, rect.width(), rect.height()).to_image();

    if crop.width() > downsample_width {
        let height = (u64::from(crop.height()) * u64::from(downsample_width)
            / u64::from(crop.width()))
        .max(1) as u32;
        crop = imageops::resize(&crop, downsample_width, height, FilterType::Lanczos3);
    }

    let points: Vec<[f64; 4]> = crop
        .pixels()
        .map(|Rgba(channels)| channels.map(f64::from))
        .collect();

    let mut clusters = partition(&points);
    clusters.sort_by(|a, b| b.population.cmp(&a.population));
    quantize(clusters[0].center)
}

/// Reduces 16-bit channel values to an 8-bit colour.
fn quantize(channels: [f64; 4]) -> Color {
    let [r, g, b, a] = channels.map(|c| (c as u64 / CHANNEL_SCALE).min(255) as u8);
    Color::from_rgba8(r, g, b, a)
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    center: [f64; 4],
    population: usize,
}

/// Splits `points` into two clusters by iterative centroid relocation.
///
/// Seeding is deterministic: the first point, then the point farthest from
/// it, so repeated runs over the same pixels always agree.
fn partition(points: &[[f64; 4]]) -> [Cluster; 2] {
    let first = points.first().copied().unwrap_or_default();
    let farthest = points
        .iter()
        .copied()
        .fold((first, 0.0), |(best, best_distance), point| {
            let distance = distance_sq(&first, &point);
            if distance > best_distance {
                (point, distance)
            } else {
                (best, best_distance)
            }
        })
        .0;

    let mut clusters = [
        Cluster {
            center: first,
            population: 0,
        },
        Cluster {
            center: farthest,
            population: 0,
        },
    ];
    let mut assignments = vec![usize::MAX; points.len()];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = 0usize;
        let mut sums = [[0.0f64; 4]; 2];
        let mut populations = [0usize; 2];

        for (point, assigned) in points.iter().zip(assignments.iter_mut()) {
            let nearest = if distance_sq(point, &clusters[1].center)
                < distance_sq(point, &clusters[0].center)
            {
                1
            } else {
                0
            };

            if *assigned != nearest {
                *assigned = nearest;
                changed += 1;
            }

            populations[nearest] += 1;
            for (sum, value) in sums[nearest].iter_mut().zip(point) {
                *sum += value;
            }
        }

        for (index, cluster) in clusters.iter_mut().enumerate() {
            cluster.population = populations[index];
            if populations[index] > 0 {
                let count = populations[index] as f64;
                cluster.center = sums[index].map(|sum| sum / count);
            }
        }

        if changed as f64 <= points.len() as f64 * KMEANS_TOLERANCE {
            break;
        }
    }

    clusters
}

fn distance_sq(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Preset;

    fn rgba8(r: u8, g: u8, b: u8) -> Rgba<u16> {
        Rgba([r, g, b, 255].map(|c| u16::from(c) * 0x101))
    }

    fn uniform(width: u32, height: u32, pixel: Rgba<u16>) -> Frame {
        ImageBuffer::from_pixel(width, height, pixel)
    }

    /// Four quadrants of distinct colour plus a noisy band in the middle.
    fn quadrants(width: u32, height: u32) -> Frame {
        ImageBuffer::from_fn(width, height, |x, y| {
            let noise = ((x * 31 + y * 17) % 13) as u8;
            match (x < width / 2, y < height / 2) {
                (true, true) => rgba8(200, noise, 10),
                (false, true) => rgba8(noise, 180, 40),
                (true, false) => rgba8(20, 30, 220 - noise),
                (false, false) => rgba8(250, 250, noise),
            }
        })
    }

    fn regions() -> Vec<Region> {
        vec![
            Preset::Top.region(1),
            Preset::Bottom.region(2),
            Preset::Left.region(3),
            Preset::Right.region(4),
            Preset::Whole.region(5),
            Region::new(6, -0.5, 0.5, 20, 20).unwrap(),
            Region::new(7, 0.5, -0.5, 20, 20).unwrap(),
            Region::new(8, 0.9, 0.9, 3, 3).unwrap(),
        ]
    }

    #[test]
    fn decodes_encoded_frames_to_sixteen_bit() {
        let image = image::RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();

        let frame = decode_frame(bytes.get_ref()).unwrap();
        assert_eq!(frame.dimensions(), (4, 3));
        assert_eq!(*frame.get_pixel(0, 0), rgba8(10, 20, 30));
    }

    #[test]
    fn rejects_undecodable_frames() {
        assert!(matches!(
            decode_frame(b"not an image"),
            Err(ChromaticError::Image(_))
        ));
    }

    #[test]
    fn average_of_uniform_region_is_exact() {
        let frame = uniform(64, 48, rgba8(161, 70, 152));
        let extractor = ColorExtractor::new(ExtractMode::Average, Fanout::Sequential);

        let color = extractor.extract(&frame, &Preset::Whole.region(1)).unwrap();
        assert_eq!(color, Color::from_rgba8(161, 70, 152, 255));
    }

    #[test]
    fn average_only_reads_the_region() {
        let frame = quadrants(100, 100);
        let extractor = ColorExtractor::new(ExtractMode::Average, Fanout::Sequential);

        // Bottom-right quadrant, well clear of the noisy channel's edges.
        let region = Region::new(1, 0.5, -0.5, 40, 40).unwrap();
        let color = extractor.extract(&frame, &region).unwrap();
        let [r, g, _] = color.to_rgb8();
        assert_eq!((r, g), (250, 250));
    }

    #[test]
    fn transparent_regions_average_to_black() {
        let frame = uniform(8, 8, Rgba([60000, 60000, 60000, 0]));
        let extractor = ColorExtractor::default();

        let color = extractor.extract(&frame, &Preset::Whole.region(1)).unwrap();
        assert_eq!(color, Color::BLACK);
    }

    #[test]
    fn empty_regions_are_reported_and_skipped() {
        let frame = uniform(10, 10, rgba8(1, 2, 3));
        let extractor = ColorExtractor::default();
        let top = Preset::Top.region(1);

        assert!(matches!(
            extractor.extract(&frame, &top),
            Err(ChromaticError::EmptyRegion(1))
        ));

        let sample = extractor.sample(&frame, &[top, Preset::Whole.region(2)]);
        assert_eq!(sample.len(), 1);
        assert!(sample.contains_key(&2));
    }

    #[test]
    fn dominant_picks_the_larger_cluster() {
        // 30 of 40 columns red, the rest blue.
        let frame = ImageBuffer::from_fn(40, 20, |x, _| {
            if x < 30 {
                rgba8(230, 12, 5)
            } else {
                rgba8(5, 20, 240)
            }
        });
        let extractor = ColorExtractor::new(ExtractMode::Dominant, Fanout::Sequential);

        let color = extractor.extract(&frame, &Preset::Whole.region(1)).unwrap();
        assert_eq!(color, Color::from_rgba8(230, 12, 5, 255));

        let average = ColorExtractor::new(ExtractMode::Average, Fanout::Sequential)
            .extract(&frame, &Preset::Whole.region(1))
            .unwrap();
        assert_ne!(average, color);
    }

    #[test]
    fn dominant_of_uniform_region_is_exact() {
        let frame = uniform(30, 30, rgba8(14, 87, 150));
        let extractor = ColorExtractor::new(ExtractMode::Dominant, Fanout::Sequential);

        let color = extractor.extract(&frame, &Preset::Whole.region(1)).unwrap();
        assert_eq!(color, Color::from_rgba8(14, 87, 150, 255));
    }

    #[test]
    fn dominant_downsamples_wide_regions() {
        let frame = quadrants(400, 200);
        let extractor = ColorExtractor::new(ExtractMode::Dominant, Fanout::Sequential)
            .with_downsample_width(25);

        let region = Region::new(1, -0.5, 0.5, 40, 40).unwrap();
        let [r, _, b] = extractor.extract(&frame, &region).unwrap().to_rgb8();
        assert!(r > 190, "red channel {r}");
        assert!(b < 30, "blue channel {b}");
    }

    #[test]
    fn parallel_and_sequential_samples_agree() {
        let frames = [quadrants(320, 240), quadrants(97, 61), uniform(16, 9, rgba8(9, 9, 9))];

        for mode in [ExtractMode::Average, ExtractMode::Dominant] {
            let sequential = ColorExtractor::new(mode, Fanout::Sequential);
            let parallel = ColorExtractor::new(mode, Fanout::Parallel);

            for frame in &frames {
                let expected = sequential.sample(frame, &regions());
                let actual = parallel.sample(frame, &regions());
                assert_eq!(expected, actual, "{mode:?} on {:?}", frame.dimensions());
                assert!(!actual.is_empty());
            }
        }
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Dominant".parse::<ExtractMode>().unwrap(), ExtractMode::Dominant);
        assert!("median".parse::<ExtractMode>().is_err());
    }
}
