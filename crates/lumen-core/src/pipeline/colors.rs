//! Dominant color extraction by bucketed pixel counting.
//!
//! Each channel is quantized into buckets of `bucket_size`; a bucket is
//! represented by its midpoint. Buckets are ranked by pixel count, ties
//! going to the bucket encountered first in a row-major scan, so the result
//! is stable for a fixed image and configuration.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::config::ColorConfig;
use crate::types::Rgb;

/// Extracts the most frequent colors of an image.
#[derive(Debug, Clone)]
pub struct DominantColorExtractor {
    config: ColorConfig,
}

impl DominantColorExtractor {
    pub fn new(config: ColorConfig) -> Self {
        Self { config }
    }

    /// Return up to `count` colors, most frequent first.
    ///
    /// Fewer colors are returned only when the image has fewer distinct
    /// quantized colors. Fully transparent pixels are ignored unless the
    /// image has no visible pixel at all.
    pub fn extract(&self, image: &DynamicImage) -> Vec<Rgb> {
        let sampled = self.sample(image);
        let pixels = sampled.to_rgba8();

        let mut counts = self.count(pixels.pixels().filter(|p| p.0[3] > 0).map(|p| p.0));
        if counts.is_empty() {
            counts = self.count(pixels.pixels().map(|p| p.0));
        }

        let mut ranked: Vec<(Rgb, usize, usize)> = counts
            .into_iter()
            .map(|(color, (count, first_seen))| (color, count, first_seen))
            .collect();
        ranked.sort_by_key(|&(_, count, first_seen)| (Reverse(count), first_seen));

        ranked
            .into_iter()
            .take(self.config.count)
            .map(|(color, _, _)| color)
            .collect()
    }

    /// Downsample with nearest-neighbour so no blended colors are introduced.
    fn sample(&self, image: &DynamicImage) -> DynamicImage {
        let target = self.config.sample_size;
        let (width, height) = image.dimensions();
        if target == 0 || (width <= target && height <= target) {
            image.clone()
        } else {
            image.resize(target, target, FilterType::Nearest)
        }
    }

    /// Map of bucket -> (pixel count, scan index of first occurrence).
    fn count(&self, pixels: impl Iterator<Item = [u8; 4]>) -> HashMap<Rgb, (usize, usize)> {
        let mut counts: HashMap<Rgb, (usize, usize)> = HashMap::new();
        for (index, [r, g, b, _]) in pixels.enumerate() {
            let key = Rgb(self.quantize(r), self.quantize(g), self.quantize(b));
            counts.entry(key).or_insert((0, index)).0 += 1;
        }
        counts
    }

    fn quantize(&self, value: u8) -> u8 {
        let bucket = u16::from(self.config.bucket_size);
        if bucket <= 1 {
            return value;
        }
        let start = u16::from(value) / bucket * bucket;
        (start + bucket / 2).min(255) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn exact(count: usize) -> DominantColorExtractor {
        DominantColorExtractor::new(ColorConfig {
            count,
            bucket_size: 1,
            sample_size: 0,
        })
    }

    /// Paint vertical stripes of the given widths and colors.
    fn stripes(height: u32, stripes: &[(u32, [u8; 4])]) -> DynamicImage {
        let width = stripes.iter().map(|(w, _)| w).sum();
        let mut img = RgbaImage::new(width, height);
        let mut x0 = 0;
        for &(w, color) in stripes {
            for x in x0..x0 + w {
                for y in 0..height {
                    img.put_pixel(x, y, Rgba(color));
                }
            }
            x0 += w;
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_ranks_by_pixel_count() {
        let img = stripes(
            10,
            &[
                (2, [0, 0, 255, 255]),
                (5, [255, 0, 0, 255]),
                (3, [0, 255, 0, 255]),
                (1, [9, 9, 9, 255]),
            ],
        );
        let colors = exact(3).extract(&img);
        assert_eq!(colors, vec![Rgb(255, 0, 0), Rgb(0, 255, 0), Rgb(0, 0, 255)]);
    }

    #[test]
    fn test_ties_go_to_first_in_scan_order() {
        // Equal counts: the left stripe appears first in every row.
        let img = stripes(4, &[(3, [10, 20, 30, 255]), (3, [200, 100, 50, 255])]);
        let colors = exact(3).extract(&img);
        assert_eq!(colors, vec![Rgb(10, 20, 30), Rgb(200, 100, 50)]);
    }

    #[test]
    fn test_fewer_distinct_colors_than_requested() {
        let img = stripes(5, &[(5, [1, 2, 3, 255])]);
        assert_eq!(exact(3).extract(&img), vec![Rgb(1, 2, 3)]);
    }

    #[test]
    fn test_quantization_merges_near_colors() {
        let extractor = DominantColorExtractor::new(ColorConfig {
            count: 3,
            bucket_size: 32,
            sample_size: 0,
        });
        let img = stripes(2, &[(2, [250, 0, 0, 255]), (2, [240, 5, 10, 255])]);
        assert_eq!(extractor.extract(&img), vec![Rgb(240, 16, 16)]);
    }

    #[test]
    fn test_top_bucket_is_clamped() {
        let extractor = DominantColorExtractor::new(ColorConfig {
            count: 1,
            bucket_size: 200,
            sample_size: 0,
        });
        let img = stripes(1, &[(1, [255, 255, 255, 255])]);
        assert_eq!(extractor.extract(&img), vec![Rgb(255, 255, 255)]);
    }

    #[test]
    fn test_transparent_pixels_are_ignored() {
        let img = stripes(2, &[(8, [0, 0, 0, 0]), (1, [50, 60, 70, 255])]);
        assert_eq!(exact(3).extract(&img), vec![Rgb(50, 60, 70)]);

        let invisible = stripes(2, &[(2, [0, 0, 0, 0])]);
        assert_eq!(exact(3).extract(&invisible), vec![Rgb(0, 0, 0)]);
    }

    #[test]
    fn test_deterministic_with_downsampling() {
        let mut img = RgbaImage::new(640, 480);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgba([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8, 255]);
        }
        let img = DynamicImage::ImageRgba8(img);
        let extractor = DominantColorExtractor::new(ColorConfig::default());

        let first = extractor.extract(&img);
        assert_eq!(first.len(), 3);
        for _ in 0..5 {
            assert_eq!(extractor.extract(&img), first);
        }
    }
}
