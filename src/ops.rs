//! # ops
//!
//! Histogram operations for dataset statistics.

use anyhow::{ensure, Result};
use image::{Rgba, RgbaImage};
use itertools::Itertools;
use ndarray::Array1;

/// `num` evenly spaced samples over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Array1<f64> {
    match num {
        0 => Array1::zeros(0),
        1 => Array1::from_elem(1, start),
        _ => Array1::linspace(start, stop, num),
    }
}

/// Histogram over fixed bin edges.
///
/// Bin `i` covers `[edges[i], edges[i + 1])`, except the last bin which also holds
/// `edges[n]`. Values outside the edges are not counted.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// Monotonically increasing bin edges.
    pub edges: Array1<f64>,
    /// Number of values per bin; one shorter than `edges`.
    pub counts: Array1<usize>,
}

impl Histogram {
    /// Histogram of `values` with edges spanning `ceil(min)` to `floor(max)`.
    ///
    /// When all values are equal a single bin `[v, v + 1)` is used. No values yield an
    /// empty histogram.
    pub fn from_counts(values: &[usize], num_edges: usize) -> Result<Self> {
        ensure!(
            num_edges >= 2,
            "A histogram needs at least 2 edges, got {num_edges}."
        );
        let Some((min, max)) = values.iter().minmax().into_option() else {
            return Ok(Self {
                edges: Array1::zeros(0),
                counts: Array1::zeros(0),
            });
        };
        let (low, high) = ((*min as f64).ceil(), (*max as f64).floor());
        let edges = if low < high {
            linspace(low, high, num_edges)
        } else {
            Array1::from_vec(vec![low, low + 1.])
        };

        let mut histogram = Self {
            counts: Array1::zeros(edges.len() - 1),
            edges,
        };
        for value in values {
            if let Some(bin) = histogram.bin(*value as f64) {
                histogram.counts[bin] += 1;
            }
        }
        Ok(histogram)
    }

    /// Index of the bin holding `value`.
    pub fn bin(&self, value: f64) -> Option<usize> {
        let num_bins = self.num_bins();
        if num_bins == 0 || value < self.edges[0] || value > self.edges[num_bins] {
            return None;
        }
        let upper = self
            .edges
            .as_slice()?
            .partition_point(|&edge| edge <= value);
        Some((upper - 1).min(num_bins - 1))
    }

    /// Number of bins.
    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// Number of counted values.
    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Whether the histogram has no bins.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// One line per bin with a bar scaled to `width` characters.
    pub fn render_text(&self, width: usize) -> String {
        let max_count = self.counts.iter().copied().max().unwrap_or(0).max(1);
        self.counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let closing = if i + 1 == self.num_bins() { ']' } else { ')' };
                let bar = "#".repeat(count * width / max_count);
                format!(
                    "[{:>8.1}, {:>8.1}{closing} {bar:<width$} {count}\n",
                    self.edges[i],
                    self.edges[i + 1],
                )
            })
            .collect()
    }

    /// Bar chart on a white background.
    pub fn render_image(&self, width: u32, height: u32) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let num_bins = self.num_bins() as u32;
        if num_bins == 0 || width < num_bins {
            return image;
        }
        let max_count = self.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
        let bar_width = width / num_bins;
        for (i, count) in self.counts.iter().enumerate() {
            let bar_height = (*count as f64 / max_count * height as f64).round() as u32;
            let x0 = i as u32 * bar_width;
            // One pixel gap between bars.
            for x in x0..(x0 + bar_width.saturating_sub(1)).max(x0 + 1).min(width) {
                for y in height.saturating_sub(bar_height)..height {
                    image.put_pixel(x, y, Rgba([70, 110, 180, 255]));
                }
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;
    use ndarray::array;

    use super::{linspace, Histogram};

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0., 10., 3), array![0., 5., 10.]);
        assert_eq!(linspace(4., 9., 1), array![4.]);
        assert_eq!(linspace(4., 9., 0).len(), 0);
    }

    #[test]
    fn test_histogram_matches_numpy() {
        // np.histogram([0, 1, 2, 2, 3, 9, 10], bins=np.linspace(0, 10, 6))
        let histogram = Histogram::from_counts(&[0, 1, 2, 2, 3, 9, 10], 6).unwrap();
        assert_eq!(histogram.edges, array![0., 2., 4., 6., 8., 10.]);
        assert_eq!(histogram.counts, array![2usize, 3, 0, 0, 2]);
        assert_eq!(histogram.total(), 7);
    }

    #[test]
    fn test_histogram_twenty_edges() {
        let values: Vec<usize> = (0..=190).collect();
        let histogram = Histogram::from_counts(&values, 20).unwrap();
        assert_eq!(histogram.num_bins(), 19);
        assert_eq!(histogram.counts[0], 10);
        assert_eq!(histogram.counts[18], 11);
        assert_eq!(histogram.total(), values.len());
    }

    #[test]
    fn test_histogram_degenerate_inputs() {
        let empty = Histogram::from_counts(&[], 20).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.render_text(10), "");

        let constant = Histogram::from_counts(&[7, 7, 7], 20).unwrap();
        assert_eq!(constant.edges, array![7., 8.]);
        assert_eq!(constant.counts, array![3usize]);

        assert!(Histogram::from_counts(&[1, 2], 1).is_err());
    }

    #[test]
    fn test_render() {
        let histogram = Histogram::from_counts(&[0, 0, 5, 10], 3).unwrap();
        let text = histogram.render_text(4);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().contains("####"));
        assert!(text.lines().last().unwrap().contains("10.0]"));

        let image = histogram.render_image(40, 20);
        assert_eq!(image.dimensions(), (40, 20));
        assert_eq!(image.get_pixel(0, 19), &Rgba([70, 110, 180, 255]));
        assert_eq!(image.get_pixel(0, 0), &Rgba([70, 110, 180, 255]));
        assert_eq!(image.get_pixel(39, 0), &Rgba([255, 255, 255, 255]));
    }
}
