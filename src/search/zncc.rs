//! Zero-mean normalized cross-correlation over interleaved RGB samples
//!
//! For a placement with window samples `I` and template samples `T` (both
//! `n = w * h * 3` long):
//!
//! ```text
//!            n * sum(T*I) - sum(T) * sum(I)
//! score = -----------------------------------------------------------
//!         sqrt(n * sum(T^2) - sum(T)^2) * sqrt(n * sum(I^2) - sum(I)^2)
//! ```
//!
//! All sums are exact integers; window sums come from an integral image built
//! once per source, so only the cross term is computed per placement. A flat
//! template or a flat window scores 0.
//!
//! Placements are visited in row-major order and a later placement only wins
//! with a strictly greater score, so ties resolve to the first one.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use image::RgbImage;

use super::template::Template;
use crate::model::PixelRect;

/// Summed-area tables of per-pixel channel sums and squared sums
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width:   usize,
    height:  usize,
    sums:    Vec<u64>,
    squares: Vec<u64>,
}

impl IntegralImage {
    pub fn new(image: &RgbImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let cols = width + 1;
        let mut sums = vec![0u64; cols * (height + 1)];
        let mut squares = vec![0u64; cols * (height + 1)];
        let raw = image.as_raw();

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            let row = &raw[y * width * 3..(y + 1) * width * 3];
            for (x, px) in row.chunks_exact(3).enumerate() {
                for &v in px {
                    let v = u64::from(v);
                    row_sum += v;
                    row_sq += v * v;
                }
                let at = (y + 1) * cols + x + 1;
                sums[at] = sums[at - cols] + row_sum;
                squares[at] = squares[at - cols] + row_sq;
            }
        }

        Self {
            width,
            height,
            sums,
            squares,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Sum and squared sum of all samples in the window
    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (u64, u64) {
        let cols = self.width + 1;
        let (top, bottom) = (y * cols, (y + h) * cols);
        let (left, right) = (x, x + w);
        let area = |t: &[u64]| t[bottom + right] + t[top + left] - t[top + right] - t[bottom + left];
        (area(&self.sums), area(&self.squares))
    }
}

/// Decoded source image with its integral tables
///
/// Built once and shared by every request of a batch.
#[derive(Debug, Clone)]
pub struct PreparedSource {
    image:    RgbImage,
    integral: IntegralImage,
}

impl PreparedSource {
    pub fn new(image: RgbImage) -> Self {
        let integral = IntegralImage::new(&image);
        Self { image, integral }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Best-scoring template position, in source coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x:     u32,
    pub y:     u32,
    pub score: f64,
}

/// Scans every placement of `template` fully inside `area`
///
/// Returns `None` when the template does not fit the area or the area is not
/// inside the source.
pub fn best_match(source: &PreparedSource, template: &Template, area: PixelRect) -> Option<Placement> {
    let (tw, th) = template.dimensions();
    if area.is_empty()
        || !area.fits_within(source.width(), source.height())
        || area.width < tw
        || area.height < th
    {
        return None;
    }

    let scan = Scan::new(source, template);
    let rows = area.y..=area.y + area.height - th;
    let cols = area.x..=area.x + area.width - tw;

    #[cfg(feature = "parallel")]
    let row_bests: Vec<Placement> = rows
        .into_par_iter()
        .map(|y| scan.best_in_row(y, cols.clone()))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let row_bests: Vec<Placement> = rows.map(|y| scan.best_in_row(y, cols.clone())).collect();

    row_bests.into_iter().fold(None, |best: Option<Placement>, candidate| match best {
        Some(best) if candidate.score <= best.score => Some(best),
        _ => Some(candidate),
    })
}

/// Score of the placement with top-left corner `(x, y)`
///
/// Returns `None` if the template does not fit there.
pub fn score_at(source: &PreparedSource, template: &Template, x: u32, y: u32) -> Option<f64> {
    let (tw, th) = template.dimensions();
    let fits = x.checked_add(tw).is_some_and(|right| right <= source.width())
        && y.checked_add(th).is_some_and(|bottom| bottom <= source.height());
    fits.then(|| Scan::new(source, template).score(x, y))
}

struct Scan<'a> {
    source:   &'a PreparedSource,
    template: &'a Template,
    n:        u128,
    row_len:  usize,
    stride:   usize,
}

impl<'a> Scan<'a> {
    fn new(source: &'a PreparedSource, template: &'a Template) -> Self {
        Self {
            source,
            template,
            n: u128::from(template.sample_count()),
            row_len: template.width() as usize * 3,
            stride: source.width() as usize * 3,
        }
    }

    fn best_in_row(&self, y: u32, cols: std::ops::RangeInclusive<u32>) -> Placement {
        let mut best = Placement {
            x: *cols.start(),
            y,
            score: f64::NEG_INFINITY,
        };
        for x in cols {
            let score = self.score(x, y);
            if score > best.score {
                best = Placement { x, y, score };
            }
        }
        best
    }

    fn score(&self, x: u32, y: u32) -> f64 {
        let var_t = self.template.centered_variance();
        if var_t == 0 {
            return 0.0;
        }

        let (tw, th) = self.template.dimensions();
        let (sum_i, sum_sq_i) =
            self.source
                .integral
                .window(x as usize, y as usize, tw as usize, th as usize);
        let var_i = (self.n * u128::from(sum_sq_i)).saturating_sub(u128::from(sum_i) * u128::from(sum_i));
        if var_i == 0 {
            return 0.0;
        }

        let dot = self.cross(x as usize, y as usize, th as usize);
        let numerator = self.n as i128 * i128::from(dot)
            - i128::from(self.template.sum()) * i128::from(sum_i);
        // One rounding before the root, so identical variances give exactly 1
        let denominator = ((var_t as f64) * (var_i as f64)).sqrt();
        (numerator as f64 / denominator).clamp(-1.0, 1.0)
    }

    /// `sum(T*I)` over the window at `(x, y)`
    fn cross(&self, x: usize, y: usize, rows: usize) -> u64 {
        let source = self.source.image.as_raw();
        let template = self.template.samples();
        (0..rows)
            .map(|ty| {
                let start = (y + ty) * self.stride + x * 3;
                let window_row = &source[start..start + self.row_len];
                let template_row = &template[ty * self.row_len..(ty + 1) * self.row_len];
                window_row
                    .iter()
                    .zip(template_row)
                    .map(|(&a, &b)| u64::from(a) * u64::from(b))
                    .sum::<u64>()
            })
            .sum()
    }
}
