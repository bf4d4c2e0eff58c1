//! Page image preprocessing for OCR.
//!
//! Pipeline: grayscale -> adaptive mean threshold -> skew estimate from the
//! minimum-area rectangle around all ink -> bicubic rotation with replicated
//! borders. Pure Rust on top of `image` buffers; row loops run on `rayon`.

use image::{DynamicImage, GrayImage};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PreprocessError;

const WHITE: u8 = 255;
const INK: u8 = 0;

/// Adaptive threshold parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdParams {
    /// Side of the square neighbourhood; forced odd.
    pub window: u32,
    /// Subtracted from the neighbourhood mean.
    pub offset: f32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            window: 51,
            offset: 10.0,
        }
    }
}

/// Binarize and deskew one page.
pub fn preprocess_page(
    page: &DynamicImage,
    params: ThresholdParams,
) -> Result<GrayImage, PreprocessError> {
    let (width, height) = (page.width(), page.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let gray = page.to_luma8();
    let binary = adaptive_threshold(&gray, params);

    match estimate_skew(&binary) {
        Some(angle) if angle.abs() > f32::EPSILON => {
            debug!("Deskewing {}x{} page by {:.2} degrees", width, height, angle);
            Ok(rotate_about_center(&binary, angle))
        }
        Some(_) => Ok(binary),
        None => {
            debug!("No ink found on {}x{} page, skipping deskew", width, height);
            Ok(binary)
        }
    }
}

/// Pixels brighter than `mean(window) - offset` become white, the rest ink.
pub fn adaptive_threshold(gray: &GrayImage, params: ThresholdParams) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let radius = (params.window.max(3) | 1) / 2;
    let integral = integral_image(gray);
    let stride = w as usize + 1;
    let src = gray.as_raw();

    let mut out = vec![WHITE; (w * h) as usize];
    out.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            let y0 = y.saturating_sub(radius) as usize;
            let y1 = (y + radius + 1).min(h) as usize;
            for (x, px) in row.iter_mut().enumerate() {
                let x0 = (x as u32).saturating_sub(radius) as usize;
                let x1 = (x as u32 + radius + 1).min(w) as usize;
                let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                    - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0];
                let area = ((x1 - x0) * (y1 - y0)) as f64;
                let threshold = sum as f64 / area - params.offset as f64;
                let value = src[y as usize * w as usize + x] as f64;
                *px = if value > threshold { WHITE } else { INK };
            }
        });

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| GrayImage::new(w, h))
}

fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += gray.as_raw()[y * w as usize + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
    integral
}

/// Skew angle in degrees within [-45, 45], or `None` for a page without ink.
///
/// Positive angles mean the content runs downhill to the right.
pub fn estimate_skew(binary: &GrayImage) -> Option<f32> {
    let points = ink_extremes(binary);
    if points.is_empty() {
        return None;
    }
    let hull = convex_hull(points);
    Some(normalize_angle(min_area_rect_angle(&hull)))
}

/// Fold a rectangle angle into [-45, 45] so the page is never turned sideways.
pub fn normalize_angle(angle: f32) -> f32 {
    if angle < -45.0 {
        angle + 90.0
    } else if angle > 45.0 {
        angle - 90.0
    } else {
        angle
    }
}

// The hull of all ink equals the hull of each row's leftmost and rightmost
// ink pixel, which keeps the point set at most 2 * height.
fn ink_extremes(binary: &GrayImage) -> Vec<(f64, f64)> {
    let w = binary.width() as usize;
    if w == 0 {
        return Vec::new();
    }
    let rows: Vec<[(f64, f64); 2]> = binary
        .as_raw()
        .par_chunks(w)
        .enumerate()
        .filter_map(|(y, row)| {
            let first = row.iter().position(|&p| p == INK)?;
            let last = row.iter().rposition(|&p| p == INK)?;
            Some([(first as f64, y as f64), (last as f64, y as f64)])
        })
        .collect();
    rows.into_iter().flatten().collect()
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Andrew's monotone chain.
fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Angle (degrees, [-90, 90)) of one edge of the minimum-area rectangle
/// enclosing the hull; one edge of that rectangle is collinear with a hull edge.
fn min_area_rect_angle(hull: &[(f64, f64)]) -> f32 {
    if hull.len() < 3 {
        return match hull {
            [a, b] => edge_angle(*a, *b) as f32,
            _ => 0.0,
        };
    }

    let mut best_area = f64::INFINITY;
    let mut best_angle = 0.0f64;

    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let theta = (b.1 - a.1).atan2(b.0 - a.0);
        let (sin, cos) = theta.sin_cos();

        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for &(x, y) in hull {
            let u = x * cos + y * sin;
            let v = -x * sin + y * cos;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area - 1e-9 {
            best_area = area;
            best_angle = theta.to_degrees();
        }
    }

    fold_half_turn(best_angle) as f32
}

fn edge_angle(a: (f64, f64), b: (f64, f64)) -> f64 {
    fold_half_turn((b.1 - a.1).atan2(b.0 - a.0).to_degrees())
}

/// An edge direction and its reverse describe the same line.
fn fold_half_turn(mut degrees: f64) -> f64 {
    while degrees >= 90.0 {
        degrees -= 180.0;
    }
    while degrees < -90.0 {
        degrees += 180.0;
    }
    degrees
}

/// Rotate content by `-angle` degrees about the image center using bicubic
/// interpolation; samples outside the image replicate the nearest edge pixel.
pub fn rotate_about_center(img: &GrayImage, angle: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let cx = (w / 2) as f64;
    let cy = (h / 2) as f64;
    let (sin, cos) = (angle as f64).to_radians().sin_cos();

    let mut out = vec![WHITE; (w * h) as usize];
    out.par_chunks_mut(w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 - cy;
            for (x, px) in row.iter_mut().enumerate() {
                let dx = x as f64 - cx;
                let sx = cx + cos * dx - sin * dy;
                let sy = cy + sin * dx + cos * dy;
                *px = sample_bicubic(img, sx, sy);
            }
        });

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| img.clone())
}

// Keys cubic kernel with a = -0.75, as used by common imaging libraries.
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

fn sample_bicubic(img: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = img.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let raw = img.as_raw();

    let mut acc = 0.0;
    for j in -1i64..=2 {
        let wy = cubic_weight(j as f64 - fy);
        let py = (y0 as i64 + j).clamp(0, h as i64 - 1) as usize;
        for i in -1i64..=2 {
            let wx = cubic_weight(i as f64 - fx);
            let px = (x0 as i64 + i).clamp(0, w as i64 - 1) as usize;
            acc += wx * wy * raw[py * w as usize + px] as f64;
        }
    }
    acc.round().clamp(0.0, 255.0) as u8
}
