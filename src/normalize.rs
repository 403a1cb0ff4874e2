//! Plate-crop normalization cascade.
//!
//! Six stages run in order: upscale, perspective rectification, deskew,
//! bilateral denoise, CLAHE contrast enhancement, unsharp sharpening. The
//! cascade is a total function: every stage degrades to returning its input
//! when it cannot improve it, and an empty crop short-circuits immediately.
//! The output feeds the OCR retry path, never the persisted crop.

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{bilateral_filter, filter3x3, gaussian_blur_f32};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::dilate;
use imageproc::point::Point;

use crate::geometry::{distance, is_visible_skew, normalize_skew_angle, order_corners};

/// Crops narrower than this are upscaled before anything else; small plates
/// carry too few pixels per glyph for the OCR engine.
const MIN_PLATE_WIDTH: u32 = 200;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const BLUR_SIGMA: f32 = 1.4;

/// A rectified quad must plausibly be a plate face.
const MIN_RECT_WIDTH: u32 = 50;
const MIN_RECT_HEIGHT: u32 = 20;
const MIN_ASPECT: f32 = 1.5;
const MAX_ASPECT: f32 = 6.0;

/// Contours examined per crop, largest areas first.
const MAX_CONTOUR_CANDIDATES: usize = 5;

/// Deskew needs a minimum of foreground evidence.
const MIN_FOREGROUND_PIXELS: usize = 10;

const BILATERAL_WINDOW: u32 = 9;
const BILATERAL_SIGMA: f32 = 75.0;

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_TILES: u32 = 8;

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Run the full cascade. Never panics; an unusable input comes back as-is.
pub fn normalize_plate(crop: &RgbImage) -> RgbImage {
    if crop.width() == 0 || crop.height() == 0 {
        return crop.clone();
    }
    let img = upscale_small(crop);
    let img = rectify_perspective(&img);
    let img = deskew(&img);
    let img = denoise(&img);
    let img = enhance_contrast(&img);
    sharpen(&img)
}

// ----------------------------------------------------------------------------
// Stage 1: upscale
// ----------------------------------------------------------------------------

fn upscale_small(img: &RgbImage) -> RgbImage {
    if img.width() >= MIN_PLATE_WIDTH {
        return img.clone();
    }
    let scale = MIN_PLATE_WIDTH as f32 / img.width() as f32;
    let new_h = ((img.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(img, MIN_PLATE_WIDTH, new_h, imageops::FilterType::CatmullRom)
}

// ----------------------------------------------------------------------------
// Stage 2: perspective rectification
// ----------------------------------------------------------------------------

fn rectify_perspective(img: &RgbImage) -> RgbImage {
    let gray = imageops::grayscale(img);
    let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
    // Close one-pixel gaps so the plate boundary forms a single contour.
    let closed = dilate(&edges, Norm::LInf, 1);

    let mut contours: Vec<Contour<i32>> = find_contours(&closed);
    contours.retain(|c| c.border_type == BorderType::Outer && c.parent.is_none());
    contours.sort_by(|a, b| {
        shoelace_area(&b.points)
            .partial_cmp(&shoelace_area(&a.points))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for contour in contours.iter().take(MAX_CONTOUR_CANDIDATES) {
        let perimeter = arc_length(&contour.points, true);
        let approx = approximate_polygon_dp(&contour.points, 0.02 * perimeter, true);
        if approx.len() != 4 {
            continue;
        }
        let corners = order_corners([
            (approx[0].x as f32, approx[0].y as f32),
            (approx[1].x as f32, approx[1].y as f32),
            (approx[2].x as f32, approx[2].y as f32),
            (approx[3].x as f32, approx[3].y as f32),
        ]);
        let [tl, tr, br, bl] = corners;

        let width_bottom = distance(br, bl);
        let width_top = distance(tr, tl);
        let max_w = (width_bottom as u32).max(width_top as u32);
        let height_right = distance(tr, br);
        let height_left = distance(tl, bl);
        let max_h = (height_right as u32).max(height_left as u32);

        if max_w < MIN_RECT_WIDTH || max_h < MIN_RECT_HEIGHT {
            continue;
        }
        let aspect = max_w as f32 / max_h as f32;
        if aspect <= MIN_ASPECT || aspect >= MAX_ASPECT {
            continue;
        }

        let dst = [
            (0.0, 0.0),
            (max_w as f32 - 1.0, 0.0),
            (max_w as f32 - 1.0, max_h as f32 - 1.0),
            (0.0, max_h as f32 - 1.0),
        ];
        let Some(projection) = Projection::from_control_points(corners, dst) else {
            continue;
        };
        let mut warped = RgbImage::new(max_w, max_h);
        warp_into(
            img,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut warped,
        );
        return warped;
    }

    img.clone()
}

/// Absolute polygon area via the shoelace formula.
fn shoelace_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        acc += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (acc.abs() as f64) / 2.0
}

// ----------------------------------------------------------------------------
// Stage 3: deskew
// ----------------------------------------------------------------------------

/// Residual text-line tilt from the dark foreground pixels, folded into
/// [-45, 45] degrees. None when there is too little foreground to trust.
fn estimate_skew_angle(gray: &GrayImage) -> Option<f32> {
    let level = otsu_level(gray);
    // Inverted-binary foreground: plate glyphs are dark on a light face.
    let foreground: Vec<Point<i32>> = gray
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] <= level)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();
    if foreground.len() < MIN_FOREGROUND_PIXELS {
        return None;
    }

    let rect = imageproc::geometry::min_area_rect(&foreground);
    let dx = (rect[1].x - rect[0].x) as f32;
    let dy = (rect[1].y - rect[0].y) as f32;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let mut angle = dy.atan2(dx).to_degrees();
    // Rectangle edges are defined modulo 180; bring into (-90, 90] before
    // folding into the [-45, 45] band (the two perpendicular edges fold to
    // the same value, so edge choice does not matter).
    if angle > 90.0 {
        angle -= 180.0;
    } else if angle <= -90.0 {
        angle += 180.0;
    }
    Some(normalize_skew_angle(angle))
}

fn deskew(img: &RgbImage) -> RgbImage {
    let gray = imageops::grayscale(img);
    let Some(angle) = estimate_skew_angle(&gray) else {
        return img.clone();
    };
    if !is_visible_skew(angle) {
        return img.clone();
    }
    rotate_replicate(img, -angle)
}

/// Rotate about the image center with bicubic (Catmull-Rom) sampling and
/// edge-replicated borders, so plate background bleeds outward instead of
/// introducing hard black corners that confuse the OCR engine.
fn rotate_replicate(img: &RgbImage, angle_deg: f32) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();

    let mut out = RgbImage::new(w, h);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        // Inverse mapping: where did this output pixel come from?
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        *pixel = sample_bicubic_clamped(img, sx, sy);
    }
    out
}

fn catmull_rom(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        1.5 * t * t * t - 2.5 * t * t + 1.0
    } else if t < 2.0 {
        -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
    } else {
        0.0
    }
}

fn sample_bicubic_clamped(img: &RgbImage, sx: f32, sy: f32) -> Rgb<u8> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let mut acc = [0.0f32; 3];
    let mut weight_sum = 0.0f32;
    for j in -1..=2i64 {
        let wy = catmull_rom(j as f32 - fy);
        if wy == 0.0 {
            continue;
        }
        let py = (y0 + j).clamp(0, h - 1) as u32;
        for i in -1..=2i64 {
            let wx = catmull_rom(i as f32 - fx);
            if wx == 0.0 {
                continue;
            }
            let px = (x0 + i).clamp(0, w - 1) as u32;
            let p = img.get_pixel(px, py);
            let wgt = wx * wy;
            weight_sum += wgt;
            for c in 0..3 {
                acc[c] += wgt * p.0[c] as f32;
            }
        }
    }
    if weight_sum == 0.0 {
        return *img.get_pixel(sx.max(0.0).min(w as f32 - 1.0) as u32, sy.max(0.0).min(h as f32 - 1.0) as u32);
    }
    Rgb([
        (acc[0] / weight_sum).round().clamp(0.0, 255.0) as u8,
        (acc[1] / weight_sum).round().clamp(0.0, 255.0) as u8,
        (acc[2] / weight_sum).round().clamp(0.0, 255.0) as u8,
    ])
}

// ----------------------------------------------------------------------------
// Stage 4: denoise
// ----------------------------------------------------------------------------

/// Edge-preserving smoothing, applied per channel.
fn denoise(img: &RgbImage) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let mut planes = Vec::with_capacity(3);
    for c in 0..3 {
        let plane = GrayImage::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y).0[c]]));
        planes.push(bilateral_filter(
            &plane,
            BILATERAL_WINDOW,
            BILATERAL_SIGMA,
            BILATERAL_SIGMA,
        ));
    }
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
        ])
    })
}

// ----------------------------------------------------------------------------
// Stage 5: contrast (CLAHE on luminance)
// ----------------------------------------------------------------------------

/// Adaptive local histogram equalization on the luminance channel only;
/// chroma is preserved by rescaling RGB with the luminance ratio.
fn enhance_contrast(img: &RgbImage) -> RgbImage {
    let (w, h) = (img.width(), img.height());
    let luma = GrayImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y).0;
        let l = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        Luma([l.round().clamp(0.0, 255.0) as u8])
    });
    let equalized = clahe(&luma, CLAHE_CLIP_LIMIT, CLAHE_TILES, CLAHE_TILES);

    RgbImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y).0;
        let old_l = luma.get_pixel(x, y).0[0] as f32;
        let new_l = equalized.get_pixel(x, y).0[0] as f32;
        if old_l <= 0.0 {
            return Rgb([new_l as u8; 3]);
        }
        let ratio = new_l / old_l;
        Rgb([
            (p[0] as f32 * ratio).round().clamp(0.0, 255.0) as u8,
            (p[1] as f32 * ratio).round().clamp(0.0, 255.0) as u8,
            (p[2] as f32 * ratio).round().clamp(0.0, 255.0) as u8,
        ])
    })
}

/// Contrast-limited adaptive histogram equalization over a tile grid, with
/// bilinear interpolation between the per-tile mappings.
fn clahe(gray: &GrayImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (w, h) = (gray.width(), gray.height());
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tiles_x = tiles_x.min(w).max(1);
    let tiles_y = tiles_y.min(h).max(1);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    // Per-tile lookup tables.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u32; 256];
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y).0[0] as usize] += 1;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            // Clip and redistribute the excess uniformly.
            let limit = ((clip_limit * count as f32 / 256.0).ceil() as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            let mut remainder = excess % 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
                if remainder > 0 {
                    *bin += 1;
                    remainder -= 1;
                }
            }

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u32;
            for (v, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[v] = ((cdf as f32 / count as f32) * 255.0).round() as u8;
            }
        }
    }

    let tile_at = |tx: i64, ty: i64| -> &[u8; 256] {
        let tx = tx.clamp(0, tiles_x as i64 - 1) as u32;
        let ty = ty.clamp(0, tiles_y as i64 - 1) as u32;
        &luts[(ty * tiles_x + tx) as usize]
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as usize;
        // Position relative to tile centers.
        let gx = (x as f32 - tile_w as f32 / 2.0) / tile_w as f32;
        let gy = (y as f32 - tile_h as f32 / 2.0) / tile_h as f32;
        let tx0 = gx.floor() as i64;
        let ty0 = gy.floor() as i64;
        let fx = gx - tx0 as f32;
        let fy = gy - ty0 as f32;

        let top = tile_at(tx0, ty0)[v] as f32 * (1.0 - fx) + tile_at(tx0 + 1, ty0)[v] as f32 * fx;
        let bottom =
            tile_at(tx0, ty0 + 1)[v] as f32 * (1.0 - fx) + tile_at(tx0 + 1, ty0 + 1)[v] as f32 * fx;
        let blended = top * (1.0 - fy) + bottom * fy;
        Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

// ----------------------------------------------------------------------------
// Stage 6: sharpen
// ----------------------------------------------------------------------------

fn sharpen(img: &RgbImage) -> RgbImage {
    filter3x3::<Rgb<u8>, f32, u8>(img, &SHARPEN_KERNEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn empty_crop_is_returned_unchanged() {
        let empty = RgbImage::new(0, 0);
        let out = normalize_plate(&empty);
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn narrow_crop_is_upscaled_to_min_width() {
        let crop = RgbImage::from_pixel(100, 40, Rgb([120, 120, 120]));
        let out = upscale_small(&crop);
        assert_eq!(out.dimensions(), (200, 80));
    }

    #[test]
    fn wide_crop_is_not_upscaled() {
        let crop = RgbImage::from_pixel(320, 80, Rgb([120, 120, 120]));
        assert_eq!(upscale_small(&crop).dimensions(), (320, 80));
    }

    #[test]
    fn featureless_crop_passes_rectification_unchanged() {
        let crop = RgbImage::from_pixel(300, 100, Rgb([90, 90, 90]));
        let out = rectify_perspective(&crop);
        assert_eq!(out.dimensions(), (300, 100));
    }

    #[test]
    fn rectified_rectangle_lands_in_aspect_band() {
        // Bright plate face on a dark background, aspect 240/90 ~ 2.7.
        let mut crop = RgbImage::from_pixel(320, 180, Rgb([10, 10, 10]));
        draw_filled_rect_mut(
            &mut crop,
            Rect::at(40, 45).of_size(240, 90),
            Rgb([230, 230, 230]),
        );
        let out = rectify_perspective(&crop);
        let aspect = out.width() as f32 / out.height() as f32;
        assert!(
            aspect > MIN_ASPECT && aspect < MAX_ASPECT,
            "aspect {} outside band ({} x {})",
            aspect,
            out.width(),
            out.height()
        );
        // The warp should have cropped away most of the dark margin.
        assert!(out.width() < crop.width());
    }

    fn slanted_bar(angle_deg: f32) -> RgbImage {
        let mut img = RgbImage::from_pixel(240, 240, Rgb([245, 245, 245]));
        let slope = angle_deg.to_radians().tan();
        for x in 20..220 {
            let y_center = 120.0 + slope * (x as f32 - 120.0);
            for dy in -6..=6 {
                let y = (y_center as i32 + dy).clamp(0, 239) as u32;
                img.put_pixel(x, y, Rgb([15, 15, 15]));
            }
        }
        img
    }

    #[test]
    fn skew_estimate_tracks_drawn_angle() {
        let gray = imageops::grayscale(&slanted_bar(10.0));
        let angle = estimate_skew_angle(&gray).expect("foreground present");
        assert!((angle - 10.0).abs() < 3.0, "estimated {}", angle);
    }

    #[test]
    fn horizontal_text_is_not_rotated() {
        let img = slanted_bar(0.0);
        let out = deskew(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn sub_threshold_skew_is_not_rotated() {
        let img = slanted_bar(0.3);
        assert_eq!(deskew(&img), img);
    }

    #[test]
    fn visible_skew_triggers_rotation() {
        let img = slanted_bar(10.0);
        let out = deskew(&img);
        assert_eq!(out.dimensions(), img.dimensions());
        assert_ne!(out, img);
    }

    #[test]
    fn too_little_foreground_skips_deskew() {
        // Near-uniform crop: Otsu foreground collapses to almost nothing.
        let img = RgbImage::from_pixel(60, 20, Rgb([200, 200, 200]));
        let out = deskew(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn clahe_widens_low_contrast_range() {
        let gray = GrayImage::from_fn(160, 80, |x, _| Luma([100 + (x % 40) as u8]));
        let out = clahe(&gray, 2.0, 8, 8);
        let (mut in_min, mut in_max) = (255u8, 0u8);
        let (mut out_min, mut out_max) = (255u8, 0u8);
        for (a, b) in gray.pixels().zip(out.pixels()) {
            in_min = in_min.min(a.0[0]);
            in_max = in_max.max(a.0[0]);
            out_min = out_min.min(b.0[0]);
            out_max = out_max.max(b.0[0]);
        }
        assert!(out_max - out_min > in_max - in_min);
    }

    #[test]
    fn cascade_is_total_on_tiny_inputs() {
        for (w, h) in [(1, 1), (3, 2), (5, 5)] {
            let crop = RgbImage::from_pixel(w, h, Rgb([128, 64, 32]));
            let out = normalize_plate(&crop);
            assert!(out.width() > 0 && out.height() > 0);
        }
    }
}
