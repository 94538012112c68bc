//! Crop normalization.
//!
//! Turns landmark points into a square region of the full image that tightly
//! bounds them, clamped inside the image.

use crate::types::{Landmarks, Point, Rect};
use image::RgbaImage;

/// Axis-aligned bounding box of `points`. `None` when there are no points.
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let mut rect = Rect::new(first.x, first.y, first.x, first.y);

    for p in &points[1..] {
        rect.min_x = rect.min_x.min(p.x);
        rect.min_y = rect.min_y.min(p.y);
        rect.max_x = rect.max_x.max(p.x);
        rect.max_y = rect.max_y.max(p.y);
    }

    Some(rect)
}

/// Grow the shorter side symmetrically until width == height.
///
/// An odd difference puts the extra pixel on the trailing edge.
pub fn square(rect: Rect) -> Rect {
    let (width, height) = (rect.width(), rect.height());

    if height > width {
        let diff = height - width;
        let lead = diff / 2;
        let trail = diff - lead;
        return Rect::new(rect.min_x - lead, rect.min_y, rect.max_x + trail, rect.max_y);
    }

    if width > height {
        let diff = width - height;
        let lead = diff / 2;
        let trail = diff - lead;
        return Rect::new(rect.min_x, rect.min_y - lead, rect.max_x, rect.max_y + trail);
    }

    rect
}

/// Shrink a square symmetrically to the largest square `bounds` can hold.
///
/// A no-op when the square already fits. After shrinking the square may no
/// longer cover every landmark.
pub fn fit_within(rect: Rect, bounds: Rect) -> Rect {
    let limit = bounds.width().min(bounds.height()).max(0);
    let side = rect.width().max(rect.height());
    if side <= limit {
        return rect;
    }

    let shrink = |min: i32, max: i32| -> (i32, i32) {
        let trim = (max - min) - limit;
        if trim <= 0 {
            return (min, max);
        }
        let lead = trim / 2;
        (min + lead, max - (trim - lead))
    };

    let (min_x, max_x) = shrink(rect.min_x, rect.max_x);
    let (min_y, max_y) = shrink(rect.min_y, rect.max_y);
    Rect::new(min_x, min_y, max_x, max_y)
}

/// Translate `rect` so it lies inside `bounds`.
///
/// When an edge overflows, the opposite edge moves by the same amount, so the
/// size is preserved. `rect` must not be larger than `bounds`.
pub fn inside_of(mut rect: Rect, bounds: Rect) -> Rect {
    if bounds.min_x > rect.min_x {
        rect.max_x += bounds.min_x - rect.min_x;
        rect.min_x = bounds.min_x;
    }

    if bounds.min_y > rect.min_y {
        rect.max_y += bounds.min_y - rect.min_y;
        rect.min_y = bounds.min_y;
    }

    if rect.max_x > bounds.max_x {
        rect.min_x -= rect.max_x - bounds.max_x;
        rect.max_x = bounds.max_x;
    }

    if rect.max_y > bounds.max_y {
        rect.min_y -= rect.max_y - bounds.max_y;
        rect.max_y = bounds.max_y;
    }

    rect
}

/// Square region of `full` bounding `points`, always square and inside `full`.
pub fn normalize_region(points: &[Point], full: Rect) -> Option<Rect> {
    let rect = bounding_box(points)?;
    let rect = square(rect);
    let rect = fit_within(rect, full);
    Some(inside_of(rect, full))
}

/// Pixels of `image` under `rect`. `rect` must lie within the image bounds.
pub fn crop(image: &RgbaImage, rect: Rect) -> RgbaImage {
    let rect = rect.intersect(&Rect::from_size(image.width(), image.height()));
    image::imageops::crop_imm(
        image,
        rect.min_x as u32,
        rect.min_y as u32,
        rect.width() as u32,
        rect.height() as u32,
    )
    .to_image()
}

/// Normalize a face given landmarks detected on the crop at `crop_bounds`.
///
/// Returns the normalized region and its pixels from the full image, or `None`
/// when there are no landmark points.
pub fn normalize_face(
    landmarks: &Landmarks,
    crop_bounds: Rect,
    full_image: &RgbaImage,
) -> Option<(Rect, RgbaImage)> {
    let full = Rect::from_size(full_image.width(), full_image.height());
    let points = landmarks.points_relative_to_crop(crop_bounds);
    let region = normalize_region(&points, full)?;
    Some((region, crop(full_image, region)))
}
