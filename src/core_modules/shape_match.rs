// THEORY:
// Re-locating the object in a new frame. The stored silhouette is slid over a
// binary mask inside a search window; at every candidate top-left corner the
// set pixels under the silhouette spans are counted, and the object moves to
// the corner with the highest count. The count relative to the silhouette area
// is the match confidence.
//
// The search is exhaustive, O(search area x object area). The window is kept
// small by the caller, which centres it on the predicted position.

use crate::core_modules::image::{Image, ImageFormat, Window};
use crate::core_modules::tracked_object::TrackedObject;
use crate::error::TrackError;
use tracing::debug;

/// Move `object` to the best match of its silhouette in `mask` within `window`
/// and return the confidence in percent (0..=100).
///
/// A silhouette without pixels returns 0; so does a window without any set
/// pixel. In both cases the object keeps its position.
pub fn match_shape(mask: &Image, object: &mut TrackedObject, window: &Window) -> Result<u32, TrackError> {
    TrackError::expect_format(ImageFormat::Binary, mask.format)?;
    let window = window.clip_to(mask);
    if window.width < object.width || window.height < object.height {
        return Err(TrackError::InvalidArgument(format!(
            "search window {}x{} smaller than object {}x{}",
            window.width, window.height, object.width, object.height
        )));
    }

    let count = object.silhouette.pixel_count();
    if count == 0 {
        return Ok(0);
    }

    let mut best = (0usize, object.x, object.y);
    for row in window.y..=window.y + window.height - object.height {
        for col in window.x..=window.x + window.width - object.width {
            let sum = overlap(mask, object, col, row);
            if sum > best.0 {
                best = (sum, col, row);
            }
        }
    }

    let (sum, x, y) = best;
    if sum > 0 {
        object.x = x;
        object.y = y;
    }
    debug!(x, y, sum, count, "shape match");
    Ok((100 * sum.min(count) / count) as u32)
}

/// Set pixels of `mask` under the silhouette placed at (col, row).
fn overlap(mask: &Image, object: &TrackedObject, col: usize, row: usize) -> usize {
    let mut sum = 0;
    for (k, (offset, length)) in object.silhouette.rows().enumerate() {
        let y = row + k;
        if y >= mask.height {
            break;
        }
        let start = (col + offset).min(mask.width);
        let end = (col + offset + length).min(mask.width);
        let line = &mask.pixels()[y * mask.width..(y + 1) * mask.width];
        sum += line[start..end].iter().filter(|&&v| v != 0).count();
    }
    sum
}

/// Normalised correlation of two same-sized single-channel images, in percent of
/// the autocorrelation of `reference`. 0 when the reference is all zero.
pub fn image_correlation(reference: &Image, other: &Image) -> Result<u32, TrackError> {
    if reference.channels() != 1 || other.channels() != 1 {
        return Err(TrackError::FormatMismatch {
            expected: ImageFormat::Binary,
            actual: if reference.channels() != 1 { reference.format } else { other.format },
        });
    }
    if reference.width != other.width || reference.height != other.height {
        return Err(TrackError::SizeMismatch {
            left_width: reference.width,
            left_height: reference.height,
            right_width: other.width,
            right_height: other.height,
        });
    }

    let (sum, sum_max) = reference
        .pixels()
        .iter()
        .zip(other.pixels())
        .fold((0u64, 0u64), |(sum, max), (&a, &b)| {
            (sum + a as u64 * b as u64, max + a as u64 * a as u64)
        });
    if sum_max == 0 {
        return Ok(0);
    }
    Ok((100 * sum / sum_max) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::tracked_object::{ColorBounds, Silhouette};

    /// A diamond-ish silhouette of height 7.
    fn object_at(x: usize, y: usize) -> TrackedObject {
        let shape = Silhouette::from_rows([(3, 1), (2, 3), (1, 5), (0, 7), (1, 5), (2, 3), (3, 1)]);
        TrackedObject::new(x, y, 7, ColorBounds::Edge, shape, 10)
    }

    fn draw(mask: &mut Image, object: &TrackedObject, x: usize, y: usize) {
        for (k, (offset, length)) in object.silhouette.rows().enumerate() {
            for col in x + offset..x + offset + length {
                mask.set_value(col, y + k, 255);
            }
        }
    }

    #[test]
    fn exact_placement_is_full_confidence() {
        let mut object = object_at(10, 10);
        let mut mask = Image::new(ImageFormat::Binary, 40, 40);
        draw(&mut mask, &object, 10, 10);

        let confidence = match_shape(&mask, &mut object, &Window::new(5, 5, 20, 20)).expect("match");
        assert_eq!(confidence, 100);
        assert_eq!((object.x, object.y), (10, 10));
    }

    #[test]
    fn moved_object_is_found() {
        let mut object = object_at(10, 10);
        let mut mask = Image::new(ImageFormat::Binary, 40, 40);
        draw(&mut mask, &object, 14, 8);

        let confidence = match_shape(&mask, &mut object, &Window::new(0, 0, 40, 40)).expect("match");
        assert_eq!(confidence, 100);
        assert_eq!((object.x, object.y), (14, 8));
    }

    #[test]
    fn empty_mask_is_zero_confidence_and_no_move() {
        let mut object = object_at(10, 10);
        let mask = Image::new(ImageFormat::Binary, 40, 40);
        let confidence = match_shape(&mask, &mut object, &Window::new(0, 0, 40, 40)).expect("match");
        assert_eq!(confidence, 0);
        assert_eq!((object.x, object.y), (10, 10));
    }

    #[test]
    fn partial_overlap_scales_confidence() {
        let mut object = object_at(0, 0);
        let mut mask = Image::new(ImageFormat::Binary, 20, 20);
        // Only the widest row (7 of 25 pixels) is present.
        for col in 5..12 {
            mask.set_value(col, 9, 255);
        }
        let confidence = match_shape(&mask, &mut object, &Window::new(0, 0, 20, 20)).expect("match");
        assert_eq!(confidence, 28);
        assert_eq!((object.x, object.y + 3), (5, 9));
    }

    #[test]
    fn exact_window_has_a_single_candidate() {
        let mut object = object_at(3, 3);
        let mut mask = Image::new(ImageFormat::Binary, 20, 20);
        draw(&mut mask, &object, 3, 3);
        let window = Window::new(3, 3, 7, 7);
        assert_eq!(match_shape(&mask, &mut object, &window).expect("match"), 100);
    }

    #[test]
    fn undersized_window_and_degenerate_shape() {
        let mask = Image::new(ImageFormat::Binary, 20, 20);
        let mut object = object_at(0, 0);
        assert!(matches!(
            match_shape(&mask, &mut object, &Window::new(0, 0, 6, 20)),
            Err(TrackError::InvalidArgument(_))
        ));
        // Clipping to the image also shrinks the window.
        assert!(matches!(
            match_shape(&mask, &mut object, &Window::new(15, 0, 10, 10)),
            Err(TrackError::InvalidArgument(_))
        ));

        let mut empty = TrackedObject::new(2, 2, 4, ColorBounds::Edge, Silhouette::from_rows([(0, 0); 4]), 10);
        assert_eq!(match_shape(&mask, &mut empty, &Window::full(&mask)).expect("match"), 0);
        assert_eq!((empty.x, empty.y), (2, 2));
    }

    #[test]
    fn correlation_of_identical_images_is_full() {
        let mut a = Image::new(ImageFormat::Gray, 8, 8);
        a.set_value(2, 2, 200);
        a.set_value(5, 6, 40);
        assert_eq!(image_correlation(&a, &a).expect("correlate"), 100);

        let blank = Image::new(ImageFormat::Gray, 8, 8);
        assert_eq!(image_correlation(&a, &blank).expect("correlate"), 0);
        assert_eq!(image_correlation(&blank, &a).expect("correlate"), 0);
        assert!(image_correlation(&a, &Image::new(ImageFormat::Gray, 4, 4)).is_err());
    }
}
