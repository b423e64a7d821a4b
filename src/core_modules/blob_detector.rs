// THEORY:
// The `BlobDetector` is the acquisition half of the spatial grouping layer. It
// implements classic binary connected-component labelling: a raster scan finds
// every pixel still marked as unlabelled foreground, and a stack-driven flood
// fill assigns the whole 8-connected region a single id.
//
// Key architectural principles & algorithm steps:
// 1.  **Foreground convention**: the input is a single-channel image where `0`
//     means "unlabelled foreground" and any other value is background or an
//     already-assigned label. This matches the calibration mask produced by
//     `format::calibration_mask`, where pixels inside the colour window are 0.
//     Background is rewritten to `BLOB_BACKGROUND` first, so a background of
//     255 can never be mistaken for the blob with id 255.
// 2.  **In-place labelling**: each region's pixels are overwritten with its id
//     (1..=BLOB_MAX_NUM). The image therefore doubles as the label map.
// 3.  **Iterative growth**: the fill uses the `GrowableStack`, so large regions
//     cannot overflow the call stack. Every neighbour is bounds-checked, so the
//     caller does not have to clear the image borders first.
// 4.  **Data Aggregation**: area is counted while filling; centroids are computed
//     afterwards with a downward row scan from the blob's first pixel. That scan
//     stops at the first row without the id, so blobs with vertical gaps in
//     their column profile report a truncated centroid.
// 5.  **Stateless Utility**: no memory of previous frames; a `BlobSet` is produced
//     per call and discarded by the caller.

use crate::core_modules::image::{Image, ImageFormat, Pixel};
use crate::core_modules::stack::GrowableStack;
use crate::error::TrackError;
use std::fmt;

/// Highest usable blob id.
pub const BLOB_MAX_NUM: usize = 255;

/// Value the labeller writes over every non-zero input pixel before labelling.
pub const BLOB_BACKGROUND: Pixel = Pixel::MAX;

/// A labelled region of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Label written into the image, in 1..=BLOB_MAX_NUM.
    pub id: Pixel,
    /// Set once a centroid could be computed.
    pub valid: bool,
    /// Number of labelled pixels.
    pub area: usize,
    /// Flat index of the first pixel reached by the raster scan.
    pub top_left: usize,
    /// Mean row of the scanned pixels.
    pub centroid_row: usize,
    /// Mean column of the scanned pixels.
    pub centroid_col: usize,
}

impl Blob {
    fn new(id: Pixel, top_left: usize) -> Self {
        Self {
            id,
            valid: false,
            area: 0,
            top_left,
            centroid_row: 0,
            centroid_col: 0,
        }
    }

    /// (row, col) of the first labelled pixel.
    pub fn top_left_position(&self, width: usize) -> (usize, usize) {
        (self.top_left / width, self.top_left % width)
    }
}

impl fmt::Display for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Blob # {} valid {} area {} TL {} centroid ({}, {})",
            self.id, self.valid, self.area, self.top_left, self.centroid_row, self.centroid_col
        )
    }
}

/// The result of one labelling pass.
#[derive(Debug, Clone, Default)]
pub struct BlobSet {
    blobs: Vec<Blob>,
}

impl BlobSet {
    /// Number of blobs found.
    pub fn count(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Blob by label.
    pub fn get(&self, id: Pixel) -> Option<&Blob> {
        if id == 0 {
            return None;
        }
        self.blobs.get(id as usize - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Blob> {
        self.blobs.iter()
    }

    /// The blob with the greatest area, first seen on ties. `None` when the
    /// pass found nothing.
    pub fn largest(&self) -> Option<&Blob> {
        let mut best: Option<&Blob> = None;
        for blob in &self.blobs {
            if best.map_or(true, |b| blob.area > b.area) {
                best = Some(blob);
            }
        }
        best
    }
}

pub mod blob_detector {
    use super::*;
    use tracing::{debug, warn};

    /// Label every 8-connected foreground region of `image` and compute the
    /// per-blob statistics. The image is rewritten in place with the labels
    /// and its format becomes `Gray`.
    pub fn label_blobs(image: &mut Image) -> Result<BlobSet, TrackError> {
        if !matches!(image.format, ImageFormat::Binary | ImageFormat::Gray) {
            return Err(TrackError::FormatMismatch {
                expected: ImageFormat::Binary,
                actual: image.format,
            });
        }
        image.format = ImageFormat::Gray;

        // --- 1. Move the background out of the id range ---
        for value in image.pixels_mut().iter_mut().filter(|v| **v != 0) {
            *value = BLOB_BACKGROUND;
        }

        // --- 2. Raster scan and fill ---
        let total = image.width * image.height;
        let mut blobs: Vec<Blob> = Vec::new();
        let mut stack = GrowableStack::new();

        for index in 0..total {
            if image.pixels()[index] != 0 {
                continue;
            }
            if blobs.len() >= BLOB_MAX_NUM {
                warn!("blob labelling aborted: more than {} blobs", BLOB_MAX_NUM);
                return Err(TrackError::TooManyBlobs {
                    limit: BLOB_MAX_NUM,
                });
            }

            let mut blob = Blob::new((blobs.len() + 1) as Pixel, index);
            fill_blob(image, &mut stack, index, &mut blob);
            blobs.push(blob);
        }

        // --- 3. Per-blob statistics ---
        for blob in blobs.iter_mut() {
            centroid(image, blob);
        }

        debug!("labelled {} blobs", blobs.len());
        Ok(BlobSet { blobs })
    }

    /// Stack-driven 8-connected flood fill from `seed`.
    fn fill_blob(image: &mut Image, stack: &mut GrowableStack, seed: usize, blob: &mut Blob) {
        let w = image.width;
        let h = image.height;
        let id = blob.id;

        stack.push(seed);
        while let Some(index) = stack.pop() {
            if image.pixels()[index] != 0 {
                continue;
            }
            image.pixels_mut()[index] = id;
            blob.area += 1;

            let row = index / w;
            let col = index % w;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dy == 0 && dx == 0 {
                        continue;
                    }
                    let ny = row as i64 + dy;
                    let nx = col as i64 + dx;
                    if ny < 0 || ny >= h as i64 || nx < 0 || nx >= w as i64 {
                        continue;
                    }
                    let neighbour = ny as usize * w + nx as usize;
                    if image.pixels()[neighbour] == 0 {
                        stack.push(neighbour);
                    }
                }
            }
        }
    }

    /// Row-scan centroid. Starts at the blob's top-left row and stops at the
    /// first row that contains no pixel with the blob's id.
    pub fn centroid(image: &Image, blob: &mut Blob) {
        let w = image.width;
        let mut sum_row = 0usize;
        let mut sum_col = 0usize;
        let mut weight = 0usize;

        for row in (blob.top_left / w)..image.height {
            let mut found = false;
            for col in 0..w {
                if image.value(col, row) == blob.id {
                    found = true;
                    sum_row += row;
                    sum_col += col;
                    weight += 1;
                }
            }
            if !found {
                break;
            }
        }

        if weight > 0 {
            blob.centroid_row = sum_row / weight;
            blob.centroid_col = sum_col / weight;
            blob.valid = true;
        } else {
            warn!("blob {} has zero weight, centroid undefined", blob.id);
        }
    }
}
