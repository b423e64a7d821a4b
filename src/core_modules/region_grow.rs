// THEORY:
// The region grower defines a brand new `TrackedObject` from a seed point. It is
// the acquisition path of the tracker: the blob labeler says roughly *where* the
// object is, the grower finds out exactly *which* pixels belong to it.
//
// Key architectural principles & algorithm steps:
// 1.  **Reference colour**: the per-channel median of the seed's 3x3
//     neighbourhood. On the image border the seed pixel itself is used.
// 2.  **Criterion**: a `GrowthCriterion` decides whether a pixel joins the region
//     and which part of the image may be visited. The colour variants accept a
//     pixel when every channel lies within reference +/- tolerance; the edge
//     variant accepts anything that is not an edge pixel. Criteria compose, so
//     the normalised-colour grower can also stop at edges.
// 3.  **Iterative fill**: 4-connected growth over a `GrowableStack` worklist,
//     with a flat tri-state `VisitedMap` guaranteeing every pixel is tested once.
// 4.  **Summary**: bounding box of accepted pixels, one (offset, length) span per
//     row, and the observed per-channel min/max of accepted pixels as the
//     initial colour bounds.
// 5.  **Size gate**: a region smaller than `min_object_size` in both dimensions is
//     reported as `Extraction::TooSmall`. That is a normal outcome, not an error.

use crate::config::TrackingConfig;
use crate::core_modules::image::{Image, ImageFormat, Pixel, Point, hdeg_to_hval, pct_to_val};
use crate::core_modules::stack::GrowableStack;
use crate::core_modules::tracked_object::{ChannelBounds, ColorBounds, ColorSpace, Silhouette, TrackedObject};
use crate::error::TrackError;
use tracing::debug;

/// Pixels this close to the border are never visited by the edge grower.
pub const EDGE_MARGIN: usize = 2;

const RGB_TOLERANCE_MAX: u32 = 127;
const NRG_TOLERANCE_MAX: u32 = 255;
const HUE_TOLERANCE_MAX_DEG: u32 = 180;
const SI_TOLERANCE_MAX_PCT: u32 = 50;

/// Per-channel tolerance window, one variant per colour space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    /// +/- levels per channel, each 0..=127.
    Rgb { r: u32, g: u32, b: u32 },
    /// +/- levels per channel, each 0..=255.
    Nrg { nr: u32, ng: u32 },
    /// Hue in degrees (0..=180), saturation and intensity in percent (0..=50).
    Hsi { hue: u32, saturation: u32, intensity: u32 },
    /// Grow until an edge pixel is met.
    Edge,
}

impl Tolerance {
    pub fn space(&self) -> ColorSpace {
        match self {
            Tolerance::Rgb { .. } => ColorSpace::Rgb,
            Tolerance::Nrg { .. } => ColorSpace::Nrg,
            Tolerance::Hsi { .. } => ColorSpace::Hsi,
            Tolerance::Edge => ColorSpace::Edge,
        }
    }

    fn validate(&self) -> Result<(), TrackError> {
        let ok = match *self {
            Tolerance::Rgb { r, g, b } => [r, g, b].iter().all(|&t| t <= RGB_TOLERANCE_MAX),
            Tolerance::Nrg { nr, ng } => nr <= NRG_TOLERANCE_MAX && ng <= NRG_TOLERANCE_MAX,
            Tolerance::Hsi {
                hue,
                saturation,
                intensity,
            } => {
                hue <= HUE_TOLERANCE_MAX_DEG
                    && saturation <= SI_TOLERANCE_MAX_PCT
                    && intensity <= SI_TOLERANCE_MAX_PCT
            }
            Tolerance::Edge => true,
        };
        if ok {
            Ok(())
        } else {
            Err(TrackError::InvalidArgument(format!("tolerance out of range: {self:?}")))
        }
    }

    /// Tolerance in pixel units, per channel.
    fn in_pixel_units(&self) -> Vec<i64> {
        match *self {
            Tolerance::Rgb { r, g, b } => vec![r as i64, g as i64, b as i64],
            Tolerance::Nrg { nr, ng } => vec![nr as i64, ng as i64],
            Tolerance::Hsi {
                hue,
                saturation,
                intensity,
            } => vec![
                hdeg_to_hval(hue) as i64,
                pct_to_val(saturation) as i64,
                pct_to_val(intensity) as i64,
            ],
            Tolerance::Edge => Vec::new(),
        }
    }
}

/// Outcome of an extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Defined(TrackedObject),
    /// Pixels were accepted but the region is below the size limit in both
    /// dimensions (0 x 0 when not even the seed was accepted).
    TooSmall { width: usize, height: usize },
}

/// State of one pixel during a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Unchecked,
    Accepted,
    Rejected,
}

/// Flat per-pixel visit record, `row * width + col`.
#[derive(Debug)]
pub struct VisitedMap {
    cells: Vec<Visit>,
    width: usize,
    height: usize,
}

impl VisitedMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: vec![Visit::Unchecked; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Visit {
        self.cells[y * self.width + x]
    }

    #[inline]
    pub fn is_accepted(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == Visit::Accepted
    }

    /// Tight bounding box (x1, y1, x2, y2), inclusive, of accepted cells.
    pub fn accepted_bounds(&self) -> Option<(usize, usize, usize, usize)> {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_accepted(x, y) {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                });
            }
        }
        bounds
    }
}

/// Decides membership of a pixel during region growth.
pub trait GrowthCriterion {
    /// Whether (x, y) may be visited at all.
    fn in_region(&self, x: usize, y: usize) -> bool;
    /// Whether a visited pixel joins the region.
    fn accepts(&self, x: usize, y: usize) -> bool;
}

/// Every channel within reference +/- tolerance.
pub struct ColorWindow<'a> {
    image: &'a Image,
    low: Vec<i64>,
    high: Vec<i64>,
}

impl<'a> ColorWindow<'a> {
    pub fn new(image: &'a Image, reference: &[Pixel], tolerance: &[i64]) -> Self {
        let low = reference.iter().zip(tolerance).map(|(&r, &t)| r as i64 - t).collect();
        let high = reference.iter().zip(tolerance).map(|(&r, &t)| r as i64 + t).collect();
        Self { image, low, high }
    }
}

impl GrowthCriterion for ColorWindow<'_> {
    fn in_region(&self, x: usize, y: usize) -> bool {
        self.image.contains(x, y)
    }

    fn accepts(&self, x: usize, y: usize) -> bool {
        self.image
            .pixel(x, y)
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(&v, (&lo, &hi))| lo <= v as i64 && v as i64 <= hi)
    }
}

/// Non-edge pixels of a binary edge map, away from a border of `margin` pixels.
pub struct EdgeBarrier<'a> {
    edges: &'a Image,
    margin: usize,
}

impl<'a> EdgeBarrier<'a> {
    pub fn new(edges: &'a Image, margin: usize) -> Self {
        Self { edges, margin }
    }
}

impl GrowthCriterion for EdgeBarrier<'_> {
    fn in_region(&self, x: usize, y: usize) -> bool {
        x >= self.margin
            && y >= self.margin
            && x + self.margin < self.edges.width
            && y + self.margin < self.edges.height
    }

    fn accepts(&self, x: usize, y: usize) -> bool {
        self.edges.value(x, y) == 0
    }
}

/// Both criteria must hold.
pub struct Both<A, B>(pub A, pub B);

impl<A: GrowthCriterion, B: GrowthCriterion> GrowthCriterion for Both<A, B> {
    fn in_region(&self, x: usize, y: usize) -> bool {
        self.0.in_region(x, y) && self.1.in_region(x, y)
    }

    fn accepts(&self, x: usize, y: usize) -> bool {
        self.1.accepts(x, y) && self.0.accepts(x, y)
    }
}

/// 4-connected fill from `seed` driven by `criterion`.
pub fn grow<C: GrowthCriterion>(criterion: &C, width: usize, height: usize, seed: Point) -> VisitedMap {
    let mut visited = VisitedMap::new(width, height);
    let mut stack = GrowableStack::new();
    stack.push(seed.y * width + seed.x);

    while let Some(index) = stack.pop() {
        let (x, y) = (index % width, index / width);
        if visited.cells[index] != Visit::Unchecked || !criterion.in_region(x, y) {
            continue;
        }
        if !criterion.accepts(x, y) {
            visited.cells[index] = Visit::Rejected;
            continue;
        }
        visited.cells[index] = Visit::Accepted;

        // 4-connected neighbours
        if x > 0 {
            stack.push(index - 1);
        }
        if x + 1 < width {
            stack.push(index + 1);
        }
        if y > 0 {
            stack.push(index - width);
        }
        if y + 1 < height {
            stack.push(index + width);
        }
    }
    visited
}

/// Per-channel median of the 3x3 neighbourhood of `point`. On the border, the
/// pixel itself.
pub fn median_reference(image: &Image, point: Point) -> Vec<Pixel> {
    let (x, y) = (point.x, point.y);
    if x == 0 || y == 0 || x + 1 >= image.width || y + 1 >= image.height {
        return image.pixel(x, y).to_vec();
    }

    (0..image.channels())
        .map(|c| {
            let mut window = [0 as Pixel; 9];
            let mut k = 0;
            for j in y - 1..=y + 1 {
                for i in x - 1..=x + 1 {
                    window[k] = image.pixel(i, j)[c];
                    k += 1;
                }
            }
            window.sort_unstable();
            window[4]
        })
        .collect()
}

/// Grow a region from `seed` in the colour space named by `tolerance`.
///
/// The image must be in the matching format (binary edge map for
/// `Tolerance::Edge`). Fails with `InvalidArgument` for an out-of-range
/// tolerance or a seed outside the image.
pub fn extract(
    image: &Image,
    seed: Point,
    tolerance: &Tolerance,
    config: &TrackingConfig,
) -> Result<Extraction, TrackError> {
    tolerance.validate()?;
    let space = tolerance.space();
    TrackError::expect_format(space.image_format(), image.format)?;
    check_seed(image, seed)?;

    let visited = match space {
        ColorSpace::Edge => grow(&EdgeBarrier::new(image, EDGE_MARGIN), image.width, image.height, seed),
        _ => {
            let reference = median_reference(image, seed);
            debug!(?reference, "region growth reference");
            let window = ColorWindow::new(image, &reference, &tolerance.in_pixel_units());
            grow(&window, image.width, image.height, seed)
        }
    };

    Ok(summarize(&visited, image, space, config))
}

/// Normalised red/green growth that also stops at the pixels set in `edges`.
pub fn extract_nrg_with_edges(
    nrg: &Image,
    edges: &Image,
    seed: Point,
    nr: u32,
    ng: u32,
    config: &TrackingConfig,
) -> Result<Extraction, TrackError> {
    let tolerance = Tolerance::Nrg { nr, ng };
    tolerance.validate()?;
    TrackError::expect_format(ImageFormat::Nrg, nrg.format)?;
    TrackError::expect_format(ImageFormat::Binary, edges.format)?;
    if nrg.width != edges.width || nrg.height != edges.height {
        return Err(TrackError::SizeMismatch {
            left_width: nrg.width,
            left_height: nrg.height,
            right_width: edges.width,
            right_height: edges.height,
        });
    }
    check_seed(nrg, seed)?;

    let reference = median_reference(nrg, seed);
    let criterion = Both(
        ColorWindow::new(nrg, &reference, &tolerance.in_pixel_units()),
        EdgeBarrier::new(edges, 0),
    );
    let visited = grow(&criterion, nrg.width, nrg.height, seed);
    Ok(summarize(&visited, nrg, ColorSpace::Nrg, config))
}

fn check_seed(image: &Image, seed: Point) -> Result<(), TrackError> {
    if image.contains(seed.x, seed.y) {
        Ok(())
    } else {
        Err(TrackError::InvalidArgument(format!(
            "seed ({}, {}) outside {}x{} image",
            seed.x, seed.y, image.width, image.height
        )))
    }
}

fn summarize(visited: &VisitedMap, image: &Image, space: ColorSpace, config: &TrackingConfig) -> Extraction {
    // --- 1. Bounding box and size check ---
    let Some((x1, y1, x2, y2)) = visited.accepted_bounds() else {
        debug!("region growth accepted no pixel");
        return Extraction::TooSmall { width: 0, height: 0 };
    };
    let width = x2 - x1 + 1;
    let height = y2 - y1 + 1;
    if width < config.min_object_size && height < config.min_object_size {
        debug!(width, height, "extracted region too small");
        return Extraction::TooSmall { width, height };
    }

    // --- 2. Row spans and observed colour range ---
    let channels = if space == ColorSpace::Edge { 0 } else { image.channels() };
    let mut observed = vec![ChannelBounds::new(Pixel::MAX, 0); channels];
    let mut rows = Vec::with_capacity(height);

    for y in y1..=y2 {
        let mut first = None;
        let mut last = 0;
        for x in x1..=x2 {
            if !visited.is_accepted(x, y) {
                continue;
            }
            first.get_or_insert(x);
            last = x;
            for (bounds, &v) in observed.iter_mut().zip(image.pixel(x, y)) {
                bounds.min = bounds.min.min(v);
                bounds.max = bounds.max.max(v);
            }
        }
        rows.push(match first {
            Some(first) => (first - x1, last - first + 1),
            None => (0, 0),
        });
    }

    // --- 3. Assemble the object ---
    let bounds = ColorBounds::from_channels(space, &observed).unwrap_or(ColorBounds::Edge);
    debug!(x = x1, y = y1, width, height, ?space, "found object");
    Extraction::Defined(TrackedObject::new(
        x1,
        y1,
        width,
        bounds,
        Silhouette::from_rows(rows),
        config.position_history,
    ))
}
