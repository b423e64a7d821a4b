// THEORY:
// The `TrackedObject` is the one piece of state that survives from frame to
// frame. A region-growing extraction creates it; the colour, shape and motion
// updaters (see `tracker.rs`) mutate it in that order every frame; the shape
// correlator moves it. The control loop owns it and simply drops it when the
// object is lost.
//
// Key architectural principles:
// 1.  **Row-span silhouette**: the shape is stored as one horizontal run per row
//     of the bounding box (`x_offset[row]`, `x_length[row]`). The object is
//     assumed row-convex; a row with no pixel has length 0.
// 2.  **Closed colour model**: the colour space and its per-channel bounds are a
//     single tagged value, `ColorBounds`. Each variant carries exactly the
//     channels it needs, so an HSI object cannot hold normalised red bounds.
// 3.  **Bounded memory**: the motion state keeps a fixed-length ring of past
//     positions and the current prediction; nothing else is remembered.

use crate::core_modules::image::{ImageFormat, Pixel, Window};
use std::collections::VecDeque;

/// Colour space an object was extracted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Rgb,
    Nrg,
    Hsi,
    /// Region bounded by an edge map; no colour bounds.
    Edge,
}

impl ColorSpace {
    /// Format of the images this object is matched against.
    pub fn image_format(self) -> ImageFormat {
        match self {
            ColorSpace::Rgb => ImageFormat::Rgb,
            ColorSpace::Nrg => ImageFormat::Nrg,
            ColorSpace::Hsi => ImageFormat::Hsi,
            ColorSpace::Edge => ImageFormat::Binary,
        }
    }

    /// Keyword used by the object file.
    pub fn keyword(self) -> &'static str {
        match self {
            ColorSpace::Rgb => "rgb",
            ColorSpace::Nrg => "nrg",
            ColorSpace::Hsi => "hsi",
            ColorSpace::Edge => "binary",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "rgb" => Some(ColorSpace::Rgb),
            "nrg" => Some(ColorSpace::Nrg),
            "hsi" => Some(ColorSpace::Hsi),
            "binary" => Some(ColorSpace::Edge),
            _ => None,
        }
    }
}

/// Inclusive [min, max] window of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBounds {
    pub min: Pixel,
    pub max: Pixel,
}

impl ChannelBounds {
    pub fn new(min: Pixel, max: Pixel) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: Pixel) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Per-channel colour bounds, tagged by colour space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorBounds {
    /// red, green, blue (0-255)
    Rgb([ChannelBounds; 3]),
    /// normalised red, normalised green (0-255)
    Nrg([ChannelBounds; 2]),
    /// hue, saturation, intensity (full pixel range)
    Hsi([ChannelBounds; 3]),
    Edge,
}

impl ColorBounds {
    pub fn space(&self) -> ColorSpace {
        match self {
            ColorBounds::Rgb(_) => ColorSpace::Rgb,
            ColorBounds::Nrg(_) => ColorSpace::Nrg,
            ColorBounds::Hsi(_) => ColorSpace::Hsi,
            ColorBounds::Edge => ColorSpace::Edge,
        }
    }

    pub fn channels(&self) -> &[ChannelBounds] {
        match self {
            ColorBounds::Rgb(c) | ColorBounds::Hsi(c) => &c[..],
            ColorBounds::Nrg(c) => &c[..],
            ColorBounds::Edge => &[],
        }
    }

    pub fn channels_mut(&mut self) -> &mut [ChannelBounds] {
        match self {
            ColorBounds::Rgb(c) | ColorBounds::Hsi(c) => &mut c[..],
            ColorBounds::Nrg(c) => &mut c[..],
            ColorBounds::Edge => &mut [],
        }
    }

    /// Build bounds of `space` from per-channel windows. `None` when the
    /// channel count does not fit the space.
    pub fn from_channels(space: ColorSpace, channels: &[ChannelBounds]) -> Option<Self> {
        match (space, channels) {
            (ColorSpace::Rgb, &[r, g, b]) => Some(ColorBounds::Rgb([r, g, b])),
            (ColorSpace::Hsi, &[h, s, i]) => Some(ColorBounds::Hsi([h, s, i])),
            (ColorSpace::Nrg, &[nr, ng]) => Some(ColorBounds::Nrg([nr, ng])),
            (ColorSpace::Edge, &[]) => Some(ColorBounds::Edge),
            _ => None,
        }
    }

    /// Whether a pixel of the matching format lies inside every channel window.
    /// For edge objects, any non-edge (zero) pixel is inside.
    pub fn contains(&self, pixel: &[Pixel]) -> bool {
        match self {
            ColorBounds::Edge => pixel.first().is_some_and(|&v| v == 0),
            _ => self
                .channels()
                .iter()
                .zip(pixel.iter())
                .all(|(bounds, &v)| bounds.contains(v)),
        }
    }
}

/// Row-span description of a row-convex shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Silhouette {
    pub x_offset: Vec<usize>,
    pub x_length: Vec<usize>,
}

impl Silhouette {
    /// A full `width` x `height` rectangle.
    pub fn rectangle(width: usize, height: usize) -> Self {
        Self {
            x_offset: vec![0; height],
            x_length: vec![width; height],
        }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let (x_offset, x_length) = rows.into_iter().unzip();
        Self { x_offset, x_length }
    }

    pub fn height(&self) -> usize {
        self.x_offset.len()
    }

    /// (offset, length) per row.
    pub fn rows(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.x_offset.iter().copied().zip(self.x_length.iter().copied())
    }

    /// Total number of pixels covered by the spans.
    pub fn pixel_count(&self) -> usize {
        self.x_length.iter().sum()
    }
}

/// Signed position; predictions may leave the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Ring of recent positions plus the predicted next one.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    /// Oldest at the front, most recent at the back.
    pub history: VecDeque<Position>,
    pub capacity: usize,
    pub predicted: Position,
}

impl MotionState {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            predicted: Position::default(),
        }
    }

    /// An empty ring means no motion update has run yet.
    pub fn is_initialized(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn latest(&self) -> Option<Position> {
        self.history.back().copied()
    }
}

/// The single object followed by the tracking loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub defined: bool,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub bounds: ColorBounds,
    pub silhouette: Silhouette,
    pub motion: MotionState,
}

impl TrackedObject {
    /// A defined object at (x, y). The height is the silhouette's row count;
    /// every span must fit in `width`.
    pub fn new(
        x: usize,
        y: usize,
        width: usize,
        bounds: ColorBounds,
        silhouette: Silhouette,
        history: usize,
    ) -> Self {
        Self {
            defined: true,
            x,
            y,
            width,
            height: silhouette.height(),
            bounds,
            silhouette,
            motion: MotionState::new(history),
        }
    }

    pub fn color_space(&self) -> ColorSpace {
        self.bounds.space()
    }

    /// Current bounding box.
    pub fn bounding_box(&self) -> Window {
        Window::new(self.x, self.y, self.width, self.height)
    }

    pub fn position(&self) -> Position {
        Position::new(self.x as i64, self.y as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_variants_carry_their_channel_count() {
        let hsi = ColorBounds::Hsi([ChannelBounds::new(0, 10); 3]);
        let nrg = ColorBounds::Nrg([ChannelBounds::new(0, 10); 2]);
        assert_eq!(hsi.channels().len(), 3);
        assert_eq!(nrg.channels().len(), 2);
        assert!(ColorBounds::Edge.channels().is_empty());
        assert!(ColorBounds::from_channels(ColorSpace::Nrg, hsi.channels()).is_none());
        assert_eq!(
            ColorBounds::from_channels(ColorSpace::Nrg, nrg.channels()),
            Some(nrg)
        );
    }

    #[test]
    fn containment_is_inclusive_on_every_channel() {
        let bounds = ColorBounds::Rgb([
            ChannelBounds::new(10, 20),
            ChannelBounds::new(0, 255),
            ChannelBounds::new(5, 5),
        ]);
        assert!(bounds.contains(&[10, 100, 5]));
        assert!(bounds.contains(&[20, 0, 5]));
        assert!(!bounds.contains(&[21, 0, 5]));
        assert!(!bounds.contains(&[15, 0, 6]));
        assert!(ColorBounds::Edge.contains(&[0]));
        assert!(!ColorBounds::Edge.contains(&[255]));
    }

    #[test]
    fn silhouette_counts_span_pixels() {
        let shape = Silhouette::from_rows([(0, 3), (1, 2), (0, 0)]);
        assert_eq!(shape.height(), 3);
        assert_eq!(shape.pixel_count(), 5);
        assert_eq!(Silhouette::rectangle(4, 2).pixel_count(), 8);
    }

    #[test]
    fn keywords_round_trip() {
        for space in [ColorSpace::Rgb, ColorSpace::Nrg, ColorSpace::Hsi, ColorSpace::Edge] {
            assert_eq!(ColorSpace::from_keyword(space.keyword()), Some(space));
        }
        assert_eq!(ColorSpace::from_keyword("gray"), None);
    }
}
