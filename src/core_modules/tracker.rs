// THEORY:
// The `tracker` module gives the `TrackedObject` its memory. Once an object has
// been extracted, three adaptive updates are applied every frame, always in the
// same order: colour, then shape, then motion.
//
// Key architectural principles:
// 1.  **Colour hysteresis**: the colour bounds follow what is actually seen
//     inside the silhouette. A bound that was hit exactly is limiting, so it is
//     relaxed by one step; a bound that was not reached is pulled in to one
//     step outside the observed extreme. The window always keeps a step of
//     margin around what was seen, so it can never invert.
// 2.  **Shape re-extraction**: the silhouette is recomputed from a binary mask
//     inside a search window. A region under the size limit in both dimensions
//     means the object is lost; the object is then left exactly as it was and
//     the caller decides what to do.
// 3.  **Constant-velocity prediction**: a fixed-length ring of past positions,
//     the latest velocity, and a half-damped extrapolation of the next position.

use crate::config::TrackingConfig;
use crate::core_modules::image::{Image, ImageFormat, Pixel, Window, hdeg_to_hval, pct_to_val};
use crate::core_modules::tracked_object::{ChannelBounds, ColorSpace, Position, Silhouette, TrackedObject};
use crate::error::TrackError;
use tracing::{debug, info};

/// Outcome of a shape update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeUpdate {
    Updated,
    /// Nothing usable in the window; the object was not modified.
    Lost,
}

impl TrackedObject {
    /// Adapt the colour bounds to the pixels of `image` that are set in `mask`
    /// and covered by the silhouette at the current position. Returns the
    /// number of sampled pixels; with no sample the bounds are left alone.
    pub fn update_color(
        &mut self,
        image: &Image,
        mask: &Image,
        config: &TrackingConfig,
    ) -> Result<usize, TrackError> {
        TrackError::expect_format(ImageFormat::Binary, mask.format)?;
        if image.width != mask.width || image.height != mask.height {
            return Err(TrackError::SizeMismatch {
                left_width: image.width,
                left_height: image.height,
                right_width: mask.width,
                right_height: mask.height,
            });
        }
        let space = self.color_space();
        if space == ColorSpace::Edge {
            return Ok(0);
        }
        TrackError::expect_format(space.image_format(), image.format)?;

        // --- 1. Observed range under the silhouette ---
        let channels = image.channels();
        let mut observed = vec![ChannelBounds::new(Pixel::MAX, 0); channels];
        let mut samples = 0usize;

        for (row, (offset, length)) in self.silhouette.rows().enumerate() {
            let y = self.y + row;
            if y >= image.height {
                break;
            }
            let start = (self.x + offset).min(image.width);
            let end = (self.x + offset + length).min(image.width);
            for x in start..end {
                if mask.value(x, y) == 0 {
                    continue;
                }
                samples += 1;
                for (bounds, &v) in observed.iter_mut().zip(image.pixel(x, y)) {
                    bounds.min = bounds.min.min(v);
                    bounds.max = bounds.max.max(v);
                }
            }
        }

        if samples == 0 {
            debug!("colour update: no masked pixel under the silhouette");
            return Ok(0);
        }

        // --- 2. Widen limiting bounds, tighten the others ---
        let steps = color_steps(space, config.color_update_step, channels);
        for ((bound, seen), step) in self
            .bounds
            .channels_mut()
            .iter_mut()
            .zip(observed.iter())
            .zip(steps)
        {
            bound.max = if seen.max == bound.max {
                bound.max.saturating_add(step)
            } else {
                seen.max.saturating_add(step)
            };
            bound.min = if seen.min == bound.min {
                bound.min.saturating_sub(step)
            } else {
                seen.min.saturating_sub(step)
            };
        }
        Ok(samples)
    }

    /// Re-extract the silhouette from the set pixels of `mask` inside `window`.
    pub fn update_shape(
        &mut self,
        mask: &Image,
        window: &Window,
        config: &TrackingConfig,
    ) -> Result<ShapeUpdate, TrackError> {
        TrackError::expect_format(ImageFormat::Binary, mask.format)?;
        let window = window.clip_to(mask);

        let mut found: Option<(usize, usize, usize, usize)> = None;
        for y in window.y..window.y + window.height {
            for x in window.x..window.x + window.width {
                if mask.value(x, y) == 0 {
                    continue;
                }
                found = Some(match found {
                    None => (x, y, x, y),
                    Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
                });
            }
        }
        let Some((x1, y1, x2, y2)) = found else {
            debug!("shape update: no set pixel in the window");
            return Ok(ShapeUpdate::Lost);
        };

        let width = x2 - x1 + 1;
        let height = y2 - y1 + 1;
        if width < config.min_object_size && height < config.min_object_size {
            debug!(width, height, "shape update: region too small");
            return Ok(ShapeUpdate::Lost);
        }

        let rows = (y1..=y2).map(|y| {
            let mut set = (x1..=x2).filter(|&x| mask.value(x, y) != 0);
            match set.next() {
                Some(first) => {
                    let last = set.last().unwrap_or(first);
                    (first - x1, last - first + 1)
                }
                None => (0, 0),
            }
        });
        self.silhouette = Silhouette::from_rows(rows);
        self.x = x1;
        self.y = y1;
        self.width = width;
        self.height = height;

        info!(
            "redefined object {}x{} at (x={}, y={})",
            self.width, self.height, self.x, self.y
        );
        Ok(ShapeUpdate::Updated)
    }

    /// Record the current position and predict the next one.
    pub fn update_motion(&mut self) {
        let current = self.position();
        let motion = &mut self.motion;

        if !motion.is_initialized() {
            motion.history.extend(std::iter::repeat_n(current, motion.capacity.max(2)));
            motion.predicted = current;
            return;
        }

        let previous = motion.latest().unwrap_or(current);
        motion.history.push_back(current);
        while motion.history.len() > motion.capacity.max(2) {
            motion.history.pop_front();
        }

        let velocity = Position::new(current.x - previous.x, current.y - previous.y);
        motion.predicted = Position::new(current.x + velocity.x / 2, current.y + velocity.y / 2);
    }

    /// Last measured velocity, in pixels per frame.
    pub fn velocity(&self) -> Position {
        let mut recent = self.motion.history.iter().rev();
        match (recent.next(), recent.next()) {
            (Some(current), Some(previous)) => {
                Position::new(current.x - previous.x, current.y - previous.y)
            }
            _ => Position::default(),
        }
    }
}

/// Bound step per channel, in pixel units.
fn color_steps(space: ColorSpace, step: u16, channels: usize) -> Vec<Pixel> {
    match space {
        ColorSpace::Hsi => vec![
            hdeg_to_hval(step as u32) as Pixel,
            pct_to_val(step as u32) as Pixel,
            pct_to_val(step as u32) as Pixel,
        ],
        _ => vec![step; channels],
    }
}
