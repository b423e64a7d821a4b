// THEORY:
// The `pipeline` module is the top-level API of the tracker: one call per
// camera frame, one `Report` back. It owns the only state that lives across
// frames, the `TrackedObject`, and strings the core modules together:
//
//   no object: HSI frame -> calibration mask -> blob labels -> largest blob
//              centroid -> region growth seeded there -> motion seed
//   object:    object-space frame -> bounds mask -> shape correlation around the
//              predicted position -> colour update -> shape update -> motion
//
// A weak correlation or a failed shape update drops the object, and the next
// frame goes back to acquisition. Retrying is therefore built into the loop,
// not into the core modules. An error leaves the tracker exactly as it was
// before the frame.
//
// Tracking runs in the object's own colour space: HSI and normalised red/green
// frames are converted from RGB, RGB objects see the frame as is. Edge objects
// need an edge map the loop does not produce, so they cannot be resumed here.

use crate::config::TrackingConfig;
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::format::{
    MASK_SET, bounds_mask, calibration_mask, clear_borders, rgb_to_hsi, rgb_to_nrg,
};
use crate::core_modules::histogram::HsiCalibration;
use crate::core_modules::image::{Image, ImageFormat, Point, Window};
use crate::core_modules::region_grow::{Extraction, extract};
use crate::core_modules::shape_match::match_shape;
use crate::core_modules::tracked_object::ColorSpace;
use crate::core_modules::tracker::ShapeUpdate;
use crate::error::TrackError;
use std::borrow::Cow;
use tracing::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::tracked_object::{Position, TrackedObject};

/// The per-frame outcome of the tracking loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// No object was tracked and none could be acquired.
    NotFound,
    /// A new object was extracted in this frame.
    Acquired { bounding_box: Window, blobs: usize },
    /// The tracked object was re-located.
    Tracking {
        confidence: u32,
        bounding_box: Window,
        predicted: Position,
    },
    /// The tracked object was dropped in this frame.
    Lost { confidence: u32 },
}

/// The main, top-level struct for the tracking engine.
pub struct ObjectTracker {
    config: TrackingConfig,
    calibration: HsiCalibration,
    object: Option<TrackedObject>,
    frames: u64,
}

impl ObjectTracker {
    pub fn new(config: TrackingConfig, calibration: HsiCalibration) -> Self {
        Self {
            config,
            calibration,
            object: None,
            frames: 0,
        }
    }

    /// Start from a previously saved object instead of acquiring one. An
    /// object without motion history is predicted to stay where it is.
    pub fn with_object(
        config: TrackingConfig,
        calibration: HsiCalibration,
        mut object: TrackedObject,
    ) -> Result<Self, TrackError> {
        if object.color_space() == ColorSpace::Edge {
            return Err(TrackError::InvalidArgument(
                "edge objects cannot be tracked on colour frames".to_string(),
            ));
        }
        if !object.motion.is_initialized() {
            object.update_motion();
        }
        Ok(Self {
            object: Some(object),
            ..Self::new(config, calibration)
        })
    }

    pub fn object(&self) -> Option<&TrackedObject> {
        self.object.as_ref()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Process one RGB frame. On error the tracked object is kept unchanged.
    pub fn process_frame(&mut self, frame: &Image) -> Result<Report, TrackError> {
        TrackError::expect_format(ImageFormat::Rgb, frame.format)?;

        let report = match self.object.clone() {
            None => self.acquire(&rgb_to_hsi(frame)?)?,
            Some(current) => {
                let view = color_view(current.color_space(), frame)?;
                let (report, next) = self.track(&view, current)?;
                self.object = next;
                report
            }
        };
        self.frames += 1;
        debug!(frame = self.frames, ?report, "frame processed");
        Ok(report)
    }

    fn acquire(&mut self, hsi: &Image) -> Result<Report, TrackError> {
        // --- 1. Candidate blobs of the calibrated colour ---
        let mut labels = calibration_mask(hsi, &self.calibration)?;
        clear_borders(&mut labels, MASK_SET, 1);
        let blobs = blob_detector::label_blobs(&mut labels)?;

        let Some(blob) = blobs.largest().filter(|b| b.valid) else {
            return Ok(Report::NotFound);
        };
        let seed = Point::new(blob.centroid_col, blob.centroid_row);

        // --- 2. Grow the object from the largest blob's centroid ---
        match extract(hsi, seed, &self.calibration.extraction_tolerance(), &self.config)? {
            Extraction::Defined(mut object) => {
                object.update_motion();
                let bounding_box = object.bounding_box();
                info!(
                    "acquired object {}x{} at (x={}, y={}) from {} blobs",
                    object.width,
                    object.height,
                    object.x,
                    object.y,
                    blobs.count()
                );
                self.object = Some(object);
                Ok(Report::Acquired {
                    bounding_box,
                    blobs: blobs.count(),
                })
            }
            Extraction::TooSmall { width, height } => {
                debug!(width, height, "largest blob did not grow into an object");
                Ok(Report::NotFound)
            }
        }
    }

    /// One tracking step on a working copy. The returned object replaces the
    /// tracked one; `None` means it was lost.
    fn track(
        &self,
        image: &Image,
        mut object: TrackedObject,
    ) -> Result<(Report, Option<TrackedObject>), TrackError> {
        // --- 1. Re-locate the silhouette near the prediction ---
        let mask = bounds_mask(image, &object.bounds)?;
        let window = self.search_window(&object, &mask);

        let confidence = match_shape(&mask, &mut object, &window)?;
        if confidence < self.config.min_confidence {
            info!(confidence, "object lost: weak shape match");
            return Ok((Report::Lost { confidence }, None));
        }

        // --- 2. Adapt colour, then shape with the new colour window ---
        object.update_color(image, &mask, &self.config)?;
        let mask = bounds_mask(image, &object.bounds)?;
        if object.update_shape(&mask, &window, &self.config)? == ShapeUpdate::Lost {
            info!(confidence, "object lost: shape update found no region");
            return Ok((Report::Lost { confidence }, None));
        }

        // --- 3. Predict the next position ---
        object.update_motion();

        let report = Report::Tracking {
            confidence,
            bounding_box: object.bounding_box(),
            predicted: object.motion.predicted,
        };
        Ok((report, Some(object)))
    }

    /// Object box at the predicted position, kept inside the image, padded by
    /// the search margin.
    fn search_window(&self, object: &TrackedObject, image: &Image) -> Window {
        let predicted = object.motion.predicted;
        let max_x = image.width.saturating_sub(object.width) as i64;
        let max_y = image.height.saturating_sub(object.height) as i64;
        let x = predicted.x.clamp(0, max_x) as usize;
        let y = predicted.y.clamp(0, max_y) as usize;

        Window::new(x, y, object.width, object.height)
            .padded(self.config.search_margin)
            .clip_to(image)
    }
}

/// The frame in the colour space `space` is tracked in.
fn color_view(space: ColorSpace, frame: &Image) -> Result<Cow<'_, Image>, TrackError> {
    match space {
        ColorSpace::Rgb => Ok(Cow::Borrowed(frame)),
        ColorSpace::Nrg => Ok(Cow::Owned(rgb_to_nrg(frame)?)),
        ColorSpace::Hsi => Ok(Cow::Owned(rgb_to_hsi(frame)?)),
        ColorSpace::Edge => Err(TrackError::InvalidArgument(
            "edge objects cannot be tracked on colour frames".to_string(),
        )),
    }
}
