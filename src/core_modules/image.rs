// THEORY (Image model):
// The `Image` is the one "dumb" data container every component shares. It owns
// a flat buffer of 16-bit pixel values whose per-pixel channel count is fixed by
// the format tag: RGB and HSI carry three values, normalised red/green two,
// gray and binary one. Nothing in here knows about segmentation; it only
// knows how to address its own buffer.
//
// Key principles:
// 1) Flat storage: pixel (x, y) starts at `channels * (y * width + x)`.
// 2) The invariant `pixels.len() == width * height * channels` is checked once,
//    at construction, and never broken afterwards.
// 3) HSI values use the whole 16-bit range; the helper conversions below map
//    them to degrees and percent.

pub type Pixel = u16;

/// Largest representable pixel value.
pub const PIXEL_MAXVAL: u32 = 65535;

/// Pixel layout of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    None,
    Rgb,
    Hsi,
    Nrg,
    Gray,
    Binary,
}

impl ImageFormat {
    /// Number of basic pixel values per image pixel.
    pub fn channels(self) -> usize {
        match self {
            ImageFormat::None => 1,
            ImageFormat::Rgb | ImageFormat::Hsi => 3,
            ImageFormat::Nrg => 2,
            ImageFormat::Gray | ImageFormat::Binary => 1,
        }
    }
}

/// Hue in degrees [0, 360] to pixel value.
pub fn hdeg_to_hval(degrees: u32) -> u32 {
    PIXEL_MAXVAL * degrees / 360
}

/// Hue pixel value to degrees.
pub fn hval_to_hdeg(value: u32) -> u32 {
    360 * value / PIXEL_MAXVAL
}

/// Saturation or intensity percentage [0, 100] to pixel value.
pub fn pct_to_val(percent: u32) -> u32 {
    PIXEL_MAXVAL * percent / 100
}

/// Saturation or intensity pixel value to percentage.
pub fn val_to_pct(value: u32) -> u32 {
    100 * value / PIXEL_MAXVAL
}

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A rectangular sub-region of an image: top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The window that covers the whole of `image`.
    pub fn full(image: &Image) -> Self {
        Self::new(0, 0, image.width, image.height)
    }

    /// Intersection of this window with the image area.
    pub fn clip_to(&self, image: &Image) -> Self {
        let x = self.x.min(image.width);
        let y = self.y.min(image.height);
        let right = self.x.saturating_add(self.width).min(image.width);
        let bottom = self.y.saturating_add(self.height).min(image.height);
        Self::new(x, y, right - x, bottom - y)
    }

    /// Grow the window by `margin` on every side, stopping at zero on the top/left.
    pub fn padded(&self, margin: usize) -> Self {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        Self::new(
            x,
            y,
            self.x + self.width + margin - x,
            self.y + self.height + margin - y,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A multi-channel 16-bit image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub format: ImageFormat,
    pub width: usize,
    pub height: usize,
    pixels: Vec<Pixel>,
}

impl Image {
    /// A zero-filled image.
    pub fn new(format: ImageFormat, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            pixels: vec![0; width * height * format.channels()],
        }
    }

    /// An image filled with a constant value in every channel.
    pub fn filled(format: ImageFormat, width: usize, height: usize, value: Pixel) -> Self {
        Self {
            format,
            width,
            height,
            pixels: vec![value; width * height * format.channels()],
        }
    }

    /// Wrap an existing buffer, checking its length against the format.
    pub fn from_pixels(
        format: ImageFormat,
        width: usize,
        height: usize,
        pixels: Vec<Pixel>,
    ) -> Result<Self, crate::error::TrackError> {
        if pixels.len() != width * height * format.channels() {
            return Err(crate::error::TrackError::BufferLength {
                len: pixels.len(),
                width,
                height,
                format,
            });
        }
        Ok(Self {
            format,
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// Flat pixel index (not buffer offset) of (x, y).
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// All channel values of pixel (x, y).
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[Pixel] {
        self.pixel_at(self.index(x, y))
    }

    /// All channel values of the pixel with flat index `index`.
    #[inline]
    pub fn pixel_at(&self, index: usize) -> &[Pixel] {
        let c = self.channels();
        &self.pixels[c * index..c * index + c]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [Pixel] {
        let c = self.channels();
        let i = self.index(x, y);
        &mut self.pixels[c * i..c * i + c]
    }

    /// First channel of (x, y); the whole value for single-channel images.
    #[inline]
    pub fn value(&self, x: usize, y: usize) -> Pixel {
        self.pixels[self.channels() * self.index(x, y)]
    }

    #[inline]
    pub fn set_value(&mut self, x: usize, y: usize, value: Pixel) {
        let i = self.channels() * self.index(x, y);
        self.pixels[i] = value;
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_length_follows_format() {
        assert_eq!(Image::new(ImageFormat::Rgb, 4, 3).pixels().len(), 36);
        assert_eq!(Image::new(ImageFormat::Nrg, 4, 3).pixels().len(), 24);
        assert_eq!(Image::new(ImageFormat::Binary, 4, 3).pixels().len(), 12);
        assert!(Image::from_pixels(ImageFormat::Hsi, 2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn pixel_addressing_is_row_major() {
        let mut image = Image::new(ImageFormat::Rgb, 3, 2);
        image.pixel_mut(2, 1).copy_from_slice(&[1, 2, 3]);
        assert_eq!(image.pixel_at(5), &[1, 2, 3]);
        assert_eq!(image.value(2, 1), 1);
    }

    #[test]
    fn windows_clip_and_pad() {
        let image = Image::new(ImageFormat::Gray, 10, 8);
        let clipped = Window::new(6, 5, 10, 10).clip_to(&image);
        assert_eq!(clipped, Window::new(6, 5, 4, 3));

        let padded = Window::new(1, 4, 2, 2).padded(3);
        assert_eq!(padded, Window::new(0, 1, 6, 8));
    }

    #[test]
    fn hsi_scales_round_trip_at_landmarks() {
        assert_eq!(hdeg_to_hval(360), PIXEL_MAXVAL);
        assert_eq!(hval_to_hdeg(PIXEL_MAXVAL), 360);
        assert_eq!(pct_to_val(100), PIXEL_MAXVAL);
        assert_eq!(val_to_pct(pct_to_val(50)), 49);
    }
}
