// THEORY:
// Format conversions around the tracking engine. None of these are hard; they
// exist so the control loop can go from a decoded camera frame to the inputs
// the labeler, the extractor and the correlator expect:
//
//   RGB (0-255 per channel) -> HSI (full 16-bit range per channel)
//   RGB -> normalised red/green (0-255)
//   HSI + calibration       -> binary mask, object colour = 0 (labeler input)
//   image + object bounds   -> binary mask, object colour = 255 (correlator input)
//
// PNG decode/encode goes through the `image` crate so frames and debug masks can
// be inspected with any viewer.

use crate::core_modules::histogram::HsiCalibration;
use crate::core_modules::image::{
    Image, ImageFormat, PIXEL_MAXVAL, Pixel, hdeg_to_hval, pct_to_val,
};
use crate::core_modules::tracked_object::ColorBounds;
use crate::error::TrackError;
use ::image::ImageEncoder;
use std::path::Path;

/// Value written for pixels outside a colour window in binary masks.
pub const MASK_SET: Pixel = 255;

/// Integer RGB to HSI conversion (hexcone model). Hue, saturation and
/// intensity all span 0..=PIXEL_MAXVAL.
pub fn rgb_to_hsi(src: &Image) -> Result<Image, TrackError> {
    TrackError::expect_format(ImageFormat::Rgb, src.format)?;
    let mut dest = Image::new(ImageFormat::Hsi, src.width, src.height);

    for (rgb, hsi) in src.pixels().chunks_exact(3).zip(dest.pixels_mut().chunks_exact_mut(3)) {
        let (h, s, i) = hsi_of(rgb[0] as i64, rgb[1] as i64, rgb[2] as i64);
        hsi[0] = h;
        hsi[1] = s;
        hsi[2] = i;
    }
    Ok(dest)
}

fn hsi_of(r: i64, g: i64, b: i64) -> (Pixel, Pixel, Pixel) {
    let maxval = PIXEL_MAXVAL as i64;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let sum = max + min;

    let intensity = to_pixel(maxval * sum / 510);
    if max == min {
        return (0, 0, intensity);
    }

    let delta = max - min;
    let saturation = if sum < 255 {
        maxval * delta / sum
    } else {
        maxval * delta / (510 - sum)
    };

    let hue = if r == max {
        let base = maxval * (g - b) / (delta * 6);
        if g < b { base + maxval } else { base }
    } else if g == max {
        let base = maxval * (b - r) / (delta * 6);
        if 2 * delta < b - r {
            base + maxval * 4 / 3
        } else {
            base + maxval / 3
        }
    } else {
        let base = maxval * (r - g) / (delta * 6);
        if 4 * delta < r - g {
            base + maxval * 5 / 3
        } else {
            base + maxval * 2 / 3
        }
    };

    (to_pixel(hue), to_pixel(saturation), intensity)
}

#[inline]
fn to_pixel(value: i64) -> Pixel {
    value.clamp(0, PIXEL_MAXVAL as i64) as Pixel
}

/// RGB to normalised red/green: `255 * c / (r + g + b)`, rounded. Black maps to (0, 0).
pub fn rgb_to_nrg(src: &Image) -> Result<Image, TrackError> {
    TrackError::expect_format(ImageFormat::Rgb, src.format)?;
    let mut dest = Image::new(ImageFormat::Nrg, src.width, src.height);

    for (rgb, nrg) in src.pixels().chunks_exact(3).zip(dest.pixels_mut().chunks_exact_mut(2)) {
        let sum = rgb[0] as u32 + rgb[1] as u32 + rgb[2] as u32;
        if sum == 0 {
            nrg[0] = 0;
            nrg[1] = 0;
            continue;
        }
        nrg[0] = ((255 * rgb[0] as u32 + sum / 2) / sum) as Pixel;
        nrg[1] = ((255 * rgb[1] as u32 + sum / 2) / sum) as Pixel;
    }
    Ok(dest)
}

/// Binarise an HSI image against a calibration: 0 where every channel lies
/// within reference +/- tolerance, `MASK_SET` elsewhere.
pub fn calibration_mask(hsi: &Image, calibration: &HsiCalibration) -> Result<Image, TrackError> {
    TrackError::expect_format(ImageFormat::Hsi, hsi.format)?;
    let reference = [calibration.h as u32, calibration.s as u32, calibration.i as u32];
    let tolerance = [
        hdeg_to_hval(calibration.h_tol),
        pct_to_val(calibration.s_tol),
        pct_to_val(calibration.i_tol),
    ];

    let mut dest = Image::new(ImageFormat::Binary, hsi.width, hsi.height);
    for (pixel, out) in hsi.pixels().chunks_exact(3).zip(dest.pixels_mut().iter_mut()) {
        let inside = pixel
            .iter()
            .zip(reference.iter().zip(tolerance.iter()))
            .all(|(&v, (&r, &t))| (v as u32).abs_diff(r) <= t);
        *out = if inside { 0 } else { MASK_SET };
    }
    Ok(dest)
}

/// Binarise an image against an object's colour bounds: `MASK_SET` for pixels
/// inside every channel window, 0 elsewhere. Edge objects treat non-edge
/// (zero) pixels as inside.
pub fn bounds_mask(image: &Image, bounds: &ColorBounds) -> Result<Image, TrackError> {
    TrackError::expect_format(bounds.space().image_format(), image.format)?;

    let mut dest = Image::new(ImageFormat::Binary, image.width, image.height);
    let channels = image.channels();
    for (pixel, out) in image
        .pixels()
        .chunks_exact(channels)
        .zip(dest.pixels_mut().iter_mut())
    {
        *out = if bounds.contains(pixel) { MASK_SET } else { 0 };
    }
    Ok(dest)
}

/// Overwrite a `width`-pixel frame around the image with `value`, on every channel.
pub fn clear_borders(image: &mut Image, value: Pixel, width: usize) {
    let (w, h) = (image.width, image.height);
    for y in 0..h {
        for x in 0..w {
            let on_border = x < width || y < width || x + width >= w || y + width >= h;
            if on_border {
                image.pixel_mut(x, y).fill(value);
            }
        }
    }
}

/// Wrap an 8-bit RGB buffer decoded by the `image` crate.
pub fn from_rgb_image(rgb: &::image::RgbImage) -> Image {
    let pixels: Vec<Pixel> = rgb.as_raw().iter().map(|&v| v as Pixel).collect();
    let mut image = Image::new(ImageFormat::Rgb, rgb.width() as usize, rgb.height() as usize);
    image.pixels_mut().copy_from_slice(&pixels);
    image
}

/// Decode any image file the `image` crate understands into an RGB `Image`.
pub fn load_rgb(path: &Path) -> Result<Image, TrackError> {
    let decoded = ::image::open(path)?.to_rgb8();
    Ok(from_rgb_image(&decoded))
}

/// Encode a gray, binary or RGB image as an 8-bit PNG. Values above 255 are clipped.
pub fn save_png(image: &Image, path: &Path) -> Result<(), TrackError> {
    let color = match image.format {
        ImageFormat::Gray | ImageFormat::Binary => ::image::ExtendedColorType::L8,
        ImageFormat::Rgb => ::image::ExtendedColorType::Rgb8,
        other => {
            return Err(TrackError::FormatMismatch {
                expected: ImageFormat::Rgb,
                actual: other,
            });
        }
    };
    let buffer: Vec<u8> = image.pixels().iter().map(|&v| v.min(255) as u8).collect();

    let output = std::fs::File::create(path)?;
    let encoder = ::image::codecs::png::PngEncoder::new(output);
    encoder.write_image(&buffer, image.width as u32, image.height as u32, color)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::image::{hval_to_hdeg, val_to_pct};
    use crate::core_modules::tracked_object::ChannelBounds;

    fn rgb(pixels: &[[Pixel; 3]]) -> Image {
        let flat: Vec<Pixel> = pixels.iter().flatten().copied().collect();
        Image::from_pixels(ImageFormat::Rgb, pixels.len(), 1, flat).expect("buffer")
    }

    #[test]
    fn primaries_land_on_their_hues() {
        let hsi = rgb_to_hsi(&rgb(&[[255, 0, 0], [0, 255, 0], [0, 0, 255], [128, 128, 128]]))
            .expect("convert");
        let hues: Vec<u32> = (0..4).map(|x| hval_to_hdeg(hsi.pixel(x, 0)[0] as u32)).collect();
        assert_eq!(hues[0], 0);
        assert_eq!(hues[1], 120);
        assert_eq!(hues[2], 240);

        // Gray has no saturation and sits near half intensity.
        assert_eq!(hsi.pixel(3, 0)[1], 0);
        assert_eq!(val_to_pct(hsi.pixel(3, 0)[2] as u32), 50);
        assert_eq!(val_to_pct(hsi.pixel(0, 0)[1] as u32), 100);
    }

    #[test]
    fn nrg_rounds_and_handles_black() {
        let nrg = rgb_to_nrg(&rgb(&[[100, 100, 100], [0, 0, 0], [255, 0, 0]])).expect("convert");
        assert_eq!(nrg.pixel(0, 0), &[85, 85]);
        assert_eq!(nrg.pixel(1, 0), &[0, 0]);
        assert_eq!(nrg.pixel(2, 0), &[255, 0]);
    }

    #[test]
    fn calibration_mask_marks_inside_as_zero() {
        let hsi = rgb_to_hsi(&rgb(&[[255, 0, 0], [0, 0, 255]])).expect("convert");
        let red = hsi.pixel(0, 0);
        let calibration = HsiCalibration::with_reference(red[0], red[1], red[2], 10, 10, 10);
        let mask = calibration_mask(&hsi, &calibration).expect("mask");
        assert_eq!(mask.format, ImageFormat::Binary);
        assert_eq!(mask.pixels(), &[0, MASK_SET]);
    }

    #[test]
    fn bounds_mask_marks_inside_as_set() {
        let nrg = rgb_to_nrg(&rgb(&[[255, 0, 0], [0, 255, 0]])).expect("convert");
        let bounds = ColorBounds::Nrg([ChannelBounds::new(200, 255), ChannelBounds::new(0, 10)]);
        let mask = bounds_mask(&nrg, &bounds).expect("mask");
        assert_eq!(mask.pixels(), &[MASK_SET, 0]);

        let hsi = Image::new(ImageFormat::Hsi, 2, 1);
        assert!(bounds_mask(&hsi, &bounds).is_err());
    }

    #[test]
    fn borders_are_cleared_on_every_channel() {
        let mut image = Image::new(ImageFormat::Rgb, 5, 4);
        clear_borders(&mut image, 9, 1);
        assert_eq!(image.pixel(0, 0), &[9, 9, 9]);
        assert_eq!(image.pixel(4, 3), &[9, 9, 9]);
        assert_eq!(image.pixel(2, 1), &[0, 0, 0]);
        assert_eq!(image.pixel(3, 2), &[0, 0, 0]);
    }

    #[test]
    fn png_refuses_hsi() {
        let hsi = Image::new(ImageFormat::Hsi, 2, 2);
        let path = std::env::temp_dir().join("vistrack_hsi_refused.png");
        assert!(matches!(
            save_png(&hsi, &path),
            Err(TrackError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn png_round_trips_through_the_codec() {
        let mut frame = Image::new(ImageFormat::Rgb, 3, 2);
        frame.pixel_mut(1, 1).copy_from_slice(&[10, 200, 30]);
        let path = std::env::temp_dir().join("vistrack_rgb_roundtrip.png");
        save_png(&frame, &path).expect("save");
        let loaded = load_rgb(&path).expect("load");
        assert_eq!(loaded, frame);
        let _ = std::fs::remove_file(path);
    }
}
