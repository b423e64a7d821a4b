// THEORY:
// Offline calibration. A sample patch of the target object is converted to HSI
// and each channel is summarised in a histogram (hue in degrees, saturation and
// intensity in percent). Two statistics come out of it:
//
// 1.  **Median**: the reference colour of the object, one value per channel.
// 2.  **Otsu threshold on distances**: a second histogram counts how far each
//     sample pixel is from the reference. The split between "near" and "far"
//     distances becomes the segmentation tolerance for that channel.
//
// The Otsu scan is greedy: it walks the splits from low to high and stops at the
// first one whose between-class score is lower than the previous split's. It
// answers the split just before that drop, which is not necessarily the global
// maximum of the score.

use crate::core_modules::format::rgb_to_hsi;
use crate::core_modules::image::{
    Image, ImageFormat, Pixel, hdeg_to_hval, hval_to_hdeg, pct_to_val, val_to_pct,
};
use crate::core_modules::region_grow::Tolerance;
use crate::error::TrackError;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const HUE_BINS: usize = 360;
const PERCENT_BINS: usize = 100;

/// One channel of an HSI image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsiChannel {
    Hue,
    Saturation,
    Intensity,
}

impl HsiChannel {
    fn offset(self) -> usize {
        match self {
            HsiChannel::Hue => 0,
            HsiChannel::Saturation => 1,
            HsiChannel::Intensity => 2,
        }
    }

    pub fn bins(self) -> usize {
        match self {
            HsiChannel::Hue => HUE_BINS,
            _ => PERCENT_BINS,
        }
    }

    /// Bin of a pixel value; values mapping past the last bin are clamped into it.
    fn bin_of(self, value: u32) -> usize {
        let bin = match self {
            HsiChannel::Hue => hval_to_hdeg(value),
            _ => val_to_pct(value),
        } as usize;
        bin.min(self.bins() - 1)
    }

    /// Pixel value at the start of a bin.
    fn value_of(self, bin: usize) -> Pixel {
        match self {
            HsiChannel::Hue => hdeg_to_hval(bin as u32) as Pixel,
            _ => pct_to_val(bin as u32) as Pixel,
        }
    }
}

/// Bin counts with cumulative count and cumulative `bin * count` per bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: Vec<u64>,
    sum_bins: Vec<u64>,
    mean_bins: Vec<u64>,
    count: u64,
}

impl Histogram {
    pub fn from_bins(bins: Vec<u64>) -> Self {
        let mut sum_bins = Vec::with_capacity(bins.len());
        let mut mean_bins = Vec::with_capacity(bins.len());
        let (mut sum, mut mean) = (0u64, 0u64);
        for (i, &n) in bins.iter().enumerate() {
            sum += n;
            mean += i as u64 * n;
            sum_bins.push(sum);
            mean_bins.push(mean);
        }
        Self {
            bins,
            sum_bins,
            mean_bins,
            count: sum,
        }
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn sum_bins(&self) -> &[u64] {
        &self.sum_bins
    }

    pub fn mean_bins(&self) -> &[u64] {
        &self.mean_bins
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Greedy Otsu split. Returns the bin before the first drop of the
    /// between-class score, or the last bin if the score never drops.
    pub fn otsu_threshold(&self) -> usize {
        let n = self.count as u128;
        if n == 0 || self.bins.is_empty() {
            return 0;
        }
        let total_mean = self.mean_bins[self.bins.len() - 1] as u128 / n;

        let mut last = 0u128;
        for (i, (&p, &m)) in self.sum_bins.iter().zip(self.mean_bins.iter()).enumerate() {
            let p = p as u128;
            let score = if p == 0 || p == n {
                0
            } else {
                let a = (m as u128).abs_diff(total_mean * p);
                a * a / (p * (n - p))
            };
            if score < last {
                return i - 1;
            }
            last = score;
        }
        self.bins.len() - 1
    }

    /// Smallest bin whose cumulative count reaches half the total.
    pub fn median(&self) -> usize {
        if self.count == 0 {
            return 0;
        }
        let half = self.count.div_ceil(2);
        self.sum_bins
            .partition_point(|&s| s < half)
            .min(self.bins.len() - 1)
    }
}

fn channel_values(hsi: &Image, channel: HsiChannel) -> Result<impl Iterator<Item = Pixel> + '_, TrackError> {
    TrackError::expect_format(ImageFormat::Hsi, hsi.format)?;
    Ok(hsi.pixels().chunks_exact(3).map(move |px| px[channel.offset()]))
}

/// Histogram of one HSI channel.
pub fn image_histogram(hsi: &Image, channel: HsiChannel) -> Result<Histogram, TrackError> {
    let mut bins = vec![0u64; channel.bins()];
    for v in channel_values(hsi, channel)? {
        bins[channel.bin_of(v as u32)] += 1;
    }
    Ok(Histogram::from_bins(bins))
}

/// Histogram of the distances between one HSI channel and `reference`.
pub fn image_histogram_dist(
    hsi: &Image,
    channel: HsiChannel,
    reference: Pixel,
) -> Result<Histogram, TrackError> {
    let mut bins = vec![0u64; channel.bins()];
    for v in channel_values(hsi, channel)? {
        bins[channel.bin_of(v.abs_diff(reference) as u32)] += 1;
    }
    Ok(Histogram::from_bins(bins))
}

/// Reference colour and tolerances of the target object.
///
/// `h`, `s`, `i` are pixel values; the tolerances are degrees (hue) and
/// percent (saturation, intensity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsiCalibration {
    pub h: Pixel,
    pub s: Pixel,
    pub i: Pixel,
    pub h_tol: u32,
    pub s_tol: u32,
    pub i_tol: u32,
}

impl HsiCalibration {
    pub fn with_reference(h: Pixel, s: Pixel, i: Pixel, h_tol: u32, s_tol: u32, i_tol: u32) -> Self {
        Self {
            h,
            s,
            i,
            h_tol,
            s_tol,
            i_tol,
        }
    }

    /// Calibrate from an RGB sample of the object: histogram medians give the
    /// reference, Otsu on the distance histograms the tolerances.
    pub fn from_sample(sample: &Image) -> Result<Self, TrackError> {
        if sample.width == 0 || sample.height == 0 {
            return Err(TrackError::Calibration("empty sample image".to_string()));
        }
        let hsi = rgb_to_hsi(sample)?;
        let reference = |channel: HsiChannel| -> Result<Pixel, TrackError> {
            Ok(channel.value_of(image_histogram(&hsi, channel)?.median()))
        };
        let mut calibration = Self::with_reference(
            reference(HsiChannel::Hue)?,
            reference(HsiChannel::Saturation)?,
            reference(HsiChannel::Intensity)?,
            0,
            0,
            0,
        );
        calibration.derive_tolerances(&hsi)?;
        debug!(%calibration, "calibrated from sample");
        Ok(calibration)
    }

    /// Replace the tolerances by the Otsu split of each channel's distance
    /// histogram around the current reference.
    pub fn derive_tolerances(&mut self, hsi: &Image) -> Result<(), TrackError> {
        self.h_tol = image_histogram_dist(hsi, HsiChannel::Hue, self.h)?.otsu_threshold() as u32;
        self.s_tol = image_histogram_dist(hsi, HsiChannel::Saturation, self.s)?.otsu_threshold() as u32;
        self.i_tol = image_histogram_dist(hsi, HsiChannel::Intensity, self.i)?.otsu_threshold() as u32;
        Ok(())
    }

    /// Tolerances as a region-growing window, clamped to the extractor's limits.
    pub fn extraction_tolerance(&self) -> Tolerance {
        Tolerance::Hsi {
            hue: self.h_tol.min(180),
            saturation: self.s_tol.min(50),
            intensity: self.i_tol.min(50),
        }
    }
}

impl fmt::Display for HsiCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.h, self.s, self.i, self.h_tol, self.s_tol, self.i_tol
        )
    }
}

impl FromStr for HsiCalibration {
    type Err = TrackError;

    /// Six whitespace-separated unsigned integers: `h s i h_tol s_tol i_tol`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let values = text
            .split_whitespace()
            .map(|word| {
                word.parse::<u32>()
                    .map_err(|e| TrackError::Calibration(format!("{word:?}: {e}")))
            })
            .collect::<Result<Vec<u32>, TrackError>>()?;
        let &[h, s, i, h_tol, s_tol, i_tol] = values.as_slice() else {
            return Err(TrackError::Calibration(format!(
                "expected 6 values, found {}",
                values.len()
            )));
        };
        let pixel = |v: u32| {
            Pixel::try_from(v).map_err(|_| TrackError::Calibration(format!("{v} exceeds the pixel range")))
        };
        Ok(Self::with_reference(pixel(h)?, pixel(s)?, pixel(i)?, h_tol, s_tol, i_tol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spikes(bins: usize, at: &[(usize, u64)]) -> Histogram {
        let mut counts = vec![0; bins];
        for &(bin, n) in at {
            counts[bin] = n;
        }
        Histogram::from_bins(counts)
    }

    #[test]
    fn cumulative_arrays_accumulate() {
        let h = Histogram::from_bins(vec![1, 0, 2, 3]);
        assert_eq!(h.sum_bins(), &[1, 1, 3, 6]);
        assert_eq!(h.mean_bins(), &[0, 0, 4, 13]);
        assert_eq!(h.count(), 6);
    }

    #[test]
    fn median_of_a_single_spike_is_that_bin() {
        assert_eq!(spikes(100, &[(37, 500)]).median(), 37);
        assert_eq!(spikes(360, &[(0, 1)]).median(), 0);
        assert_eq!(spikes(100, &[(10, 3), (20, 3)]).median(), 10);
        assert_eq!(spikes(100, &[(10, 3), (20, 4)]).median(), 20);
    }

    #[test]
    fn otsu_splits_two_spikes_between_them() {
        // The score is flat between the spikes and drops to 0 on the second
        // one, so the greedy scan answers the bin just before it.
        assert_eq!(spikes(100, &[(10, 500), (50, 500)]).otsu_threshold(), 49);
        assert_eq!(spikes(100, &[(5, 200), (80, 900)]).otsu_threshold(), 79);
    }

    #[test]
    fn otsu_without_drop_answers_the_last_bin() {
        assert_eq!(spikes(100, &[(40, 10)]).otsu_threshold(), 99);
        assert_eq!(Histogram::from_bins(vec![0; 8]).otsu_threshold(), 0);
    }

    #[test]
    fn channel_histograms_bin_in_degrees_and_percent() {
        let mut hsi = Image::new(ImageFormat::Hsi, 3, 1);
        hsi.pixel_mut(0, 0).copy_from_slice(&[hdeg_to_hval(90) as Pixel, 65535, 0]);
        hsi.pixel_mut(1, 0).copy_from_slice(&[65535, pct_to_val(30) as Pixel, 0]);
        hsi.pixel_mut(2, 0).copy_from_slice(&[hdeg_to_hval(90) as Pixel, 0, 0]);

        let hue = image_histogram(&hsi, HsiChannel::Hue).expect("hue");
        assert_eq!(hue.len(), 360);
        assert_eq!(hue.bins()[89], 2);
        assert_eq!(hue.bins()[359], 1);

        let sat = image_histogram(&hsi, HsiChannel::Saturation).expect("sat");
        assert_eq!(sat.len(), 100);
        assert_eq!(sat.bins()[99], 1);
        assert_eq!(sat.bins()[29], 1);
        assert_eq!(sat.bins()[0], 1);

        assert!(image_histogram(&Image::new(ImageFormat::Rgb, 2, 2), HsiChannel::Hue).is_err());
    }

    #[test]
    fn distance_histogram_is_symmetric_around_the_reference() {
        let mut hsi = Image::new(ImageFormat::Hsi, 2, 1);
        let reference = pct_to_val(50) as Pixel;
        let delta = pct_to_val(10) as Pixel;
        hsi.pixel_mut(0, 0)[2] = reference - delta;
        hsi.pixel_mut(1, 0)[2] = reference + delta;
        let dist = image_histogram_dist(&hsi, HsiChannel::Intensity, reference).expect("dist");
        assert_eq!(dist.bins()[9] + dist.bins()[10], 2);
        assert_eq!(dist.count(), 2);
    }

    #[test]
    fn calibration_text_round_trips() {
        let calibration: HsiCalibration = "100 2000 30000 12 8 15".parse().expect("parse");
        assert_eq!(calibration, HsiCalibration::with_reference(100, 2000, 30000, 12, 8, 15));
        assert_eq!(calibration.to_string(), "100 2000 30000 12 8 15");

        assert!("1 2 3 4 5".parse::<HsiCalibration>().is_err());
        assert!("1 2 3 4 5 x".parse::<HsiCalibration>().is_err());
        assert!("70000 2 3 4 5 6".parse::<HsiCalibration>().is_err());
    }

    #[test]
    fn extraction_tolerance_is_clamped() {
        let calibration = HsiCalibration::with_reference(0, 0, 0, 359, 99, 20);
        assert_eq!(
            calibration.extraction_tolerance(),
            Tolerance::Hsi {
                hue: 180,
                saturation: 50,
                intensity: 20
            }
        );
    }

    #[test]
    fn sample_calibration_finds_the_dominant_colour() {
        // Mostly pure red with a few dark pixels.
        let mut sample = Image::new(ImageFormat::Rgb, 10, 10);
        for (k, px) in sample.pixels_mut().chunks_exact_mut(3).enumerate() {
            if k % 10 == 0 {
                px.copy_from_slice(&[20, 20, 20]);
            } else {
                px.copy_from_slice(&[255, 0, 0]);
            }
        }
        let calibration = HsiCalibration::from_sample(&sample).expect("calibrate");
        assert_eq!(hval_to_hdeg(calibration.h as u32), 0);
        assert!(val_to_pct(calibration.s as u32) >= 98);
        assert!(val_to_pct(calibration.i as u32) >= 48);
        assert!(calibration.s_tol < 100);
    }
}
