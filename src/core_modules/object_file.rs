// THEORY:
// Plain-text persistence for the two things worth keeping between runs: the
// tracked object and the calibration sample.
//
// Object file: `#` starts a comment, every other line is `key value`. `width`
// and `height` must come first; then `x`, `y`, `format`, the colour bounds of
// that format, and one `shape` line per row drawing the span as `.` and `x`.
// Hue bounds are written in degrees and saturation/intensity in percent. A
// loaded minimum is the smallest pixel value of its unit step and a loaded
// maximum the largest, so a save/load cycle of an HSI object never narrows its
// colour window.
//
// Calibration file: six unsigned integers, see `HsiCalibration`.

use crate::core_modules::histogram::HsiCalibration;
use crate::core_modules::image::{PIXEL_MAXVAL, Pixel, hval_to_hdeg, val_to_pct};
use crate::core_modules::tracked_object::{ChannelBounds, ColorBounds, ColorSpace, Silhouette, TrackedObject};
use crate::error::TrackError;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// How a bound is written in the file.
#[derive(Clone, Copy)]
enum Unit {
    Degrees,
    Percent,
    Level,
}

impl Unit {
    fn label(self) -> &'static str {
        match self {
            Unit::Degrees => "deg",
            Unit::Percent => "percent",
            Unit::Level => "0-255",
        }
    }

    fn max(self) -> u32 {
        match self {
            Unit::Degrees => 360,
            Unit::Percent => 100,
            Unit::Level => 255,
        }
    }

    fn encode(self, value: Pixel) -> u32 {
        match self {
            Unit::Degrees => hval_to_hdeg(value as u32),
            Unit::Percent => val_to_pct(value as u32),
            Unit::Level => value as u32,
        }
    }

    /// Smallest pixel value that encodes to `value`.
    fn decode_min(self, value: u32) -> Pixel {
        match self {
            Unit::Level => value as Pixel,
            _ => (value * PIXEL_MAXVAL).div_ceil(self.max()).min(PIXEL_MAXVAL) as Pixel,
        }
    }

    /// Largest pixel value that encodes to `value`.
    fn decode_max(self, value: u32) -> Pixel {
        match self {
            Unit::Level => value as Pixel,
            _ if value >= self.max() => Pixel::MAX,
            _ => ((value + 1) * PIXEL_MAXVAL).div_ceil(self.max()).saturating_sub(1) as Pixel,
        }
    }
}

/// Channel key prefixes and units of a colour space.
fn channel_keys(space: ColorSpace) -> &'static [(&'static str, Unit)] {
    match space {
        ColorSpace::Hsi => &[("h", Unit::Degrees), ("s", Unit::Percent), ("i", Unit::Percent)],
        ColorSpace::Nrg => &[("nr", Unit::Level), ("ng", Unit::Level)],
        ColorSpace::Rgb => &[("r", Unit::Level), ("g", Unit::Level), ("b", Unit::Level)],
        ColorSpace::Edge => &[],
    }
}

/// Render `object` as an object file. `name` only appears in the header comment.
pub fn to_object_file(object: &TrackedObject, name: &str) -> String {
    let mut out = format!("#\n# {name} -- vistrack object file\n#\n");

    out.push_str("\n# properties\n");
    out.push_str(&format!("width {}\n", object.width));
    out.push_str(&format!("height {}\n", object.height));
    out.push_str(&format!("x {}\n", object.x));
    out.push_str(&format!("y {}\n", object.y));
    out.push_str(&format!("format {}\n", object.color_space().keyword()));

    out.push_str("\n# color boundaries\n");
    for (&(key, unit), bounds) in channel_keys(object.color_space())
        .iter()
        .zip(object.bounds.channels())
    {
        out.push_str(&format!("{key}_min {:3} # {}\n", unit.encode(bounds.min), unit.label()));
        out.push_str(&format!("{key}_max {:3} # {}\n", unit.encode(bounds.max), unit.label()));
    }

    out.push_str("\n# shape data\n");
    for (offset, length) in object.silhouette.rows() {
        let fill = object.width.saturating_sub(offset + length);
        out.push_str(&format!(
            "shape {}{}{}\n",
            ".".repeat(offset),
            "x".repeat(length),
            ".".repeat(fill)
        ));
    }
    out
}

fn line_error(line: usize, reason: impl Into<String>) -> TrackError {
    TrackError::ObjectFile {
        line,
        reason: reason.into(),
    }
}

fn parse_number(value: &str, line: usize) -> Result<usize, TrackError> {
    value
        .parse()
        .map_err(|_| line_error(line, format!("expected an unsigned integer, found {value:?}")))
}

/// Decode one `shape` line into (offset, length).
fn parse_shape(value: &str, width: usize, line: usize) -> Result<(usize, usize), TrackError> {
    if value.len() != width {
        return Err(line_error(
            line,
            format!("shape row has {} columns, width is {width}", value.len()),
        ));
    }
    if let Some(bad) = value.chars().find(|c| *c != '.' && *c != 'x') {
        return Err(line_error(line, format!("unexpected shape character {bad:?}")));
    }
    let Some(first) = value.find('x') else {
        return Ok((0, 0));
    };
    let length = value[first..].find('.').unwrap_or(value.len() - first);
    if value[first + length..].contains('x') {
        return Err(line_error(line, "shape row has more than one span"));
    }
    Ok((first, length))
}

/// Parse an object file. `history` sizes the motion ring of the new object.
pub fn parse_object_file(text: &str, history: usize) -> Result<TrackedObject, TrackError> {
    let mut width: Option<usize> = None;
    let mut height: Option<usize> = None;
    let mut x = 0usize;
    let mut y = 0usize;
    let mut space: Option<ColorSpace> = None;
    let mut limits: HashMap<String, (u32, usize)> = HashMap::new();
    let mut rows: Vec<(usize, usize)> = Vec::new();
    let mut last_line = 0;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        last_line = line;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let mut words = content.split_whitespace();
        let (Some(key), Some(value)) = (words.next(), words.next()) else {
            return Err(line_error(line, format!("expected \"key value\", found {content:?}")));
        };

        match key {
            "width" => width = Some(parse_number(value, line)?),
            "height" => height = Some(parse_number(value, line)?),
            _ => {
                let (Some(w), Some(_)) = (width, height) else {
                    return Err(line_error(line, "width and height must be the first object parameters"));
                };
                match key {
                    "x" => x = parse_number(value, line)?,
                    "y" => y = parse_number(value, line)?,
                    "format" => {
                        space = Some(ColorSpace::from_keyword(value).ok_or_else(|| {
                            line_error(line, format!("unsupported format {value:?}"))
                        })?);
                    }
                    "shape" => rows.push(parse_shape(value, w, line)?),
                    _ if key.ends_with("_min") || key.ends_with("_max") => {
                        let v = u32::try_from(parse_number(value, line)?)
                            .map_err(|_| line_error(line, format!("{key} out of range")))?;
                        limits.insert(key.to_string(), (v, line));
                    }
                    _ => return Err(line_error(line, format!("unknown key {key:?}"))),
                }
            }
        }
    }

    let (Some(width), Some(height)) = (width, height) else {
        return Err(line_error(last_line, "missing width or height"));
    };
    let space = space.ok_or_else(|| line_error(last_line, "missing format"))?;
    if rows.len() != height {
        return Err(line_error(
            last_line,
            format!("{} shape rows for height {height}", rows.len()),
        ));
    }

    let mut channels = Vec::new();
    for &(prefix, unit) in channel_keys(space) {
        let mut bound = |suffix: &str, decode: fn(Unit, u32) -> Pixel| -> Result<Pixel, TrackError> {
            let key = format!("{prefix}_{suffix}");
            let (value, line) = limits
                .remove(&key)
                .ok_or_else(|| line_error(last_line, format!("missing {key}")))?;
            if value > unit.max() {
                return Err(line_error(line, format!("{key} {value} exceeds {}", unit.max())));
            }
            Ok(decode(unit, value))
        };
        let min = bound("min", Unit::decode_min)?;
        let max = bound("max", Unit::decode_max)?;
        channels.push(ChannelBounds::new(min, max));
    }
    if let Some((key, (_, line))) = limits.into_iter().min_by_key(|(_, (_, line))| *line) {
        return Err(line_error(line, format!("{key} does not belong to format {}", space.keyword())));
    }
    let bounds = ColorBounds::from_channels(space, &channels)
        .ok_or_else(|| line_error(last_line, "inconsistent colour bounds"))?;

    Ok(TrackedObject::new(x, y, width, bounds, Silhouette::from_rows(rows), history))
}

/// Write `object` to `path`.
pub fn save_object(object: &TrackedObject, path: &Path) -> Result<(), TrackError> {
    if !object.defined {
        return Err(TrackError::InvalidArgument("cannot save an undefined object".to_string()));
    }
    info!("Writing object to {}", path.display());
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    std::fs::write(path, to_object_file(object, &name))?;
    Ok(())
}

/// Read an object from `path`.
pub fn load_object(path: &Path, history: usize) -> Result<TrackedObject, TrackError> {
    let text = std::fs::read_to_string(path)?;
    parse_object_file(&text, history)
}

pub fn load_calibration(path: &Path) -> Result<HsiCalibration, TrackError> {
    std::fs::read_to_string(path)?.parse()
}

pub fn save_calibration(calibration: &HsiCalibration, path: &Path) -> Result<(), TrackError> {
    info!("Writing calibration to {}", path.display());
    std::fs::write(path, format!("{calibration}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::image::{hdeg_to_hval, pct_to_val};

    fn rgb_object() -> TrackedObject {
        TrackedObject::new(
            4,
            7,
            5,
            ColorBounds::Rgb([
                ChannelBounds::new(10, 20),
                ChannelBounds::new(30, 40),
                ChannelBounds::new(0, 255),
            ]),
            Silhouette::from_rows([(2, 1), (1, 3), (0, 5), (0, 0)]),
            10,
        )
    }

    #[test]
    fn rendering_draws_the_shape() {
        let text = to_object_file(&rgb_object(), "ball.txt");
        assert!(text.contains("# ball.txt -- vistrack object file"));
        assert!(text.contains("format rgb\n"));
        assert!(text.contains("g_min  30 # 0-255\n"));
        assert!(text.contains("shape ..x..\nshape .xxx.\nshape xxxxx\nshape .....\n"));
    }

    #[test]
    fn rendering_lays_out_every_section() {
        let object = TrackedObject::new(
            1,
            2,
            3,
            ColorBounds::Nrg([ChannelBounds::new(5, 250), ChannelBounds::new(40, 41)]),
            Silhouette::from_rows([(1, 2), (0, 3)]),
            10,
        );
        let expected = "#\n# cup -- vistrack object file\n#\n\
                        \n# properties\nwidth 3\nheight 2\nx 1\ny 2\nformat nrg\n\
                        \n# color boundaries\n\
                        nr_min   5 # 0-255\nnr_max 250 # 0-255\n\
                        ng_min  40 # 0-255\nng_max  41 # 0-255\n\
                        \n# shape data\nshape .xx\nshape xxx\n";
        assert_eq!(to_object_file(&object, "cup"), expected);
    }

    #[test]
    fn rgb_objects_survive_a_round_trip() {
        let object = rgb_object();
        let parsed = parse_object_file(&to_object_file(&object, "ball"), 10).expect("parse");
        assert_eq!(parsed, object);
        assert_eq!(parsed.color_space(), ColorSpace::Rgb);
    }

    #[test]
    fn hsi_bounds_are_stored_in_degrees_and_percent() {
        let object = TrackedObject::new(
            0,
            0,
            2,
            ColorBounds::Hsi([
                ChannelBounds::new(hdeg_to_hval(20) as Pixel, hdeg_to_hval(40) as Pixel),
                ChannelBounds::new(pct_to_val(10) as Pixel, pct_to_val(90) as Pixel),
                ChannelBounds::new(0, pct_to_val(100) as Pixel),
            ]),
            Silhouette::rectangle(2, 2),
            10,
        );
        let text = to_object_file(&object, "hsi");
        assert!(text.contains("h_min  19 # deg"));
        assert!(text.contains("i_max 100 # percent"));

        let parsed = parse_object_file(&text, 10).expect("parse");
        assert!(text.contains("h_max  39 # deg"));
        assert_eq!(parsed.bounds.channels()[0].max, hdeg_to_hval(40) as Pixel);
        for (loaded, saved) in parsed.bounds.channels().iter().zip(object.bounds.channels()) {
            assert!(loaded.min <= saved.min && loaded.max >= saved.max);
        }
        assert_eq!(parsed.bounds.channels()[2].max, Pixel::MAX);
        assert_eq!(parsed.silhouette, object.silhouette);
    }

    #[test]
    fn edge_objects_have_no_bounds() {
        let object = TrackedObject::new(1, 1, 3, ColorBounds::Edge, Silhouette::rectangle(3, 1), 10);
        let text = to_object_file(&object, "edge");
        assert!(text.contains("format binary"));
        assert_eq!(parse_object_file(&text, 10).expect("parse"), object);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let early = "# comment\nx 3\nwidth 2\n";
        assert!(matches!(
            parse_object_file(early, 10),
            Err(TrackError::ObjectFile { line: 2, .. })
        ));

        let bad_shape = "width 3\nheight 1\nformat binary\nshape x.x\n";
        assert!(matches!(
            parse_object_file(bad_shape, 10),
            Err(TrackError::ObjectFile { line: 4, .. })
        ));

        let bad_format = "width 3\nheight 1\nformat gray\n";
        assert!(matches!(
            parse_object_file(bad_format, 10),
            Err(TrackError::ObjectFile { line: 3, .. })
        ));

        let foreign = "width 1\nheight 1\nformat binary\nnr_min 4\nshape x\n";
        assert!(matches!(
            parse_object_file(foreign, 10),
            Err(TrackError::ObjectFile { line: 4, .. })
        ));

        let missing = "width 1\nheight 2\nformat binary\nshape x\n";
        assert!(matches!(
            parse_object_file(missing, 10),
            Err(TrackError::ObjectFile { line: 4, .. })
        ));
    }

    #[test]
    fn files_round_trip_on_disk() {
        let dir = std::env::temp_dir();
        let object_path = dir.join("vistrack_object_test.txt");
        save_object(&rgb_object(), &object_path).expect("save");
        assert_eq!(load_object(&object_path, 10).expect("load"), rgb_object());

        let calibration_path = dir.join("vistrack_calibration_test.txt");
        let calibration = HsiCalibration::with_reference(1, 2, 3, 4, 5, 6);
        save_calibration(&calibration, &calibration_path).expect("save");
        assert_eq!(load_calibration(&calibration_path).expect("load"), calibration);

        let _ = std::fs::remove_file(object_path);
        let _ = std::fs::remove_file(calibration_path);
    }
}
