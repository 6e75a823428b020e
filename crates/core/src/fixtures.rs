//! Synthetic listing photos for manual end-to-end runs.
//!
//! Each fixture is a diagonal gradient in its own hue with a dark band
//! whose vertical position encodes the frame index, so the order of
//! stills is visible in the rendered tour without any text rendering.

use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};

/// Largest edge accepted for a generated fixture.
pub const MAX_FIXTURE_EDGE: u32 = 8192;

/// Upper bound on fixtures produced in one call.
pub const MAX_FIXTURE_COUNT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("invalid fixture parameters: {0}")]
    Invalid(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output encoding for generated stills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureFormat {
    Png,
    Jpeg,
}

impl FixtureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Write `count` fixtures named `fixture_{NN}.{ext}` into `dir`.
///
/// Creates `dir` if needed and returns the written paths in frame order.
pub fn generate_test_images(
    dir: &Path,
    count: usize,
    width: u32,
    height: u32,
    format: FixtureFormat,
) -> Result<Vec<PathBuf>, FixtureError> {
    if count == 0 || count > MAX_FIXTURE_COUNT {
        return Err(FixtureError::Invalid(format!(
            "count must be within 1..={MAX_FIXTURE_COUNT}, got {count}"
        )));
    }
    for (name, edge) in [("width", width), ("height", height)] {
        if edge < 16 || edge > MAX_FIXTURE_EDGE {
            return Err(FixtureError::Invalid(format!(
                "{name} must be within 16..={MAX_FIXTURE_EDGE}, got {edge}"
            )));
        }
    }

    std::fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(count);
    for index in 0..count {
        let img = render_fixture(index, count, width, height);
        let path = dir.join(format!("fixture_{index:02}.{}", format.extension()));
        img.save_with_format(&path, format.image_format())?;
        tracing::debug!(path = %path.display(), index, "Wrote fixture image");
        paths.push(path);
    }

    Ok(paths)
}

/// Render one fixture in memory.
pub fn render_fixture(index: usize, count: usize, width: u32, height: u32) -> RgbImage {
    let hue = (index as f32 * 360.0 / count.max(1) as f32) % 360.0;
    let band_height = (height / count.max(1) as u32).max(4);
    let band_top = (index as u32 * band_height).min(height.saturating_sub(band_height));

    RgbImage::from_fn(width, height, |x, y| {
        let t = (x as f32 / width as f32 + y as f32 / height as f32) / 2.0;
        let value = 0.45 + 0.5 * t;
        let [r, g, b] = hsv_to_rgb(hue, 0.65, value);
        if y >= band_top && y < band_top + band_height {
            Rgb([r / 4, g / 4, b / 4])
        } else {
            Rgb([r, g, b])
        }
    })
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let c = value * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_byte = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}
