use crate::{CalibError, CalibResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Wrap a row-major buffer, checking its length against the dimensions.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> CalibResult<Self> {
        let expected = width.checked_mul(height).ok_or_else(|| {
            CalibError::InputMismatch(format!("image dimensions overflow ({width}x{height})"))
        })?;
        if data.len() != expected {
            return Err(CalibError::InputMismatch(format!(
                "grayscale buffer has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width as u32, self.height as u32)
    }

    /// Copy the pixels inside `roi` (already clipped) into a new buffer.
    pub fn crop(&self, roi: &RegionOfInterest) -> GrayImage {
        let mut data = Vec::with_capacity(roi.width as usize * roi.height as usize);
        for y in roi.y..roi.y + roi.height {
            let start = y as usize * self.width + roi.x as usize;
            data.extend_from_slice(&self.data[start..start + roi.width as usize]);
        }
        GrayImage {
            width: roi.width as usize,
            height: roi.height as usize,
            data,
        }
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Check that every image in a set has the expected size.
///
/// `sizes` pairs an image name with its dimensions; the first mismatch is
/// reported as [`CalibError::InputMismatch`].
pub fn validate_image_sizes<'a, I>(expected: ImageSize, sizes: I) -> CalibResult<()>
where
    I: IntoIterator<Item = (&'a str, ImageSize)>,
{
    for (name, size) in sizes {
        if size != expected {
            return Err(CalibError::InputMismatch(format!(
                "image {name} is {size}, expected {expected}"
            )));
        }
    }
    Ok(())
}

/// Axis-aligned search window in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionOfInterest {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with the image rectangle; `None` when nothing remains.
    pub fn clip(&self, size: ImageSize) -> Option<RegionOfInterest> {
        let x0 = self.x.min(size.width);
        let y0 = self.y.min(size.height);
        let x1 = self.x.saturating_add(self.width).min(size.width);
        let y1 = self.y.saturating_add(self.height).min(size.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(RegionOfInterest::new(x0, y0, x1 - x0, y1 - y0))
    }

    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x as f32
            && y >= self.y as f32
            && x < self.x.saturating_add(self.width) as f32
            && y < self.y.saturating_add(self.height) as f32
    }
}

/// One input frame for corner detection.
///
/// The optional region of interest restricts the board search, e.g. when two
/// boards are visible side by side.
#[derive(Clone, Debug)]
pub struct CalibrationImage {
    pub name: String,
    pub image: GrayImage,
    pub roi: Option<RegionOfInterest>,
}

impl CalibrationImage {
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image,
            roi: None,
        }
    }

    pub fn with_roi(mut self, roi: Option<RegionOfInterest>) -> Self {
        self.roi = roi;
        self
    }

    pub fn size(&self) -> ImageSize {
        self.image.size()
    }

    /// The area to search: the ROI clipped to the image, or the full frame.
    pub fn search_window(&self) -> Option<RegionOfInterest> {
        let size = self.size();
        match self.roi {
            Some(roi) => roi.clip(size),
            None => RegionOfInterest::new(0, 0, size.width, size.height).clip(size),
        }
    }
}
