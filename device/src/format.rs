// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Formats supported by a device and the catalog used to negotiate them.
//!
//! A [`Format`] is a discrete combination of pixel format, resolution and frame rate. Its memory
//! layout (number of planes, stride and size of each plane) is derived from a fixed table of known
//! pixel formats.
//!
//! Devices look formats up through the [`FormatCatalog`] trait. [`FormatList`] is the built-in
//! implementation, backed by a plain list of formats.

use v4l2r::bindings;
use v4l2r::PixelFormat;
use v4l2r::QueueType;

/// A frame rate expressed as frames (`numerator`) per `denominator` seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Whether this fraction carries no usable value.
    pub fn is_unset(&self) -> bool {
        self.numerator == 0 || self.denominator == 0
    }

    pub fn value(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Convert a frame rate into the frame interval representation used by `timeperframe`.
///
/// The two members are swapped: a rate of 30/1 frames per second is an interval of 1/30 second.
pub fn rate_to_interval(rate: Fraction) -> bindings::v4l2_fract {
    bindings::v4l2_fract {
        numerator: rate.denominator,
        denominator: rate.numerator,
    }
}

/// Reverse of [`rate_to_interval`].
pub fn interval_to_rate(interval: &bindings::v4l2_fract) -> Fraction {
    Fraction::new(interval.denominator, interval.numerator)
}

/// Pixel format, width and height of `format`, read from the member used by `queue`.
pub fn v4l2_format_fields(queue: QueueType, format: &bindings::v4l2_format) -> (u32, u32, u32) {
    if queue.is_multiplanar() {
        // SAFETY: `pix_mp` is the member in use for multi-planar buffer types.
        let pix_mp = unsafe { format.fmt.pix_mp };
        (pix_mp.pixelformat, pix_mp.width, pix_mp.height)
    } else {
        // SAFETY: `pix` is the member in use for single-planar buffer types.
        let pix = unsafe { format.fmt.pix };
        (pix.pixelformat, pix.width, pix.height)
    }
}

/// Layout of a single plane of a pixel format.
struct PlaneLayout {
    /// Bits per pixel of a line of this plane.
    bits_per_pixel: u32,
    /// Vertical subsampling factor.
    height_div: u32,
}

const PACKED_16: &[PlaneLayout] = &[PlaneLayout {
    bits_per_pixel: 16,
    height_div: 1,
}];
const PACKED_24: &[PlaneLayout] = &[PlaneLayout {
    bits_per_pixel: 24,
    height_div: 1,
}];
const PACKED_32: &[PlaneLayout] = &[PlaneLayout {
    bits_per_pixel: 32,
    height_div: 1,
}];
/// Luma plane followed by an interleaved chroma plane of half height.
const SEMI_PLANAR_420: &[PlaneLayout] = &[
    PlaneLayout {
        bits_per_pixel: 8,
        height_div: 1,
    },
    PlaneLayout {
        bits_per_pixel: 8,
        height_div: 2,
    },
];
const PLANAR_420: &[PlaneLayout] = &[
    PlaneLayout {
        bits_per_pixel: 8,
        height_div: 1,
    },
    PlaneLayout {
        bits_per_pixel: 4,
        height_div: 2,
    },
    PlaneLayout {
        bits_per_pixel: 4,
        height_div: 2,
    },
];

struct PixelFormatInfo {
    fourcc: u32,
    description: &'static str,
    planes: &'static [PlaneLayout],
}

const fn pixel_format(
    fourcc: &[u8; 4],
    description: &'static str,
    planes: &'static [PlaneLayout],
) -> PixelFormatInfo {
    PixelFormatInfo {
        fourcc: u32::from_le_bytes(*fourcc),
        description,
        planes,
    }
}

static PIXEL_FORMATS: [PixelFormatInfo; 11] = [
    pixel_format(b"RGB4", "RGB32", PACKED_32),
    pixel_format(b"BGR4", "BGR32", PACKED_32),
    pixel_format(b"RGB3", "RGB24", PACKED_24),
    pixel_format(b"BGR3", "BGR24", PACKED_24),
    pixel_format(b"RGBP", "RGB565", PACKED_16),
    pixel_format(b"RGBO", "RGB555", PACKED_16),
    pixel_format(b"YUYV", "YUY2", PACKED_16),
    pixel_format(b"UYVY", "UYVY", PACKED_16),
    pixel_format(b"NV12", "NV12", SEMI_PLANAR_420),
    pixel_format(b"NV21", "NV21", SEMI_PLANAR_420),
    pixel_format(b"YU12", "YUV420", PLANAR_420),
];

fn pixel_format_info(fourcc: u32) -> Option<&'static PixelFormatInfo> {
    PIXEL_FORMATS.iter().find(|info| info.fourcc == fourcc)
}

/// Whether the memory layout of `fourcc` is known.
pub fn is_known_pixel_format(fourcc: u32) -> bool {
    pixel_format_info(fourcc).is_some()
}

/// Human-readable description of `fourcc`, falling back to its four characters.
pub fn pixel_format_description(fourcc: u32) -> String {
    match pixel_format_info(fourcc) {
        Some(info) => info.description.to_string(),
        None => fourcc
            .to_le_bytes()
            .iter()
            .map(|&c| if c.is_ascii_graphic() { c as char } else { '?' })
            .collect(),
    }
}

/// A discrete video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    fourcc: u32,
    width: u32,
    height: u32,
    frame_rate: Fraction,
}

impl Format {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, frame_rate: Fraction) -> Self {
        Self::from_fourcc(pixel_format.to_u32(), width, height, frame_rate)
    }

    pub fn from_fourcc(fourcc: u32, width: u32, height: u32, frame_rate: Fraction) -> Self {
        Self {
            fourcc,
            width,
            height,
            frame_rate,
        }
    }

    pub fn fourcc(&self) -> u32 {
        self.fourcc
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> Fraction {
        self.frame_rate
    }

    /// Same format with its frame rate replaced by `frame_rate`.
    pub fn with_frame_rate(self, frame_rate: Fraction) -> Self {
        Self { frame_rate, ..self }
    }

    fn plane_layout(&self, plane: usize) -> Option<&'static PlaneLayout> {
        pixel_format_info(self.fourcc)?.planes.get(plane)
    }

    /// Number of planes of the format, 0 if the pixel format is unknown.
    pub fn planes(&self) -> usize {
        pixel_format_info(self.fourcc).map_or(0, |info| info.planes.len())
    }

    /// Bytes per line of `plane`.
    pub fn bypl(&self, plane: usize) -> u32 {
        self.plane_layout(plane)
            .map_or(0, |layout| self.width * layout.bits_per_pixel / 8)
    }

    /// Size in bytes of `plane`.
    pub fn plane_size(&self, plane: usize) -> u32 {
        self.plane_layout(plane).map_or(0, |layout| {
            self.bypl(plane) * (self.height / layout.height_div)
        })
    }

    /// Size in bytes of a whole frame.
    pub fn size(&self) -> u32 {
        (0..self.planes()).map(|plane| self.plane_size(plane)).sum()
    }
}

/// Source of the formats supported by a device.
///
/// Only [`Self::formats`] and [`Self::nearest`] need to be implemented, the enumeration helpers
/// are derived from the list of formats.
pub trait FormatCatalog: Send + Sync {
    /// All supported formats, in order of preference.
    fn formats(&self) -> Vec<Format>;

    /// Supported format closest to `desired`, if any.
    ///
    /// An unset frame rate in `desired` matches any rate.
    fn nearest(&self, desired: &Format) -> Option<Format>;

    /// Supported pixel formats, without duplicates.
    fn pixel_formats(&self) -> Vec<u32> {
        let mut fourccs = Vec::new();
        for format in self.formats() {
            if !fourccs.contains(&format.fourcc()) {
                fourccs.push(format.fourcc());
            }
        }

        fourccs
    }

    /// Resolutions supported for `fourcc`, without duplicates.
    fn resolutions(&self, fourcc: u32) -> Vec<(u32, u32)> {
        let mut resolutions = Vec::new();
        for format in self.formats().into_iter().filter(|f| f.fourcc() == fourcc) {
            let resolution = (format.width(), format.height());
            if !resolutions.contains(&resolution) {
                resolutions.push(resolution);
            }
        }

        resolutions
    }

    /// Frame rates supported for `fourcc` at `width`x`height`, without duplicates.
    fn frame_rates(&self, fourcc: u32, width: u32, height: u32) -> Vec<Fraction> {
        let mut rates = Vec::new();
        for format in self.formats().into_iter().filter(|f| {
            f.fourcc() == fourcc && f.width() == width && f.height() == height
        }) {
            if !rates.contains(&format.frame_rate()) {
                rates.push(format.frame_rate());
            }
        }

        rates
    }

    /// Supported format exactly matching the pixel format and resolution of `format`.
    fn from_v4l2(&self, format: &bindings::v4l2_format) -> Option<Format> {
        let queue = QueueType::n(format.type_)?;
        let (fourcc, width, height) = v4l2_format_fields(queue, format);

        self.formats()
            .into_iter()
            .find(|f| f.fourcc() == fourcc && f.width() == width && f.height() == height)
    }
}

/// Catalog backed by a fixed list of formats.
#[derive(Debug, Clone)]
pub struct FormatList(Vec<Format>);

impl FormatList {
    pub fn new(formats: Vec<Format>) -> Self {
        Self(formats)
    }
}

impl FormatCatalog for FormatList {
    fn formats(&self) -> Vec<Format> {
        self.0.clone()
    }

    fn nearest(&self, desired: &Format) -> Option<Format> {
        let desired_fps = desired.frame_rate();

        self.0
            .iter()
            .map(|candidate| {
                let other_fourcc = candidate.fourcc() != desired.fourcc();
                let dw = candidate.width() as i64 - desired.width() as i64;
                let dh = candidate.height() as i64 - desired.height() as i64;
                let dfps = if desired_fps.is_unset() {
                    0.0
                } else {
                    (candidate.frame_rate().value() - desired_fps.value()).abs()
                };

                (candidate, other_fourcc, dw * dw + dh * dh, dfps)
            })
            .min_by(|a, b| {
                a.1.cmp(&b.1)
                    .then(a.2.cmp(&b.2))
                    .then(a.3.total_cmp(&b.3))
            })
            .map(|(candidate, ..)| *candidate)
    }
}
