//! Turning raw image payloads into pixel arrays.
//!
//! The session hands every received image frame to a [`FrameDecoder`].
//! [`PixelDecoder`] is the default: decode (PNG or JPEG), resize to a square
//! resolution, scale to `[0, 1]` and optionally collapse to one channel.

use image::imageops::FilterType;

/// Error type returned by frame decoders.
pub type DecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Row-major `height × width × channels` array of normalised pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<f32>,
}

impl ImageArray {
    /// Wrap pixel data, checking that it matches the shape.
    pub fn new(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Option<Self> {
        let expected = height.checked_mul(width)?.checked_mul(channels)?;
        (data.len() == expected).then_some(Self {
            height,
            width,
            channels,
            data,
        })
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// `[height, width, channels]`
    pub const fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Pixel value at `(row, col, channel)`, if in bounds.
    pub fn get(&self, row: usize, col: usize, channel: usize) -> Option<f32> {
        if row >= self.height || col >= self.width || channel >= self.channels {
            return None;
        }
        let index = row
            .checked_mul(self.width)?
            .checked_add(col)?
            .checked_mul(self.channels)?
            .checked_add(channel)?;
        self.data.get(index).copied()
    }
}

/// Converts one raw observation payload into pixels.
pub trait FrameDecoder: Send {
    /// Decode one image payload.
    ///
    /// # Errors
    /// Returns a [`DecodeError`] when the payload is not a readable image.
    fn decode(&self, frame: &[u8]) -> Result<ImageArray, DecodeError>;
}

/// Default decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDecoder {
    resolution: u32,
    grayscale: bool,
}

impl PixelDecoder {
    /// Default output edge length, in pixels.
    pub const DEFAULT_RESOLUTION: u32 = 80;

    /// Largest accepted output edge length, in pixels.
    pub const MAX_RESOLUTION: u32 = 2048;

    pub const fn new(resolution: u32, grayscale: bool) -> Self {
        Self {
            resolution,
            grayscale,
        }
    }

    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    pub const fn grayscale(&self) -> bool {
        self.grayscale
    }
}

impl Default for PixelDecoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RESOLUTION, false)
    }
}

impl FrameDecoder for PixelDecoder {
    fn decode(&self, frame: &[u8]) -> Result<ImageArray, DecodeError> {
        if self.resolution == 0 || self.resolution > Self::MAX_RESOLUTION {
            return Err(format!(
                "resolution {} outside 1..={}",
                self.resolution,
                Self::MAX_RESOLUTION
            )
            .into());
        }

        let decoded = image::load_from_memory(frame)?.resize_exact(
            self.resolution,
            self.resolution,
            FilterType::Triangle,
        );

        // Alpha survives as a fourth channel; everything else becomes RGB.
        let (raw, source_channels) = if decoded.color().has_alpha() {
            (decoded.to_rgba8().into_raw(), 4)
        } else {
            (decoded.to_rgb8().into_raw(), 3)
        };

        let edge = usize::try_from(self.resolution)?;
        let (data, channels): (Vec<f32>, usize) = if self.grayscale {
            #[allow(clippy::cast_precision_loss)]
            let scale = 255.0 * source_channels as f32;
            let data = raw
                .chunks_exact(source_channels)
                .map(|pixel| pixel.iter().map(|&c| f32::from(c)).sum::<f32>() / scale)
                .collect();
            (data, 1)
        } else {
            let data = raw.iter().map(|&c| f32::from(c) / 255.0).collect();
            (data, source_channels)
        };

        ImageArray::new(edge, edge, channels, data)
            .ok_or_else(|| "decoded pixel count does not match the requested resolution".into())
    }
}
