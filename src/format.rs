//! Media format descriptions carried by ports and streams.
//!
//! Small, `Copy` types. Codecs are described only by their identity; bit
//! layout and codec correctness live behind the capability traits in
//! [`crate::codec`].

// ============================================================================
// Domain
// ============================================================================

/// Media domain of a port or buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaDomain {
    /// Audio samples or compressed audio.
    Audio,
    /// Video frames or compressed video.
    Video,
}

impl std::fmt::Display for MediaDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

// ============================================================================
// Video
// ============================================================================

/// Video coding of a port or stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum VideoCoding {
    /// Uncompressed frames.
    #[default]
    Raw,
    /// Motion JPEG.
    Mjpeg,
    /// H.264 / AVC.
    H264,
}

/// Pixel layout of raw video frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar.
    #[default]
    Yuv420p,
    /// YUV 4:2:0 semi-planar, UV interleaved.
    Nv12,
    /// YUV 4:2:0 semi-planar, VU interleaved.
    Nv21,
    /// YUV 4:2:2 planar.
    Yuv422p,
    /// RGB 5-6-5 packed.
    Rgb565,
}

/// Frame rate as numerator/denominator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (time units).
    pub den: u32,
}

impl Framerate {
    /// Create a new framerate.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 25 fps.
    pub const FPS_25: Self = Self::new(25, 1);
    /// 30 fps.
    pub const FPS_30: Self = Self::new(30, 1);

    /// Duration of one frame.
    pub fn frame_duration(&self) -> std::time::Duration {
        if self.num == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_nanos(self.den as u64 * 1_000_000_000 / self.num as u64)
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_30
    }
}

/// Video port or stream format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VideoFormat {
    /// Coding of the buffers flowing through the port.
    pub coding: VideoCoding,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row of the luma plane (0 = tightly packed).
    pub stride: u32,
    /// Pixel layout for raw frames.
    pub pixel_format: PixelFormat,
    /// Frame rate.
    pub framerate: Framerate,
    /// Target bitrate in bits per second (0 = unspecified).
    pub bitrate: u32,
}

impl VideoFormat {
    /// Create a format with the given coding and size.
    pub fn new(coding: VideoCoding, width: u32, height: u32) -> Self {
        Self {
            coding,
            width,
            height,
            ..Self::default()
        }
    }

    /// Set the framerate.
    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = framerate;
        self
    }

    /// Set the pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Audio coding of a port or stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AudioCoding {
    /// Uncompressed PCM.
    #[default]
    Pcm,
    /// MPEG-1 Layer III.
    Mp3,
    /// AAC.
    Aac,
}

/// Audio sample formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    #[default]
    S16,
    /// Signed 32-bit integer.
    S32,
}

impl SampleFormat {
    /// Bits per sample.
    pub const fn bits(&self) -> u32 {
        match self {
            Self::S16 => 16,
            Self::S32 => 32,
        }
    }
}

/// Audio port or stream format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct AudioFormat {
    /// Coding of the buffers flowing through the port.
    pub coding: AudioCoding,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bitrate in bits per second (0 = unspecified).
    pub bitrate: u32,
    /// Sample format of decoded PCM.
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Create a format with the given coding, rate and channel count.
    pub fn new(coding: AudioCoding, sample_rate: u32, channels: u16) -> Self {
        Self {
            coding,
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    /// Set the bitrate.
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }
}

// ============================================================================
// Port format
// ============================================================================

/// Format carried by a port definition; its variant fixes the port's domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortFormat {
    /// Audio port.
    Audio(AudioFormat),
    /// Video port.
    Video(VideoFormat),
}

impl PortFormat {
    /// Domain implied by this format.
    pub fn domain(&self) -> MediaDomain {
        match self {
            Self::Audio(_) => MediaDomain::Audio,
            Self::Video(_) => MediaDomain::Video,
        }
    }

    /// Audio format, if this is an audio port.
    pub fn audio(&self) -> Option<&AudioFormat> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) => None,
        }
    }

    /// Video format, if this is a video port.
    pub fn video(&self) -> Option<&VideoFormat> {
        match self {
            Self::Video(v) => Some(v),
            Self::Audio(_) => None,
        }
    }
}
