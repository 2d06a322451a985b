//! Capability boundary: opaque decoders, encoders and container writers.
//!
//! Components never look inside a codec or a container format. They drive
//! these traits and react to the returned status:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  AudioDecoder    │   │  VideoEncoder    │   │  Muxer           │
//! │  put_packet()    │   │  encode()        │   │  init()          │
//! │  decode()        │   │                  │   │  write_header()  │
//! │  get/put_frame() │   │                  │   │  write_packet()  │
//! │  reset()         │   │                  │   │  write_trailer() │
//! └──────────────────┘   └──────────────────┘   └──────────────────┘
//! ```
//!
//! Instances are created through factories so a component can build a fresh
//! capability on every LOADED → IDLE transition (decoder, encoder) or every
//! file rotation (muxer). Dropping an instance destroys it.

use crate::buffer::{MediaPacket, RawFrame};
use crate::error::Result;
use crate::format::{AudioFormat, VideoFormat};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Outcome of one decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStatus {
    /// Output was produced.
    Ok,
    /// No input packet is available.
    NoInputAvailable,
    /// No free output buffer to decode into.
    NoOutputBuffer,
    /// Input was consumed but produced nothing to render.
    NoRenderableOutput,
    /// Any other failure.
    Failed,
}

impl fmt::Display for CodecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::NoInputAvailable => "no-input",
            Self::NoOutputBuffer => "no-output-buffer",
            Self::NoRenderableOutput => "no-renderable-output",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Audio decoding
// ============================================================================

/// Configuration for creating an audio decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioDecoderConfig {
    /// Input coding and stream parameters.
    pub format: AudioFormat,
    /// Packets the decoder may buffer internally.
    pub packet_count: u32,
    /// Output frames the decoder owns.
    pub frame_count: u32,
}

/// An opaque audio decoder.
///
/// The decoder owns its output frames: every frame returned by
/// [`get_frame`](Self::get_frame) must eventually come back through
/// [`put_frame`](Self::put_frame).
pub trait AudioDecoder: Send {
    /// Queue a compressed packet.
    ///
    /// Fails with [`InsufficientResources`](crate::Error::InsufficientResources)
    /// when the decoder's input buffer is full.
    fn put_packet(&mut self, packet: &MediaPacket) -> Result<()>;

    /// Run one decode step.
    fn decode(&mut self) -> CodecStatus;

    /// Take a decoded frame, if one is ready.
    fn get_frame(&mut self) -> Option<RawFrame>;

    /// Return a frame previously taken with `get_frame`.
    fn put_frame(&mut self, frame: RawFrame) -> Result<()>;

    /// Drop all buffered input and output (seek).
    fn reset(&mut self) -> Result<()>;
}

/// Creates audio decoders.
pub trait AudioDecoderFactory: Send + Sync {
    /// Build a decoder for `config`.
    fn create(&self, config: &AudioDecoderConfig) -> Result<Box<dyn AudioDecoder>>;
}

impl<F> AudioDecoderFactory for F
where
    F: Fn(&AudioDecoderConfig) -> Result<Box<dyn AudioDecoder>> + Send + Sync,
{
    fn create(&self, config: &AudioDecoderConfig) -> Result<Box<dyn AudioDecoder>> {
        self(config)
    }
}

// ============================================================================
// Video encoding
// ============================================================================

/// Configuration for creating a video encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoEncoderConfig {
    /// Output coding and stream parameters.
    pub format: VideoFormat,
    /// Quality factor (1..=100).
    pub quality: u32,
}

/// An opaque video encoder producing one packet per frame.
pub trait VideoEncoder: Send {
    /// Encode one frame.
    fn encode(&mut self, frame: &RawFrame, quality: u32) -> Result<bytes::Bytes>;
}

/// Creates video encoders.
pub trait VideoEncoderFactory: Send + Sync {
    /// Build an encoder for `config`.
    fn create(&self, config: &VideoEncoderConfig) -> Result<Box<dyn VideoEncoder>>;
}

impl<F> VideoEncoderFactory for F
where
    F: Fn(&VideoEncoderConfig) -> Result<Box<dyn VideoEncoder>> + Send + Sync,
{
    fn create(&self, config: &VideoEncoderConfig) -> Result<Box<dyn VideoEncoder>> {
        self(config)
    }
}

// ============================================================================
// Muxing
// ============================================================================

/// Output container type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainerKind {
    /// ISO base media (MP4).
    #[default]
    Mp4,
    /// MPEG transport stream.
    MpegTs,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp4 => f.write_str("mp4"),
            Self::MpegTs => f.write_str("mpegts"),
        }
    }
}

/// Static description of the streams written into one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaInfo {
    /// Video stream, if present.
    pub video: Option<VideoFormat>,
    /// Audio stream, if present.
    pub audio: Option<AudioFormat>,
}

impl MediaInfo {
    /// Whether a video stream is present.
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Whether an audio stream is present.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// An opaque container writer for one output file.
///
/// Dropping the writer closes it; call [`write_trailer`](Self::write_trailer)
/// first to finalize the file.
pub trait Muxer: Send {
    /// Configure the streams.
    fn init(&mut self, info: &MediaInfo) -> Result<()>;

    /// Write the container header.
    fn write_header(&mut self) -> Result<()>;

    /// Write one packet.
    ///
    /// [`OutOfSpace`](crate::Error::OutOfSpace) is recoverable: the packet was
    /// not written and may be retried.
    fn write_packet(&mut self, packet: &MediaPacket) -> Result<()>;

    /// Finalize the container.
    fn write_trailer(&mut self) -> Result<()>;
}

/// Creates container writers.
pub trait MuxerFactory: Send + Sync {
    /// Open a writer for `uri`.
    fn create(&self, uri: &str, container: ContainerKind) -> Result<Box<dyn Muxer>>;
}

impl<F> MuxerFactory for F
where
    F: Fn(&str, ContainerKind) -> Result<Box<dyn Muxer>> + Send + Sync,
{
    fn create(&self, uri: &str, container: ContainerKind) -> Result<Box<dyn Muxer>> {
        self(uri, container)
    }
}
