//! Buffers exchanged between components.
//!
//! A [`MediaBuffer`] is a descriptor: it names the ports it travels between,
//! the exchange node it occupies on the producing side ([`BufferToken`]) and
//! the payload itself. Payload bytes are [`Bytes`], so copying a descriptor
//! into an exchange node never copies media data.

use crate::format::{MediaDomain, PixelFormat, SampleFormat};
use bytes::Bytes;
use std::time::Duration;

pub use crate::exchange::BufferToken;

/// Per-buffer flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags {
    /// Last buffer of the stream.
    pub eos: bool,
    /// Independently decodable (keyframe).
    pub sync_point: bool,
    /// Contents are incomplete or damaged.
    pub corrupted: bool,
}

impl BufferFlags {
    /// Flags for a keyframe.
    pub fn sync() -> Self {
        Self {
            sync_point: true,
            ..Self::default()
        }
    }
}

/// Compressed media (encoder output, muxer and decoder input).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPacket {
    /// Compressed bytes.
    pub data: Bytes,
    /// Presentation timestamp.
    pub pts: Duration,
    /// Decode timestamp.
    pub dts: Duration,
    /// Stream the packet belongs to.
    pub domain: MediaDomain,
    /// Flags.
    pub flags: BufferFlags,
}

impl MediaPacket {
    /// Create a packet with `dts == pts`.
    pub fn new(domain: MediaDomain, data: impl Into<Bytes>, pts: Duration) -> Self {
        Self {
            data: data.into(),
            pts,
            dts: pts,
            domain,
            flags: BufferFlags::default(),
        }
    }

    /// Set the flags.
    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Layout of a raw frame's samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameLayout {
    /// Raw video picture.
    Video {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Luma row stride in bytes.
        stride: u32,
        /// Pixel layout.
        pixel_format: PixelFormat,
    },
    /// Interleaved PCM.
    Audio {
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Channel count.
        channels: u16,
        /// Sample format.
        sample_format: SampleFormat,
    },
}

/// Uncompressed media (encoder input, decoder output).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Sample or pixel data.
    pub data: Bytes,
    /// Layout of `data`.
    pub layout: FrameLayout,
    /// Presentation timestamp.
    pub pts: Duration,
    /// Frame identifier chosen by the producer (e.g. capture slot).
    pub id: u32,
    /// Flags.
    pub flags: BufferFlags,
}

impl RawFrame {
    /// Create a raw video frame.
    pub fn video(data: impl Into<Bytes>, width: u32, height: u32, pts: Duration) -> Self {
        Self {
            data: data.into(),
            layout: FrameLayout::Video {
                width,
                height,
                stride: width,
                pixel_format: PixelFormat::default(),
            },
            pts,
            id: 0,
            flags: BufferFlags::default(),
        }
    }

    /// Create an interleaved PCM frame.
    pub fn audio(data: impl Into<Bytes>, sample_rate: u32, channels: u16, pts: Duration) -> Self {
        Self {
            data: data.into(),
            layout: FrameLayout::Audio {
                sample_rate,
                channels,
                sample_format: SampleFormat::S16,
            },
            pts,
            id: 0,
            flags: BufferFlags::default(),
        }
    }

    /// Set the producer-chosen identifier.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Domain of this frame.
    pub fn domain(&self) -> MediaDomain {
        match self.layout {
            FrameLayout::Video { .. } => MediaDomain::Video,
            FrameLayout::Audio { .. } => MediaDomain::Audio,
        }
    }
}

/// What a [`MediaBuffer`] carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferPayload {
    /// Compressed packet.
    Packet(MediaPacket),
    /// Raw frame.
    Frame(RawFrame),
}

impl BufferPayload {
    /// Domain of the payload.
    pub fn domain(&self) -> MediaDomain {
        match self {
            Self::Packet(p) => p.domain,
            Self::Frame(f) => f.domain(),
        }
    }

    /// Presentation timestamp of the payload.
    pub fn pts(&self) -> Duration {
        match self {
            Self::Packet(p) => p.pts,
            Self::Frame(f) => f.pts,
        }
    }
}

/// A buffer descriptor travelling between two ports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaBuffer {
    /// Port index on the producing component.
    pub output_port: u32,
    /// Port index on the consuming component.
    pub input_port: u32,
    /// Node the buffer occupies in the producer's exchange, if any.
    pub token: Option<BufferToken>,
    /// The media itself.
    pub payload: BufferPayload,
}

impl MediaBuffer {
    /// Wrap a packet.
    pub fn packet(output_port: u32, input_port: u32, packet: MediaPacket) -> Self {
        Self {
            output_port,
            input_port,
            token: None,
            payload: BufferPayload::Packet(packet),
        }
    }

    /// Wrap a frame.
    pub fn frame(output_port: u32, input_port: u32, frame: RawFrame) -> Self {
        Self {
            output_port,
            input_port,
            token: None,
            payload: BufferPayload::Frame(frame),
        }
    }

    /// Attach the producer's exchange token.
    pub fn with_token(mut self, token: BufferToken) -> Self {
        self.token = Some(token);
        self
    }

    /// The packet, if this buffer carries one.
    pub fn as_packet(&self) -> Option<&MediaPacket> {
        match &self.payload {
            BufferPayload::Packet(p) => Some(p),
            BufferPayload::Frame(_) => None,
        }
    }

    /// The frame, if this buffer carries one.
    pub fn as_frame(&self) -> Option<&RawFrame> {
        match &self.payload {
            BufferPayload::Frame(f) => Some(f),
            BufferPayload::Packet(_) => None,
        }
    }
}
