//! # mmpipe
//!
//! A threaded media component pipeline: independently running stages
//! (audio decoder, video encoder, muxer) that exchange typed buffers, bind
//! their ports to each other and share one lifecycle state machine.
//!
//! ## Features
//!
//! - **Message queues**: pooled, deep-copying FIFO with timed waits
//! - **Generic components**: one worker thread per component, LOADED / IDLE /
//!   EXECUTING / PAUSE / INVALID lifecycle driven by commands
//! - **Tunneling**: direction and domain checked port binding
//! - **Buffer exchange**: empty / ready / processing lists with token-based
//!   giveback and a conservation invariant
//! - **Muxer rotation**: duration-based file rotation across audio and video
//!
//! Codecs and container writers are opaque capabilities supplied through the
//! traits in [`codec`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mmpipe::prelude::*;
//!
//! let venc = VideoEncoderComponent::create(encoder_factory, ComponentConfig::new("venc"))?;
//! let muxer = MuxerComponent::create(muxer_factory, ComponentConfig::new("muxer"))?;
//!
//! let producer: Arc<dyn Component> = venc.clone();
//! let consumer: Arc<dyn Component> = muxer.clone();
//! tunnel(&producer, VIDEO_ENCODER_OUTPUT_PORT, &consumer, MUXER_VIDEO_PORT)?;
//!
//! muxer.set_parameter(Param::ContentUri("/data/rec-0.mp4".into()))?;
//! for c in [&consumer, &producer] {
//!     c.send_command(Command::SetState(ComponentState::Idle), None)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod codec;
pub mod component;
pub mod components;
pub mod config;
pub mod error;
pub mod exchange;
pub mod format;
pub mod message;
pub mod observability;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{BufferFlags, BufferPayload, MediaBuffer, MediaPacket, RawFrame};
    pub use crate::component::{
        Command, Component, ComponentCallback, ComponentEvent, ComponentId, ComponentState,
        EventChannel, Param, ParamIndex, tunnel, untunnel,
    };
    pub use crate::components::{
        AUDIO_DECODER_INPUT_PORT, AUDIO_DECODER_OUTPUT_PORT, AudioDecoderComponent,
        MUXER_AUDIO_PORT, MUXER_VIDEO_PORT, MuxerComponent, VIDEO_ENCODER_INPUT_PORT,
        VIDEO_ENCODER_OUTPUT_PORT, VideoEncoderComponent,
    };
    pub use crate::config::ComponentConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::format::{AudioFormat, MediaDomain, PortFormat, VideoFormat};
    pub use std::sync::Arc;
}

pub use error::{Error, ErrorKind, Result};
