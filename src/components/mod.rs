//! Concrete media components.
//!
//! | Component | Input ports | Output ports |
//! |-----------|-------------|--------------|
//! | [`AudioDecoderComponent`] | 0: compressed audio | 1: PCM frames |
//! | [`VideoEncoderComponent`] | 0: raw video frames | 1: MJPEG packets |
//! | [`MuxerComponent`] | 0: video packets, 1: audio packets | - |
//!
//! Each component is a [`GenericComponent`](crate::component::GenericComponent)
//! driven by a handler from this module and created with `create(factory,
//! config)`.

mod audio_decoder;
mod muxer;
mod rotation;
mod video_encoder;

pub use audio_decoder::{AudioDecoderComponent, AudioDecoderHandler};
pub use muxer::{MuxerComponent, MuxerHandler};
pub use rotation::{FileRotation, RotationDecision};
pub use video_encoder::{DEFAULT_VIDEO_QUALITY, VideoEncoderComponent, VideoEncoderHandler};

use crate::buffer::MediaBuffer;
use crate::component::ComponentContext;
use crate::error::Error;
use crate::exchange::BufferExchange;

/// Compressed audio input of the audio decoder.
pub const AUDIO_DECODER_INPUT_PORT: u32 = 0;
/// PCM output of the audio decoder.
pub const AUDIO_DECODER_OUTPUT_PORT: u32 = 1;

/// Raw frame input of the video encoder.
pub const VIDEO_ENCODER_INPUT_PORT: u32 = 0;
/// Encoded packet output of the video encoder.
pub const VIDEO_ENCODER_OUTPUT_PORT: u32 = 1;

/// Video input of the muxer.
pub const MUXER_VIDEO_PORT: u32 = 0;
/// Audio input of the muxer.
pub const MUXER_AUDIO_PORT: u32 = 1;

/// Hand consumed input buffers back to whoever produced them, oldest first.
///
/// Stops at the first refusal and returns `false`, unless `force` is set, in
/// which case refused buffers are released locally. A dropped producer never
/// blocks the list.
pub(crate) fn return_consumed(
    ctx: &ComponentContext<'_>,
    consumed: &BufferExchange<MediaBuffer>,
    force: bool,
) -> bool {
    while let Some((token, buffer)) = consumed.front_processing() {
        match ctx.return_buffer(&buffer) {
            Ok(()) => {}
            Err(Error::PeerGone(id)) => {
                tracing::warn!(peer = %id, exchange = consumed.name(), "producer gone");
            }
            Err(error) if force => {
                tracing::warn!(%error, exchange = consumed.name(), "giveback refused on teardown");
            }
            Err(error) => {
                tracing::debug!(%error, exchange = consumed.name(), "giveback refused");
                return false;
            }
        }
        if let Err(error) = consumed.release(token) {
            tracing::error!(%error, "returned buffer vanished from processing");
        }
    }
    true
}
