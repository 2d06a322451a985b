//! Video encoder component: raw frames in, MJPEG packets out.

use super::{VIDEO_ENCODER_INPUT_PORT, VIDEO_ENCODER_OUTPUT_PORT, return_consumed};
use crate::buffer::{BufferFlags, BufferPayload, MediaBuffer, MediaPacket};
use crate::codec::{VideoEncoder, VideoEncoderConfig, VideoEncoderFactory};
use crate::component::{
    Command, ComponentContext, ComponentEvent, ComponentHandler, ComponentKind, ComponentState,
    GenericComponent, Param, ParamIndex, PortDefinition, WorkOutcome,
};
use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::exchange::{BufferExchange, BufferToken, ExchangeCounts};
use crate::format::{MediaDomain, PortFormat, VideoCoding, VideoFormat};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Quality factor used until [`Param::VideoQuality`] is set.
pub const DEFAULT_VIDEO_QUALITY: u32 = 90;

/// Video encoder component.
pub type VideoEncoderComponent = GenericComponent<VideoEncoderHandler>;

impl GenericComponent<VideoEncoderHandler> {
    /// Create an encoder building its codec through `factory`.
    pub fn create(
        factory: Arc<dyn VideoEncoderFactory>,
        config: ComponentConfig,
    ) -> Result<Arc<Self>> {
        let handler = VideoEncoderHandler::new(factory, &config)?;
        Self::spawn(handler, config)
    }
}

#[derive(Default)]
struct EncoderWorker {
    encoder: Option<Box<dyn VideoEncoder>>,
    /// Encoded head frame waiting for a free output node or a willing consumer.
    pending: Option<MediaPacket>,
    eos_forwarded: bool,
}

/// Domain behavior of the video encoder.
pub struct VideoEncoderHandler {
    factory: Arc<dyn VideoEncoderFactory>,
    format: Mutex<VideoFormat>,
    quality: AtomicU32,
    frames: BufferExchange<MediaBuffer>,
    packets: BufferExchange<MediaPacket>,
    worker: Mutex<EncoderWorker>,
}

impl VideoEncoderHandler {
    /// Create the handler; frame nodes follow `config.input`, packet nodes
    /// `config.output`.
    pub fn new(factory: Arc<dyn VideoEncoderFactory>, config: &ComponentConfig) -> Result<Self> {
        Ok(Self {
            factory,
            format: Mutex::new(VideoFormat::new(VideoCoding::Mjpeg, 0, 0)),
            quality: AtomicU32::new(DEFAULT_VIDEO_QUALITY),
            frames: BufferExchange::new("venc-frames", config.input.clone())?,
            packets: BufferExchange::new("venc-packets", config.output.clone())?,
            worker: Mutex::new(EncoderWorker::default()),
        })
    }

    /// Snapshot of the input frame lists.
    pub fn frame_counts(&self) -> ExchangeCounts {
        self.frames.counts()
    }

    /// Snapshot of the output packet lists.
    pub fn packet_counts(&self) -> ExchangeCounts {
        self.packets.counts()
    }

    /// Current quality factor.
    pub fn quality(&self) -> u32 {
        self.quality.load(Ordering::Acquire)
    }

    /// Move a frame from ready to processing without encoding it.
    fn retire_frame(&self, token: BufferToken) {
        if let Err(error) = self.frames.advance_ready(token) {
            tracing::warn!(%token, %error, "failed to retire frame");
        }
    }

    /// Encode the ready head into `worker.pending`.
    ///
    /// Returns `false` when there is nothing to encode.
    fn encode_head(&self, ctx: &ComponentContext<'_>, worker: &mut EncoderWorker) -> bool {
        let Some((token, buffer)) = self.frames.front_ready() else {
            return false;
        };
        let Some(frame) = buffer.as_frame() else {
            tracing::error!(%token, "non-frame buffer in encoder ready list");
            self.retire_frame(token);
            return true;
        };
        let Some(encoder) = worker.encoder.as_mut() else {
            ctx.report(&Error::InvalidState { state: ctx.state() });
            self.retire_frame(token);
            return true;
        };

        match encoder.encode(frame, self.quality()) {
            Ok(data) => {
                let mut packet = MediaPacket::new(MediaDomain::Video, data, frame.pts)
                    .with_flags(BufferFlags::sync());
                packet.flags.eos = frame.flags.eos;
                worker.pending = Some(packet);
            }
            Err(error) => {
                tracing::error!(%error, pts = ?frame.pts, "encode failed");
                ctx.report(&error);
                // Return the frame unencoded.
                self.retire_frame(token);
            }
        }
        true
    }

    /// Try to hand the pending packet downstream.
    fn deliver_pending(&self, ctx: &ComponentContext<'_>, worker: &mut EncoderWorker) -> Result<()> {
        let Some(packet) = worker.pending.clone() else {
            return Ok(());
        };
        let token = self.packets.reserve_empty()?;
        // Committed before delivery so an immediate giveback finds the node.
        self.packets.commit_processing(token, packet.clone())?;
        let payload = BufferPayload::Packet(packet);
        if let Err(error) = ctx.deliver(VIDEO_ENCODER_OUTPUT_PORT, token, payload) {
            if let Err(release) = self.packets.release(token) {
                tracing::warn!(error = %release, "failed to release undelivered packet node");
            }
            return Err(error);
        }

        worker.pending = None;
        if let Some((frame_token, _)) = self.frames.front_ready() {
            self.frames.advance_ready(frame_token)?;
        }
        Ok(())
    }
}

impl ComponentHandler for VideoEncoderHandler {
    fn kind(&self) -> ComponentKind {
        ComponentKind::VideoEncoder
    }

    fn ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::input(
                VIDEO_ENCODER_INPUT_PORT,
                PortFormat::Video(VideoFormat::new(VideoCoding::Raw, 0, 0)),
            ),
            PortDefinition::output(
                VIDEO_ENCODER_OUTPUT_PORT,
                PortFormat::Video(VideoFormat::new(VideoCoding::Mjpeg, 0, 0)),
            ),
        ]
    }

    fn get_parameter(&self, _ctx: &ComponentContext<'_>, index: ParamIndex) -> Result<Param> {
        match index {
            ParamIndex::VideoQuality => Ok(Param::VideoQuality(self.quality())),
            other => Err(Error::Unsupported(format!("encoder parameter {other:?}"))),
        }
    }

    fn set_parameter(&self, _ctx: &ComponentContext<'_>, param: Param) -> Result<()> {
        match param {
            Param::VideoQuality(quality) if (1..=100).contains(&quality) => {
                self.quality.store(quality, Ordering::Release);
                Ok(())
            }
            Param::VideoQuality(quality) => Err(Error::BadParameter(format!(
                "quality {quality} outside 1..=100"
            ))),
            other => Err(Error::Unsupported(format!(
                "encoder parameter {:?}",
                other.index()
            ))),
        }
    }

    fn on_port_format(&self, _ctx: &ComponentContext<'_>, def: &PortDefinition) -> Result<()> {
        let Some(video) = def.format.video() else {
            return Err(Error::BadParameter("encoder ports carry video".into()));
        };
        let mut format = self.format.lock();
        if def.index == VIDEO_ENCODER_OUTPUT_PORT {
            if video.coding != VideoCoding::Mjpeg {
                return Err(Error::Unsupported(format!(
                    "encoder output coding {:?}",
                    video.coding
                )));
            }
            *format = VideoFormat {
                coding: VideoCoding::Mjpeg,
                ..*video
            };
        } else {
            format.width = video.width;
            format.height = video.height;
            format.stride = video.stride;
            format.pixel_format = video.pixel_format;
            format.framerate = video.framerate;
        }
        Ok(())
    }

    fn send_buffer(&self, _ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()> {
        match buffer.as_frame() {
            Some(frame) if frame.domain() == MediaDomain::Video => {
                self.frames.push_ready(buffer.clone())?;
                Ok(())
            }
            _ => Err(Error::BadParameter("encoder accepts video frames only".into())),
        }
    }

    fn giveback_buffer(&self, _ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()> {
        let token = buffer
            .token
            .ok_or_else(|| Error::BadParameter("packet carries no token".into()))?;
        self.packets.release(token).map(|_| ())
    }

    fn on_transition(
        &self,
        _ctx: &ComponentContext<'_>,
        from: ComponentState,
        to: ComponentState,
    ) -> Result<()> {
        use ComponentState::*;

        let mut worker = self.worker.lock();
        match (from, to) {
            (Loaded, Idle) => {
                let config = VideoEncoderConfig {
                    format: *self.format.lock(),
                    quality: self.quality(),
                };
                worker.encoder = Some(self.factory.create(&config)?);
                tracing::debug!(
                    width = config.format.width,
                    height = config.format.height,
                    quality = config.quality,
                    "encoder created"
                );
            }
            (Idle, Executing) => worker.eos_forwarded = false,
            (Executing | Pause, Idle) => {
                worker.pending = None;
                let dropped = self.frames.drain_ready().len();
                if dropped > 0 {
                    tracing::debug!(dropped, "returning unencoded frames");
                }
            }
            (Idle, Loaded) | (_, Invalid) => {
                worker.encoder = None;
                worker.pending = None;
            }
            _ => {}
        }
        Ok(())
    }

    fn after_transition(
        &self,
        ctx: &ComponentContext<'_>,
        from: ComponentState,
        to: ComponentState,
    ) {
        if to == ComponentState::Idle && from != ComponentState::Loaded {
            return_consumed(ctx, &self.frames, true);
        }
    }

    fn on_flush(&self, ctx: &ComponentContext<'_>) {
        self.worker.lock().pending = None;
        self.frames.drain_ready();
        return_consumed(ctx, &self.frames, true);
    }

    fn process(&self, ctx: &ComponentContext<'_>) -> WorkOutcome {
        let waits = ctx.waits();
        let returned_all = return_consumed(ctx, &self.frames, false);

        let mut worker = self.worker.lock();
        if worker.pending.is_none() && !self.encode_head(ctx, &mut worker) {
            if ctx.eos_pending() && !worker.eos_forwarded && returned_all {
                worker.eos_forwarded = true;
                match ctx.command_peer(VIDEO_ENCODER_OUTPUT_PORT, Command::Eos) {
                    Ok(true) => tracing::debug!("end of stream forwarded"),
                    Ok(false) => ctx.notify(ComponentEvent::BufferFlag),
                    Err(error) => ctx.report(&error),
                }
            }
            return if returned_all {
                WorkOutcome::WaitForMessage
            } else {
                WorkOutcome::WaitFor(waits.retry)
            };
        }
        if worker.pending.is_none() {
            // The head was consumed without producing a packet.
            return WorkOutcome::Progress;
        }

        match self.deliver_pending(ctx, &mut worker) {
            Ok(()) => WorkOutcome::Progress,
            Err(Error::PeerGone(id)) => {
                ctx.report(&Error::PeerGone(id));
                worker.pending = None;
                if let Some((token, _)) = self.frames.front_ready() {
                    self.retire_frame(token);
                }
                WorkOutcome::Progress
            }
            Err(error) => {
                tracing::trace!(%error, "packet not delivered, retrying");
                WorkOutcome::WaitFor(waits.retry)
            }
        }
    }

    fn on_deinit(&self) {
        *self.worker.lock() = EncoderWorker::default();
        self.frames.reset();
        self.packets.reset();
    }
}
