//! Audio decoder component: MP3/AAC packets in, PCM frames out.
//!
//! The decoder capability owns its output frames. A frame delivered
//! downstream occupies a node in the frame exchange until the consumer gives
//! it back; the worker then returns it to the decoder with `put_frame`.

use super::{AUDIO_DECODER_INPUT_PORT, AUDIO_DECODER_OUTPUT_PORT, return_consumed};
use crate::buffer::{BufferPayload, MediaBuffer, RawFrame};
use crate::codec::{AudioDecoder, AudioDecoderConfig, AudioDecoderFactory, CodecStatus};
use crate::component::{
    Command, ComponentContext, ComponentEvent, ComponentHandler, ComponentKind, ComponentState,
    Config, ConfigIndex, GenericComponent, Param, ParamIndex, PortDefinition, WorkOutcome,
};
use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::exchange::{BufferExchange, ExchangeCounts};
use crate::format::{AudioCoding, AudioFormat, MediaDomain, PortFormat};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Audio decoder component.
pub type AudioDecoderComponent = GenericComponent<AudioDecoderHandler>;

impl GenericComponent<AudioDecoderHandler> {
    /// Create a decoder building its codec through `factory`.
    pub fn create(
        factory: Arc<dyn AudioDecoderFactory>,
        config: ComponentConfig,
    ) -> Result<Arc<Self>> {
        let handler = AudioDecoderHandler::new(factory, &config)?;
        Self::spawn(handler, config)
    }
}

const DEFAULT_NODE_COUNT: u32 = 64;

#[derive(Default)]
struct DecoderWorker {
    decoder: Option<Box<dyn AudioDecoder>>,
    /// Decoded frame the consumer did not accept yet.
    pending: Option<RawFrame>,
    eos_forwarded: bool,
    position: Duration,
}

/// Domain behavior of the audio decoder.
pub struct AudioDecoderHandler {
    factory: Arc<dyn AudioDecoderFactory>,
    format: Mutex<AudioFormat>,
    packet_count: u32,
    frame_count: u32,
    packets: BufferExchange<MediaBuffer>,
    frames: BufferExchange<RawFrame>,
    /// Frames given back by the consumer, waiting for `put_frame`.
    recycled: Mutex<VecDeque<RawFrame>>,
    worker: Mutex<DecoderWorker>,
}

impl AudioDecoderHandler {
    /// Create the handler; packet nodes follow `config.input`, frame nodes
    /// `config.output`.
    pub fn new(factory: Arc<dyn AudioDecoderFactory>, config: &ComponentConfig) -> Result<Self> {
        let nodes = |max: Option<usize>| {
            max.and_then(|n| u32::try_from(n).ok())
                .unwrap_or(DEFAULT_NODE_COUNT)
        };
        Ok(Self {
            factory,
            format: Mutex::new(AudioFormat::new(AudioCoding::Mp3, 44_100, 2)),
            packet_count: nodes(config.input.max_nodes),
            frame_count: nodes(config.output.max_nodes),
            packets: BufferExchange::new("adec-packets", config.input.clone())?,
            frames: BufferExchange::new("adec-frames", config.output.clone())?,
            recycled: Mutex::new(VecDeque::new()),
            worker: Mutex::new(DecoderWorker::default()),
        })
    }

    /// Snapshot of the input packet lists.
    pub fn packet_counts(&self) -> ExchangeCounts {
        self.packets.counts()
    }

    /// Snapshot of the output frame lists.
    pub fn frame_counts(&self) -> ExchangeCounts {
        self.frames.counts()
    }

    /// Input coding the decoder is (or will be) created for.
    pub fn coding(&self) -> AudioCoding {
        self.format.lock().coding
    }

    fn set_coding(&self, coding: AudioCoding) -> Result<()> {
        if !matches!(coding, AudioCoding::Mp3 | AudioCoding::Aac) {
            return Err(Error::Unsupported(format!("decoder input coding {coding:?}")));
        }
        self.format.lock().coding = coding;
        Ok(())
    }

    fn recycle_frames(&self, decoder: &mut dyn AudioDecoder) {
        let frames: Vec<_> = self.recycled.lock().drain(..).collect();
        for frame in frames {
            if let Err(error) = decoder.put_frame(frame) {
                tracing::warn!(%error, "decoder refused returned frame");
            }
        }
    }

    /// Push ready packets into the decoder until it is full.
    fn feed_packets(&self, ctx: &ComponentContext<'_>, decoder: &mut dyn AudioDecoder) {
        while let Some((token, buffer)) = self.packets.front_ready() {
            let Some(packet) = buffer.as_packet() else {
                if let Err(error) = self.packets.advance_ready(token) {
                    tracing::warn!(%error, "failed to retire non-packet buffer");
                    break;
                }
                continue;
            };
            match decoder.put_packet(packet) {
                Ok(()) => {}
                Err(Error::InsufficientResources(_)) => break,
                Err(error) => {
                    ctx.report(&error);
                }
            }
            if self.packets.advance_ready(token).is_err() {
                break;
            }
        }
    }

    /// Send one decoded frame downstream; hands it back on refusal.
    fn deliver_frame(
        &self,
        ctx: &ComponentContext<'_>,
        frame: RawFrame,
    ) -> std::result::Result<(), RawFrame> {
        let token = match self.frames.reserve_empty() {
            Ok(token) => token,
            Err(error) => {
                tracing::debug!(%error, "no free frame node");
                return Err(frame);
            }
        };
        if self.frames.commit_processing(token, frame.clone()).is_err() {
            return Err(frame);
        }
        let payload = BufferPayload::Frame(frame.clone());
        if let Err(error) = ctx.deliver(AUDIO_DECODER_OUTPUT_PORT, token, payload) {
            tracing::trace!(%error, "frame not delivered");
            if let Err(error) = self.frames.release(token) {
                tracing::warn!(%error, "failed to release undelivered frame node");
            }
            return Err(frame);
        }
        Ok(())
    }

    /// End of input: forward EOS downstream and raise the buffer flag, once.
    fn finish_stream(&self, ctx: &ComponentContext<'_>, worker: &mut DecoderWorker) {
        if worker.eos_forwarded {
            return;
        }
        worker.eos_forwarded = true;
        if let Err(error) = ctx.command_peer(AUDIO_DECODER_OUTPUT_PORT, Command::Eos) {
            ctx.report(&error);
        }
        ctx.notify(ComponentEvent::BufferFlag);
        tracing::debug!("decoder drained");
    }
}

impl ComponentHandler for AudioDecoderHandler {
    fn kind(&self) -> ComponentKind {
        ComponentKind::AudioDecoder
    }

    fn ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::input(AUDIO_DECODER_INPUT_PORT, PortFormat::Audio(*self.format.lock())),
            PortDefinition::output(
                AUDIO_DECODER_OUTPUT_PORT,
                PortFormat::Audio(AudioFormat::new(AudioCoding::Pcm, 44_100, 2)),
            ),
        ]
    }

    fn get_parameter(&self, _ctx: &ComponentContext<'_>, index: ParamIndex) -> Result<Param> {
        match index {
            ParamIndex::AudioPortFormat(AUDIO_DECODER_INPUT_PORT) => Ok(Param::AudioPortFormat {
                port: AUDIO_DECODER_INPUT_PORT,
                coding: self.coding(),
            }),
            ParamIndex::AudioPortFormat(AUDIO_DECODER_OUTPUT_PORT) => Ok(Param::AudioPortFormat {
                port: AUDIO_DECODER_OUTPUT_PORT,
                coding: AudioCoding::Pcm,
            }),
            other => Err(Error::Unsupported(format!("decoder parameter {other:?}"))),
        }
    }

    fn set_parameter(&self, ctx: &ComponentContext<'_>, param: Param) -> Result<()> {
        match param {
            Param::AudioPortFormat { port, coding } => {
                if ctx.state() != ComponentState::Loaded {
                    return Err(Error::InvalidState { state: ctx.state() });
                }
                if port != AUDIO_DECODER_INPUT_PORT {
                    return Err(Error::BadParameter(format!(
                        "port {port} is not the compressed input"
                    )));
                }
                self.set_coding(coding)
            }
            other => Err(Error::Unsupported(format!(
                "decoder parameter {:?}",
                other.index()
            ))),
        }
    }

    fn on_port_format(&self, _ctx: &ComponentContext<'_>, def: &PortDefinition) -> Result<()> {
        let Some(audio) = def.format.audio() else {
            return Err(Error::BadParameter("decoder ports carry audio".into()));
        };
        if def.index == AUDIO_DECODER_OUTPUT_PORT {
            return match audio.coding {
                AudioCoding::Pcm => Ok(()),
                other => Err(Error::Unsupported(format!("decoder output coding {other:?}"))),
            };
        }
        self.set_coding(audio.coding)?;
        *self.format.lock() = *audio;
        Ok(())
    }

    fn get_config(&self, _ctx: &ComponentContext<'_>, index: ConfigIndex) -> Result<Config> {
        match index {
            ConfigIndex::TimePosition => Ok(Config::TimePosition(self.worker.lock().position)),
        }
    }

    fn set_config(&self, ctx: &ComponentContext<'_>, config: Config) -> Result<()> {
        match config {
            Config::TimePosition(position) => {
                let mut worker = self.worker.lock();
                if let Some(decoder) = worker.decoder.as_mut() {
                    decoder.reset()?;
                }
                worker.pending = None;
                worker.eos_forwarded = false;
                worker.position = position;
                drop(worker);

                ctx.clear_eos();
                let dropped = self.packets.drain_ready().len();
                tracing::debug!(?position, dropped, "seek");
                ctx.poke();
                Ok(())
            }
        }
    }

    fn send_buffer(&self, _ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()> {
        match buffer.as_packet() {
            Some(packet) if packet.domain == MediaDomain::Audio => {
                self.packets.push_ready(buffer.clone())?;
                Ok(())
            }
            _ => Err(Error::BadParameter("decoder accepts audio packets only".into())),
        }
    }

    fn giveback_buffer(&self, _ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()> {
        let token = buffer
            .token
            .ok_or_else(|| Error::BadParameter("frame carries no token".into()))?;
        let frame = self.frames.release(token)?;
        self.recycled.lock().push_back(frame);
        Ok(())
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
                let config = AudioDecoderConfig {
                    format: *self.format.lock(),
                    packet_count: self.packet_count,
                    frame_count: self.frame_count,
                };
                worker.decoder = Some(self.factory.create(&config)?);
                tracing::debug!(coding = ?config.format.coding, "decoder created");
            }
            (Idle, Executing) => worker.eos_forwarded = false,
            (Executing | Pause, Idle) => {
                let DecoderWorker {
                    decoder, pending, ..
                } = &mut *worker;
                if let (Some(decoder), Some(frame)) = (decoder.as_mut(), pending.take()) {
                    if let Err(error) = decoder.put_frame(frame) {
                        tracing::warn!(%error, "decoder refused held frame");
                    }
                }
                self.packets.drain_ready();
            }
            (Idle, Loaded) | (_, Invalid) => {
                worker.decoder = None;
                worker.pending = None;
                self.recycled.lock().clear();
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
            return_consumed(ctx, &self.packets, true);
        }
    }

    fn on_flush(&self, ctx: &ComponentContext<'_>) {
        self.packets.drain_ready();
        return_consumed(ctx, &self.packets, true);
    }

    fn process(&self, ctx: &ComponentContext<'_>) -> WorkOutcome {
        let waits = ctx.waits();
        return_consumed(ctx, &self.packets, false);

        let mut guard = self.worker.lock();
        let worker = &mut *guard;
        let Some(decoder) = worker.decoder.as_mut() else {
            ctx.report(&Error::InvalidState { state: ctx.state() });
            return WorkOutcome::WaitForMessage;
        };
        self.recycle_frames(decoder.as_mut());

        if let Some(frame) = worker.pending.take() {
            if let Err(frame) = self.deliver_frame(ctx, frame) {
                worker.pending = Some(frame);
                return WorkOutcome::WaitFor(waits.retry);
            }
        }

        // Everything was sent: park until a message brings new work.
        if worker.eos_forwarded && ctx.eos_pending() && self.packets.is_ready_empty() {
            return WorkOutcome::WaitForMessage;
        }

        self.feed_packets(ctx, decoder.as_mut());
        match decoder.decode() {
            CodecStatus::Ok => {
                while let Some(frame) = decoder.get_frame() {
                    if let Err(frame) = self.deliver_frame(ctx, frame) {
                        worker.pending = Some(frame);
                        return WorkOutcome::WaitFor(waits.retry);
                    }
                }
                WorkOutcome::Progress
            }
            CodecStatus::NoInputAvailable => {
                if ctx.eos_pending() && self.packets.is_ready_empty() {
                    self.finish_stream(ctx, worker);
                    return WorkOutcome::WaitFor(waits.eos_poll);
                }
                // Ask the producer for more data.
                if let Err(error) = ctx.command_peer(AUDIO_DECODER_INPUT_PORT, Command::Wakeup) {
                    tracing::debug!(%error, "upstream wakeup failed");
                }
                WorkOutcome::WaitForMessage
            }
            CodecStatus::NoOutputBuffer => WorkOutcome::WaitForMessage,
            CodecStatus::NoRenderableOutput => WorkOutcome::WaitFor(waits.short),
            CodecStatus::Failed => {
                ctx.report(&Error::Codec("audio decode failed".into()));
                WorkOutcome::WaitFor(waits.short)
            }
        }
    }

    fn on_deinit(&self) {
        *self.worker.lock() = DecoderWorker::default();
        self.recycled.lock().clear();
        self.packets.reset();
        self.frames.reset();
    }
}
