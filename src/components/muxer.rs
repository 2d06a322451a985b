//! Muxer component: writes compressed streams into rotating container files.
//!
//! Input port 0 takes video packets, input port 1 audio packets. Packets from
//! both ports share one ready list and are written in arrival order. A packet
//! goes back to its producer only after it was written (or after the write
//! failed for a reason other than a full disk).
//!
//! A new file is opened when EXECUTING starts and whenever [`FileRotation`]
//! says the current one is long enough. Each open raises
//! [`ComponentEvent::NeedNextFile`]; the application may answer it by setting
//! [`Param::ContentUri`] from inside the callback.

use super::rotation::{FileRotation, RotationDecision};
use super::{MUXER_AUDIO_PORT, MUXER_VIDEO_PORT, return_consumed};
use crate::buffer::{BufferPayload, MediaBuffer};
use crate::codec::{ContainerKind, MediaInfo, Muxer, MuxerFactory};
use crate::component::{
    ComponentContext, ComponentEvent, ComponentHandler, ComponentKind, ComponentState,
    GenericComponent, Param, ParamIndex, PortDefinition, RecordFileInfo, WorkOutcome,
};
use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::exchange::{BufferExchange, ExchangeCounts};
use crate::format::{
    AudioCoding, AudioFormat, MediaDomain, PortFormat, SampleFormat, VideoCoding, VideoFormat,
};
use crate::observability;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Muxer component.
pub type MuxerComponent = GenericComponent<MuxerHandler>;

impl GenericComponent<MuxerHandler> {
    /// Create a muxer writing through `factory`.
    pub fn create(factory: Arc<dyn MuxerFactory>, config: ComponentConfig) -> Result<Arc<Self>> {
        let handler = MuxerHandler::new(factory, &config)?;
        Self::spawn(handler, config)
    }
}

#[derive(Debug, Default)]
struct MuxerSettings {
    uri: Option<String>,
    record: RecordFileInfo,
    info: MediaInfo,
    /// Bumped on every change so a failed open is retried only after one.
    version: u64,
}

struct OpenFile {
    muxer: Box<dyn Muxer>,
    uri: String,
}

struct MuxerWorker {
    file: Option<OpenFile>,
    rotation: FileRotation,
    sequence: u32,
    failed_open_version: Option<u64>,
    stalled: bool,
    eos_reported: bool,
}

impl MuxerWorker {
    fn new() -> Self {
        Self {
            file: None,
            rotation: FileRotation::new(std::time::Duration::ZERO, &MediaInfo::default()),
            sequence: 0,
            failed_open_version: None,
            stalled: false,
            eos_reported: false,
        }
    }
}

/// Domain behavior of the muxer.
pub struct MuxerHandler {
    factory: Arc<dyn MuxerFactory>,
    settings: Mutex<MuxerSettings>,
    packets: BufferExchange<MediaBuffer>,
    worker: Mutex<MuxerWorker>,
    files_opened: AtomicU32,
}

impl MuxerHandler {
    /// Create the handler; packet nodes are sized by `config.input`.
    pub fn new(factory: Arc<dyn MuxerFactory>, config: &ComponentConfig) -> Result<Self> {
        Ok(Self {
            factory,
            settings: Mutex::new(MuxerSettings {
                info: MediaInfo {
                    video: Some(default_video()),
                    audio: Some(default_audio()),
                },
                ..MuxerSettings::default()
            }),
            packets: BufferExchange::new("muxer-packets", config.input.clone())?,
            worker: Mutex::new(MuxerWorker::new()),
            files_opened: AtomicU32::new(0),
        })
    }

    /// Snapshot of the packet lists.
    pub fn packet_counts(&self) -> ExchangeCounts {
        self.packets.counts()
    }

    /// Files opened since the component was created.
    pub fn files_opened(&self) -> u32 {
        self.files_opened.load(Ordering::Acquire)
    }

    /// Streams the next file will carry.
    pub fn media_info(&self) -> MediaInfo {
        self.settings.lock().info
    }

    fn finalize(&self, ctx: &ComponentContext<'_>, worker: &mut MuxerWorker) {
        let Some(mut file) = worker.file.take() else {
            return;
        };
        if let Err(error) = file.muxer.write_trailer() {
            ctx.report(&error);
        }
        tracing::info!(
            uri = %file.uri,
            packets = worker.rotation.packets_in_file(),
            "file finalized"
        );
        observability::record_file_rotated();
    }

    /// Finalize the current file and open the next one.
    fn open_next_file(&self, ctx: &ComponentContext<'_>, worker: &mut MuxerWorker) -> Result<()> {
        self.finalize(ctx, worker);

        let file_num = self.settings.lock().record.file_num;
        let sequence = worker.sequence;
        let slot = if file_num == 0 { sequence } else { sequence % file_num };
        // No lock held: the callback may set the next URI.
        ctx.notify(ComponentEvent::NeedNextFile { sequence, slot });

        let (uri, record, info) = {
            let settings = self.settings.lock();
            (settings.uri.clone(), settings.record, settings.info)
        };
        let uri = uri.ok_or_else(|| Error::BadParameter("no content URI set".into()))?;

        let mut muxer = self.factory.create(&uri, record.container)?;
        muxer.init(&info)?;
        muxer.write_header()?;

        tracing::info!(%uri, sequence, slot, "file opened");
        worker.file = Some(OpenFile { muxer, uri });
        worker.rotation = FileRotation::new(record.duration, &info);
        worker.sequence += 1;
        self.files_opened.fetch_add(1, Ordering::AcqRel);
        worker.failed_open_version = None;
        Ok(())
    }

    /// Write queued packets until the list is empty or a write fails.
    fn flush_ready(&self, ctx: &ComponentContext<'_>, worker: &mut MuxerWorker) {
        while let Some((token, buffer)) = self.packets.front_ready() {
            let Some(file) = worker.file.as_mut() else {
                break;
            };
            let Some(packet) = buffer.as_packet() else {
                break;
            };
            if let Err(error) = file.muxer.write_packet(packet) {
                ctx.report(&error);
                break;
            }
            worker.rotation.record_written();
            if self.packets.advance_ready(token).is_err() {
                break;
            }
        }
        let unwritten = self.packets.drain_ready().len();
        if unwritten > 0 {
            tracing::warn!(unwritten, "returning unwritten packets on stop");
        }
    }

    fn stream_format(&self, def: &PortDefinition) -> Result<()> {
        let mut settings = self.settings.lock();
        match (def.index, def.format) {
            (MUXER_VIDEO_PORT, PortFormat::Video(video)) => {
                if video.coding != VideoCoding::Mjpeg {
                    return Err(Error::Unsupported(format!(
                        "muxer video coding {:?}",
                        video.coding
                    )));
                }
                settings.info.video = def.enabled.then_some(video);
            }
            (MUXER_AUDIO_PORT, PortFormat::Audio(audio)) => {
                let audio = AudioFormat {
                    sample_format: SampleFormat::S16,
                    ..audio
                };
                settings.info.audio = def.enabled.then_some(audio);
            }
            (index, _) => {
                return Err(Error::BadParameter(format!(
                    "muxer port {index} does not take this format"
                )));
            }
        }
        settings.version += 1;
        Ok(())
    }
}

impl ComponentHandler for MuxerHandler {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Muxer
    }

    fn ports(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::input(MUXER_VIDEO_PORT, PortFormat::Video(default_video())),
            PortDefinition::input(MUXER_AUDIO_PORT, PortFormat::Audio(default_audio())),
        ]
    }

    fn get_parameter(&self, _ctx: &ComponentContext<'_>, index: ParamIndex) -> Result<Param> {
        let settings = self.settings.lock();
        match index {
            ParamIndex::ContentUri => settings
                .uri
                .clone()
                .map(Param::ContentUri)
                .ok_or_else(|| Error::BadParameter("no content URI set".into())),
            ParamIndex::RecordFileInfo => Ok(Param::RecordFileInfo(settings.record)),
            other => Err(Error::Unsupported(format!("muxer parameter {other:?}"))),
        }
    }

    fn set_parameter(&self, ctx: &ComponentContext<'_>, param: Param) -> Result<()> {
        {
            let mut settings = self.settings.lock();
            match param {
                Param::ContentUri(uri) => {
                    if uri.is_empty() {
                        return Err(Error::BadParameter("empty content URI".into()));
                    }
                    settings.uri = Some(uri);
                }
                Param::RecordFileInfo(record) => {
                    if record.container != ContainerKind::Mp4 {
                        return Err(Error::BadParameter(format!(
                            "unsupported container {}",
                            record.container
                        )));
                    }
                    settings.record = record;
                }
                other => {
                    return Err(Error::Unsupported(format!(
                        "muxer parameter {:?}",
                        other.index()
                    )));
                }
            }
            settings.version += 1;
        }
        ctx.poke();
        Ok(())
    }

    fn on_port_format(&self, _ctx: &ComponentContext<'_>, def: &PortDefinition) -> Result<()> {
        self.stream_format(def)
    }

    fn send_buffer(&self, ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()> {
        let BufferPayload::Packet(packet) = &buffer.payload else {
            return Err(Error::BadParameter("muxer accepts packets only".into()));
        };
        let def = ctx.port_definition(buffer.input_port)?;
        if !def.enabled {
            return Err(Error::BadParameter(format!(
                "muxer port {} is disabled",
                buffer.input_port
            )));
        }
        let expected = def.domain();
        if packet.domain != expected {
            return Err(Error::BadParameter(format!(
                "{} packet on {expected} port {}",
                packet.domain, buffer.input_port
            )));
        }
        self.packets.push_ready(buffer.clone())?;
        Ok(())
    }

    fn giveback_buffer(&self, _ctx: &ComponentContext<'_>, _buffer: &MediaBuffer) -> Result<()> {
        Err(Error::Unsupported("muxer has no output ports".into()))
    }

    fn on_transition(
        &self,
        ctx: &ComponentContext<'_>,
        from: ComponentState,
        to: ComponentState,
    ) -> Result<()> {
        use ComponentState::*;

        let mut worker = self.worker.lock();
        match (from, to) {
            (Loaded, Idle) => {
                worker.stalled = false;
                worker.eos_reported = false;
            }
            (Executing | Pause, Idle) => {
                self.flush_ready(ctx, &mut worker);
                self.finalize(ctx, &mut worker);
            }
            (_, Invalid) => {
                worker.file = None;
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
        let flushed = self.packets.drain_ready().len();
        tracing::debug!(flushed, "muxer flush");
        return_consumed(ctx, &self.packets, true);
    }

    fn process(&self, ctx: &ComponentContext<'_>) -> WorkOutcome {
        let waits = ctx.waits();
        let returned_all = return_consumed(ctx, &self.packets, false);

        let mut worker = self.worker.lock();
        if worker.file.is_none() {
            let version = self.settings.lock().version;
            if worker.failed_open_version == Some(version) {
                return WorkOutcome::WaitForMessage;
            }
            if let Err(error) = self.open_next_file(ctx, &mut worker) {
                ctx.report(&error);
                worker.failed_open_version = Some(self.settings.lock().version);
                return WorkOutcome::WaitForMessage;
            }
        }

        let Some((token, buffer)) = self.packets.front_ready() else {
            if ctx.eos_pending() && !worker.eos_reported && returned_all {
                worker.eos_reported = true;
                ctx.notify(ComponentEvent::BufferFlag);
            }
            return if returned_all {
                WorkOutcome::WaitForMessage
            } else {
                WorkOutcome::WaitFor(waits.retry)
            };
        };
        let Some(packet) = buffer.as_packet() else {
            tracing::error!("non-packet buffer in muxer ready list");
            if let Err(error) = self.packets.advance_ready(token) {
                tracing::warn!(%error, "failed to retire non-packet buffer");
                return WorkOutcome::WaitFor(waits.retry);
            }
            return WorkOutcome::Progress;
        };

        if worker.rotation.observe(packet.domain, packet.pts) == RotationDecision::Rotate {
            tracing::debug!(pts = ?packet.pts, "rotation due");
            if let Err(error) = self.open_next_file(ctx, &mut worker) {
                ctx.report(&error);
                worker.failed_open_version = Some(self.settings.lock().version);
                return WorkOutcome::WaitForMessage;
            }
            worker.rotation.observe(packet.domain, packet.pts);
        }

        let MuxerWorker {
            file,
            rotation,
            stalled,
            ..
        } = &mut *worker;
        let Some(file) = file.as_mut() else {
            return WorkOutcome::WaitForMessage;
        };
        match file.muxer.write_packet(packet) {
            Ok(()) => {
                observability::trace_packet_written(
                    &file.uri,
                    stream_name(packet.domain),
                    packet.pts,
                    packet.len(),
                );
                rotation.record_written();
                *stalled = false;
                if let Err(error) = self.packets.advance_ready(token) {
                    tracing::error!(%error, "written packet left ready list");
                }
                WorkOutcome::Progress
            }
            Err(Error::OutOfSpace) => {
                if !*stalled {
                    *stalled = true;
                    observability::record_out_of_space();
                    ctx.report(&Error::OutOfSpace);
                }
                WorkOutcome::WaitFor(waits.retry)
            }
            Err(error) => {
                ctx.report(&error);
                // Hand the packet back unwritten rather than retrying forever.
                if let Err(error) = self.packets.advance_ready(token) {
                    tracing::warn!(%error, "failed to return unwritten packet");
                }
                WorkOutcome::Progress
            }
        }
    }

    fn on_deinit(&self) {
        self.worker.lock().file = None;
        self.packets.reset();
    }
}

fn default_video() -> VideoFormat {
    VideoFormat::new(VideoCoding::Mjpeg, 0, 0)
}

fn default_audio() -> AudioFormat {
    AudioFormat::new(AudioCoding::Aac, 48_000, 2)
}

fn stream_name(domain: MediaDomain) -> &'static str {
    match domain {
        MediaDomain::Video => "video",
        MediaDomain::Audio => "audio",
    }
}
