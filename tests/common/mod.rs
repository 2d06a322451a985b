//! Shared mock capabilities and event helpers for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use mmpipe::buffer::{MediaPacket, RawFrame};
use mmpipe::codec::{
    AudioDecoder, AudioDecoderConfig, AudioDecoderFactory, CodecStatus, ContainerKind, MediaInfo,
    Muxer, MuxerFactory, VideoEncoder, VideoEncoderConfig, VideoEncoderFactory,
};
use mmpipe::component::{
    Command, Component, ComponentEvent, ComponentId, ComponentState, EventChannel, EventReceiver,
    Notification,
};
use mmpipe::format::MediaDomain;
use mmpipe::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Route component logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Events
// ============================================================================

/// Receives notifications and keeps every one it has seen.
pub struct Observer {
    rx: EventReceiver,
    pub log: Vec<Notification>,
}

impl Observer {
    /// Install a fresh [`EventChannel`] on every component.
    pub fn attach(components: &[&dyn Component]) -> Self {
        Self::attach_channel(components, |c| c)
    }

    /// Like [`attach`](Self::attach) but lets the caller adjust the channel.
    pub fn attach_channel(
        components: &[&dyn Component],
        adjust: impl Fn(EventChannel) -> EventChannel,
    ) -> Self {
        init_tracing();
        let (channel, rx) = EventChannel::new();
        let channel = Arc::new(adjust(channel));
        for c in components {
            c.set_callback(channel.clone()).expect("set callback");
        }
        Self { rx, log: Vec::new() }
    }

    /// Observe a receiver whose channel the caller installed itself.
    pub fn from_receiver(rx: EventReceiver) -> Self {
        Self { rx, log: Vec::new() }
    }

    /// Wait for a notification matching `pred`, logging everything received.
    pub fn wait(&mut self, pred: impl Fn(&Notification) -> bool) -> bool {
        let deadline = std::time::Instant::now() + TIMEOUT;
        while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            let Some(n) = self.rx.recv_timeout(remaining) else {
                return false;
            };
            let hit = pred(&n);
            self.log.push(n);
            if hit {
                return true;
            }
        }
        false
    }

    /// Wait for `event` from `id`.
    pub fn wait_event(&mut self, id: ComponentId, event: ComponentEvent) -> bool {
        self.wait(|n| matches!(n, Notification::Event(i, e) if *i == id && *e == event))
    }

    /// Wait for any error event from `id`.
    pub fn wait_error(&mut self, id: ComponentId) -> Option<ComponentEvent> {
        let found = self.wait(
            |n| matches!(n, Notification::Event(i, ComponentEvent::Error { .. }) if *i == id),
        );
        if !found {
            return None;
        }
        match self.log.last() {
            Some(Notification::Event(_, e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Pull in whatever arrived without waiting.
    pub fn settle(&mut self, pause: Duration) {
        std::thread::sleep(pause);
        self.log.extend(self.rx.drain());
    }

    /// Events logged for `id`, in order.
    pub fn events(&self, id: ComponentId) -> Vec<ComponentEvent> {
        self.log
            .iter()
            .filter_map(|n| match n {
                Notification::Event(i, e) if *i == id => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Buffers handed back to the application by `id`.
    pub fn givebacks(&self, id: ComponentId) -> usize {
        self.log
            .iter()
            .filter(|n| matches!(n, Notification::Giveback(i, _) if *i == id))
            .count()
    }
}

/// Request `state` and wait for its completion.
pub fn set_state(observer: &mut Observer, component: &dyn Component, state: ComponentState) {
    component
        .send_command(Command::SetState(state), None)
        .expect("send state command");
    assert!(
        observer.wait_event(component.id(), ComponentEvent::CommandComplete(state)),
        "{} did not reach {state}",
        component.name()
    );
}

/// Walk `components` (in order) through each state in `states`.
pub fn walk(observer: &mut Observer, components: &[&dyn Component], states: &[ComponentState]) {
    for state in states {
        for c in components {
            set_state(observer, *c, *state);
        }
    }
}

// ============================================================================
// Muxer
// ============================================================================

/// One file written by [`MockMuxer`].
#[derive(Debug, Clone, Default)]
pub struct RecordedFile {
    pub uri: String,
    pub info: MediaInfo,
    pub header: bool,
    pub trailer: bool,
    pub packets: Vec<(MediaDomain, Duration)>,
}

/// Shared view of everything the mock muxers wrote.
#[derive(Default)]
pub struct MuxerLog {
    pub files: Mutex<Vec<RecordedFile>>,
    /// Writes to fail with `OutOfSpace` before succeeding again.
    pub out_of_space: AtomicUsize,
    /// Fail the next write with a codec error.
    pub corrupt_next: AtomicBool,
    pub refuse_open: AtomicBool,
}

impl MuxerLog {
    pub fn files(&self) -> Vec<RecordedFile> {
        self.files.lock().clone()
    }

    pub fn written(&self) -> usize {
        self.files.lock().iter().map(|f| f.packets.len()).sum()
    }
}

struct MockMuxer {
    log: Arc<MuxerLog>,
    index: usize,
}

impl MockMuxer {
    fn file<R>(&self, f: impl FnOnce(&mut RecordedFile) -> R) -> R {
        let mut files = self.log.files.lock();
        f(&mut files[self.index])
    }
}

impl Muxer for MockMuxer {
    fn init(&mut self, info: &MediaInfo) -> Result<()> {
        let info = *info;
        self.file(|file| file.info = info);
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.file(|file| file.header = true);
        Ok(())
    }

    fn write_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        let stalled = self
            .log
            .out_of_space
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            return Err(Error::OutOfSpace);
        }
        if self.log.corrupt_next.swap(false, Ordering::AcqRel) {
            return Err(Error::Codec("mock write failure".into()));
        }
        let entry = (packet.domain, packet.pts);
        self.file(|file| file.packets.push(entry));
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.file(|file| file.trailer = true);
        Ok(())
    }
}

pub fn muxer_factory(log: Arc<MuxerLog>) -> Arc<dyn MuxerFactory> {
    Arc::new(move |uri: &str, container: ContainerKind| -> Result<Box<dyn Muxer>> {
        assert_eq!(container, ContainerKind::Mp4);
        if log.refuse_open.load(Ordering::Acquire) {
            return Err(Error::Codec(format!("cannot open {uri}")));
        }
        let mut files = log.files.lock();
        files.push(RecordedFile {
            uri: uri.to_string(),
            ..RecordedFile::default()
        });
        Ok(Box::new(MockMuxer {
            log: Arc::clone(&log),
            index: files.len() - 1,
        }))
    })
}

// ============================================================================
// Video encoder
// ============================================================================

struct MockEncoder {
    fail: Arc<AtomicBool>,
}

impl VideoEncoder for MockEncoder {
    fn encode(&mut self, frame: &RawFrame, quality: u32) -> Result<Bytes> {
        if self.fail.load(Ordering::Acquire) {
            return Err(Error::Codec("mock encode failure".into()));
        }
        // Half the input size, tagged with the quality.
        let mut out = vec![quality as u8];
        out.extend_from_slice(&frame.data[..frame.data.len() / 2]);
        Ok(Bytes::from(out))
    }
}

/// Encoder factory; `fail` makes every encode fail.
pub fn encoder_factory(fail: Arc<AtomicBool>) -> Arc<dyn VideoEncoderFactory> {
    Arc::new(move |config: &VideoEncoderConfig| -> Result<Box<dyn VideoEncoder>> {
        assert!((1..=100).contains(&config.quality));
        Ok(Box::new(MockEncoder {
            fail: Arc::clone(&fail),
        }))
    })
}

/// Encoder factory that cannot create encoders.
pub fn broken_encoder_factory() -> Arc<dyn VideoEncoderFactory> {
    Arc::new(|_: &VideoEncoderConfig| -> Result<Box<dyn VideoEncoder>> {
        Err(Error::InsufficientResources("no encoder hardware".into()))
    })
}

pub fn video_frame(pts: Duration) -> RawFrame {
    RawFrame::video(vec![0x80u8; 64], 8, 8, pts)
}

// ============================================================================
// Audio decoder
// ============================================================================

/// Counters shared with [`MockDecoder`].
#[derive(Default)]
pub struct DecoderLog {
    pub created: AtomicUsize,
    pub resets: AtomicUsize,
    pub outstanding: AtomicUsize,
    pub decodes: AtomicUsize,
}

/// One frame per packet; owns `frame_count` output frames.
struct MockDecoder {
    log: Arc<DecoderLog>,
    config: AudioDecoderConfig,
    input: VecDeque<MediaPacket>,
    output: VecDeque<RawFrame>,
}

impl AudioDecoder for MockDecoder {
    fn put_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        if self.input.len() >= 4 {
            return Err(Error::InsufficientResources("decoder input full".into()));
        }
        self.input.push_back(packet.clone());
        Ok(())
    }

    fn decode(&mut self) -> CodecStatus {
        self.log.decodes.fetch_add(1, Ordering::AcqRel);
        if self.log.outstanding.load(Ordering::Acquire) + self.output.len()
            >= self.config.frame_count as usize
        {
            return CodecStatus::NoOutputBuffer;
        }
        let Some(packet) = self.input.pop_front() else {
            return CodecStatus::NoInputAvailable;
        };
        let pcm = vec![0u8; packet.len() * 4];
        let format = self.config.format;
        self.output
            .push_back(RawFrame::audio(pcm, format.sample_rate, format.channels, packet.pts));
        CodecStatus::Ok
    }

    fn get_frame(&mut self) -> Option<RawFrame> {
        let frame = self.output.pop_front()?;
        self.log.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(frame)
    }

    fn put_frame(&mut self, _frame: RawFrame) -> Result<()> {
        self.log.outstanding.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.log.resets.fetch_add(1, Ordering::AcqRel);
        self.input.clear();
        self.output.clear();
        Ok(())
    }
}

pub fn decoder_factory(log: Arc<DecoderLog>) -> Arc<dyn AudioDecoderFactory> {
    Arc::new(move |config: &AudioDecoderConfig| -> Result<Box<dyn AudioDecoder>> {
        log.created.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockDecoder {
            log: Arc::clone(&log),
            config: *config,
            input: VecDeque::new(),
            output: VecDeque::new(),
        }))
    })
}

pub fn audio_packet(pts: Duration) -> MediaPacket {
    MediaPacket::new(MediaDomain::Audio, vec![0x11u8; 32], pts)
}

pub fn video_packet(pts: Duration) -> MediaPacket {
    MediaPacket::new(MediaDomain::Video, vec![0xffu8; 32], pts)
}
