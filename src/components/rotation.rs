//! Duration-based file rotation for the muxer.
//!
//! Tracks, per stream, the time elapsed since the first packet written into
//! the current file. A file is due for rotation once the elapsed time exceeds
//! the maximum on every stream the file carries: a video-only file rotates on
//! video time alone, an audio+video file waits until both streams are past
//! the limit.

use crate::codec::MediaInfo;
use crate::format::MediaDomain;
use std::time::Duration;

/// Verdict for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    /// Write the packet into the current file.
    Keep,
    /// Finalize the current file and write the packet into a new one.
    Rotate,
}

#[derive(Debug, Clone, Copy, Default)]
struct StreamClock {
    present: bool,
    first_pts: Option<Duration>,
    elapsed: Duration,
}

impl StreamClock {
    fn observe(&mut self, pts: Duration) {
        let first = *self.first_pts.get_or_insert(pts);
        self.elapsed = pts.saturating_sub(first);
    }

    fn exceeds(&self, max: Duration) -> bool {
        self.elapsed > max
    }
}

/// Rotation state of the file currently being written.
#[derive(Debug, Clone)]
pub struct FileRotation {
    max_duration: Duration,
    video: StreamClock,
    audio: StreamClock,
    packets_in_file: u64,
}

impl FileRotation {
    /// Start tracking a new file. A zero `max_duration` never rotates.
    pub fn new(max_duration: Duration, info: &MediaInfo) -> Self {
        Self {
            max_duration,
            video: StreamClock {
                present: info.has_video(),
                ..StreamClock::default()
            },
            audio: StreamClock {
                present: info.has_audio(),
                ..StreamClock::default()
            },
            packets_in_file: 0,
        }
    }

    /// Account for a packet about to be written and decide where it goes.
    pub fn observe(&mut self, domain: MediaDomain, pts: Duration) -> RotationDecision {
        match domain {
            MediaDomain::Video => self.video.observe(pts),
            MediaDomain::Audio => self.audio.observe(pts),
        }
        if self.max_duration.is_zero() || self.packets_in_file == 0 {
            return RotationDecision::Keep;
        }

        let max = self.max_duration;
        let due = match (self.video.present, self.audio.present) {
            (true, true) => self.video.exceeds(max) && self.audio.exceeds(max),
            (true, false) => self.video.exceeds(max),
            (false, true) => self.audio.exceeds(max),
            (false, false) => false,
        };
        if due {
            RotationDecision::Rotate
        } else {
            RotationDecision::Keep
        }
    }

    /// Forget first-seen timestamps; called when a new file is opened.
    pub fn restart(&mut self) {
        for clock in [&mut self.video, &mut self.audio] {
            clock.first_pts = None;
            clock.elapsed = Duration::ZERO;
        }
        self.packets_in_file = 0;
    }

    /// Count a packet successfully written into the current file.
    pub fn record_written(&mut self) {
        self.packets_in_file += 1;
    }

    /// Packets written into the current file.
    pub fn packets_in_file(&self) -> u64 {
        self.packets_in_file
    }

    /// Time covered so far by `domain` in the current file.
    pub fn elapsed(&self, domain: MediaDomain) -> Duration {
        match domain {
            MediaDomain::Video => self.video.elapsed,
            MediaDomain::Audio => self.audio.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioCoding, AudioFormat, VideoCoding, VideoFormat};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn video_only() -> MediaInfo {
        MediaInfo {
            video: Some(VideoFormat::new(VideoCoding::Mjpeg, 640, 480)),
            audio: None,
        }
    }

    fn both() -> MediaInfo {
        MediaInfo {
            video: Some(VideoFormat::new(VideoCoding::Mjpeg, 640, 480)),
            audio: Some(AudioFormat::new(AudioCoding::Aac, 48_000, 2)),
        }
    }

    fn write(rotation: &mut FileRotation, domain: MediaDomain, pts: Duration) -> RotationDecision {
        let decision = rotation.observe(domain, pts);
        if decision == RotationDecision::Rotate {
            rotation.restart();
            rotation.observe(domain, pts);
        }
        rotation.record_written();
        decision
    }

    #[test]
    fn test_video_only_rotates_once_past_limit() {
        let mut rotation = FileRotation::new(secs(5), &video_only());
        let decisions: Vec<_> = (0..=6)
            .map(|s| write(&mut rotation, MediaDomain::Video, secs(s)))
            .collect();

        let rotations: Vec<_> = decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == RotationDecision::Rotate)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(rotations, vec![6]);
        assert_eq!(rotation.packets_in_file(), 1);
        assert_eq!(rotation.elapsed(MediaDomain::Video), Duration::ZERO);
    }

    #[test]
    fn test_mixed_streams_wait_for_both() {
        let mut rotation = FileRotation::new(secs(5), &both());
        write(&mut rotation, MediaDomain::Video, secs(0));
        write(&mut rotation, MediaDomain::Audio, secs(2));

        // Video is past the limit but audio only covers 4s.
        assert_eq!(
            write(&mut rotation, MediaDomain::Video, secs(7)),
            RotationDecision::Keep
        );
        assert_eq!(
            write(&mut rotation, MediaDomain::Audio, secs(6)),
            RotationDecision::Keep
        );
        assert_eq!(
            write(&mut rotation, MediaDomain::Audio, secs(8)),
            RotationDecision::Rotate
        );
    }

    #[test]
    fn test_zero_duration_never_rotates() {
        let mut rotation = FileRotation::new(Duration::ZERO, &video_only());
        for s in 0..100 {
            assert_eq!(
                write(&mut rotation, MediaDomain::Video, secs(s)),
                RotationDecision::Keep
            );
        }
    }

    #[test]
    fn test_absent_stream_ignored() {
        let mut rotation = FileRotation::new(secs(1), &video_only());
        write(&mut rotation, MediaDomain::Video, secs(0));
        // Audio packets do not count towards a video-only file.
        assert_eq!(
            write(&mut rotation, MediaDomain::Audio, secs(10)),
            RotationDecision::Keep
        );
    }
}
