//! Parameters and runtime configs understood by components.

use super::port::PortDefinition;
use crate::codec::ContainerKind;
use crate::format::AudioCoding;
use std::time::Duration;

/// Selects a parameter for [`get_parameter`](super::Component::get_parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamIndex {
    /// Definition of the given port.
    PortDefinition(u32),
    /// Output URI (muxer).
    ContentUri,
    /// File rotation settings (muxer).
    RecordFileInfo,
    /// Compressed audio coding of the given port (decoder).
    AudioPortFormat(u32),
    /// Encoder quality factor.
    VideoQuality,
}

/// Muxer file rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFileInfo {
    /// Number of files in the recording ring (0 = unbounded).
    pub file_num: u32,
    /// Maximum duration of one file (zero disables rotation).
    pub duration: Duration,
    /// Container type.
    pub container: ContainerKind,
}

impl Default for RecordFileInfo {
    fn default() -> Self {
        Self {
            file_num: 0,
            duration: Duration::ZERO,
            container: ContainerKind::Mp4,
        }
    }
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Port definition. Only the format is applied; direction and domain are fixed.
    PortDefinition(PortDefinition),
    /// Output URI.
    ContentUri(String),
    /// File rotation settings.
    RecordFileInfo(RecordFileInfo),
    /// Compressed audio coding on a port.
    AudioPortFormat {
        /// Port index.
        port: u32,
        /// Coding.
        coding: AudioCoding,
    },
    /// Encoder quality factor (1..=100).
    VideoQuality(u32),
}

impl Param {
    /// The index that reads this parameter back.
    pub fn index(&self) -> ParamIndex {
        match self {
            Self::PortDefinition(def) => ParamIndex::PortDefinition(def.index),
            Self::ContentUri(_) => ParamIndex::ContentUri,
            Self::RecordFileInfo(_) => ParamIndex::RecordFileInfo,
            Self::AudioPortFormat { port, .. } => ParamIndex::AudioPortFormat(*port),
            Self::VideoQuality(_) => ParamIndex::VideoQuality,
        }
    }
}

/// Selects a runtime config for [`get_config`](super::Component::get_config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigIndex {
    /// Playback position.
    TimePosition,
}

/// A runtime config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Config {
    /// Seek to a position; decoders drop their internal state.
    TimePosition(Duration),
}
