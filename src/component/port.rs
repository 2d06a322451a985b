//! Ports and tunnel bindings.
//!
//! Ports are the attachment points of a component. Direction, index and
//! domain are fixed at creation; only the format (while LOADED) and the
//! binding change afterwards.
//!
//! A [`BindInfo`] is a relation, not ownership: it holds a [`Weak`] reference
//! to the peer and every use goes through [`BindInfo::peer`], which fails with
//! [`Error::PeerGone`] if the peer has been dropped.

use super::{Component, ComponentId};
use crate::error::{Error, Result};
use crate::format::{MediaDomain, PortFormat};
use std::sync::{Arc, Weak};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Receives buffers from upstream.
    Input,
    /// Sends buffers downstream.
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Static description of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDefinition {
    /// Index on its component.
    pub index: u32,
    /// Direction.
    pub direction: PortDirection,
    /// Whether the port takes part in buffer flow.
    pub enabled: bool,
    /// Format; its variant fixes the domain.
    pub format: PortFormat,
}

impl PortDefinition {
    /// Create an enabled input port.
    pub fn input(index: u32, format: PortFormat) -> Self {
        Self {
            index,
            direction: PortDirection::Input,
            enabled: true,
            format,
        }
    }

    /// Create an enabled output port.
    pub fn output(index: u32, format: PortFormat) -> Self {
        Self {
            index,
            direction: PortDirection::Output,
            enabled: true,
            format,
        }
    }

    /// Domain of the port.
    pub fn domain(&self) -> MediaDomain {
        self.format.domain()
    }

    /// Check that `peer` can feed this port, or that this port can feed it.
    ///
    /// Directions must be opposite and domains equal.
    pub fn check_compatible(&self, peer: &PortDefinition) -> Result<()> {
        if self.direction == peer.direction {
            return Err(Error::PortNotCompatible(format!(
                "port {} and peer port {} are both {}",
                self.index, peer.index, self.direction
            )));
        }
        if self.domain() != peer.domain() {
            return Err(Error::PortNotCompatible(format!(
                "port {} is {} but peer port {} is {}",
                self.index,
                self.domain(),
                peer.index,
                peer.domain()
            )));
        }
        Ok(())
    }
}

/// Binding of one port to a peer port.
#[derive(Clone, Default)]
pub struct BindInfo {
    peer: Option<(Weak<dyn Component>, ComponentId)>,
    peer_port: u32,
}

impl BindInfo {
    /// Record a binding to `peer`'s port `peer_port`.
    pub fn bound(peer: &Arc<dyn Component>, peer_port: u32) -> Self {
        Self {
            peer: Some((Arc::downgrade(peer), peer.id())),
            peer_port,
        }
    }

    /// Whether a peer is recorded, alive or not.
    pub fn is_bound(&self) -> bool {
        self.peer.is_some()
    }

    /// Peer port index (meaningless when unbound).
    pub fn peer_port(&self) -> u32 {
        self.peer_port
    }

    /// Identity of the recorded peer.
    pub fn peer_id(&self) -> Option<ComponentId> {
        self.peer.as_ref().map(|(_, id)| *id)
    }

    /// Resolve the peer.
    ///
    /// `Ok(None)` when unbound, [`Error::PeerGone`] when the peer was dropped.
    pub fn peer(&self) -> Result<Option<(Arc<dyn Component>, u32)>> {
        match &self.peer {
            None => Ok(None),
            Some((weak, id)) => weak
                .upgrade()
                .map(|peer| Some((peer, self.peer_port)))
                .ok_or(Error::PeerGone(*id)),
        }
    }

    /// Whether the recorded peer is still alive.
    pub fn is_peer_alive(&self) -> bool {
        self.peer
            .as_ref()
            .is_some_and(|(weak, _)| weak.strong_count() > 0)
    }
}

impl std::fmt::Debug for BindInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindInfo")
            .field("bound", &self.is_bound())
            .field("peer", &self.peer_id())
            .field("peer_port", &self.peer_port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioCoding, AudioFormat, VideoCoding, VideoFormat};

    fn video() -> PortFormat {
        PortFormat::Video(VideoFormat::new(VideoCoding::Mjpeg, 320, 240))
    }

    #[test]
    fn test_direction_compatibility() {
        let out = PortDefinition::output(1, video());
        let inp = PortDefinition::input(0, video());
        assert!(inp.check_compatible(&out).is_ok());
        assert!(out.check_compatible(&inp).is_ok());
        assert!(matches!(
            inp.check_compatible(&PortDefinition::input(1, video())),
            Err(Error::PortNotCompatible(_))
        ));
    }

    #[test]
    fn test_domain_compatibility() {
        let out = PortDefinition::output(1, PortFormat::Audio(AudioFormat::new(AudioCoding::Pcm, 8000, 1)));
        let inp = PortDefinition::input(0, video());
        assert!(matches!(
            inp.check_compatible(&out),
            Err(Error::PortNotCompatible(_))
        ));
    }

    #[test]
    fn test_unbound_bind_info() {
        let info = BindInfo::default();
        assert!(!info.is_bound());
        assert!(!info.is_peer_alive());
        assert!(matches!(info.peer(), Ok(None)));
    }
}
