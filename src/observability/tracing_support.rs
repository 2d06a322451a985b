//! Tracing spans and structured events for components.

use crate::component::{ComponentId, ComponentKind};
use std::time::Duration;
use tracing::{Level, Span, span};

/// Create the span a component's worker thread runs in.
///
/// ```rust,ignore
/// let span = span_component("muxer-3", ComponentKind::Muxer, id);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_component(name: &str, kind: ComponentKind, id: ComponentId) -> Span {
    span!(
        Level::DEBUG,
        "component",
        name = %name,
        kind = %kind,
        id = %id
    )
}

/// Log a packet written to a container.
#[inline]
pub fn trace_packet_written(uri: &str, stream: &str, pts: Duration, size: usize) {
    tracing::trace!(
        uri = %uri,
        stream = %stream,
        pts_ms = pts.as_millis() as u64,
        size,
        "packet written"
    );
}
