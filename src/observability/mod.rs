//! Observability: metrics and tracing.
//!
//! - **Metrics**: counters via `metrics-rs`, labelled by component kind
//! - **Tracing**: one span per component worker thread, structured events
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `mmpipe_messages_posted` | Counter | Messages queued to workers |
//! | `mmpipe_state_transitions` | Counter | Completed state transitions |
//! | `mmpipe_commands_rejected` | Counter | Refused state-set commands |
//! | `mmpipe_errors` | Counter | Error events raised by workers |
//! | `mmpipe_buffers_received` | Counter | Buffers accepted by `send_buffer` |
//! | `mmpipe_buffers_returned` | Counter | Buffers accepted by `giveback_buffer` |
//! | `mmpipe_giveback_failures` | Counter | Refused givebacks |
//! | `mmpipe_files_rotated` | Counter | Containers finalized by rotation |
//! | `mmpipe_out_of_space_stalls` | Counter | Container writes that hit a full disk |
//!
//! Nothing is exported unless the application installs a `metrics` recorder;
//! call [`init_metrics`] once to register descriptions.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    init_metrics, record_buffer_received, record_buffer_returned, record_error,
    record_file_rotated, record_giveback_failure, record_message_posted, record_out_of_space,
    record_rejected_command, record_transition,
};
pub use self::tracing_support::{span_component, trace_packet_written};
