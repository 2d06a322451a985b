//! Metrics collection using metrics-rs.

use crate::component::{ComponentKind, ComponentState};
use crate::error::ErrorKind;
use metrics::{Unit, counter};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const MESSAGES_POSTED: &str = "mmpipe_messages_posted";
const STATE_TRANSITIONS: &str = "mmpipe_state_transitions";
const COMMANDS_REJECTED: &str = "mmpipe_commands_rejected";
const ERRORS: &str = "mmpipe_errors";
const BUFFERS_RECEIVED: &str = "mmpipe_buffers_received";
const BUFFERS_RETURNED: &str = "mmpipe_buffers_returned";
const GIVEBACK_FAILURES: &str = "mmpipe_giveback_failures";
const FILES_ROTATED: &str = "mmpipe_files_rotated";
const OUT_OF_SPACE_STALLS: &str = "mmpipe_out_of_space_stalls";

/// Register metric descriptions. Idempotent.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        MESSAGES_POSTED,
        Unit::Count,
        "Messages queued to component workers"
    );
    metrics::describe_counter!(
        STATE_TRANSITIONS,
        Unit::Count,
        "Completed component state transitions"
    );
    metrics::describe_counter!(
        COMMANDS_REJECTED,
        Unit::Count,
        "State-set commands refused by a component"
    );
    metrics::describe_counter!(ERRORS, Unit::Count, "Error events raised by component workers");
    metrics::describe_counter!(
        BUFFERS_RECEIVED,
        Unit::Count,
        "Buffers accepted on input ports"
    );
    metrics::describe_counter!(
        BUFFERS_RETURNED,
        Unit::Count,
        "Buffers given back to their producer"
    );
    metrics::describe_counter!(
        GIVEBACK_FAILURES,
        Unit::Count,
        "Givebacks refused because no node matched"
    );
    metrics::describe_counter!(FILES_ROTATED, Unit::Count, "Container files finalized by rotation");
    metrics::describe_counter!(
        OUT_OF_SPACE_STALLS,
        Unit::Count,
        "Container writes that failed for lack of space"
    );
}

/// Record a message queued to a worker.
#[inline]
pub fn record_message_posted(kind: ComponentKind) {
    counter!(MESSAGES_POSTED, "kind" => kind.to_string()).increment(1);
}

/// Record a completed transition.
#[inline]
pub fn record_transition(kind: ComponentKind, to: ComponentState) {
    counter!(STATE_TRANSITIONS, "kind" => kind.to_string(), "to" => to.to_string()).increment(1);
}

/// Record a refused state-set command.
#[inline]
pub fn record_rejected_command(kind: ComponentKind) {
    counter!(COMMANDS_REJECTED, "kind" => kind.to_string()).increment(1);
}

/// Record an error event.
#[inline]
pub fn record_error(kind: ComponentKind, error: ErrorKind) {
    counter!(ERRORS, "kind" => kind.to_string(), "error" => error.to_string()).increment(1);
}

/// Record a buffer accepted by `send_buffer`.
#[inline]
pub fn record_buffer_received(kind: ComponentKind) {
    counter!(BUFFERS_RECEIVED, "kind" => kind.to_string()).increment(1);
}

/// Record a buffer accepted by `giveback_buffer`.
#[inline]
pub fn record_buffer_returned(kind: ComponentKind) {
    counter!(BUFFERS_RETURNED, "kind" => kind.to_string()).increment(1);
}

/// Record a refused giveback.
#[inline]
pub fn record_giveback_failure(kind: ComponentKind) {
    counter!(GIVEBACK_FAILURES, "kind" => kind.to_string()).increment(1);
}

/// Record a finalized file.
#[inline]
pub fn record_file_rotated() {
    counter!(FILES_ROTATED).increment(1);
}

/// Record a write that hit a full disk.
#[inline]
pub fn record_out_of_space() {
    counter!(OUT_OF_SPACE_STALLS).increment(1);
}
