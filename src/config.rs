//! Component configuration.
//!
//! All sizing and timing knobs are passed explicitly into component
//! constructors. Every struct has sensible defaults and `with_*` builders:
//!
//! ```rust,ignore
//! use mmpipe::config::{ComponentConfig, ExchangeConfig};
//!
//! let config = ComponentConfig::new("venc")
//!     .with_output(ExchangeConfig::new(4, 4).with_max_nodes(16));
//! ```

use std::time::Duration;

/// Sizing of a component's message queue node pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Nodes allocated when the queue is created.
    pub initial_nodes: usize,
    /// Nodes added each time the pool runs dry.
    pub grow_batch: usize,
    /// Upper bound on nodes ever allocated (`None` = unbounded).
    pub max_nodes: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 8,
            grow_batch: 8,
            max_nodes: None,
        }
    }
}

impl QueueConfig {
    /// Create a queue config with the given initial size and growth batch.
    pub fn new(initial_nodes: usize, grow_batch: usize) -> Self {
        Self {
            initial_nodes,
            grow_batch,
            max_nodes: None,
        }
    }

    /// Cap the total number of nodes.
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }
}

/// Sizing of one buffer exchange (one port's node arena).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Nodes allocated up front.
    pub initial_nodes: usize,
    /// Nodes added when the empty list is exhausted.
    pub grow_batch: usize,
    /// Upper bound on nodes ever allocated (`None` = unbounded).
    pub max_nodes: Option<usize>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 16,
            grow_batch: 16,
            max_nodes: Some(64),
        }
    }
}

impl ExchangeConfig {
    /// Create an exchange config without a node cap.
    pub fn new(initial_nodes: usize, grow_batch: usize) -> Self {
        Self {
            initial_nodes,
            grow_batch,
            max_nodes: None,
        }
    }

    /// Cap the total number of nodes.
    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = Some(max);
        self
    }

    /// Remove the node cap.
    pub fn unbounded(mut self) -> Self {
        self.max_nodes = None;
        self
    }
}

/// Bounded waits used by worker loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Wait after partial progress (keeps live streams low-latency).
    pub short: Duration,
    /// Wait while end-of-stream is pending and output is still draining.
    /// Longer than `short`.
    pub eos_poll: Duration,
    /// Wait before retrying a refused hand-off or a full container.
    pub retry: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            short: Duration::from_millis(5),
            eos_poll: Duration::from_millis(20),
            retry: Duration::from_millis(20),
        }
    }
}

/// Configuration shared by every component.
#[derive(Debug, Clone, Default)]
pub struct ComponentConfig {
    /// Human-readable name; defaults to `<kind>-<id>`.
    pub name: Option<String>,
    /// Message queue sizing.
    pub queue: QueueConfig,
    /// Input-side exchange sizing.
    pub input: ExchangeConfig,
    /// Output-side exchange sizing.
    pub output: ExchangeConfig,
    /// Worker loop waits.
    pub waits: WaitConfig,
}

impl ComponentConfig {
    /// Create a named config with default sizing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the message queue sizing.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Set the input exchange sizing.
    pub fn with_input(mut self, input: ExchangeConfig) -> Self {
        self.input = input;
        self
    }

    /// Set the output exchange sizing.
    pub fn with_output(mut self, output: ExchangeConfig) -> Self {
        self.output = output;
        self
    }

    /// Set the worker waits.
    pub fn with_waits(mut self, waits: WaitConfig) -> Self {
        self.waits = waits;
        self
    }
}
