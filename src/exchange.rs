//! Buffer exchange: a node arena with three ownership lists.
//!
//! Every node lives in exactly one of `empty`, `ready` or `processing`. The
//! lists hold slot indices into the arena, never the payload itself, and a
//! [`BufferToken`] names one node for one trip through the lists: releasing
//! a node bumps its generation, so a stale token can never match again.
//!
//! ```text
//!  push_ready ─────────────┐
//!  empty ──────────────► ready ──advance/pop──► processing ──release──► empty
//!    └──reserve/commit_processing──────────────────┘
//! ```
//!
//! All list mutations happen under one lock per exchange. Nothing here
//! blocks: exhaustion is reported as [`Error::InsufficientResources`] and the
//! caller decides how to wait.

use crate::config::ExchangeConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Identity of one exchange node for one trip through the lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferToken {
    slot: u32,
    generation: u32,
}

impl BufferToken {
    /// Arena slot index.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when the token was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for BufferToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

/// Snapshot of list lengths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeCounts {
    /// Free nodes.
    pub empty: usize,
    /// Nodes waiting to be consumed.
    pub ready: usize,
    /// Nodes being consumed or awaiting giveback.
    pub processing: usize,
    /// Nodes ever allocated.
    pub allocated: usize,
}

impl ExchangeCounts {
    /// Whether every allocated node is on exactly one list.
    pub fn is_conserved(&self) -> bool {
        self.empty + self.ready + self.processing == self.allocated
    }

    /// Nodes currently owned outside the empty list.
    pub fn in_flight(&self) -> usize {
        self.ready + self.processing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Empty,
    Ready,
    Processing,
}

struct Slot<T> {
    generation: u32,
    location: Location,
    payload: Option<T>,
}

struct Lists<T> {
    slots: Vec<Slot<T>>,
    empty: VecDeque<u32>,
    ready: VecDeque<u32>,
    processing: VecDeque<u32>,
}

impl<T> Lists<T> {
    fn grow(&mut self, name: &str, config: &ExchangeConfig, batch: usize) -> Result<()> {
        let room = config
            .max_nodes
            .map_or(usize::MAX, |max| max.saturating_sub(self.slots.len()));
        let batch = batch.max(1).min(room);
        if batch == 0 {
            return Err(Error::InsufficientResources(format!(
                "{name}: node cap of {} reached",
                self.slots.len()
            )));
        }
        if self.slots.try_reserve(batch).is_err() || self.empty.try_reserve(batch).is_err() {
            return Err(Error::InsufficientResources(format!(
                "{name}: cannot allocate {batch} nodes"
            )));
        }
        for _ in 0..batch {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                location: Location::Empty,
                payload: None,
            });
            self.empty.push_back(index);
        }
        tracing::trace!(exchange = %name, added = batch, total = self.slots.len(), "exchange grew");
        Ok(())
    }

    fn token(&self, index: u32) -> BufferToken {
        BufferToken {
            slot: index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn slot_at(&mut self, token: BufferToken, expected: Location) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(token.slot as usize)
            .filter(|s| s.generation == token.generation && s.location == expected)
    }
}

fn remove_index(list: &mut VecDeque<u32>, index: u32) -> bool {
    match list.iter().position(|&i| i == index) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

/// One port's node arena with empty/ready/processing lists.
pub struct BufferExchange<T> {
    name: String,
    config: ExchangeConfig,
    lists: Mutex<Lists<T>>,
}

impl<T: Clone> BufferExchange<T> {
    /// Create an exchange and allocate its initial nodes.
    pub fn new(name: impl Into<String>, config: ExchangeConfig) -> Result<Self> {
        let name = name.into();
        let mut lists = Lists {
            slots: Vec::new(),
            empty: VecDeque::new(),
            ready: VecDeque::new(),
            processing: VecDeque::new(),
        };
        if config.initial_nodes > 0 {
            lists.grow(&name, &config, config.initial_nodes)?;
        }
        Ok(Self {
            name,
            config,
            lists: Mutex::new(lists),
        })
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy `payload` into a free node and append it to `ready`.
    ///
    /// Grows the arena by one batch when `empty` is exhausted.
    pub fn push_ready(&self, payload: T) -> Result<BufferToken> {
        let mut lists = self.lists.lock();
        if lists.empty.is_empty() {
            lists.grow(&self.name, &self.config, self.config.grow_batch)?;
        }
        let Some(index) = lists.empty.pop_front() else {
            return Err(Error::InsufficientResources(format!("{}: no empty node", self.name)));
        };
        let slot = &mut lists.slots[index as usize];
        slot.location = Location::Ready;
        slot.payload = Some(payload);
        lists.ready.push_back(index);
        Ok(lists.token(index))
    }

    /// Peek the oldest ready node.
    pub fn front_ready(&self) -> Option<(BufferToken, T)> {
        let lists = self.lists.lock();
        let index = *lists.ready.front()?;
        let payload = lists.slots[index as usize].payload.clone()?;
        Some((lists.token(index), payload))
    }

    /// Move the ready head, which must be `token`, to `processing`.
    pub fn advance_ready(&self, token: BufferToken) -> Result<()> {
        let mut lists = self.lists.lock();
        if lists.ready.front() != Some(&token.slot) || lists.slot_at(token, Location::Ready).is_none()
        {
            return Err(Error::BadParameter(format!(
                "{}: {token} is not at the head of ready",
                self.name
            )));
        }
        lists.ready.pop_front();
        lists.slots[token.slot as usize].location = Location::Processing;
        lists.processing.push_back(token.slot);
        Ok(())
    }

    /// Move the ready head to `processing` and return a copy of it.
    pub fn pop_ready(&self) -> Option<(BufferToken, T)> {
        let mut lists = self.lists.lock();
        let index = lists.ready.pop_front()?;
        let slot = &mut lists.slots[index as usize];
        slot.location = Location::Processing;
        let payload = slot.payload.clone();
        lists.processing.push_back(index);
        payload.map(|p| (lists.token(index), p))
    }

    /// Move every ready node to `processing`, oldest first.
    pub fn drain_ready(&self) -> Vec<(BufferToken, T)> {
        let mut lists = self.lists.lock();
        let mut drained = Vec::with_capacity(lists.ready.len());
        while let Some(index) = lists.ready.pop_front() {
            let slot = &mut lists.slots[index as usize];
            slot.location = Location::Processing;
            if let Some(p) = slot.payload.clone() {
                drained.push((lists.token(index), p));
            }
            lists.processing.push_back(index);
        }
        drained
    }

    /// Make sure a free node exists and return its token without moving it.
    ///
    /// Pair with [`commit_processing`](Self::commit_processing) once the
    /// payload has been handed off; dropping the token leaves the node free.
    pub fn reserve_empty(&self) -> Result<BufferToken> {
        let mut lists = self.lists.lock();
        if lists.empty.is_empty() {
            lists.grow(&self.name, &self.config, self.config.grow_batch)?;
        }
        match lists.empty.front() {
            Some(&index) => Ok(lists.token(index)),
            None => Err(Error::InsufficientResources(format!("{}: no empty node", self.name))),
        }
    }

    /// Move a reserved free node straight to `processing` holding `payload`.
    pub fn commit_processing(&self, token: BufferToken, payload: T) -> Result<()> {
        let mut lists = self.lists.lock();
        if lists.slot_at(token, Location::Empty).is_none() || !remove_index(&mut lists.empty, token.slot)
        {
            return Err(Error::BadParameter(format!(
                "{}: {token} is not a free node",
                self.name
            )));
        }
        let slot = &mut lists.slots[token.slot as usize];
        slot.location = Location::Processing;
        slot.payload = Some(payload);
        lists.processing.push_back(token.slot);
        Ok(())
    }

    /// Peek the oldest processing node.
    pub fn front_processing(&self) -> Option<(BufferToken, T)> {
        let lists = self.lists.lock();
        let index = *lists.processing.front()?;
        let payload = lists.slots[index as usize].payload.clone()?;
        Some((lists.token(index), payload))
    }

    /// Return a processing node to `empty`, handing its payload back.
    ///
    /// Fails with [`Error::BadParameter`] when `token` does not name a node in
    /// `processing`.
    pub fn release(&self, token: BufferToken) -> Result<T> {
        let mut lists = self.lists.lock();
        let found = lists.slot_at(token, Location::Processing).is_some()
            && remove_index(&mut lists.processing, token.slot);
        if !found {
            return Err(Error::BadParameter(format!(
                "{}: {token} is not being processed",
                self.name
            )));
        }
        let slot = &mut lists.slots[token.slot as usize];
        slot.location = Location::Empty;
        slot.generation = slot.generation.wrapping_add(1);
        let payload = slot.payload.take();
        lists.empty.push_back(token.slot);
        payload.ok_or_else(|| Error::BadParameter(format!("{}: {token} has no payload", self.name)))
    }

    /// Return every node to `empty`, dropping payloads.
    pub fn reset(&self) {
        let mut lists = self.lists.lock();
        let Lists {
            slots,
            empty,
            ready,
            processing,
        } = &mut *lists;
        for index in ready.drain(..).chain(processing.drain(..)) {
            let slot = &mut slots[index as usize];
            slot.location = Location::Empty;
            slot.generation = slot.generation.wrapping_add(1);
            slot.payload = None;
            empty.push_back(index);
        }
    }

    /// Whether nothing is waiting in `ready`.
    pub fn is_ready_empty(&self) -> bool {
        self.lists.lock().ready.is_empty()
    }

    /// Number of nodes in `processing`.
    pub fn processing_len(&self) -> usize {
        self.lists.lock().processing.len()
    }

    /// Snapshot all list lengths under one lock.
    pub fn counts(&self) -> ExchangeCounts {
        let lists = self.lists.lock();
        ExchangeCounts {
            empty: lists.empty.len(),
            ready: lists.ready.len(),
            processing: lists.processing.len(),
            allocated: lists.slots.len(),
        }
    }
}

impl<T> std::fmt::Debug for BufferExchange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lists = self.lists.lock();
        f.debug_struct("BufferExchange")
            .field("name", &self.name)
            .field("empty", &lists.empty.len())
            .field("ready", &lists.ready.len())
            .field("processing", &lists.processing.len())
            .finish()
    }
}
