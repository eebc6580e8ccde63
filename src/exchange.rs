//! Command delivery into, and state publication out of, the audio thread.
//!
//! A [`StateExchange`] is split in two halves:
//!
//! - the exchange itself, shared by any number of non-real-time threads. They
//!   [`post`](StateExchange::post) messages and read
//!   [`current_view`](StateExchange::current_view)s.
//! - a [`RealtimeSide`], moved into the audio callback. Once per callback it
//!   drains the pending messages into a [`MessageHandler`], lets the handler
//!   render, and publishes the resulting state.
//!
//! ```text
//! ┌──────────────┐  post()    ┌──────────────────┐  pop()   ┌────────────────┐
//! │ any thread   │──────────► │ command ring     │────────► │ RealtimeSide   │
//! │              │            │ (rtrb, bounded)  │          │ working state  │
//! │              │  view()    ┌──────────────────┐ write()  │                │
//! │              │◄────────── │ triple buffer    │◄──────── │                │
//! └──────────────┘            └──────────────────┘          └────────────────┘
//! ```
//!
//! The ring and the triple buffer are single-producer/single-consumer. The
//! non-real-time ends sit behind mutexes that only non-real-time threads take,
//! so posters serialize against each other and readers against each other, but
//! the audio thread never waits on either.

use core::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use rtrb::{Consumer, Producer, PushError, RingBuffer};
use triple_buffer::{Input, Output, TripleBuffer};

use crate::error::PostError;

/// Applies messages to the state owned by the audio thread.
///
/// Called from inside the audio callback, once per drained message, in the
/// order the messages were posted and before the buffer that observes them is
/// rendered. Implementations must not block, allocate or panic. Anything that
/// goes wrong is raised on [`FaultFlags`] and handled by degrading.
pub trait MessageHandler {
    type State;
    type Message;

    fn apply_message(&mut self, state: &mut Self::State, message: Self::Message);
}

/// A non-fatal problem noticed on the audio thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Fault {
    /// A command payload violated its invariants and was ignored
    MalformedCommand = 1,
    /// The channel selection did not cover any channel of the source
    ChannelSelection = 1 << 1,
    /// The source ran out of data earlier than it claimed
    SourceExhausted = 1 << 2,
    /// Rendering was requested with no source attached
    MissingSource = 1 << 3,
    /// A finished request had to be released on the audio thread
    RetireOverflow = 1 << 4,
}

impl Fault {
    pub const ALL: [Fault; 5] = [
        Fault::MalformedCommand,
        Fault::ChannelSelection,
        Fault::SourceExhausted,
        Fault::MissingSource,
        Fault::RetireOverflow,
    ];

    #[inline]
    fn bit(self) -> u32 {
        self as u32
    }
}

/// A set of [`Fault`]s, as read from [`FaultFlags`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultSet(u32);

impl FaultSet {
    #[inline]
    pub fn contains(&self, fault: Fault) -> bool {
        self.0 & fault.bit() != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Fault> + '_ {
        Fault::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

/// Sticky fault bits, raised by the audio thread and polled by anyone else.
#[derive(Debug, Default)]
pub struct FaultFlags {
    bits: AtomicU32,
}

impl FaultFlags {
    /// Raise a fault. Wait-free, safe on the audio thread.
    #[inline]
    pub fn raise(&self, fault: Fault) {
        self.bits.fetch_or(fault.bit(), Ordering::Relaxed);
    }

    /// Read the raised faults without clearing them.
    pub fn peek(&self) -> FaultSet {
        FaultSet(self.bits.load(Ordering::Relaxed))
    }

    /// Read and clear the raised faults.
    pub fn take(&self) -> FaultSet {
        FaultSet(self.bits.swap(0, Ordering::AcqRel))
    }
}

/// The any-thread half of the exchange.
///
/// `S` is the state owned by the audio thread, `V` the read-only view handed
/// out to other threads, `M` the message type.
pub struct StateExchange<S: Send, V, M> {
    commands: Mutex<Producer<M>>,
    snapshot: Mutex<Output<S>>,
    capacity: usize,
    generation: Arc<AtomicU64>,
    faults: Arc<FaultFlags>,
    _view: PhantomData<fn() -> V>,
}

impl<S, V, M> StateExchange<S, V, M>
where
    S: Clone + Send + 'static,
    V: for<'a> From<&'a S>,
    M: Send + 'static,
{
    /// Create an exchange publishing `initial`, with room for `capacity` pending messages.
    pub fn new(initial: S, capacity: usize) -> (Self, RealtimeSide<S, M>) {
        let capacity = capacity.max(1);
        let generation = Arc::new(AtomicU64::new(0));
        let faults = Arc::new(FaultFlags::default());

        let (producer, consumer) = RingBuffer::new(capacity);
        let (input, output) = TripleBuffer::new(&initial).split();

        let exchange = Self {
            commands: Mutex::new(producer),
            snapshot: Mutex::new(output),
            capacity,
            generation: Arc::clone(&generation),
            faults: Arc::clone(&faults),
            _view: PhantomData,
        };

        let realtime = RealtimeSide {
            commands: consumer,
            publisher: input,
            working: initial,
            generation,
            faults,
        };

        (exchange, realtime)
    }

    /// Queue a message for the audio thread.
    ///
    /// Never waits for the audio thread. Messages are applied in the order
    /// they were accepted. When the queue is full the message is handed back
    /// in [`PostError::Full`] and everything already queued stays queued.
    pub fn post(&self, message: M) -> Result<(), PostError<M>> {
        let mut producer = lock(&self.commands);
        producer
            .push(message)
            .map_err(|PushError::Full(m)| PostError::Full(m))
    }

    /// Like [`post`](Self::post), but gives up instead of waiting for another
    /// poster. This is the variant to use from the audio thread itself.
    pub fn try_post(&self, message: M) -> Result<(), PostError<M>> {
        let mut producer = match self.commands.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(PostError::Busy(message)),
        };
        producer
            .push(message)
            .map_err(|PushError::Full(m)| PostError::Full(m))
    }

    /// Messages accepted but not yet drained by the audio thread.
    pub fn pending(&self) -> usize {
        self.capacity - lock(&self.commands).slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A view over the most recently published state.
    ///
    /// The view always reflects one complete publication.
    pub fn current_view(&self) -> V {
        let mut output = lock(&self.snapshot);
        V::from(output.read())
    }

    /// How many states have been published. Starts at zero and counts every
    /// publication, including the initial state published by
    /// [`reattach`](Self::reattach) and [`reset`](Self::reset).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn faults(&self) -> &FaultFlags {
        &self.faults
    }

    /// Start over with a fresh real-time half publishing `initial`.
    ///
    /// Messages posted to the previous real-time half and not yet drained are
    /// discarded. Must only be called while no audio callback is using the
    /// previous [`RealtimeSide`].
    pub fn reattach(&self, initial: S) -> RealtimeSide<S, M> {
        let (producer, consumer) = RingBuffer::new(self.capacity);
        let (input, output) = TripleBuffer::new(&initial).split();

        let stale_commands = core::mem::replace(&mut *lock(&self.commands), producer);
        let stale_snapshot = core::mem::replace(&mut *lock(&self.snapshot), output);
        drop((stale_commands, stale_snapshot));

        self.generation.fetch_add(1, Ordering::AcqRel);

        RealtimeSide {
            commands: consumer,
            publisher: input,
            working: initial,
            generation: Arc::clone(&self.generation),
            faults: Arc::clone(&self.faults),
        }
    }

    /// Publish `initial` with no real-time half attached.
    pub fn reset(&self, initial: S) {
        drop(self.reattach(initial));
    }
}

/// The audio-thread half of the exchange.
pub struct RealtimeSide<S: Send, M> {
    commands: Consumer<M>,
    publisher: Input<S>,
    working: S,
    generation: Arc<AtomicU64>,
    faults: Arc<FaultFlags>,
}

impl<S, M> RealtimeSide<S, M>
where
    S: Clone + Send + 'static,
    M: Send + 'static,
{
    /// Apply every message that was pending when the drain started.
    ///
    /// Messages posted while draining wait for the next call.
    pub fn drain<H>(&mut self, handler: &mut H) -> usize
    where
        H: MessageHandler<State = S, Message = M>,
    {
        let pending = self.commands.slots();
        let mut applied = 0;
        while applied < pending {
            match self.commands.pop() {
                Ok(message) => handler.apply_message(&mut self.working, message),
                Err(_) => break,
            }
            applied += 1;
        }
        applied
    }

    #[inline]
    pub fn state(&self) -> &S {
        &self.working
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.working
    }

    /// Make the working state visible to readers as one update.
    ///
    /// Cloning `S` happens here, so keep it cheap (ideally `Copy`).
    pub fn publish(&mut self) {
        self.publisher.write(self.working.clone());
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// One callback's worth of work: drain, produce, publish.
    pub fn run_cycle<H, F>(&mut self, handler: &mut H, produce: F)
    where
        H: MessageHandler<State = S, Message = M>,
        F: FnOnce(&mut H, &mut S),
    {
        self.drain(handler);
        produce(handler, &mut self.working);
        self.publish();
    }

    pub fn faults(&self) -> &Arc<FaultFlags> {
        &self.faults
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
