//! Update events collected for the update worker.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use heapless::{Deque, Vec};

use crate::scheduler::UpdateSlot;
use crate::{ATT_VALUE_MAX_LEN, PEER_WRITE_QUEUE_LEN};

/// Periodic refresh tick.
pub const PERIODIC: u32 = 0x01;
/// A client connected.
pub const CONNECTED: u32 = 0x02;
/// A client disconnected.
pub const DISCONNECTED: u32 = 0x04;
/// One or more services requested a refresh outside the periodic cycle.
pub const ASYNC: u32 = 0x08;
/// The peer wrote an attribute. Payloads wait in the mailbox.
pub const PEER_WRITE: u32 = 0x10;

/// A peer write buffered until the update worker dispatches it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerWrite {
    handle: u16,
    value: Vec<u8, ATT_VALUE_MAX_LEN>,
}

impl PeerWrite {
    /// Attribute handle the peer wrote to.
    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Payload written by the peer.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

struct State {
    flags: u32,
    pending_updates: u32,
    writes: Deque<PeerWrite, PEER_WRITE_QUEUE_LEN>,
    waker: WakerRegistration,
}

/// Hub collecting update triggers from any context.
///
/// Sources set flag bits; the update worker consumes every set bit atomically
/// in [`UpdateEvents::wait`]. Flags carry no payload, so repeated triggers of
/// the same kind collapse into one round. Peer writes keep their payloads in a
/// bounded mailbox next to the flags.
pub struct UpdateEvents<M: RawMutex> {
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex> Default for UpdateEvents<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> UpdateEvents<M> {
    /// Create a new event hub.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                flags: 0,
                pending_updates: 0,
                writes: Deque::new(),
                waker: WakerRegistration::new(),
            })),
        }
    }

    fn with_mut<F: FnOnce(&mut State) -> R, R>(&self, f: F) -> R {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            f(&mut state)
        })
    }

    /// Raise a set of event flags and wake the worker.
    pub fn raise(&self, flags: u32) {
        self.with_mut(|state| {
            state.flags |= flags;
            state.waker.wake();
        });
    }

    /// Record a client connection.
    pub fn client_connected(&self) {
        self.raise(CONNECTED);
    }

    /// Record a client disconnection.
    pub fn client_disconnected(&self) {
        self.raise(DISCONNECTED);
    }

    /// Queue a peer write for dispatch by the update worker.
    ///
    /// Oversized payloads and writes arriving on a full queue are dropped.
    pub fn attribute_modified(&self, handle: u16, value: &[u8]) {
        self.with_mut(|state| {
            let Ok(value) = Vec::from_slice(value) else {
                warn!("[events] dropping oversized write to handle {}", handle);
                return;
            };
            if state.writes.push_back(PeerWrite { handle, value }).is_err() {
                warn!("[events] write queue full, dropping write to handle {}", handle);
                return;
            }
            state.flags |= PEER_WRITE;
            state.waker.wake();
        });
    }

    /// Mark a scheduler slot as wanting a refresh and raise [`ASYNC`].
    pub fn request_update(&self, slot: UpdateSlot) {
        self.with_mut(|state| {
            state.pending_updates |= slot.mask();
            state.flags |= ASYNC;
            state.waker.wake();
        });
    }

    /// Consume the mask of slots that requested a refresh.
    pub(crate) fn take_pending_updates(&self) -> u32 {
        self.with_mut(|state| core::mem::take(&mut state.pending_updates))
    }

    /// Pop the oldest buffered peer write.
    pub(crate) fn pop_write(&self) -> Option<PeerWrite> {
        self.with_mut(|state| state.writes.pop_front())
    }

    pub(crate) fn poll_wait(&self, cx: Option<&mut Context<'_>>) -> Poll<u32> {
        self.with_mut(|state| {
            if state.flags != 0 {
                return Poll::Ready(core::mem::take(&mut state.flags));
            }
            if let Some(cx) = cx {
                state.waker.register(cx.waker());
            }
            Poll::Pending
        })
    }

    /// Wait until at least one flag is raised, consuming all raised flags.
    pub async fn wait(&self) -> u32 {
        poll_fn(move |cx| self.poll_wait(Some(cx))).await
    }
}
