//! Update worker driving service refreshes.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Ticker};
use heapless::Vec;

use crate::controller::Controller;
use crate::events::{self, UpdateEvents};
use crate::stack::GattPeripheral;
use crate::Error;

/// Update period used when nothing else is configured.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_millis(500);

/// A service driven by the update worker.
pub trait GattService {
    /// Refresh the characteristic values of this service.
    fn refresh(&self);
}

/// Slot of a service registered with the scheduler.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateSlot(pub(crate) u8);

impl UpdateSlot {
    pub(crate) fn mask(&self) -> u32 {
        1 << self.0
    }
}

/// Handle a service keeps to request a refresh outside the periodic cycle.
pub struct UpdateRequest<'d, M: RawMutex> {
    events: &'d UpdateEvents<M>,
    slot: UpdateSlot,
}

impl<'d, M: RawMutex> Clone for UpdateRequest<'d, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'d, M: RawMutex> Copy for UpdateRequest<'d, M> {}

impl<'d, M: RawMutex> UpdateRequest<'d, M> {
    /// Ask the worker for a refresh of this service.
    pub fn request(&self) {
        self.events.request_update(self.slot);
    }

    /// Slot this request belongs to.
    pub fn slot(&self) -> UpdateSlot {
        self.slot
    }
}

/// Refreshes registered services on a periodic tick and on demand.
pub struct UpdateScheduler<'d, M: RawMutex, const N: usize> {
    events: &'d UpdateEvents<M>,
    period: Duration,
    services: Vec<&'d dyn GattService, N>,
}

impl<'d, M: RawMutex, const N: usize> UpdateScheduler<'d, M, N> {
    /// Create a scheduler refreshing every `period`.
    pub fn new(events: &'d UpdateEvents<M>, period: Duration) -> Self {
        Self {
            events,
            period,
            services: Vec::new(),
        }
    }

    /// Register a service for the periodic refresh pass.
    ///
    /// Returns the request handle the service can use to get refreshed
    /// outside the periodic cycle.
    pub fn register(&mut self, service: &'d dyn GattService) -> Result<UpdateRequest<'d, M>, Error> {
        // The pending update mask is a u32.
        if self.services.len() >= 32 {
            return Err(Error::Capacity);
        }
        let slot = UpdateSlot(self.services.len() as u8);
        self.services.push(service).map_err(|_| Error::Capacity)?;
        Ok(UpdateRequest {
            events: self.events,
            slot,
        })
    }

    /// Process one batch of update events.
    ///
    /// Waits until at least one event flag is raised and processes all raised
    /// flags: the periodic pass, the connection hooks, buffered peer writes
    /// and requested refreshes, in that order. Returns the processed flags.
    pub async fn poll_once<C: Controller, const MAX: usize>(&self, peripheral: &GattPeripheral<'d, C, M, MAX>) -> u32 {
        let flags = self.events.wait().await;
        self.process(flags, peripheral);
        flags
    }

    /// Run the update worker forever.
    pub async fn run<C: Controller, const MAX: usize>(&self, peripheral: &GattPeripheral<'d, C, M, MAX>) -> ! {
        info!("[update] worker running with a period of {} ms", self.period.as_millis());
        let mut ticker = Ticker::every(self.period);
        loop {
            match select(ticker.next(), self.poll_once(peripheral)).await {
                Either::First(_) => self.events.raise(events::PERIODIC),
                Either::Second(_) => {}
            }
        }
    }

    fn process<C: Controller, const MAX: usize>(&self, flags: u32, peripheral: &GattPeripheral<'d, C, M, MAX>) {
        if flags & events::PERIODIC != 0 {
            for service in self.services.iter() {
                service.refresh();
            }
        }
        if flags & events::CONNECTED != 0 {
            info!("[update] client connected");
            peripheral.connect_actions();
        }
        if flags & events::DISCONNECTED != 0 {
            info!("[update] client disconnected");
            peripheral.disconnect_actions();
        }
        if flags & events::PEER_WRITE != 0 {
            while let Some(write) = self.events.pop_write() {
                peripheral.attribute_modified(write.handle(), write.value());
            }
        }
        if flags & events::ASYNC != 0 {
            let pending = self.events.take_pending_updates();
            for (index, service) in self.services.iter().enumerate() {
                if pending & (1 << index) != 0 {
                    service.refresh();
                }
            }
        }
    }
}
