//! A controller double recording every call, for tests and bring-up.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::attribute::{CharacteristicProps, Uuid};
use crate::controller::{Controller, DeviceConfig};
use crate::ATT_VALUE_MAX_LEN;

const SERVICES: usize = 8;
const CHARACTERISTICS: usize = 16;
const UPDATES: usize = 64;

/// Error returned by the mock when a rejection is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MockError;

/// A service registration recorded by the mock.
#[derive(Clone, Debug)]
pub struct ServiceRecord {
    /// UUID passed by the stack.
    pub uuid: Uuid,
    /// Primary service flag.
    pub primary: bool,
    /// Attribute budget reserved for the service.
    pub attribute_count: u8,
    /// Handle returned to the stack.
    pub handle: u16,
}

/// A characteristic registration recorded by the mock.
#[derive(Clone, Debug)]
pub struct CharacteristicRecord {
    /// Handle of the owning service.
    pub service_handle: u16,
    /// UUID passed by the stack.
    pub uuid: Uuid,
    /// Value storage size.
    pub value_len: u16,
    /// Fixed length flag.
    pub fixed_len: bool,
    /// Properties bitmask.
    pub props: CharacteristicProps,
    /// Handle returned to the stack.
    pub handle: u16,
}

/// A value update recorded by the mock.
#[derive(Clone, Debug)]
pub struct UpdateRecord {
    /// Handle of the owning service.
    pub service_handle: u16,
    /// Handle of the characteristic.
    pub characteristic_handle: u16,
    /// Pushed payload.
    pub value: Vec<u8, ATT_VALUE_MAX_LEN>,
}

struct State {
    present: bool,
    reject_next: bool,
    next_handle: u16,
    config: Option<DeviceConfig>,
    services: Vec<ServiceRecord, SERVICES>,
    characteristics: Vec<CharacteristicRecord, CHARACTERISTICS>,
    updates: Vec<UpdateRecord, UPDATES>,
    connects: usize,
    disconnects: usize,
}

/// Records every controller call and hands out sequential handles from 1.
pub struct MockController<M: RawMutex> {
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex> Default for MockController<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> MockController<M> {
    /// Create a new mock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                present: true,
                reject_next: false,
                next_handle: 1,
                config: None,
                services: Vec::new(),
                characteristics: Vec::new(),
                updates: Vec::new(),
                connects: 0,
                disconnects: 0,
            })),
        }
    }

    fn with_state<F: FnOnce(&mut State) -> R, R>(&self, f: F) -> R {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            f(&mut state)
        })
    }

    fn take_reject(&self, state: &mut State) -> Result<(), MockError> {
        if state.reject_next {
            state.reject_next = false;
            return Err(MockError);
        }
        Ok(())
    }

    /// Make [`Controller::probe`] report `present`.
    pub fn set_present(&self, present: bool) {
        self.with_state(|state| state.present = present);
    }

    /// Make the next fallible controller call fail once.
    pub fn reject_next(&self) {
        self.with_state(|state| state.reject_next = true);
    }

    /// Configuration received from the stack, if any.
    pub fn config(&self) -> Option<DeviceConfig> {
        self.with_state(|state| state.config.clone())
    }

    /// Number of recorded service registrations.
    pub fn service_count(&self) -> usize {
        self.with_state(|state| state.services.len())
    }

    /// Recorded service registration at `index`.
    pub fn service(&self, index: usize) -> Option<ServiceRecord> {
        self.with_state(|state| state.services.get(index).cloned())
    }

    /// Number of recorded characteristic registrations.
    pub fn characteristic_count(&self) -> usize {
        self.with_state(|state| state.characteristics.len())
    }

    /// Recorded characteristic registration at `index`.
    pub fn characteristic(&self, index: usize) -> Option<CharacteristicRecord> {
        self.with_state(|state| state.characteristics.get(index).cloned())
    }

    /// Number of recorded value updates.
    pub fn update_count(&self) -> usize {
        self.with_state(|state| state.updates.len())
    }

    /// Recorded value update at `index`.
    pub fn update(&self, index: usize) -> Option<UpdateRecord> {
        self.with_state(|state| state.updates.get(index).cloned())
    }

    /// Number of connect hook invocations.
    pub fn connects(&self) -> usize {
        self.with_state(|state| state.connects)
    }

    /// Number of disconnect hook invocations.
    pub fn disconnects(&self) -> usize {
        self.with_state(|state| state.disconnects)
    }
}

impl<M: RawMutex> Controller for MockController<M> {
    type Error = MockError;

    fn probe(&self) -> bool {
        self.with_state(|state| state.present)
    }

    fn set_device_configuration(&self, config: &DeviceConfig) -> Result<(), Self::Error> {
        self.with_state(|state| {
            self.take_reject(state)?;
            state.config = Some(config.clone());
            Ok(())
        })
    }

    fn add_service(&self, uuid: &Uuid, primary: bool, attribute_count: u8) -> Result<u16, Self::Error> {
        self.with_state(|state| {
            self.take_reject(state)?;
            let handle = state.next_handle;
            state.next_handle += 1;
            state
                .services
                .push(ServiceRecord {
                    uuid: uuid.clone(),
                    primary,
                    attribute_count,
                    handle,
                })
                .map_err(|_| MockError)?;
            Ok(handle)
        })
    }

    fn add_characteristic(
        &self,
        service_handle: u16,
        uuid: &Uuid,
        value_len: u16,
        fixed_len: bool,
        props: CharacteristicProps,
    ) -> Result<u16, Self::Error> {
        self.with_state(|state| {
            self.take_reject(state)?;
            let handle = state.next_handle;
            state.next_handle += 1;
            state
                .characteristics
                .push(CharacteristicRecord {
                    service_handle,
                    uuid: uuid.clone(),
                    value_len,
                    fixed_len,
                    props,
                    handle,
                })
                .map_err(|_| MockError)?;
            Ok(handle)
        })
    }

    fn update_characteristic_value(
        &self,
        service_handle: u16,
        characteristic_handle: u16,
        value: &[u8],
    ) -> Result<(), Self::Error> {
        self.with_state(|state| {
            self.take_reject(state)?;
            let value = Vec::from_slice(value).map_err(|_| MockError)?;
            state
                .updates
                .push(UpdateRecord {
                    service_handle,
                    characteristic_handle,
                    value,
                })
                .map_err(|_| MockError)
        })
    }

    fn connect_actions(&self) {
        self.with_state(|state| state.connects += 1);
    }

    fn disconnect_actions(&self) {
        self.with_state(|state| state.disconnects += 1);
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    #[test]
    fn handles_are_sequential_from_one() {
        let mock: MockController<NoopRawMutex> = MockController::new();
        let service = mock.add_service(&Uuid::new_short(0x1800), true, 4).unwrap();
        let characteristic = mock
            .add_characteristic(
                service,
                &Uuid::new_short(0x2a00),
                4,
                true,
                [crate::attribute::CharacteristicProp::Read].into(),
            )
            .unwrap();

        assert_eq!(service, 1);
        assert_eq!(characteristic, 2);
        assert_eq!(mock.service(0).unwrap().attribute_count, 4);
        assert_eq!(mock.characteristic(0).unwrap().service_handle, 1);
    }

    #[test]
    fn armed_rejection_fails_once() {
        let mock: MockController<NoopRawMutex> = MockController::new();
        mock.reject_next();

        assert_eq!(mock.add_service(&Uuid::new_short(0x1800), true, 2), Err(MockError));
        assert!(mock.add_service(&Uuid::new_short(0x1800), true, 2).is_ok());
        assert_eq!(mock.service_count(), 1);
    }
}
