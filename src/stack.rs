//! Controller binding and value routing.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::attribute::{
    CharacteristicInfo, CharacteristicProp, ServiceRef, ServiceTable, ValueListener, ValueOrigin,
};
use crate::controller::{Controller, DeviceConfig};
use crate::{Error, StackError};

/// Binds a service table to a controller and routes values between them.
///
/// Local updates are pushed to the controller exactly once. Peer writes
/// relayed by the controller are stored and fanned out to listeners but never
/// pushed back to the controller.
pub struct GattPeripheral<'d, C: Controller, M: RawMutex, const MAX: usize> {
    controller: C,
    table: &'d ServiceTable<'d, M, MAX>,
    roots: Mutex<M, RefCell<Vec<ServiceRef, MAX>>>,
}

impl<'d, C: Controller, M: RawMutex, const MAX: usize> GattPeripheral<'d, C, M, MAX> {
    /// Create a new peripheral binding a table to a controller.
    pub fn new(controller: C, table: &'d ServiceTable<'d, M, MAX>) -> Self {
        Self {
            controller,
            table,
            roots: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Borrow the controller.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Check whether the controller responds.
    pub fn probe(&self) -> bool {
        self.controller.probe()
    }

    /// Push the device identity to the controller.
    pub fn configure(&self, config: &DeviceConfig) -> Result<(), StackError<C::Error>> {
        self.controller
            .set_device_configuration(config)
            .map_err(StackError::Controller)
    }

    /// Run the controller's connect hook.
    pub fn connect_actions(&self) {
        self.controller.connect_actions();
    }

    /// Run the controller's disconnect hook.
    pub fn disconnect_actions(&self) {
        self.controller.disconnect_actions();
    }

    /// Register services and everything they include with the controller.
    ///
    /// Services register in order, includes recurse depth first and always
    /// register as primary. A service spanning zero attributes is skipped
    /// while its includes still register. The peripheral attaches itself as
    /// value listener to every registered characteristic so local updates
    /// reach the controller.
    pub fn bind(&'d self, services: &[ServiceRef], primary: bool) -> Result<(), StackError<C::Error>> {
        for service in services {
            self.roots
                .lock(|roots| roots.borrow_mut().push(*service).map_err(|_| Error::Capacity))?;
        }
        for service in services {
            self.bind_service(*service, primary)?;
        }
        Ok(())
    }

    fn bind_service(&'d self, service: ServiceRef, primary: bool) -> Result<(), StackError<C::Error>> {
        let attribute_count = self.attribute_count(service)?;
        let info = self.table.service_info(service)?;
        if attribute_count != 0 {
            let handle = self
                .controller
                .add_service(&info.uuid, primary, attribute_count)
                .map_err(StackError::Controller)?;
            self.table.set_service_handle(service, handle)?;
            debug!("[gatt] service {} bound to handle {}", info.name, handle);

            let characteristics = self.table.characteristic_count(service)?;
            for index in 0..characteristics {
                let characteristic = self.table.characteristic_at(service, index)?;
                let ci = self.table.characteristic_info(characteristic)?;
                let value_handle = self
                    .controller
                    .add_characteristic(handle, &ci.uuid, ci.value_len, ci.fixed_len, ci.props)
                    .map_err(StackError::Controller)?;
                self.table.set_characteristic_handle(characteristic, value_handle)?;
                self.table.register_listener(characteristic, self)?;
                trace!("[gatt] characteristic {} bound to handle {}", ci.name, value_handle);
            }
        } else {
            debug!("[gatt] service {} spans no attributes, not registered", info.name);
        }

        let includes = self.table.include_count(service)?;
        for index in 0..includes {
            let include = self.table.include_at(service, index)?;
            self.bind_service(include, true)?;
        }
        Ok(())
    }

    /// Attributes a service spans on the controller.
    ///
    /// Every characteristic takes a declaration and a value attribute, one
    /// client configuration descriptor when it notifies or indicates, and one
    /// attribute per descriptor.
    fn attribute_count(&self, service: ServiceRef) -> Result<u8, Error> {
        let mut count: u8 = 0;
        let characteristics = self.table.characteristic_count(service)?;
        for index in 0..characteristics {
            let characteristic = self.table.characteristic_at(service, index)?;
            let info = self.table.characteristic_info(characteristic)?;
            count += 2;
            if info.props.any(&[CharacteristicProp::Notify, CharacteristicProp::Indicate]) {
                count += 1;
            }
            count += self.table.descriptor_count(characteristic)? as u8;
        }
        Ok(count)
    }

    /// Dispatch a peer write relayed by the controller.
    ///
    /// Bound services are searched depth first in bind order and the first
    /// characteristic carrying the handle receives the value. Writes to
    /// unknown handles are dropped.
    pub fn attribute_modified(&self, handle: u16, value: &[u8]) {
        let roots = self.roots.lock(|roots| roots.borrow().clone());
        for root in roots.iter() {
            match self.dispatch(*root, handle, value) {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => {
                    warn!("[gatt] dispatch of write to handle {} failed: {:?}", handle, e);
                    return;
                }
            }
        }
        debug!("[gatt] no characteristic bound to handle {}, dropping write", handle);
    }

    fn dispatch(&self, service: ServiceRef, handle: u16, value: &[u8]) -> Result<bool, Error> {
        let characteristics = self.table.characteristic_count(service)?;
        for index in 0..characteristics {
            let characteristic = self.table.characteristic_at(service, index)?;
            let info = self.table.characteristic_info(characteristic)?;
            if info.handle == Some(handle) {
                self.table.update_value(characteristic, ValueOrigin::Peer, value)?;
                return Ok(true);
            }
        }
        let includes = self.table.include_count(service)?;
        for index in 0..includes {
            let include = self.table.include_at(service, index)?;
            if self.dispatch(include, handle, value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'d, C: Controller, M: RawMutex, const MAX: usize> ValueListener for GattPeripheral<'d, C, M, MAX> {
    fn on_value_changed(&self, characteristic: &CharacteristicInfo<'_>, origin: ValueOrigin, value: &[u8]) {
        // The controller already stores what the peer wrote. Pushing it back
        // would echo the value to its author.
        if origin == ValueOrigin::Peer {
            return;
        }
        let (Some(service_handle), Some(handle)) = (characteristic.service_handle, characteristic.handle) else {
            trace!("[gatt] characteristic {} not bound, skipping push", characteristic.name);
            return;
        };
        if self
            .controller
            .update_characteristic_value(service_handle, handle, value)
            .is_err()
        {
            warn!("[gatt] pushing value of {} to the controller failed", characteristic.name);
        }
    }
}
