//! Attribute tree model.
//!
//! Services, characteristics and descriptors are stored in a fixed capacity
//! arena behind a blocking mutex. Composition hands out small copyable tokens
//! which stay valid for the lifetime of the table.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

pub use crate::types::uuid::Uuid;
use crate::{
    Error, ATT_VALUE_MAX_LEN, CHARACTERISTIC_DESCRIPTORS_MAX, CHARACTERISTIC_LISTENERS_MAX,
    SERVICE_CHARACTERISTICS_MAX, SERVICE_INCLUDES_MAX,
};

/// Characteristic properties
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CharacteristicProp {
    /// Broadcast
    Broadcast = 0x01,
    /// Read
    Read = 0x02,
    /// Write without response
    WriteWithoutResponse = 0x04,
    /// Write
    Write = 0x08,
    /// Notify
    Notify = 0x10,
    /// Indicate
    Indicate = 0x20,
    /// Authenticated writes
    AuthenticatedWrite = 0x40,
    /// Extended properties
    Extended = 0x80,
}

/// Properties of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicProps(u8);

impl<'a> From<&'a [CharacteristicProp]> for CharacteristicProps {
    fn from(props: &'a [CharacteristicProp]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= *prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl<const T: usize> From<[CharacteristicProp; T]> for CharacteristicProps {
    fn from(props: [CharacteristicProp; T]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl CharacteristicProps {
    /// Check if any of the properties are set.
    pub fn any(&self, props: &[CharacteristicProp]) -> bool {
        for p in props {
            if (*p as u8) & self.0 != 0 {
                return true;
            }
        }
        false
    }

    /// Get the properties as a raw bitmask.
    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Where a value update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueOrigin {
    /// Written by the connected peer, relayed by the controller.
    Peer,
    /// Produced locally by the application.
    Local,
}

/// Observer of characteristic value changes.
///
/// Invoked after the new value has been stored, outside the table lock, so a
/// listener may call back into the table.
pub trait ValueListener {
    /// A characteristic value changed.
    fn on_value_changed(&self, characteristic: &CharacteristicInfo<'_>, origin: ValueOrigin, value: &[u8]);
}

/// Token for a service in the attribute table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceRef(pub(crate) usize);

/// Token for a characteristic in the attribute table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharacteristicRef {
    pub(crate) service: usize,
    pub(crate) index: usize,
}

/// Token for a descriptor in the attribute table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorRef {
    pub(crate) characteristic: CharacteristicRef,
    pub(crate) index: usize,
}

/// Snapshot of a service node.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Debug)]
pub struct ServiceInfo<'d> {
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the service.
    pub uuid: Uuid,
    /// Controller handle, once bound.
    pub handle: Option<u16>,
}

/// Snapshot of a characteristic node, also handed to value listeners.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Debug)]
pub struct CharacteristicInfo<'d> {
    /// Token of this characteristic.
    pub characteristic: CharacteristicRef,
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the characteristic.
    pub uuid: Uuid,
    /// Controller handle of the owning service, once bound.
    pub service_handle: Option<u16>,
    /// Controller handle of this characteristic, once bound.
    pub handle: Option<u16>,
    /// Bytes reserved for the value.
    pub value_len: u16,
    /// Whether the value has a fixed length.
    pub fixed_len: bool,
    /// Properties bitmask.
    pub props: CharacteristicProps,
}

/// Snapshot of a descriptor node.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Debug)]
pub struct DescriptorInfo<'d> {
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the descriptor.
    pub uuid: Uuid,
}

/// A GATT service.
pub struct Service<'d> {
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the service.
    pub uuid: Uuid,
}

impl<'d> Service<'d> {
    /// Create a new service with a uuid.
    pub fn new<U: Into<Uuid>>(name: &'d str, uuid: U) -> Self {
        Self {
            name,
            uuid: uuid.into(),
        }
    }
}

/// A characteristic attached to a service.
pub struct Characteristic<'d> {
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the characteristic.
    pub uuid: Uuid,
    /// Bytes reserved for the value.
    pub value_len: u16,
    /// Whether the value has a fixed length.
    pub fixed_len: bool,
    /// Properties bitmask.
    pub props: CharacteristicProps,
}

impl<'d> Characteristic<'d> {
    /// Create a new characteristic.
    pub fn new<U: Into<Uuid>, P: Into<CharacteristicProps>>(
        name: &'d str,
        uuid: U,
        value_len: u16,
        fixed_len: bool,
        props: P,
    ) -> Self {
        Self {
            name,
            uuid: uuid.into(),
            value_len,
            fixed_len,
            props: props.into(),
        }
    }
}

/// A descriptor attached to a characteristic.
pub struct Descriptor<'d> {
    /// Display name used in logs.
    pub name: &'d str,
    /// UUID of the descriptor.
    pub uuid: Uuid,
}

impl<'d> Descriptor<'d> {
    /// Create a new descriptor.
    pub fn new<U: Into<Uuid>>(name: &'d str, uuid: U) -> Self {
        Self {
            name,
            uuid: uuid.into(),
        }
    }
}

struct DescriptorNode<'d> {
    name: &'d str,
    uuid: Uuid,
}

struct CharacteristicNode<'d> {
    name: &'d str,
    uuid: Uuid,
    handle: Option<u16>,
    value_len: u16,
    fixed_len: bool,
    props: CharacteristicProps,
    value: Vec<u8, ATT_VALUE_MAX_LEN>,
    descriptors: Vec<DescriptorNode<'d>, CHARACTERISTIC_DESCRIPTORS_MAX>,
    listeners: Vec<&'d dyn ValueListener, CHARACTERISTIC_LISTENERS_MAX>,
}

struct ServiceNode<'d> {
    name: &'d str,
    uuid: Uuid,
    handle: Option<u16>,
    includes: Vec<ServiceRef, SERVICE_INCLUDES_MAX>,
    characteristics: Vec<CharacteristicNode<'d>, SERVICE_CHARACTERISTICS_MAX>,
}

/// A table of services.
pub struct ServiceTable<'d, M: RawMutex, const MAX: usize> {
    inner: Mutex<M, RefCell<InnerTable<'d, MAX>>>,
}

struct InnerTable<'d, const MAX: usize> {
    services: Vec<ServiceNode<'d>, MAX>,
}

impl<'d, const MAX: usize> InnerTable<'d, MAX> {
    fn service(&self, service: ServiceRef) -> Result<&ServiceNode<'d>, Error> {
        self.services.get(service.0).ok_or(Error::NotFound)
    }

    fn service_mut(&mut self, service: ServiceRef) -> Result<&mut ServiceNode<'d>, Error> {
        self.services.get_mut(service.0).ok_or(Error::NotFound)
    }

    fn characteristic(&self, characteristic: CharacteristicRef) -> Result<&CharacteristicNode<'d>, Error> {
        self.services
            .get(characteristic.service)
            .and_then(|service| service.characteristics.get(characteristic.index))
            .ok_or(Error::NotFound)
    }

    fn characteristic_mut(
        &mut self,
        characteristic: CharacteristicRef,
    ) -> Result<&mut CharacteristicNode<'d>, Error> {
        self.services
            .get_mut(characteristic.service)
            .and_then(|service| service.characteristics.get_mut(characteristic.index))
            .ok_or(Error::NotFound)
    }

    fn characteristic_info(&self, characteristic: CharacteristicRef) -> Result<CharacteristicInfo<'d>, Error> {
        let service_handle = self.service(ServiceRef(characteristic.service))?.handle;
        let node = self.characteristic(characteristic)?;
        Ok(CharacteristicInfo {
            characteristic,
            name: node.name,
            uuid: node.uuid.clone(),
            service_handle,
            handle: node.handle,
            value_len: node.value_len,
            fixed_len: node.fixed_len,
            props: node.props,
        })
    }

    /// Whether `target` is reachable over the include graph starting at `from`.
    fn reaches(&self, from: ServiceRef, target: ServiceRef) -> bool {
        let Ok(node) = self.service(from) else {
            return false;
        };
        for include in node.includes.iter() {
            if *include == target || self.reaches(*include, target) {
                return true;
            }
        }
        false
    }
}

impl<'d, M: RawMutex, const MAX: usize> Default for ServiceTable<'d, M, MAX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, M: RawMutex, const MAX: usize> ServiceTable<'d, M, MAX> {
    /// Create a new service table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(InnerTable { services: Vec::new() })),
        }
    }

    fn with_inner<F: FnOnce(&mut InnerTable<'d, MAX>) -> R, R>(&self, f: F) -> R {
        self.inner.lock(|inner| {
            let mut table = inner.borrow_mut();
            f(&mut table)
        })
    }

    /// Add a service to the table.
    pub fn add_service(&self, service: Service<'d>) -> Result<ServiceRef, Error> {
        self.with_inner(|inner| {
            let index = inner.services.len();
            inner
                .services
                .push(ServiceNode {
                    name: service.name,
                    uuid: service.uuid,
                    handle: None,
                    includes: Vec::new(),
                    characteristics: Vec::new(),
                })
                .map_err(|_| Error::Capacity)?;
            Ok(ServiceRef(index))
        })
    }

    /// Add a characteristic to a service.
    pub fn add_characteristic(
        &self,
        service: ServiceRef,
        characteristic: Characteristic<'d>,
    ) -> Result<CharacteristicRef, Error> {
        if characteristic.value_len as usize > ATT_VALUE_MAX_LEN {
            return Err(Error::ValueTooLong);
        }
        self.with_inner(|inner| {
            let node = inner.service_mut(service)?;
            let index = node.characteristics.len();
            node.characteristics
                .push(CharacteristicNode {
                    name: characteristic.name,
                    uuid: characteristic.uuid,
                    handle: None,
                    value_len: characteristic.value_len,
                    fixed_len: characteristic.fixed_len,
                    props: characteristic.props,
                    value: Vec::new(),
                    descriptors: Vec::new(),
                    listeners: Vec::new(),
                })
                .map_err(|_| Error::Capacity)?;
            Ok(CharacteristicRef {
                service: service.0,
                index,
            })
        })
    }

    /// Add a descriptor to a characteristic.
    pub fn add_descriptor(
        &self,
        characteristic: CharacteristicRef,
        descriptor: Descriptor<'d>,
    ) -> Result<DescriptorRef, Error> {
        self.with_inner(|inner| {
            let node = inner.characteristic_mut(characteristic)?;
            let index = node.descriptors.len();
            node.descriptors
                .push(DescriptorNode {
                    name: descriptor.name,
                    uuid: descriptor.uuid,
                })
                .map_err(|_| Error::Capacity)?;
            Ok(DescriptorRef {
                characteristic,
                index,
            })
        })
    }

    /// Include another service in a service.
    ///
    /// The include graph must stay acyclic.
    pub fn add_include(&self, service: ServiceRef, include: ServiceRef) -> Result<(), Error> {
        self.with_inner(|inner| {
            inner.service(include)?;
            if service == include || inner.reaches(include, service) {
                return Err(Error::IncludeCycle);
            }
            let node = inner.service_mut(service)?;
            node.includes.push(include).map_err(|_| Error::Capacity)?;
            Ok(())
        })
    }

    /// Attach a listener to a characteristic.
    pub fn register_listener(
        &self,
        characteristic: CharacteristicRef,
        listener: &'d dyn ValueListener,
    ) -> Result<(), Error> {
        self.with_inner(|inner| {
            let node = inner.characteristic_mut(characteristic)?;
            node.listeners.push(listener).map_err(|_| Error::Capacity)
        })
    }

    /// Store a new characteristic value and fan it out to the listeners.
    ///
    /// The payload must fit the reserved value storage, otherwise the update
    /// is rejected without side effects. Listeners run after the store, with
    /// the table unlocked.
    pub fn update_value(
        &self,
        characteristic: CharacteristicRef,
        origin: ValueOrigin,
        value: &[u8],
    ) -> Result<(), Error> {
        let (info, listeners) = self.with_inner(|inner| {
            let info = inner.characteristic_info(characteristic)?;
            let node = inner.characteristic_mut(characteristic)?;
            if value.len() > node.value_len as usize {
                return Err(Error::ValueTooLong);
            }
            node.value.clear();
            node.value.extend_from_slice(value).map_err(|_| Error::ValueTooLong)?;
            Ok((info, node.listeners.clone()))
        })?;
        for listener in listeners.iter() {
            listener.on_value_changed(&info, origin, value);
        }
        Ok(())
    }

    /// Read the value of the characteristic and pass the value to the provided closure.
    ///
    /// The return value of the closure is returned in this function and is assumed to be infallible.
    ///
    /// If the characteristic cannot be found, an error is returned.
    pub fn get<F: FnMut(&[u8]) -> T, T>(&self, characteristic: CharacteristicRef, mut f: F) -> Result<T, Error> {
        self.with_inner(|inner| {
            let node = inner.characteristic(characteristic)?;
            Ok(f(&node.value))
        })
    }

    /// Snapshot a service node.
    pub fn service_info(&self, service: ServiceRef) -> Result<ServiceInfo<'d>, Error> {
        self.with_inner(|inner| {
            let node = inner.service(service)?;
            Ok(ServiceInfo {
                name: node.name,
                uuid: node.uuid.clone(),
                handle: node.handle,
            })
        })
    }

    /// Snapshot a characteristic node.
    pub fn characteristic_info(&self, characteristic: CharacteristicRef) -> Result<CharacteristicInfo<'d>, Error> {
        self.with_inner(|inner| inner.characteristic_info(characteristic))
    }

    /// Snapshot a descriptor node.
    pub fn descriptor_info(&self, descriptor: DescriptorRef) -> Result<DescriptorInfo<'d>, Error> {
        self.with_inner(|inner| {
            let node = inner
                .characteristic(descriptor.characteristic)?
                .descriptors
                .get(descriptor.index)
                .ok_or(Error::NotFound)?;
            Ok(DescriptorInfo {
                name: node.name,
                uuid: node.uuid.clone(),
            })
        })
    }

    /// Number of characteristics attached to a service.
    pub fn characteristic_count(&self, service: ServiceRef) -> Result<usize, Error> {
        self.with_inner(|inner| Ok(inner.service(service)?.characteristics.len()))
    }

    /// Token of the characteristic at `index` within a service.
    pub fn characteristic_at(&self, service: ServiceRef, index: usize) -> Result<CharacteristicRef, Error> {
        self.with_inner(|inner| {
            let node = inner.service(service)?;
            if index >= node.characteristics.len() {
                return Err(Error::NotFound);
            }
            Ok(CharacteristicRef {
                service: service.0,
                index,
            })
        })
    }

    /// Number of services included by a service.
    pub fn include_count(&self, service: ServiceRef) -> Result<usize, Error> {
        self.with_inner(|inner| Ok(inner.service(service)?.includes.len()))
    }

    /// Token of the service included at `index`.
    pub fn include_at(&self, service: ServiceRef, index: usize) -> Result<ServiceRef, Error> {
        self.with_inner(|inner| {
            inner
                .service(service)?
                .includes
                .get(index)
                .copied()
                .ok_or(Error::NotFound)
        })
    }

    /// Number of descriptors attached to a characteristic.
    pub fn descriptor_count(&self, characteristic: CharacteristicRef) -> Result<usize, Error> {
        self.with_inner(|inner| Ok(inner.characteristic(characteristic)?.descriptors.len()))
    }

    /// Record the controller handle of a service. Valid once.
    pub(crate) fn set_service_handle(&self, service: ServiceRef, handle: u16) -> Result<(), Error> {
        self.with_inner(|inner| {
            let node = inner.service_mut(service)?;
            if node.handle.is_some() {
                return Err(Error::AlreadyBound);
            }
            node.handle = Some(handle);
            Ok(())
        })
    }

    /// Record the controller handle of a characteristic. Valid once.
    pub(crate) fn set_characteristic_handle(
        &self,
        characteristic: CharacteristicRef,
        handle: u16,
    ) -> Result<(), Error> {
        self.with_inner(|inner| {
            let node = inner.characteristic_mut(characteristic)?;
            if node.handle.is_some() {
                return Err(Error::AlreadyBound);
            }
            node.handle = Some(handle);
            Ok(())
        })
    }
}
