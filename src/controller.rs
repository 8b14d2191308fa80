//! Controller interface.

use heapless::String;

use crate::attribute::{CharacteristicProps, Uuid};
use crate::Error;

/// Max length of the advertised device name.
pub const DEVICE_NAME_MAX_LEN: usize = 31;

/// Length of a hardware address.
pub const HW_ADDRESS_LEN: usize = 6;

/// Identity pushed to the controller before binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Advertised device name.
    pub name: String<DEVICE_NAME_MAX_LEN>,
    /// Hardware address, least significant byte first.
    pub hw_address: [u8; HW_ADDRESS_LEN],
}

impl DeviceConfig {
    /// Create a config, rejecting names longer than [`DEVICE_NAME_MAX_LEN`] bytes.
    pub fn new(name: &str, hw_address: [u8; HW_ADDRESS_LEN]) -> Result<Self, Error> {
        let name = String::try_from(name).map_err(|_| Error::Capacity)?;
        Ok(Self { name, hw_address })
    }
}

/// Interface to a BLE controller owning the attribute storage.
///
/// Handles returned by [`Controller::add_service`] and
/// [`Controller::add_characteristic`] are the controller's identifiers and are
/// echoed back verbatim on value updates.
pub trait Controller {
    /// Error raised by the controller.
    type Error: core::fmt::Debug;

    /// Check whether the controller responds.
    fn probe(&self) -> bool;

    /// Apply the device identity.
    fn set_device_configuration(&self, config: &DeviceConfig) -> Result<(), Self::Error>;

    /// Register a service spanning `attribute_count` attributes.
    fn add_service(&self, uuid: &Uuid, primary: bool, attribute_count: u8) -> Result<u16, Self::Error>;

    /// Register a characteristic within a previously registered service.
    fn add_characteristic(
        &self,
        service_handle: u16,
        uuid: &Uuid,
        value_len: u16,
        fixed_len: bool,
        props: CharacteristicProps,
    ) -> Result<u16, Self::Error>;

    /// Push a new characteristic value to the controller.
    fn update_characteristic_value(
        &self,
        service_handle: u16,
        characteristic_handle: u16,
        value: &[u8],
    ) -> Result<(), Self::Error>;

    /// Hook run by the update worker when a client connects.
    fn connect_actions(&self) {}

    /// Hook run by the update worker when a client disconnects.
    fn disconnect_actions(&self) {}
}
