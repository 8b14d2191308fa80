//! Variometer service.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::{
    Characteristic, CharacteristicProp, CharacteristicRef, Service, ServiceRef, ServiceTable, Uuid,
    ValueOrigin,
};
use crate::scheduler::GattService;
use crate::Error;

const SERVICE_UUID: &str = "ae283ac8-786f-42ef-b694-b7faf492cae9";
const VARIO_ACCELERATION_UUID: &str = "7708157c-132f-4d21-a1d9-c9768732b4e9";

/// Source of the vertical speed.
pub trait VarioProvider {
    /// Current vertical speed, in 0.1 m/s.
    fn vario(&self) -> i16;
}

/// GATT variometer service.
pub struct VariometerService<'d, M: RawMutex, const MAX: usize> {
    table: &'d ServiceTable<'d, M, MAX>,
    service: ServiceRef,
    vario_acceleration: CharacteristicRef,
    provider: &'d dyn VarioProvider,
}

impl<'d, M: RawMutex, const MAX: usize> VariometerService<'d, M, MAX> {
    /// Compose the service in `table`.
    pub fn new(
        table: &'d ServiceTable<'d, M, MAX>,
        provider: &'d dyn VarioProvider,
    ) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Variometer service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        let vario_acceleration = table.add_characteristic(
            service,
            Characteristic::new(
                "Vario-Acceleration",
                Uuid::parse_uuid128(VARIO_ACCELERATION_UUID),
                4,
                true,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
            ),
        )?;
        Ok(Self {
            table,
            service,
            vario_acceleration,
            provider,
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for VariometerService<'d, M, MAX> {
    fn refresh(&self) {
        // Acceleration half stays zero, no accelerometer feeds it.
        let mut value = [0u8; 4];
        value[..2].copy_from_slice(&self.provider.vario().to_le_bytes());
        if self
            .table
            .update_value(self.vario_acceleration, ValueOrigin::Local, &value)
            .is_err()
        {
            warn!("[variometer] vario update rejected");
        }
    }
}
