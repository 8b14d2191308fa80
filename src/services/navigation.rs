//! Navigation service.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::{
    Characteristic, CharacteristicProp, CharacteristicRef, Service, ServiceRef, ServiceTable, Uuid,
    ValueOrigin,
};
use crate::scheduler::GattService;
use crate::Error;

const SERVICE_UUID: &str = "530b9c7a-3185-49f0-9bb5-8e7b88a9df09";
const NAV_DATA_UUID: &str = "609a0afe-59a2-4837-b4fe-46d2ddfec0dd";

/// One GNSS fix.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NavFix {
    /// Number of satellites in view.
    pub satellite_count: u8,
    /// Latitude, in degrees.
    pub latitude: f64,
    /// Longitude, in degrees.
    pub longitude: f64,
    /// Ground speed, in 0.1 m/s.
    pub speed: u32,
    /// Track angle, in 0.1 degree.
    pub track_angle: u16,
}

/// Source of navigation data.
pub trait NavProvider {
    /// Latest fix.
    fn fix(&self) -> NavFix;
}

/// GATT navigation service.
pub struct NavigationService<'d, M: RawMutex, const MAX: usize> {
    table: &'d ServiceTable<'d, M, MAX>,
    service: ServiceRef,
    nav_data: CharacteristicRef,
    provider: &'d dyn NavProvider,
}

impl<'d, M: RawMutex, const MAX: usize> NavigationService<'d, M, MAX> {
    /// Compose the service in `table`.
    pub fn new(table: &'d ServiceTable<'d, M, MAX>, provider: &'d dyn NavProvider) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Navigation service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        let nav_data = table.add_characteristic(
            service,
            Characteristic::new(
                "Navigation data",
                Uuid::parse_uuid128(NAV_DATA_UUID),
                23,
                true,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
            ),
        )?;
        Ok(Self {
            table,
            service,
            nav_data,
            provider,
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for NavigationService<'d, M, MAX> {
    fn refresh(&self) {
        let fix = self.provider.fix();
        let mut value = [0u8; 23];
        value[0] = fix.satellite_count;
        value[1..9].copy_from_slice(&fix.latitude.to_le_bytes());
        value[9..17].copy_from_slice(&fix.longitude.to_le_bytes());
        value[17..21].copy_from_slice(&fix.speed.to_le_bytes());
        value[21..].copy_from_slice(&fix.track_angle.to_le_bytes());
        if self
            .table
            .update_value(self.nav_data, ValueOrigin::Local, &value)
            .is_err()
        {
            warn!("[navigation] fix update rejected");
        }
    }
}
