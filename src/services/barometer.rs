//! Barometer service.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::{
    Characteristic, CharacteristicProp, CharacteristicRef, Service, ServiceRef, ServiceTable, Uuid,
    ValueOrigin,
};
use crate::scheduler::GattService;
use crate::Error;

const SERVICE_UUID: &str = "d29a5ba1-e46c-4e2c-a1b7-05f21091a216";
const PRESSURE_TEMPERATURE_UUID: &str = "a59b4f7f-47ec-4515-b561-497209d3e8f2";
const MIN_MAX_UUID: &str = "88db8fd5-8362-429b-bfc8-c74aa6c2de44";

/// One temperature and pressure reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PressureSample {
    /// Temperature, in 0.1 °C.
    pub temperature: i16,
    /// Pressure, in 0.01 mbar.
    pub pressure: u32,
}

/// Extreme readings since power up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PressureExtremes {
    /// Lowest temperature, in 0.1 °C.
    pub min_temperature: i16,
    /// Highest temperature, in 0.1 °C.
    pub max_temperature: i16,
    /// Lowest pressure, in 0.01 mbar.
    pub min_pressure: u32,
    /// Highest pressure, in 0.01 mbar.
    pub max_pressure: u32,
}

/// Source of pressure and temperature data.
pub trait PressureProvider {
    /// Latest reading.
    fn current(&self) -> PressureSample;

    /// Extremes seen so far.
    fn extremes(&self) -> PressureExtremes;
}

/// GATT barometer service.
pub struct BarometerService<'d, M: RawMutex, const MAX: usize> {
    table: &'d ServiceTable<'d, M, MAX>,
    service: ServiceRef,
    pressure_temperature: CharacteristicRef,
    min_max: CharacteristicRef,
    provider: &'d dyn PressureProvider,
}

impl<'d, M: RawMutex, const MAX: usize> BarometerService<'d, M, MAX> {
    /// Compose the service in `table`.
    pub fn new(
        table: &'d ServiceTable<'d, M, MAX>,
        provider: &'d dyn PressureProvider,
    ) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Barometer service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        let pressure_temperature = table.add_characteristic(
            service,
            Characteristic::new(
                "Pressure-Temperature",
                Uuid::parse_uuid128(PRESSURE_TEMPERATURE_UUID),
                6,
                true,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
            ),
        )?;
        let min_max = table.add_characteristic(
            service,
            Characteristic::new(
                "Min-Max",
                Uuid::parse_uuid128(MIN_MAX_UUID),
                12,
                true,
                [CharacteristicProp::Read],
            ),
        )?;
        Ok(Self {
            table,
            service,
            pressure_temperature,
            min_max,
            provider,
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for BarometerService<'d, M, MAX> {
    fn refresh(&self) {
        let sample = self.provider.current();
        let mut value = [0u8; 6];
        value[..2].copy_from_slice(&sample.temperature.to_le_bytes());
        value[2..].copy_from_slice(&sample.pressure.to_le_bytes());
        if self
            .table
            .update_value(self.pressure_temperature, ValueOrigin::Local, &value)
            .is_err()
        {
            warn!("[barometer] pressure update rejected");
        }

        let extremes = self.provider.extremes();
        let mut value = [0u8; 12];
        value[..2].copy_from_slice(&extremes.min_temperature.to_le_bytes());
        value[2..4].copy_from_slice(&extremes.max_temperature.to_le_bytes());
        value[4..8].copy_from_slice(&extremes.min_pressure.to_le_bytes());
        value[8..].copy_from_slice(&extremes.max_pressure.to_le_bytes());
        if self
            .table
            .update_value(self.min_max, ValueOrigin::Local, &value)
            .is_err()
        {
            warn!("[barometer] min-max update rejected");
        }
    }
}
