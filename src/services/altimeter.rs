//! Altimeter service.
//!
//! Exposes the five tracked altitudes and lets the peer adjust them through a
//! write only command characteristic.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::{
    Characteristic, CharacteristicInfo, CharacteristicProp, CharacteristicRef, Service, ServiceRef,
    ServiceTable, Uuid, ValueListener, ValueOrigin,
};
use crate::scheduler::GattService;
use crate::Error;

const SERVICE_UUID: &str = "516c5737-8250-493b-bb95-b2a16f65110e";
const ALTITUDES_UUID: &str = "f033de08-eda3-46a2-9918-19e123297152";
const COMMAND_UUID: &str = "b176dd1b-d98e-4707-b51d-d0e31223f776";

const CMD_SET_MAIN_ALTI: u16 = 0x1000;
const CMD_SET_ALTI_1: u16 = 0x1001;
const CMD_SET_ALTI_2: u16 = 0x1002;
const CMD_SET_ALTI_3: u16 = 0x1003;
const CMD_SET_ALTI_4: u16 = 0x1004;

/// Tracked altitudes, all in 0.1 m.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Altitudes {
    /// Main altitude.
    pub main: i32,
    /// Altitude 1.
    pub alti1: i32,
    /// Altitude 2.
    pub alti2: i32,
    /// Altitude 3.
    pub alti3: i32,
    /// Altitude 4.
    pub alti4: i32,
}

/// Source and sink of altitude data.
pub trait AltitudeProvider {
    /// Current altitudes.
    fn altitudes(&self) -> Altitudes;

    /// Set the reference altitude, in 0.1 m.
    fn set_reference_altitude(&self, altitude: i32);

    /// Set altitude 1, in 0.1 m.
    fn set_alti1(&self, altitude: i32);

    /// Set altitude 2, in 0.1 m.
    fn set_alti2(&self, altitude: i32);

    /// Set altitude 3, in 0.1 m.
    fn set_alti3(&self, altitude: i32);

    /// Set altitude 4, in 0.1 m.
    fn set_alti4(&self, altitude: i32);
}

/// GATT altimeter service.
///
/// The altitudes characteristic carries five little endian `i16` values in
/// meters. Commands arrive as an `i16` altitude argument in meters followed
/// by a `u16` command id.
pub struct AltimeterService<'d, M: RawMutex, const MAX: usize> {
    table: &'d ServiceTable<'d, M, MAX>,
    service: ServiceRef,
    altitudes: CharacteristicRef,
    command: CharacteristicRef,
    provider: &'d dyn AltitudeProvider,
}

impl<'d, M: RawMutex, const MAX: usize> AltimeterService<'d, M, MAX> {
    /// Compose the service in `table`.
    pub fn new(
        table: &'d ServiceTable<'d, M, MAX>,
        provider: &'d dyn AltitudeProvider,
    ) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Altimeter service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        let altitudes = table.add_characteristic(
            service,
            Characteristic::new(
                "Altitudes",
                Uuid::parse_uuid128(ALTITUDES_UUID),
                10,
                true,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
            ),
        )?;
        let command = table.add_characteristic(
            service,
            Characteristic::new(
                "Command",
                Uuid::parse_uuid128(COMMAND_UUID),
                4,
                true,
                [CharacteristicProp::Write],
            ),
        )?;
        Ok(Self {
            table,
            service,
            altitudes,
            command,
            provider,
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }

    /// Listen for peer commands.
    pub fn start(&'d self) -> Result<(), Error> {
        self.table.register_listener(self.command, self)
    }

    fn apply_command(&self, value: &[u8]) {
        let Ok(raw) = <[u8; 4]>::try_from(value) else {
            warn!("[altimeter] command write with {} bytes, expected 4", value.len());
            return;
        };
        let altitude = i16::from_le_bytes([raw[0], raw[1]]) as i32 * 10;
        let command = u16::from_le_bytes([raw[2], raw[3]]);
        match command {
            CMD_SET_MAIN_ALTI => self.provider.set_reference_altitude(altitude),
            CMD_SET_ALTI_1 => self.provider.set_alti1(altitude),
            CMD_SET_ALTI_2 => self.provider.set_alti2(altitude),
            CMD_SET_ALTI_3 => self.provider.set_alti3(altitude),
            CMD_SET_ALTI_4 => self.provider.set_alti4(altitude),
            other => debug!("[altimeter] ignoring unknown command {}", other),
        }
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for AltimeterService<'d, M, MAX> {
    fn refresh(&self) {
        let altitudes = self.provider.altitudes();
        let mut value = [0u8; 10];
        for (chunk, altitude) in value.chunks_exact_mut(2).zip([
            altitudes.main,
            altitudes.alti1,
            altitudes.alti2,
            altitudes.alti3,
            altitudes.alti4,
        ]) {
            chunk.copy_from_slice(&((altitude / 10) as i16).to_le_bytes());
        }
        if self
            .table
            .update_value(self.altitudes, ValueOrigin::Local, &value)
            .is_err()
        {
            warn!("[altimeter] altitude update rejected");
        }
    }
}

impl<'d, M: RawMutex, const MAX: usize> ValueListener for AltimeterService<'d, M, MAX> {
    fn on_value_changed(&self, _characteristic: &CharacteristicInfo<'_>, origin: ValueOrigin, value: &[u8]) {
        // Only peer writes carry commands.
        if origin != ValueOrigin::Peer {
            return;
        }
        self.apply_command(value);
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;
    use core::mem::ManuallyDrop;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    #[derive(Default)]
    struct FakeAltimeter {
        main: Cell<i32>,
        alti1: Cell<i32>,
        alti2: Cell<i32>,
        alti3: Cell<i32>,
        alti4: Cell<i32>,
    }

    impl AltitudeProvider for FakeAltimeter {
        fn altitudes(&self) -> Altitudes {
            Altitudes {
                main: self.main.get(),
                alti1: self.alti1.get(),
                alti2: self.alti2.get(),
                alti3: self.alti3.get(),
                alti4: self.alti4.get(),
            }
        }

        fn set_reference_altitude(&self, altitude: i32) {
            self.main.set(altitude);
        }

        fn set_alti1(&self, altitude: i32) {
            self.alti1.set(altitude);
        }

        fn set_alti2(&self, altitude: i32) {
            self.alti2.set(altitude);
        }

        fn set_alti3(&self, altitude: i32) {
            self.alti3.set(altitude);
        }

        fn set_alti4(&self, altitude: i32) {
            self.alti4.set(altitude);
        }
    }

    fn command_bytes(command: u16, altitude: i16) -> [u8; 4] {
        let mut value = [0u8; 4];
        value[..2].copy_from_slice(&altitude.to_le_bytes());
        value[2..].copy_from_slice(&command.to_le_bytes());
        value
    }

    #[test]
    fn refresh_encodes_altitudes_in_meters() {
        let provider = FakeAltimeter::default();
        provider.main.set(12345);
        provider.alti1.set(-200);
        let table: ManuallyDrop<ServiceTable<'_, NoopRawMutex, 4>> = ManuallyDrop::new(ServiceTable::new());
        let service = AltimeterService::new(&table, &provider).unwrap();

        service.refresh();

        table
            .get(service.altitudes, |value| {
                assert_eq!(value.len(), 10);
                assert_eq!(i16::from_le_bytes([value[0], value[1]]), 1234);
                assert_eq!(i16::from_le_bytes([value[2], value[3]]), -20);
                assert_eq!(&value[4..], &[0; 6]);
            })
            .unwrap();
    }

    #[test]
    fn peer_commands_reach_the_provider() {
        let provider = FakeAltimeter::default();
        let table: ManuallyDrop<ServiceTable<'_, NoopRawMutex, 4>> = ManuallyDrop::new(ServiceTable::new());
        let service = AltimeterService::new(&table, &provider).unwrap();
        let info = table.characteristic_info(service.command).unwrap();

        service.on_value_changed(&info, ValueOrigin::Peer, &command_bytes(CMD_SET_ALTI_2, 570));
        assert_eq!(provider.alti2.get(), 5700);

        service.on_value_changed(&info, ValueOrigin::Peer, &command_bytes(CMD_SET_MAIN_ALTI, -12));
        assert_eq!(provider.main.get(), -120);
    }

    #[test]
    fn malformed_and_local_writes_are_ignored() {
        let provider = FakeAltimeter::default();
        let table: ManuallyDrop<ServiceTable<'_, NoopRawMutex, 4>> = ManuallyDrop::new(ServiceTable::new());
        let service = AltimeterService::new(&table, &provider).unwrap();
        let info = table.characteristic_info(service.command).unwrap();

        service.on_value_changed(&info, ValueOrigin::Local, &command_bytes(CMD_SET_ALTI_1, 100));
        service.on_value_changed(&info, ValueOrigin::Peer, &[0, 1, 2]);
        service.on_value_changed(&info, ValueOrigin::Peer, &command_bytes(0x2000, 100));

        assert_eq!(provider.altitudes(), Altitudes::default());
    }
}
