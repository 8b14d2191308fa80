//! Bring-up of the full flight instrument against a recording controller.

use std::cell::Cell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gatt_peripheral::attribute::{ServiceTable, Uuid};
use gatt_peripheral::events::{self, UpdateEvents};
use gatt_peripheral::mock_controller::MockController;
use gatt_peripheral::scheduler::{GattService, UpdateScheduler, DEFAULT_UPDATE_PERIOD};
use gatt_peripheral::services::{
    AltimeterService, AltitudeProvider, Altitudes, BarometerService, DeviceIdentity,
    FlightDataService, IdentificationService, NavFix, NavProvider, NavigationService,
    PressureExtremes, PressureProvider, PressureSample, VarioProvider, VariometerService,
};
use gatt_peripheral::stack::GattPeripheral;

const TABLE_MAX: usize = 8;

type Table = ServiceTable<'static, NoopRawMutex, TABLE_MAX>;
type Peripheral = GattPeripheral<'static, MockController<NoopRawMutex>, NoopRawMutex, TABLE_MAX>;
type Scheduler = UpdateScheduler<'static, NoopRawMutex, 4>;

const IDENTIFICATION_UUID: &str = "38df4da7-94f3-44dc-83ad-4e10864fbd44";
const BAROMETER_UUID: &str = "d29a5ba1-e46c-4e2c-a1b7-05f21091a216";
const ALTIMETER_UUID: &str = "516c5737-8250-493b-bb95-b2a16f65110e";
const VARIOMETER_UUID: &str = "ae283ac8-786f-42ef-b694-b7faf492cae9";
const NAVIGATION_UUID: &str = "530b9c7a-3185-49f0-9bb5-8e7b88a9df09";

// Handles the recording controller hands out during bring-up, in bind order.
const IDENT_SERVICE: u16 = 1;
const IDENT_COMMAND: u16 = 2;
const IDENT_INFO: u16 = 3;
const BARO_SERVICE: u16 = 4;
const BARO_PRESSURE_TEMPERATURE: u16 = 5;
const BARO_MIN_MAX: u16 = 6;
const ALTI_SERVICE: u16 = 7;
const ALTI_ALTITUDES: u16 = 8;
const ALTI_COMMAND: u16 = 9;
const VARIO_SERVICE: u16 = 10;
const VARIO_DATA: u16 = 11;
const NAV_SERVICE: u16 = 12;
const NAV_DATA: u16 = 13;

// Peer protocol bytes.
const CMD_SET_MAIN_ALTI: u16 = 0x1000;
const CMD_RD_HARD_SERIAL_NUMBER: u8 = 5;

#[derive(Default)]
struct Sensors {
    altitudes: Cell<Altitudes>,
    sample: Cell<PressureSample>,
    extremes: Cell<PressureExtremes>,
    vario: Cell<i16>,
    fix: Cell<NavFix>,
}

impl AltitudeProvider for Sensors {
    fn altitudes(&self) -> Altitudes {
        self.altitudes.get()
    }

    fn set_reference_altitude(&self, altitude: i32) {
        let mut altitudes = self.altitudes.get();
        altitudes.main = altitude;
        self.altitudes.set(altitudes);
    }

    fn set_alti1(&self, altitude: i32) {
        let mut altitudes = self.altitudes.get();
        altitudes.alti1 = altitude;
        self.altitudes.set(altitudes);
    }

    fn set_alti2(&self, altitude: i32) {
        let mut altitudes = self.altitudes.get();
        altitudes.alti2 = altitude;
        self.altitudes.set(altitudes);
    }

    fn set_alti3(&self, altitude: i32) {
        let mut altitudes = self.altitudes.get();
        altitudes.alti3 = altitude;
        self.altitudes.set(altitudes);
    }

    fn set_alti4(&self, altitude: i32) {
        let mut altitudes = self.altitudes.get();
        altitudes.alti4 = altitude;
        self.altitudes.set(altitudes);
    }
}

impl PressureProvider for Sensors {
    fn current(&self) -> PressureSample {
        self.sample.get()
    }

    fn extremes(&self) -> PressureExtremes {
        self.extremes.get()
    }
}

impl VarioProvider for Sensors {
    fn vario(&self) -> i16 {
        self.vario.get()
    }
}

impl NavProvider for Sensors {
    fn fix(&self) -> NavFix {
        self.fix.get()
    }
}

impl DeviceIdentity for Sensors {
    fn software_version(&self) -> &str {
        "1.4.2"
    }

    fn software_manufacturer(&self) -> &str {
        "Open Flight Systems"
    }

    fn hardware_version(&self) -> &str {
        "rev C"
    }

    fn hardware_manufacturer(&self) -> &str {
        "Skytronics"
    }

    fn hardware_serial_number(&self) -> &str {
        "SN-000042"
    }

    fn hardware_manufacturing_date(&self) -> &str {
        "2024-11-05"
    }
}

struct Rig {
    sensors: &'static Sensors,
    table: &'static Table,
    peripheral: &'static Peripheral,
    hub: &'static UpdateEvents<NoopRawMutex>,
    scheduler: Scheduler,
    flight: &'static FlightDataService<'static, NoopRawMutex, TABLE_MAX>,
}

/// Compose and bind the whole instrument the way firmware main would.
fn bring_up() -> Rig {
    let _ = env_logger::try_init();
    let sensors: &'static Sensors = Box::leak(Box::new(Sensors::default()));
    let table: &'static Table = Box::leak(Box::new(ServiceTable::new()));

    let identification: &'static IdentificationService<'static, NoopRawMutex, TABLE_MAX> =
        Box::leak(Box::new(IdentificationService::new(table, sensors).unwrap()));
    let barometer = Box::leak(Box::new(BarometerService::new(table, sensors).unwrap()));
    let altimeter = Box::leak(Box::new(AltimeterService::new(table, sensors).unwrap()));
    let variometer = Box::leak(Box::new(VariometerService::new(table, sensors).unwrap()));
    let navigation = Box::leak(Box::new(NavigationService::new(table, sensors).unwrap()));
    let flight: &'static FlightDataService<'static, NoopRawMutex, TABLE_MAX> = Box::leak(Box::new(
        FlightDataService::new(table, barometer, altimeter, variometer, navigation).unwrap(),
    ));

    let peripheral: &'static Peripheral =
        Box::leak(Box::new(GattPeripheral::new(MockController::new(), table)));
    let hub: &'static UpdateEvents<NoopRawMutex> = Box::leak(Box::new(UpdateEvents::new()));

    let mut scheduler = Scheduler::new(hub, DEFAULT_UPDATE_PERIOD);
    let identification_request = scheduler.register(identification).unwrap();
    scheduler.register(flight).unwrap();

    peripheral
        .bind(&[identification.service(), flight.service()], true)
        .unwrap();
    flight.start().unwrap();
    identification.start(identification_request).unwrap();

    Rig {
        sensors,
        table,
        peripheral,
        hub,
        scheduler,
        flight,
    }
}

#[test]
fn full_tree_binds_with_stable_handles() {
    let rig = bring_up();
    let mock = rig.peripheral.controller();

    // The composite group itself never reaches the controller.
    assert_eq!(mock.service_count(), 5);
    assert_eq!(rig.table.service_info(rig.flight.service()).unwrap().handle, None);

    let expected = [
        (IDENTIFICATION_UUID, IDENT_SERVICE, 5),
        (BAROMETER_UUID, BARO_SERVICE, 5),
        (ALTIMETER_UUID, ALTI_SERVICE, 5),
        (VARIOMETER_UUID, VARIO_SERVICE, 3),
        (NAVIGATION_UUID, NAV_SERVICE, 3),
    ];
    for (index, (uuid, handle, attribute_count)) in expected.into_iter().enumerate() {
        let record = mock.service(index).unwrap();
        assert_eq!(record.uuid, Uuid::parse_uuid128(uuid));
        assert!(record.primary);
        assert_eq!(record.handle, handle);
        assert_eq!(record.attribute_count, attribute_count);
    }

    let expected = [
        (IDENT_SERVICE, IDENT_COMMAND),
        (IDENT_SERVICE, IDENT_INFO),
        (BARO_SERVICE, BARO_PRESSURE_TEMPERATURE),
        (BARO_SERVICE, BARO_MIN_MAX),
        (ALTI_SERVICE, ALTI_ALTITUDES),
        (ALTI_SERVICE, ALTI_COMMAND),
        (VARIO_SERVICE, VARIO_DATA),
        (NAV_SERVICE, NAV_DATA),
    ];
    assert_eq!(mock.characteristic_count(), expected.len());
    for (index, (service_handle, handle)) in expected.into_iter().enumerate() {
        let record = mock.characteristic(index).unwrap();
        assert_eq!(record.service_handle, service_handle);
        assert_eq!(record.handle, handle);
    }

    // Starting the identification service publishes the layout version.
    assert_eq!(mock.update_count(), 1);
    let update = mock.update(0).unwrap();
    assert_eq!(update.service_handle, IDENT_SERVICE);
    assert_eq!(update.characteristic_handle, IDENT_INFO);
    assert_eq!(update.value.as_slice(), b"1.0");
}

#[test]
fn flight_refresh_publishes_every_instrument() {
    let rig = bring_up();
    rig.sensors.altitudes.set(Altitudes {
        main: 12345,
        alti1: -200,
        alti2: 5,
        alti3: 0,
        alti4: 32767,
    });
    rig.sensors.sample.set(PressureSample {
        temperature: -53,
        pressure: 101325,
    });
    rig.sensors.extremes.set(PressureExtremes {
        min_temperature: -120,
        max_temperature: 251,
        min_pressure: 99000,
        max_pressure: 102500,
    });
    rig.sensors.vario.set(-25);
    rig.sensors.fix.set(NavFix {
        satellite_count: 9,
        latitude: 45.188529,
        longitude: 5.724524,
        speed: 72,
        track_angle: 1845,
    });
    let mock = rig.peripheral.controller();
    let baseline = mock.update_count();

    rig.flight.refresh();

    assert_eq!(mock.update_count(), baseline + 5);

    let mut pressure_temperature = Vec::new();
    pressure_temperature.extend_from_slice(&(-53i16).to_le_bytes());
    pressure_temperature.extend_from_slice(&101325u32.to_le_bytes());

    let mut min_max = Vec::new();
    min_max.extend_from_slice(&(-120i16).to_le_bytes());
    min_max.extend_from_slice(&251i16.to_le_bytes());
    min_max.extend_from_slice(&99000u32.to_le_bytes());
    min_max.extend_from_slice(&102500u32.to_le_bytes());

    // Altitudes go out in whole meters.
    let mut altitudes = Vec::new();
    for meters in [1234i16, -20, 0, 0, 3276] {
        altitudes.extend_from_slice(&meters.to_le_bytes());
    }

    let mut vario = Vec::new();
    vario.extend_from_slice(&(-25i16).to_le_bytes());
    vario.extend_from_slice(&0u16.to_le_bytes());

    let mut nav = vec![9u8];
    nav.extend_from_slice(&45.188529f64.to_le_bytes());
    nav.extend_from_slice(&5.724524f64.to_le_bytes());
    nav.extend_from_slice(&72u32.to_le_bytes());
    nav.extend_from_slice(&1845u16.to_le_bytes());

    let expected: [(u16, u16, &[u8]); 5] = [
        (BARO_SERVICE, BARO_PRESSURE_TEMPERATURE, &pressure_temperature),
        (BARO_SERVICE, BARO_MIN_MAX, &min_max),
        (ALTI_SERVICE, ALTI_ALTITUDES, &altitudes),
        (VARIO_SERVICE, VARIO_DATA, &vario),
        (NAV_SERVICE, NAV_DATA, &nav),
    ];
    for (index, (service_handle, handle, value)) in expected.into_iter().enumerate() {
        let update = mock.update(baseline + index).unwrap();
        assert_eq!(update.service_handle, service_handle);
        assert_eq!(update.characteristic_handle, handle);
        assert_eq!(update.value.as_slice(), value);
    }
}

#[tokio::test]
async fn scheduled_pass_refreshes_the_whole_instrument() {
    let rig = bring_up();
    let mock = rig.peripheral.controller();
    let baseline = mock.update_count();

    rig.hub.raise(events::PERIODIC);
    let flags = rig.scheduler.poll_once(rig.peripheral).await;

    // Identification has nothing pending, the flight group pushes five values.
    assert_eq!(flags, events::PERIODIC);
    assert_eq!(mock.update_count(), baseline + 5);
}

#[tokio::test]
async fn peer_command_adjusts_the_reference_altitude() {
    let rig = bring_up();
    let mock = rig.peripheral.controller();
    let baseline = mock.update_count();

    let mut command = Vec::new();
    command.extend_from_slice(&100i16.to_le_bytes());
    command.extend_from_slice(&CMD_SET_MAIN_ALTI.to_le_bytes());
    rig.hub.attribute_modified(ALTI_COMMAND, &command);

    let flags = rig.scheduler.poll_once(rig.peripheral).await;

    assert_eq!(flags, events::PEER_WRITE);
    // 100 m from the peer lands as 1000 tenths in the provider.
    assert_eq!(rig.sensors.altitudes.get().main, 1000);
    // A command is consumed, never echoed.
    assert_eq!(mock.update_count(), baseline);
}

#[tokio::test]
async fn identification_answers_peer_commands() {
    let rig = bring_up();
    let mock = rig.peripheral.controller();
    assert_eq!(mock.update_count(), 1);

    rig.hub
        .attribute_modified(IDENT_COMMAND, &[CMD_RD_HARD_SERIAL_NUMBER]);

    // The write round only queues the response, the async round publishes it.
    let flags = rig.scheduler.poll_once(rig.peripheral).await;
    assert_eq!(flags, events::PEER_WRITE);
    assert_eq!(mock.update_count(), 1);

    let flags = rig.scheduler.poll_once(rig.peripheral).await;
    assert_eq!(flags, events::ASYNC);
    assert_eq!(mock.update_count(), 2);
    let update = mock.update(1).unwrap();
    assert_eq!(update.service_handle, IDENT_SERVICE);
    assert_eq!(update.characteristic_handle, IDENT_INFO);
    assert_eq!(update.value.as_slice(), b"SN-000042");
}
