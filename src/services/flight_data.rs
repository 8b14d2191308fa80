//! Flight data composite service.
//!
//! Groups the in-flight services under one entry point. The service spans no
//! attributes of its own; the grouped services register through the include
//! graph and refresh together.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::{Service, ServiceRef, ServiceTable, Uuid};
use crate::scheduler::GattService;
use crate::services::altimeter::AltimeterService;
use crate::services::barometer::BarometerService;
use crate::services::navigation::NavigationService;
use crate::services::variometer::VariometerService;
use crate::Error;

const SERVICE_UUID: &str = "7bb055f2-ab96-43ab-9ed4-f8dbaec1af10";

/// GATT flight data service grouping barometer, altimeter, variometer and
/// navigation.
pub struct FlightDataService<'d, M: RawMutex, const MAX: usize> {
    service: ServiceRef,
    barometer: &'d BarometerService<'d, M, MAX>,
    altimeter: &'d AltimeterService<'d, M, MAX>,
    variometer: &'d VariometerService<'d, M, MAX>,
    navigation: &'d NavigationService<'d, M, MAX>,
}

impl<'d, M: RawMutex, const MAX: usize> FlightDataService<'d, M, MAX> {
    /// Compose the service in `table`, including the grouped services.
    pub fn new(
        table: &'d ServiceTable<'d, M, MAX>,
        barometer: &'d BarometerService<'d, M, MAX>,
        altimeter: &'d AltimeterService<'d, M, MAX>,
        variometer: &'d VariometerService<'d, M, MAX>,
        navigation: &'d NavigationService<'d, M, MAX>,
    ) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Flight data service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        table.add_include(service, barometer.service())?;
        table.add_include(service, altimeter.service())?;
        table.add_include(service, variometer.service())?;
        table.add_include(service, navigation.service())?;
        Ok(Self {
            service,
            barometer,
            altimeter,
            variometer,
            navigation,
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }

    /// Start the grouped services.
    pub fn start(&self) -> Result<(), Error> {
        self.altimeter.start()
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for FlightDataService<'d, M, MAX> {
    fn refresh(&self) {
        self.barometer.refresh();
        self.altimeter.refresh();
        self.variometer.refresh();
        self.navigation.refresh();
    }
}
