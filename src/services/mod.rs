//! GATT services of the flight instrument.
//!
//! Each service composes its nodes in a shared [`ServiceTable`] and reads its
//! payloads from an injected provider. The update worker drives the
//! [`refresh`] implementations which encode the provider state into the
//! characteristic values.
//!
//! [`ServiceTable`]: crate::attribute::ServiceTable
//! [`refresh`]: crate::scheduler::GattService::refresh

pub mod altimeter;
pub mod barometer;
pub mod flight_data;
pub mod identification;
pub mod navigation;
pub mod variometer;

pub use altimeter::{AltimeterService, AltitudeProvider, Altitudes};
pub use barometer::{BarometerService, PressureExtremes, PressureProvider, PressureSample};
pub use flight_data::FlightDataService;
pub use identification::{DeviceIdentity, IdentificationService};
pub use navigation::{NavFix, NavProvider, NavigationService};
pub use variometer::{VarioProvider, VariometerService};
