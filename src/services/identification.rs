//! Identification service.
//!
//! The peer writes a command id selecting which identity string it wants; the
//! update worker then publishes the response on the info characteristic. The
//! layout version is published as soon as the service starts.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::attribute::{
    Characteristic, CharacteristicInfo, CharacteristicProp, CharacteristicRef, Service, ServiceRef,
    ServiceTable, Uuid, ValueListener, ValueOrigin,
};
use crate::scheduler::{GattService, UpdateRequest};
use crate::Error;

const SERVICE_UUID: &str = "38df4da7-94f3-44dc-83ad-4e10864fbd44";
const COMMAND_UUID: &str = "520b42a8-ee29-46ec-9eff-24e732ca0cb5";
const INFO_UUID: &str = "dea233cc-dabb-4b00-9046-f70a44c1ceda";

/// Version of this GATT layout.
const GATT_VERSION: &str = "1.0";

const INFO_MAX_LEN: usize = 32;

const CMD_RD_GATT_VERSION: u8 = 0;
const CMD_RD_SOFT_VERSION: u8 = 1;
const CMD_RD_SOFT_MANUF_NAME: u8 = 2;
const CMD_RD_HARD_VERSION: u8 = 3;
const CMD_RD_HARD_MANUF_NAME: u8 = 4;
const CMD_RD_HARD_SERIAL_NUMBER: u8 = 5;
const CMD_RD_HARD_MANUF_DATE: u8 = 6;

/// Identity strings exposed to the peer.
pub trait DeviceIdentity {
    /// Software version.
    fn software_version(&self) -> &str;

    /// Software manufacturer name.
    fn software_manufacturer(&self) -> &str;

    /// Hardware version.
    fn hardware_version(&self) -> &str;

    /// Hardware manufacturer name.
    fn hardware_manufacturer(&self) -> &str;

    /// Hardware serial number.
    fn hardware_serial_number(&self) -> &str;

    /// Hardware manufacturing date.
    fn hardware_manufacturing_date(&self) -> &str;
}

struct State<'d, M: RawMutex> {
    pending: Option<u8>,
    request: Option<UpdateRequest<'d, M>>,
}

/// GATT identification service.
pub struct IdentificationService<'d, M: RawMutex, const MAX: usize> {
    table: &'d ServiceTable<'d, M, MAX>,
    service: ServiceRef,
    command: CharacteristicRef,
    info: CharacteristicRef,
    identity: &'d dyn DeviceIdentity,
    state: Mutex<M, RefCell<State<'d, M>>>,
}

impl<'d, M: RawMutex, const MAX: usize> IdentificationService<'d, M, MAX> {
    /// Compose the service in `table`.
    pub fn new(
        table: &'d ServiceTable<'d, M, MAX>,
        identity: &'d dyn DeviceIdentity,
    ) -> Result<Self, Error> {
        let service = table.add_service(Service::new(
            "Identification service",
            Uuid::parse_uuid128(SERVICE_UUID),
        ))?;
        let command = table.add_characteristic(
            service,
            Characteristic::new(
                "Command",
                Uuid::parse_uuid128(COMMAND_UUID),
                1,
                true,
                [CharacteristicProp::Write],
            ),
        )?;
        let info = table.add_characteristic(
            service,
            Characteristic::new(
                "Identification info",
                Uuid::parse_uuid128(INFO_UUID),
                INFO_MAX_LEN as u16,
                false,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
            ),
        )?;
        Ok(Self {
            table,
            service,
            command,
            info,
            identity,
            state: Mutex::new(RefCell::new(State {
                pending: Some(CMD_RD_GATT_VERSION),
                request: None,
            })),
        })
    }

    /// Token of the composed service.
    pub fn service(&self) -> ServiceRef {
        self.service
    }

    /// Listen for peer commands and publish the layout version.
    ///
    /// `request` is used to get the worker to publish a response after a
    /// command arrives.
    pub fn start(&'d self, request: UpdateRequest<'d, M>) -> Result<(), Error> {
        self.with_state(|state| state.request = Some(request));
        self.table.register_listener(self.command, self)?;
        self.refresh();
        Ok(())
    }

    fn with_state<F: FnOnce(&mut State<'d, M>) -> R, R>(&self, f: F) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    fn response(&self, command: u8) -> &'d str {
        match command {
            CMD_RD_GATT_VERSION => GATT_VERSION,
            CMD_RD_SOFT_VERSION => self.identity.software_version(),
            CMD_RD_SOFT_MANUF_NAME => self.identity.software_manufacturer(),
            CMD_RD_HARD_VERSION => self.identity.hardware_version(),
            CMD_RD_HARD_MANUF_NAME => self.identity.hardware_manufacturer(),
            CMD_RD_HARD_SERIAL_NUMBER => self.identity.hardware_serial_number(),
            CMD_RD_HARD_MANUF_DATE => self.identity.hardware_manufacturing_date(),
            _ => "Invalid command",
        }
    }
}

impl<'d, M: RawMutex, const MAX: usize> GattService for IdentificationService<'d, M, MAX> {
    fn refresh(&self) {
        let Some(command) = self.with_state(|state| state.pending.take()) else {
            return;
        };
        let response = self.response(command).as_bytes();
        let len = response.len().min(INFO_MAX_LEN);
        if self
            .table
            .update_value(self.info, ValueOrigin::Local, &response[..len])
            .is_err()
        {
            warn!("[identification] info update rejected");
        }
    }
}

impl<'d, M: RawMutex, const MAX: usize> ValueListener for IdentificationService<'d, M, MAX> {
    fn on_value_changed(&self, _characteristic: &CharacteristicInfo<'_>, origin: ValueOrigin, value: &[u8]) {
        // Only peer writes carry commands.
        if origin != ValueOrigin::Peer {
            return;
        }
        let &[command] = value else {
            warn!("[identification] command write with {} bytes, expected 1", value.len());
            return;
        };
        let request = self.with_state(|state| {
            state.pending = Some(command);
            state.request
        });
        match request {
            Some(request) => request.request(),
            None => debug!("[identification] not started, response stays pending"),
        }
    }
}
