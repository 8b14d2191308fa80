#![no_std]

// TODO: Make these configurable
/// Largest characteristic value this stack will store or forward.
pub const ATT_VALUE_MAX_LEN: usize = 32;
/// Max characteristics attached to a single service.
pub const SERVICE_CHARACTERISTICS_MAX: usize = 4;
/// Max services included by a single service.
pub const SERVICE_INCLUDES_MAX: usize = 5;
/// Max descriptors attached to a single characteristic.
pub const CHARACTERISTIC_DESCRIPTORS_MAX: usize = 2;
/// Max value listeners attached to a single characteristic.
pub const CHARACTERISTIC_LISTENERS_MAX: usize = 2;
/// Capacity of the queue buffering peer writes until the update worker runs.
pub const PEER_WRITE_QUEUE_LEN: usize = 4;

mod fmt;

pub(crate) mod types;

pub mod attribute;
pub mod controller;
pub mod events;
pub mod mock_controller;
pub mod scheduler;
pub mod services;
pub mod stack;

/// Errors raised while composing the attribute tree or routing values through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A fixed capacity table or queue is full.
    Capacity,
    /// Payload does not fit the target value buffer.
    ValueTooLong,
    /// A controller handle was already recorded for this node.
    AlreadyBound,
    /// Including this service would make the include graph cyclic.
    IncludeCycle,
    /// No node behind this token or handle.
    NotFound,
    /// Raw identifier bytes were neither 2 nor 16 bytes long.
    InvalidUuidLength(usize),
}

/// Errors raised while driving a controller.
#[derive(Debug)]
pub enum StackError<E> {
    /// The attribute tree rejected the operation.
    Stack(Error),
    /// The controller rejected the operation.
    Controller(E),
}

impl<E> From<Error> for StackError<E> {
    fn from(error: Error) -> Self {
        Self::Stack(error)
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for StackError<E>
where
    E: defmt::Format,
{
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            StackError::Stack(value) => {
                defmt::write!(fmt, "Stack({})", value)
            }
            StackError::Controller(value) => {
                defmt::write!(fmt, "Controller({})", value)
            }
        }
    }
}
