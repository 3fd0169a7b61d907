//! Device-side upper half for USB 2.0 peripheral drivers.
//!
//! This crate sits between a hardware-specific low-level driver that
//! owns the USB controller's registers and endpoint memory, and an
//! application or USB class implementation. It runs the endpoint zero
//! control-transfer state machine, answers the chapter 9 standard
//! requests (descriptors, address, configuration, features, status),
//! tracks the device lifecycle across bus resets, and forwards
//! bulk/interrupt/isochronous traffic between the application and the
//! hardware.
//!
//! The split is deliberately narrow: the low-level side implements the
//! [`UsbLld`] trait and reports completion events; everything
//! protocol-shaped lives here. Descriptors, class requests and events
//! reach the application through plain function pointers in a
//! [`Config`].
//!
//! # Example
//!
//! ```no_run
//! use usbd_core::{
//!     Config, Descriptor, Driver, EndpointConfig, EpStatus, UsbLld,
//! };
//!
//! // The hardware-specific lower half.
//! struct Lld;
//!
//! impl UsbLld for Lld {
//!     fn init(&mut self) {}
//!     fn start(&mut self) {}
//!     fn stop(&mut self) {}
//!     fn reset(&mut self) {}
//!     fn set_address(&mut self, _address: u8) {}
//!     fn init_endpoint(&mut self, _ep: u8, _config: &EndpointConfig) {}
//!     fn disable_endpoints(&mut self) {}
//!     fn start_in(&mut self, _ep: u8, _data: &[u8]) {}
//!     fn start_out(&mut self, _ep: u8, _len: usize) {}
//!     fn read_packet(&mut self, _ep: u8, _buf: &mut [u8]) -> usize { 0 }
//!     fn write_packet(&mut self, _ep: u8, _data: &[u8]) {}
//!     fn stall_in(&mut self, _ep: u8) {}
//!     fn stall_out(&mut self, _ep: u8) {}
//!     fn clear_in(&mut self, _ep: u8) {}
//!     fn clear_out(&mut self, _ep: u8) {}
//!     fn status_in(&self, _ep: u8) -> EpStatus { EpStatus::Active }
//!     fn status_out(&self, _ep: u8) -> EpStatus { EpStatus::Active }
//!     fn ep0_max_packet(&self) -> u16 { 64 }
//! }
//!
//! static DEVICE_DESCRIPTOR: [u8; 18] = [
//!     18, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 64,
//!     0x83, 0x04, 0x11, 0x57, 0x00, 0x01, 0, 0, 0, 1,
//! ];
//!
//! fn get_descriptor(
//!     _usb: &mut Driver<'static, Lld, 5>,
//!     dtype: u8,
//!     _dindex: u8,
//!     _langid: u16,
//! ) -> Option<Descriptor<'static>> {
//!     (dtype == 0x01).then(|| Descriptor::new(&DEVICE_DESCRIPTOR))
//! }
//!
//! static CONFIG: Config<'static, Lld, 5> = Config {
//!     get_descriptor,
//!     requests_hook: None,
//!     event: None,
//! };
//!
//! let mut usb: Driver<Lld, 5> = Driver::new(Lld);
//! usb.start(&CONFIG);
//! // From here the low-level driver's interrupt handler drives the
//! // core: usb.reset(), usb.out_complete(ep, n), usb.in_complete(ep).
//! ```
//!
//! # Concurrency
//!
//! The driver is not a synchronization point. Completion events are
//! expected to arrive from a single interrupt context, in the order the
//! bus produced them; `start` and `stop` take a `critical-section`
//! section so the application may call them from thread context. Share
//! the driver between contexts with whatever mutual exclusion the
//! platform provides (on bare-metal ARM, a
//! `critical_section::Mutex<RefCell<…>>` works well).

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod control;
mod driver;
mod endpoint;
mod lld;
#[cfg(test)]
mod mock;

pub use control::{DataStage, CONTROL_BUFFER_LEN};
pub use driver::{
    Config, Descriptor, DeviceState, DeviceStatus, Driver, Event, EventFn, GetDescriptorFn,
    RequestsHookFn, TransferEndFn,
};
pub use endpoint::{EndpointConfig, EndpointFn, TransferMode};
pub use lld::{EpStatus, UsbLld};
