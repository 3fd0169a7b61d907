//! The contract between the control core and the hardware-specific
//! lower half.

use crate::endpoint::EndpointConfig;

/// Hardware status of one endpoint direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpStatus {
    /// The direction is not enabled.
    Disabled,
    /// The direction answers requests with STALL handshakes.
    Stalled,
    /// The direction is enabled and not halted.
    Active,
}

/// Operations the control core requires from a low-level driver.
///
/// An implementation owns the USB controller's registers and endpoint
/// memory. The core never touches hardware itself; it calls these
/// operations and reacts to the completion events the implementation
/// feeds back through [`Driver::reset`](crate::Driver::reset),
/// [`Driver::in_complete`](crate::Driver::in_complete) and
/// [`Driver::out_complete`](crate::Driver::out_complete).
///
/// # Buffer model
///
/// Transfers run out of memory owned by the implementation, never out of
/// borrowed core memory:
///
/// - [`start_in`](UsbLld::start_in) receives the complete payload and
///   must latch it (into a FIFO, packet SRAM, or a DMA staging buffer)
///   before returning. Splitting it into bus packets is the
///   implementation's job; `in_complete` fires once, when the last
///   packet went out.
/// - [`start_out`](UsbLld::start_out) only arms reception.
///   `out_complete` fires when the transfer ends, and the accumulated
///   bytes stay readable through [`read_packet`](UsbLld::read_packet)
///   until the next transfer is started.
///
/// # SETUP packets
///
/// A SETUP packet on endpoint zero is reported as an OUT completion, with
/// the 8 bytes readable through `read_packet`. The core pulls them
/// synchronously from inside [`Driver::out_complete`](crate::Driver::out_complete).
pub trait UsbLld {
    /// One-time low-level initialization.
    ///
    /// Invoked exactly once per peripheral, when the driver object is
    /// created.
    fn init(&mut self);

    /// Starts the peripheral (clocks, pull-ups, interrupt sources).
    fn start(&mut self);

    /// Stops and powers down the peripheral.
    fn stop(&mut self);

    /// Post-bus-reset hardware setup.
    ///
    /// Runs after a bus reset was signaled to the core. The
    /// implementation must leave endpoint zero enabled and ready to
    /// receive the first SETUP packet.
    fn reset(&mut self);

    /// Writes the device address to hardware.
    fn set_address(&mut self, address: u8);

    /// Activates an endpoint with the given shape.
    fn init_endpoint(&mut self, ep: u8, config: &EndpointConfig);

    /// Deactivates every endpoint except endpoint zero.
    fn disable_endpoints(&mut self);

    /// Starts an IN transfer, latching `data` for transmission.
    ///
    /// An empty slice transmits a zero-length packet.
    fn start_in(&mut self, ep: u8, data: &[u8]);

    /// Arms an OUT transfer of up to `len` bytes.
    fn start_out(&mut self, ep: u8, len: usize);

    /// Copies the most recently received data into `buf`.
    ///
    /// Returns the true received size even when `buf` is shorter; the
    /// copy itself must be bounded by `buf.len()`.
    fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> usize;

    /// Writes a single packet for transmission on an IN endpoint.
    fn write_packet(&mut self, ep: u8, data: &[u8]);

    /// Halts the IN side of an endpoint.
    fn stall_in(&mut self, ep: u8);

    /// Halts the OUT side of an endpoint.
    fn stall_out(&mut self, ep: u8);

    /// Returns the IN side of an endpoint to the active state, resetting
    /// its data toggle.
    fn clear_in(&mut self, ep: u8);

    /// Returns the OUT side of an endpoint to the active state, resetting
    /// its data toggle.
    fn clear_out(&mut self, ep: u8);

    /// Reports the IN side status of an endpoint.
    fn status_in(&self, ep: u8) -> EpStatus;

    /// Reports the OUT side status of an endpoint.
    fn status_out(&self, ep: u8) -> EpStatus;

    /// Max packet size of endpoint zero, as configured in hardware.
    fn ep0_max_packet(&self) -> u16;
}
