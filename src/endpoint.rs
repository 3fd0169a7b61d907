//! Endpoint configuration and per-endpoint transfer state.

use usb_device::endpoint::EndpointType;

use crate::driver::Driver;

/// Completion callback for one direction of a non-control endpoint.
///
/// Receives the driver and the endpoint number. Runs in the same context
/// as the low-level driver's completion events, typically an interrupt
/// handler.
pub type EndpointFn<'a, L, const EP_COUNT: usize> = fn(&mut Driver<'a, L, EP_COUNT>, u8);

/// How an endpoint exchanges data with the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// Single-packet exchanges through
    /// [`read_packet`](Driver::read_packet) and
    /// [`write_packet`](Driver::write_packet).
    Packet,
    /// Multi-packet transactions through
    /// [`start_receive`](Driver::start_receive) and
    /// [`start_transmit`](Driver::start_transmit).
    Transaction,
}

/// Endpoint shape, shared between the application and the low-level
/// driver.
///
/// A max packet size of zero marks the direction as unused.
#[derive(Clone, Copy, Debug)]
pub struct EndpointConfig {
    /// Transfer type programmed into the endpoint hardware.
    pub ep_type: EndpointType,
    /// Data exchange style for the endpoint.
    pub mode: TransferMode,
    /// Max packet size for the IN side.
    pub in_max_packet: u16,
    /// Max packet size for the OUT side.
    pub out_max_packet: u16,
}

impl EndpointConfig {
    /// The shape of a control endpoint with the given max packet size.
    pub const fn control(max_packet: u16) -> Self {
        EndpointConfig {
            ep_type: EndpointType::Control,
            mode: TransferMode::Transaction,
            in_max_packet: max_packet,
            out_max_packet: max_packet,
        }
    }
}

/// Driver-held state of one endpoint slot.
pub(crate) struct EndpointState<'a, L, const EP_COUNT: usize> {
    pub(crate) config: EndpointConfig,
    /// An IN transaction is in flight.
    pub(crate) transmitting: bool,
    /// An OUT transaction is in flight.
    pub(crate) receiving: bool,
    /// Size of the most recently completed OUT transfer.
    pub(crate) rx_size: usize,
    pub(crate) in_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
    pub(crate) out_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
}

impl<'a, L, const EP_COUNT: usize> EndpointState<'a, L, EP_COUNT> {
    pub(crate) fn new(
        config: EndpointConfig,
        in_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
        out_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
    ) -> Self {
        EndpointState {
            config,
            transmitting: false,
            receiving: false,
            rx_size: 0,
            in_cb,
            out_cb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EndpointConfig, TransferMode};
    use usb_device::endpoint::EndpointType;

    #[test]
    fn control_config_shape() {
        let config = EndpointConfig::control(64);
        assert_eq!(config.ep_type, EndpointType::Control);
        assert_eq!(config.mode, TransferMode::Transaction);
        assert_eq!(config.in_max_packet, 64);
        assert_eq!(config.out_max_packet, 64);
    }
}
