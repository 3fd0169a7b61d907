//! The driver object: lifecycle, endpoint table, transfer surface.

use usb_device::control::Request;
use usb_device::{Result, UsbError};

use crate::control::{ControlPhase, Ep0Next, CONTROL_BUFFER_LEN};
use crate::endpoint::{EndpointConfig, EndpointFn, EndpointState};
use crate::lld::UsbLld;

/// Driver lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Not started; no configuration attached.
    Stop,
    /// Peripheral running, no address assigned.
    Ready,
    /// Address assigned, or configuration cleared back to zero.
    Selected,
    /// A non-zero configuration is selected.
    Active,
}

bitflags::bitflags! {
    /// Device status word, as reported by a device GET_STATUS request.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceStatus: u16 {
        const SELF_POWERED = 1 << 0;
        const REMOTE_WAKEUP = 1 << 1;
    }
}

/// Notification delivered through the configuration's event callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A new device address was committed to hardware.
    Address,
    /// The host selected a configuration, possibly configuration zero.
    Configured,
    /// Endpoint zero was stalled in response to a protocol error.
    Stalled,
}

/// A descriptor returned by the application.
#[derive(Clone, Copy, Debug)]
pub struct Descriptor<'a> {
    bytes: &'a [u8],
}

impl<'a> Descriptor<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Descriptor { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Resolves a descriptor query. `None` means the descriptor does not
/// exist, which stalls the request.
///
/// Arguments are the descriptor type, the descriptor index and the
/// language identifier from the SETUP packet.
pub type GetDescriptorFn<'a, L, const EP_COUNT: usize> =
    fn(&mut Driver<'a, L, EP_COUNT>, u8, u8, u16) -> Option<Descriptor<'a>>;

/// First look at every SETUP packet. Returning `true` means the hook
/// handled the request and prepared the transfer with
/// [`setup_transfer`](Driver::setup_transfer).
pub type RequestsHookFn<'a, L, const EP_COUNT: usize> =
    fn(&mut Driver<'a, L, EP_COUNT>, &Request) -> bool;

/// Event delivery to the application.
pub type EventFn<'a, L, const EP_COUNT: usize> = fn(&mut Driver<'a, L, EP_COUNT>, Event);

/// Invoked when a control transfer completes its status phase.
pub type TransferEndFn<'a, L, const EP_COUNT: usize> = fn(&mut Driver<'a, L, EP_COUNT>);

/// Application-provided driver configuration.
pub struct Config<'a, L, const EP_COUNT: usize> {
    /// Descriptor source for GET_DESCRIPTOR requests.
    pub get_descriptor: GetDescriptorFn<'a, L, EP_COUNT>,
    /// Optional override for SETUP handling. Class and vendor requests
    /// that the hook declines stall endpoint zero.
    pub requests_hook: Option<RequestsHookFn<'a, L, EP_COUNT>>,
    /// Optional event delivery.
    pub event: Option<EventFn<'a, L, EP_COUNT>>,
}

/// The device-side upper half of a USB peripheral driver.
///
/// `EP_COUNT` is the number of endpoint slots, endpoint zero included.
/// The driver owns the low-level driver instance `L` and calls into it;
/// the low-level driver's interrupt handler drives the other direction
/// through [`reset`](Driver::reset), [`in_complete`](Driver::in_complete)
/// and [`out_complete`](Driver::out_complete).
pub struct Driver<'a, L, const EP_COUNT: usize> {
    pub(crate) lld: L,
    pub(crate) state: DeviceState,
    pub(crate) config: Option<&'a Config<'a, L, EP_COUNT>>,
    /// The most recent SETUP packet, as received.
    pub(crate) setup: [u8; 8],
    pub(crate) address: u8,
    pub(crate) configuration: u8,
    pub(crate) status: DeviceStatus,
    pub(crate) ep: [Option<EndpointState<'a, L, EP_COUNT>>; EP_COUNT],
    pub(crate) ep0: ControlPhase,
    pub(crate) ep0_next: Ep0Next<'a>,
    /// Scratch for short computed replies (status words and the like).
    pub(crate) ep0_short: [u8; 2],
    /// Landing zone for host-to-device data stages.
    pub(crate) ep0_buf: [u8; CONTROL_BUFFER_LEN],
    pub(crate) ep0_rx_len: usize,
    pub(crate) ep0_end: Option<TransferEndFn<'a, L, EP_COUNT>>,
}

impl<'a, L: UsbLld, const EP_COUNT: usize> Driver<'a, L, EP_COUNT> {
    /// Creates the driver around its low-level half and initializes the
    /// low level once.
    pub fn new(mut lld: L) -> Self {
        lld.init();
        Driver {
            lld,
            state: DeviceState::Stop,
            config: None,
            setup: [0; 8],
            address: 0,
            configuration: 0,
            status: DeviceStatus::empty(),
            ep: core::array::from_fn(|_| None),
            ep0: ControlPhase::WaitingSetup,
            ep0_next: Ep0Next::None,
            ep0_short: [0; 2],
            ep0_buf: [0; CONTROL_BUFFER_LEN],
            ep0_rx_len: 0,
            ep0_end: None,
        }
    }

    /// Configures and activates the peripheral.
    ///
    /// Runs inside a critical section to serialize against the
    /// low-level driver's interrupt handler.
    pub fn start(&mut self, config: &'a Config<'a, L, EP_COUNT>) {
        critical_section::with(|_| {
            debug_assert!(
                matches!(self.state, DeviceState::Stop | DeviceState::Ready),
                "start() requires the STOP or READY state"
            );
            self.config = Some(config);
            for slot in self.ep.iter_mut() {
                *slot = None;
            }
            self.lld.start();
            self.state = DeviceState::Ready;
        });
        debug!("START");
    }

    /// Deactivates the peripheral.
    pub fn stop(&mut self) {
        critical_section::with(|_| {
            debug_assert!(
                matches!(self.state, DeviceState::Stop | DeviceState::Ready),
                "stop() requires the STOP or READY state"
            );
            self.lld.stop();
            self.state = DeviceState::Stop;
        });
        debug!("STOP");
    }

    /// Handles a bus reset. Invoked by the low-level driver when the
    /// host resets the bus.
    pub fn reset(&mut self) {
        self.state = DeviceState::Ready;
        self.status = DeviceStatus::empty();
        self.address = 0;
        self.configuration = 0;

        // Invalidate every slot; endpoint zero comes back with the shape
        // the hardware gives it.
        for slot in self.ep.iter_mut() {
            *slot = None;
        }

        self.ep0 = ControlPhase::WaitingSetup;
        self.ep0_next = Ep0Next::None;
        self.ep0_end = None;

        self.lld.reset();
        let ep0 = EndpointConfig::control(self.lld.ep0_max_packet());
        self.ep[0] = Some(EndpointState::new(ep0, None, None));
        debug!("RESET");
    }

    /// Enables an endpoint, in both directions or one of them depending
    /// on the configuration.
    ///
    /// Must be invoked in response to a SET_CONFIGURATION request, from
    /// the same context that delivers completion events. The slot must
    /// not already be bound.
    pub fn init_endpoint(
        &mut self,
        ep: u8,
        config: EndpointConfig,
        in_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
        out_cb: Option<EndpointFn<'a, L, EP_COUNT>>,
    ) {
        debug_assert!(
            self.state == DeviceState::Active,
            "init_endpoint() requires the ACTIVE state"
        );
        debug_assert!(
            self.ep[ep as usize].is_none(),
            "init_endpoint(): endpoint already initialized"
        );

        self.ep[ep as usize] = Some(EndpointState::new(config, in_cb, out_cb));
        self.lld.init_endpoint(ep, &config);
        debug!("INIT EP{}", ep);
    }

    /// Disables every endpoint except endpoint zero.
    ///
    /// Must be invoked in response to a SET_CONFIGURATION request with
    /// configuration number zero.
    pub fn disable_endpoints(&mut self) {
        debug_assert!(
            self.state == DeviceState::Selected,
            "disable_endpoints() requires the SELECTED state"
        );
        for slot in self.ep.iter_mut().skip(1) {
            *slot = None;
        }
        self.lld.disable_endpoints();
    }

    /// Reads a packet from an endpoint initialized in packet mode.
    ///
    /// Returns the size of the received packet, which may exceed
    /// `buf.len()`; the copy itself is bounded by `buf.len()`. Fails
    /// with [`UsbError::WouldBlock`] while a receive transaction is in
    /// flight.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn read_packet(&mut self, ep: u8, buf: &mut [u8]) -> Result<usize> {
        let slot = self.ep[ep as usize].as_ref().expect("endpoint not initialized");
        if slot.receiving {
            return Err(UsbError::WouldBlock);
        }
        Ok(self.lld.read_packet(ep, buf))
    }

    /// Writes a packet to an endpoint initialized in packet mode.
    ///
    /// Fails with [`UsbError::WouldBlock`] while a transmit transaction
    /// is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn write_packet(&mut self, ep: u8, data: &[u8]) -> Result<()> {
        let slot = self.ep[ep as usize].as_ref().expect("endpoint not initialized");
        if slot.transmitting {
            return Err(UsbError::WouldBlock);
        }
        self.lld.write_packet(ep, data);
        Ok(())
    }

    /// Starts a receive transaction of up to `len` bytes on an OUT
    /// endpoint. The endpoint's OUT callback fires on completion, and
    /// the data is collected with [`read_packet`](Driver::read_packet).
    ///
    /// Fails with [`UsbError::WouldBlock`] while the endpoint is already
    /// receiving.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn start_receive(&mut self, ep: u8, len: usize) -> Result<()> {
        let slot = self.ep[ep as usize].as_mut().expect("endpoint not initialized");
        if slot.receiving {
            return Err(UsbError::WouldBlock);
        }
        slot.receiving = true;
        self.lld.start_out(ep, len);
        Ok(())
    }

    /// Starts a transmit transaction on an IN endpoint. The endpoint's
    /// IN callback fires when the last packet went out.
    ///
    /// Fails with [`UsbError::WouldBlock`] while the endpoint is already
    /// transmitting.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn start_transmit(&mut self, ep: u8, data: &[u8]) -> Result<()> {
        let slot = self.ep[ep as usize].as_mut().expect("endpoint not initialized");
        if slot.transmitting {
            return Err(UsbError::WouldBlock);
        }
        slot.transmitting = true;
        self.lld.start_in(ep, data);
        Ok(())
    }

    /// Stalls the OUT side of an endpoint.
    ///
    /// Fails with [`UsbError::WouldBlock`] while a receive transaction
    /// is in flight; an active transaction cannot be stalled.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn stall_receive(&mut self, ep: u8) -> Result<()> {
        let slot = self.ep[ep as usize].as_ref().expect("endpoint not initialized");
        if slot.receiving {
            return Err(UsbError::WouldBlock);
        }
        self.lld.stall_out(ep);
        Ok(())
    }

    /// Stalls the IN side of an endpoint.
    ///
    /// Fails with [`UsbError::WouldBlock`] while a transmit transaction
    /// is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint was never initialized.
    pub fn stall_transmit(&mut self, ep: u8) -> Result<()> {
        let slot = self.ep[ep as usize].as_ref().expect("endpoint not initialized");
        if slot.transmitting {
            return Err(UsbError::WouldBlock);
        }
        self.lld.stall_in(ep);
        Ok(())
    }

    /// IN transfer completion, delivered by the low-level driver.
    pub fn in_complete(&mut self, ep: u8) {
        debug_assert!(
            self.ep[ep as usize].is_some(),
            "in_complete(): endpoint not initialized"
        );
        if let Some(slot) = self.ep[ep as usize].as_mut() {
            slot.transmitting = false;
        }
        if ep == 0 {
            self.ep0_in();
            return;
        }
        let cb = self.ep[ep as usize].as_ref().and_then(|slot| slot.in_cb);
        if let Some(cb) = cb {
            cb(self, ep);
        }
    }

    /// OUT transfer completion, delivered by the low-level driver.
    /// `n` is the received size; a SETUP packet on endpoint zero is
    /// reported here with `n == 8`.
    pub fn out_complete(&mut self, ep: u8, n: usize) {
        debug_assert!(
            self.ep[ep as usize].is_some(),
            "out_complete(): endpoint not initialized"
        );
        if let Some(slot) = self.ep[ep as usize].as_mut() {
            slot.receiving = false;
            slot.rx_size = n;
        }
        if ep == 0 {
            self.ep0_out(n);
            return;
        }
        let cb = self.ep[ep as usize].as_ref().and_then(|slot| slot.out_cb);
        if let Some(cb) = cb {
            cb(self, ep);
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The current (or, in late commit mode, pending) device address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The most recently selected configuration number.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// The device status word.
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Maintains the self-powered bit of the status word.
    pub fn set_self_powered(&mut self, on: bool) {
        self.status.set(DeviceStatus::SELF_POWERED, on);
    }

    /// Whether the host enabled remote wakeup.
    pub fn remote_wakeup_enabled(&self) -> bool {
        self.status.contains(DeviceStatus::REMOTE_WAKEUP)
    }

    /// The most recent SETUP packet. Only meaningful while a control
    /// transfer is being handled.
    pub fn setup(&self) -> &[u8; 8] {
        &self.setup
    }

    pub fn lld(&self) -> &L {
        &self.lld
    }

    pub fn lld_mut(&mut self) -> &mut L {
        &mut self.lld
    }

    pub(crate) fn config(&self) -> &'a Config<'a, L, EP_COUNT> {
        self.config.expect("driver is not started")
    }

    pub(crate) fn fire_event(&mut self, event: Event) {
        if let Some(cb) = self.config().event {
            cb(self, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use usb_device::endpoint::EndpointType;
    use usb_device::UsbError;

    use crate::control::ControlPhase;
    use crate::endpoint::{EndpointConfig, TransferMode};
    use crate::mock::{started, MockLld, Op, TestDriver, TEST_CONFIG};
    use crate::{DeviceState, DeviceStatus};

    fn bulk_config() -> EndpointConfig {
        EndpointConfig {
            ep_type: EndpointType::Bulk,
            mode: TransferMode::Transaction,
            in_max_packet: 64,
            out_max_packet: 64,
        }
    }

    fn activated() -> TestDriver {
        let mut usb = started();
        usb.state = DeviceState::Active;
        usb.init_endpoint(2, bulk_config(), Some(note_in), Some(note_out));
        usb.lld_mut().ops.clear();
        usb
    }

    fn note_in(usb: &mut TestDriver, ep: u8) {
        usb.lld_mut().notifications.push((ep, true));
    }

    fn note_out(usb: &mut TestDriver, ep: u8) {
        usb.lld_mut().notifications.push((ep, false));
    }

    #[test]
    fn lifecycle_start_stop() {
        let mut usb: TestDriver = crate::Driver::new(MockLld::new());
        assert_eq!(usb.state(), DeviceState::Stop);
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::Init]);

        usb.start(&TEST_CONFIG);
        assert_eq!(usb.state(), DeviceState::Ready);
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::Start]);

        usb.stop();
        assert_eq!(usb.state(), DeviceState::Stop);
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::Stop]);
    }

    #[test]
    fn reset_clears_device_state() {
        let mut usb = activated();
        usb.address = 5;
        usb.configuration = 1;
        usb.status = DeviceStatus::REMOTE_WAKEUP;

        usb.reset();

        assert_eq!(usb.state(), DeviceState::Ready);
        assert_eq!(usb.address(), 0);
        assert_eq!(usb.configuration(), 0);
        assert_eq!(usb.status(), DeviceStatus::empty());
        assert_eq!(usb.ep0, ControlPhase::WaitingSetup);
        assert!(usb.ep[0].is_some());
        assert!(usb.ep[1..].iter().all(Option::is_none));
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::Reset]);
    }

    #[test]
    fn init_endpoint_binds_slot() {
        let mut usb = started();
        usb.state = DeviceState::Active;
        usb.init_endpoint(3, bulk_config(), None, None);
        assert!(usb.ep[3].is_some());
        assert!(usb.lld_mut().ops.contains(&Op::InitEndpoint(3)));
    }

    #[test]
    fn disable_endpoints_keeps_endpoint_zero() {
        let mut usb = activated();
        usb.state = DeviceState::Selected;
        usb.disable_endpoints();
        assert!(usb.ep[0].is_some());
        assert!(usb.ep[1..].iter().all(Option::is_none));
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::DisableEndpoints]);
    }

    #[test]
    fn start_transmit_guards_against_double_start() {
        let mut usb = activated();

        assert!(usb.start_transmit(2, b"hello").is_ok());
        assert!(matches!(
            usb.start_transmit(2, b"again"),
            Err(UsbError::WouldBlock)
        ));
        assert_eq!(
            usb.lld_mut().take_ops(),
            vec![Op::StartIn(2, b"hello".to_vec())]
        );

        usb.in_complete(2);
        assert_eq!(usb.lld_mut().notifications, vec![(2, true)]);
        assert!(usb.start_transmit(2, b"again").is_ok());
    }

    #[test]
    fn start_receive_guards_against_double_start() {
        let mut usb = activated();

        assert!(usb.start_receive(2, 64).is_ok());
        assert!(matches!(usb.start_receive(2, 64), Err(UsbError::WouldBlock)));
        assert_eq!(usb.lld_mut().take_ops(), vec![Op::StartOut(2, 64)]);

        usb.out_complete(2, 7);
        assert_eq!(usb.lld_mut().notifications, vec![(2, false)]);
        assert_eq!(usb.ep[2].as_ref().unwrap().rx_size, 7);
        assert!(usb.start_receive(2, 64).is_ok());
    }

    #[test]
    fn packet_surface_guards_and_passthrough() {
        let mut usb = activated();

        usb.lld_mut().rx.push_back(vec![1, 2, 3]);
        let mut buf = [0u8; 2];
        // Short destination: the true packet size still comes back.
        assert_eq!(usb.read_packet(2, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2]);

        assert!(usb.write_packet(2, &[9, 9]).is_ok());
        assert_eq!(
            usb.lld_mut().take_ops(),
            vec![Op::WritePacket(2, vec![9, 9])]
        );

        // A direction busy with a transaction rejects the packet surface.
        usb.start_receive(2, 64).unwrap();
        assert!(matches!(
            usb.read_packet(2, &mut buf),
            Err(UsbError::WouldBlock)
        ));
        usb.start_transmit(2, b"x").unwrap();
        assert!(matches!(
            usb.write_packet(2, &[1]),
            Err(UsbError::WouldBlock)
        ));
    }

    #[test]
    fn stall_surface_refuses_active_transactions() {
        let mut usb = activated();

        usb.start_transmit(2, b"x").unwrap();
        assert!(matches!(usb.stall_transmit(2), Err(UsbError::WouldBlock)));
        usb.in_complete(2);
        assert!(usb.stall_transmit(2).is_ok());

        usb.start_receive(2, 8).unwrap();
        assert!(matches!(usb.stall_receive(2), Err(UsbError::WouldBlock)));
        usb.out_complete(2, 0);
        assert!(usb.stall_receive(2).is_ok());

        let ops: Vec<Op> = usb.lld_mut().take_ops();
        assert!(ops.contains(&Op::StallIn(2)));
        assert!(ops.contains(&Op::StallOut(2)));
    }
}
