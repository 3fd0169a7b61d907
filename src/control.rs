//! Endpoint zero and the control transfer protocol.
//!
//! Control transfers are driven entirely by completion events: the
//! low-level driver reports every EP0 IN or OUT completion, and the
//! phase recorded in the driver decides what the event means. Any event
//! that does not fit the current phase stalls both halves of endpoint
//! zero; the host recovers by sending a fresh SETUP packet.

use usb_device::control::{Recipient, Request, RequestType};
use usb_device::UsbDirection;

use crate::driver::{DeviceState, DeviceStatus, Driver, Event, TransferEndFn};
use crate::lld::{EpStatus, UsbLld};

/// Capacity of the driver-owned buffer that receives host-to-device
/// data stages.
pub const CONTROL_BUFFER_LEN: usize = 128;

/// Endpoint zero transfer phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ControlPhase {
    /// No control transfer in progress.
    WaitingSetup,
    /// Device-to-host data stage in flight. `zlp` is set while a
    /// zero-length packet still has to terminate the stage.
    Tx { zlp: bool },
    /// Host-to-device data stage in flight.
    Rx,
    /// Waiting for the host's zero-length status OUT.
    WaitingStatus,
    /// Zero-length status IN in flight.
    SendingStatus,
}

/// Data stage requested by a SETUP handler.
pub enum DataStage<'a> {
    /// Transmit these bytes to the host.
    In(&'a [u8]),
    /// Receive up to this many bytes from the host, at most
    /// [`CONTROL_BUFFER_LEN`].
    Out(usize),
    /// No data stage; proceed straight to status.
    None,
}

#[derive(Clone, Copy)]
pub(crate) enum Ep0Next<'a> {
    None,
    In(&'a [u8]),
    /// Reply out of the driver's two-byte scratch.
    InShort(u8),
    Out(usize),
}

const ACTIVE_STATUS: [u8; 2] = [0x00, 0x00];
const HALTED_STATUS: [u8; 2] = [0x01, 0x00];

/// Decodes the 8 SETUP bytes into the request record.
pub(crate) fn decode_setup(setup: &[u8; 8]) -> Request {
    let rt = setup[0];
    Request {
        direction: rt.into(),
        request_type: match (rt >> 5) & 0b11 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        },
        recipient: match rt & 0b1_1111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        },
        request: setup[1],
        value: u16::from_le_bytes([setup[2], setup[3]]),
        index: u16::from_le_bytes([setup[4], setup[5]]),
        length: u16::from_le_bytes([setup[6], setup[7]]),
    }
}

/// A device-recipient SET_ADDRESS, matched on the raw SETUP bytes.
fn is_set_address(setup: &[u8; 8]) -> bool {
    setup[0] == 0x00 && setup[1] == Request::SET_ADDRESS
}

impl<'a, L: UsbLld, const EP_COUNT: usize> Driver<'a, L, EP_COUNT> {
    /// Prepares the data and status phases of the control transfer
    /// whose SETUP packet is currently being handled.
    ///
    /// Meant to be called from a requests hook. The transfer length is
    /// clamped to the length the host requested. `end` runs when the
    /// transfer completes its status phase; for host-to-device
    /// transfers the received bytes are available to it through
    /// [`control_data`](Driver::control_data).
    pub fn setup_transfer(
        &mut self,
        data: DataStage<'a>,
        end: Option<TransferEndFn<'a, L, EP_COUNT>>,
    ) {
        self.ep0_next = match data {
            DataStage::In(bytes) => Ep0Next::In(bytes),
            DataStage::Out(len) => {
                debug_assert!(len <= CONTROL_BUFFER_LEN, "control receive too long");
                Ep0Next::Out(len)
            }
            DataStage::None => Ep0Next::None,
        };
        self.ep0_end = end;
    }

    /// Data received by the most recent host-to-device data stage.
    pub fn control_data(&self) -> &[u8] {
        &self.ep0_buf[..self.ep0_rx_len]
    }

    /// Short computed reply, copied into the driver's scratch.
    pub(crate) fn reply_short(&mut self, bytes: &[u8]) {
        self.ep0_short[..bytes.len()].copy_from_slice(bytes);
        self.ep0_next = Ep0Next::InShort(bytes.len() as u8);
        self.ep0_end = None;
    }

    fn ep0_in_max(&self) -> usize {
        let ep0 = self.ep[0].as_ref().expect("EP0 not initialized");
        ep0.config.in_max_packet as usize
    }

    /// Endpoint zero IN completion.
    pub(crate) fn ep0_in(&mut self) {
        match self.ep0 {
            ControlPhase::Tx { zlp } => {
                if zlp {
                    // Terminate a short reply that filled its last packet.
                    self.ep0 = ControlPhase::Tx { zlp: false };
                    self.lld.start_in(0, &[]);
                } else {
                    self.ep0 = ControlPhase::WaitingStatus;
                    self.lld.start_out(0, 0);
                }
                return;
            }
            ControlPhase::SendingStatus => {
                if cfg!(not(feature = "early-set-address")) && is_set_address(&self.setup) {
                    self.commit_address();
                }
                self.ep0_finish();
                return;
            }
            _ => {}
        }
        self.ep0_error();
    }

    /// Endpoint zero OUT completion; `n` is the received size.
    pub(crate) fn ep0_out(&mut self, n: usize) {
        match self.ep0 {
            ControlPhase::WaitingSetup => {
                let mut setup = [0u8; 8];
                let got = self.lld.read_packet(0, &mut setup);
                self.setup = setup;
                if got == 8 {
                    self.dispatch_setup();
                    return;
                }
            }
            ControlPhase::Rx => {
                let got = self.lld.read_packet(0, &mut self.ep0_buf);
                self.ep0_rx_len = got.min(CONTROL_BUFFER_LEN);
                self.ep0 = ControlPhase::SendingStatus;
                self.lld.start_in(0, &[]);
                return;
            }
            ControlPhase::WaitingStatus => {
                // The status packet must be zero sized.
                if n == 0 {
                    self.ep0_finish();
                    return;
                }
            }
            _ => {}
        }
        self.ep0_error();
    }

    /// Decodes a freshly received SETUP packet, runs its handler and
    /// starts the data or status phase.
    fn dispatch_setup(&mut self) {
        self.ep0_next = Ep0Next::None;
        self.ep0_end = None;

        let req = decode_setup(&self.setup);
        trace!("EP0 SETUP {} {}", self.setup[0], self.setup[1]);

        let handled = match self.config().requests_hook {
            Some(hook) => hook(self, &req),
            None => false,
        };
        if !handled
            && (req.request_type != RequestType::Standard || !self.standard_request(&req))
        {
            self.ep0_error();
            return;
        }

        // The transfer cannot exceed what the host asked for.
        let requested = req.length as usize;
        let next = self.ep0_next;
        if req.direction == UsbDirection::In {
            let n = match next {
                Ep0Next::In(data) => data.len(),
                Ep0Next::InShort(len) => len as usize,
                _ => 0,
            }
            .min(requested);
            if n > 0 {
                // A reply shorter than requested whose last packet is
                // full needs a zero-length packet to end the stage.
                let zlp = n < requested && n % self.ep0_in_max() == 0;
                self.ep0 = ControlPhase::Tx { zlp };
                match next {
                    Ep0Next::In(data) => self.lld.start_in(0, &data[..n]),
                    _ => {
                        let short = self.ep0_short;
                        self.lld.start_in(0, &short[..n]);
                    }
                }
            } else {
                self.ep0 = ControlPhase::WaitingStatus;
                self.lld.start_out(0, 0);
            }
        } else {
            let n = match next {
                Ep0Next::Out(len) => len.min(requested),
                _ => 0,
            };
            if n > 0 {
                self.ep0 = ControlPhase::Rx;
                self.lld.start_out(0, n);
            } else {
                self.ep0 = ControlPhase::SendingStatus;
                self.lld.start_in(0, &[]);
            }
        }
    }

    /// Default handling for standard requests. Returns `false` when the
    /// request is not recognized, which stalls endpoint zero.
    fn standard_request(&mut self, req: &Request) -> bool {
        match (req.recipient, req.request) {
            (Recipient::Device, Request::GET_STATUS) => {
                let status = self.status.bits().to_le_bytes();
                self.reply_short(&status);
                true
            }
            (Recipient::Device, Request::CLEAR_FEATURE) => {
                // Only DEVICE_REMOTE_WAKEUP is handled here; any other
                // feature selector is an error.
                if req.value == Request::FEATURE_DEVICE_REMOTE_WAKEUP {
                    self.status.remove(DeviceStatus::REMOTE_WAKEUP);
                    self.setup_transfer(DataStage::None, None);
                    true
                } else {
                    false
                }
            }
            (Recipient::Device, Request::SET_FEATURE) => {
                if req.value == Request::FEATURE_DEVICE_REMOTE_WAKEUP {
                    self.status.insert(DeviceStatus::REMOTE_WAKEUP);
                    self.setup_transfer(DataStage::None, None);
                    true
                } else {
                    false
                }
            }
            (Recipient::Device, Request::SET_ADDRESS) => {
                // The commit happens either here or when the status
                // phase completes, per the `early-set-address` feature.
                if cfg!(feature = "early-set-address") && is_set_address(&self.setup) {
                    self.commit_address();
                }
                self.setup_transfer(DataStage::None, None);
                true
            }
            (Recipient::Device, Request::GET_DESCRIPTOR) => {
                let dtype = (req.value >> 8) as u8;
                let dindex = req.value as u8;
                let get_descriptor = self.config().get_descriptor;
                match get_descriptor(self, dtype, dindex, req.index) {
                    Some(descriptor) => {
                        self.setup_transfer(DataStage::In(descriptor.bytes()), None);
                        true
                    }
                    None => false,
                }
            }
            (Recipient::Device, Request::GET_CONFIGURATION) => {
                let configuration = [self.configuration];
                self.reply_short(&configuration);
                true
            }
            (Recipient::Device, Request::SET_CONFIGURATION) => {
                self.configuration = req.value as u8;
                self.state = if self.configuration == 0 {
                    DeviceState::Selected
                } else {
                    DeviceState::Active
                };
                debug!("CONFIGURED {}", self.configuration);
                self.fire_event(Event::Configured);
                self.setup_transfer(DataStage::None, None);
                true
            }
            (Recipient::Interface, Request::GET_STATUS)
            | (Recipient::Endpoint, Request::SYNCH_FRAME) => {
                // Two zero bytes; anything richer comes from the hook.
                self.reply_short(&ACTIVE_STATUS);
                true
            }
            (Recipient::Endpoint, Request::GET_STATUS) => {
                let ep = (req.index & 0x0F) as u8;
                let status = if req.index & 0x80 != 0 {
                    self.lld.status_in(ep)
                } else {
                    self.lld.status_out(ep)
                };
                match status {
                    EpStatus::Stalled => {
                        self.reply_short(&HALTED_STATUS);
                        true
                    }
                    EpStatus::Active => {
                        self.reply_short(&ACTIVE_STATUS);
                        true
                    }
                    EpStatus::Disabled => false,
                }
            }
            (Recipient::Endpoint, Request::CLEAR_FEATURE) => {
                if req.value != Request::FEATURE_ENDPOINT_HALT {
                    return false;
                }
                // Not valid for endpoint zero; ignored in that case.
                let ep = (req.index & 0x0F) as u8;
                if ep > 0 {
                    if req.index & 0x80 != 0 {
                        self.lld.clear_in(ep);
                    } else {
                        self.lld.clear_out(ep);
                    }
                }
                self.setup_transfer(DataStage::None, None);
                true
            }
            (Recipient::Endpoint, Request::SET_FEATURE) => {
                if req.value != Request::FEATURE_ENDPOINT_HALT {
                    return false;
                }
                let ep = (req.index & 0x0F) as u8;
                if ep > 0 {
                    if req.index & 0x80 != 0 {
                        self.lld.stall_in(ep);
                    } else {
                        self.lld.stall_out(ep);
                    }
                }
                self.setup_transfer(DataStage::None, None);
                true
            }
            // SET_DESCRIPTOR, GET_INTERFACE, SET_INTERFACE and the
            // interface feature requests are left to the requests hook.
            _ => false,
        }
    }

    /// Commits the address carried by the pending SET_ADDRESS request.
    fn commit_address(&mut self) {
        self.address = self.setup[2];
        self.lld.set_address(self.address);
        debug!("ADDRESS {}", self.address);
        self.fire_event(Event::Address);
        self.state = DeviceState::Selected;
    }

    /// Successful end of a control transfer.
    fn ep0_finish(&mut self) {
        self.ep0 = ControlPhase::WaitingSetup;
        if let Some(end) = self.ep0_end.take() {
            end(self);
        }
    }

    /// Protocol error response: stall both halves of endpoint zero and
    /// wait for the next SETUP.
    fn ep0_error(&mut self) {
        warn!("EP0 STALL");
        self.lld.stall_in(0);
        self.lld.stall_out(0);
        self.fire_event(Event::Stalled);
        self.ep0 = ControlPhase::WaitingSetup;
        self.ep0_end = None;
    }
}
