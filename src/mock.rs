//! A recording low-level driver for exercising the core on the host.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::driver::{Config, Descriptor, Driver, Event};
use crate::endpoint::EndpointConfig;
use crate::lld::{EpStatus, UsbLld};

/// One recorded low-level driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Init,
    Start,
    Stop,
    Reset,
    SetAddress(u8),
    InitEndpoint(u8),
    DisableEndpoints,
    StartIn(u8, Vec<u8>),
    StartOut(u8, usize),
    WritePacket(u8, Vec<u8>),
    StallIn(u8),
    StallOut(u8),
    ClearIn(u8),
    ClearOut(u8),
}

pub(crate) struct MockLld {
    pub ops: Vec<Op>,
    /// Packets handed out by `read_packet`, front first.
    pub rx: VecDeque<Vec<u8>>,
    pub in_status: [EpStatus; 16],
    pub out_status: [EpStatus; 16],
    /// Events captured by the test configurations.
    pub events: Vec<Event>,
    /// `(endpoint, is_in)` completion callbacks observed by tests.
    pub notifications: Vec<(u8, bool)>,
    /// End-of-transfer callback invocations observed by tests.
    pub transfer_ends: usize,
}

impl MockLld {
    pub fn new() -> Self {
        MockLld {
            ops: Vec::new(),
            rx: VecDeque::new(),
            in_status: [EpStatus::Disabled; 16],
            out_status: [EpStatus::Disabled; 16],
            events: Vec::new(),
            notifications: Vec::new(),
            transfer_ends: 0,
        }
    }

    pub fn take_ops(&mut self) -> Vec<Op> {
        core::mem::take(&mut self.ops)
    }
}

impl UsbLld for MockLld {
    fn init(&mut self) {
        self.ops.push(Op::Init);
    }

    fn start(&mut self) {
        self.ops.push(Op::Start);
    }

    fn stop(&mut self) {
        self.ops.push(Op::Stop);
    }

    fn reset(&mut self) {
        self.ops.push(Op::Reset);
    }

    fn set_address(&mut self, address: u8) {
        self.ops.push(Op::SetAddress(address));
    }

    fn init_endpoint(&mut self, ep: u8, _config: &EndpointConfig) {
        self.ops.push(Op::InitEndpoint(ep));
    }

    fn disable_endpoints(&mut self) {
        self.ops.push(Op::DisableEndpoints);
    }

    fn start_in(&mut self, ep: u8, data: &[u8]) {
        self.ops.push(Op::StartIn(ep, data.to_vec()));
    }

    fn start_out(&mut self, ep: u8, len: usize) {
        self.ops.push(Op::StartOut(ep, len));
    }

    fn read_packet(&mut self, _ep: u8, buf: &mut [u8]) -> usize {
        let packet = self.rx.pop_front().unwrap_or_default();
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        packet.len()
    }

    fn write_packet(&mut self, ep: u8, data: &[u8]) {
        self.ops.push(Op::WritePacket(ep, data.to_vec()));
    }

    fn stall_in(&mut self, ep: u8) {
        self.ops.push(Op::StallIn(ep));
    }

    fn stall_out(&mut self, ep: u8) {
        self.ops.push(Op::StallOut(ep));
    }

    fn clear_in(&mut self, ep: u8) {
        self.ops.push(Op::ClearIn(ep));
    }

    fn clear_out(&mut self, ep: u8) {
        self.ops.push(Op::ClearOut(ep));
    }

    fn status_in(&self, ep: u8) -> EpStatus {
        self.in_status[ep as usize]
    }

    fn status_out(&self, ep: u8) -> EpStatus {
        self.out_status[ep as usize]
    }

    fn ep0_max_packet(&self) -> u16 {
        64
    }
}

pub(crate) type TestDriver = Driver<'static, MockLld, 5>;

pub(crate) static DEVICE_DESCRIPTOR: [u8; 18] = [
    18, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 64, 0x83, 0x04, 0x11, 0x57, 0x00, 0x01, 1, 2, 3, 1,
];

/// Sized to one full EP0 packet, for zero-length-terminator coverage.
pub(crate) static CONFIG_DESCRIPTOR: [u8; 64] = {
    let mut d = [0u8; 64];
    d[0] = 9;
    d[1] = 0x02;
    d[2] = 64;
    d[4] = 1;
    d
};

pub(crate) fn get_descriptor(
    _usb: &mut TestDriver,
    dtype: u8,
    dindex: u8,
    _langid: u16,
) -> Option<Descriptor<'static>> {
    match (dtype, dindex) {
        (0x01, 0) => Some(Descriptor::new(&DEVICE_DESCRIPTOR)),
        (0x02, 0) => Some(Descriptor::new(&CONFIG_DESCRIPTOR)),
        _ => None,
    }
}

pub(crate) fn record_event(usb: &mut TestDriver, event: Event) {
    usb.lld_mut().events.push(event);
}

pub(crate) static TEST_CONFIG: Config<'static, MockLld, 5> = Config {
    get_descriptor,
    requests_hook: None,
    event: Some(record_event),
};

/// A driver that has been started and has seen a bus reset, with the
/// construction noise dropped from the call log.
pub(crate) fn started() -> TestDriver {
    let mut usb = Driver::new(MockLld::new());
    usb.start(&TEST_CONFIG);
    usb.reset();
    usb.lld_mut().ops.clear();
    usb
}

/// Delivers a SETUP packet the way a low-level driver would: queue the
/// bytes, then report an EP0 OUT completion.
pub(crate) fn send_setup(usb: &mut TestDriver, setup: [u8; 8]) {
    usb.lld_mut().rx.push_back(setup.to_vec());
    usb.out_complete(0, 8);
}
