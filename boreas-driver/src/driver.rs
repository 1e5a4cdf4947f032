//! The per-tick bus driver.
//!
//! [`ErvDriver::poll`] is the whole external surface. The host calls it
//! from its scheduler with the port, the sink and the current timestamp;
//! the driver drains buffered frames, takes its transmit opportunity if
//! flow control allows one, then generates periodic traffic.

use boreas_protocol::message::{
    MSG_CONTROL_ACK, MSG_CONTROL_OFFER, MSG_PING_REPLY, MSG_READ_REQUEST, MSG_WRITE_REQUEST,
};
use boreas_protocol::{
    encode_frame, FieldTuples, Message, Value, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
use heapless::Vec;
use log::{debug, warn};

use crate::config::DriverConfig;
use crate::flow::FlowControl;
use crate::link::{FrameReader, ReceivedFrame};
use crate::queue::{SendQueue, TxPayload, MAX_TX_PAYLOAD};
use crate::registry::{FieldId, Registry};
use crate::scan::{OpcodeSweep, UnknownFields};
use crate::traits::{BusPort, FanMode, StateSink};

/// Keepalive payload: a zero-length write to the (0x00, 0x50) register.
const HEARTBEAT_PAYLOAD: [u8; 4] = [MSG_WRITE_REQUEST, 0x00, 0x50, 0x00];

/// Driver for one ERV bus.
///
/// Owns every piece of bus state. The port and sink are borrowed per
/// tick so the host keeps ownership of its peripherals.
pub struct ErvDriver {
    config: DriverConfig,
    reader: FrameReader,
    registry: Registry,
    queue: SendQueue,
    flow: FlowControl,
    unknown: UnknownFields,
    sweep: OpcodeSweep,
    /// Timestamp of the last queued keepalive (ms)
    last_heartbeat_ms: u32,
}

impl ErvDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            reader: FrameReader::new(),
            registry: Registry::new(),
            queue: SendQueue::new(),
            flow: FlowControl::new(),
            unknown: UnknownFields::new(),
            sweep: OpcodeSweep::new(),
            last_heartbeat_ms: 0,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The field catalog and its current values.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable catalog access, for hosts that tune poll cadences.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Flow-control state, for diagnostics.
    pub fn flow(&self) -> &FlowControl {
        &self.flow
    }

    /// Unmapped registers seen so far.
    pub fn unknown_fields(&self) -> &UnknownFields {
        &self.unknown
    }

    /// Number of messages waiting for a transmit window.
    pub fn queued_messages(&self) -> usize {
        self.queue.len()
    }

    /// One scheduler tick.
    ///
    /// Phases run in a fixed order: drain and dispatch buffered frames,
    /// run the flow-control reply step, then the periodic tasks (field
    /// polls, the keepalive, the discovery sweep).
    pub fn poll<P: BusPort, S: StateSink>(&mut self, port: &mut P, sink: &mut S, now_ms: u32) {
        self.drain_frames(port, sink, now_ms);
        self.reply_step(port, now_ms);
        self.run_tasks(now_ms);
    }

    /// Queue a write request for one or more fields.
    ///
    /// Each assignment encodes as `(opcode, length, value bytes)` with
    /// the length taken from the field's registered kind, so assignments
    /// should carry a value of that kind. The ERV confirms with a write
    /// ack, which marks the fields dirty.
    pub fn write_fields(&mut self, assignments: &[(FieldId, Value)]) {
        if assignments.is_empty() {
            return;
        }

        let mut payload = TxPayload::new();
        let _ = payload.push(MSG_WRITE_REQUEST);

        for &(id, value) in assignments {
            let field = self.registry.get(id);
            let length = field.kind.wire_len();
            let wire = value.to_wire();

            if payload.len() + 3 + length > MAX_TX_PAYLOAD {
                warn!(
                    "write request full, dropping assignment for {:02X}{:02X}",
                    field.opcode.high, field.opcode.low
                );
                continue;
            }
            let _ = payload.push(field.opcode.high);
            let _ = payload.push(field.opcode.low);
            let _ = payload.push(length as u8);
            let _ = payload.extend_from_slice(&wire[..length]);
        }

        self.queue.enqueue(payload);
    }

    /// Read and dispatch frames until the buffer runs dry or a frame
    /// fails, whichever comes first.
    fn drain_frames<P: BusPort, S: StateSink>(&mut self, port: &mut P, sink: &mut S, now_ms: u32) {
        loop {
            if !self.reader.try_read_header(port) {
                break;
            }
            match self.reader.try_read_frame(port) {
                Some(frame) => self.dispatch(port, sink, now_ms, &frame),
                None => break,
            }
        }
    }

    /// Route one validated frame.
    fn dispatch<P: BusPort, S: StateSink>(
        &mut self,
        port: &mut P,
        sink: &mut S,
        now_ms: u32,
        frame: &ReceivedFrame,
    ) {
        // A ping reply crossing the bus settles the alternation even
        // when the rest of dispatch filters the frame out
        if frame.target == self.config.local_address
            && frame.payload.first() == Some(&MSG_PING_REPLY)
        {
            self.flow.clear_reply_pending();
        }

        if !self.config.listen_only && frame.target != self.config.local_address {
            return;
        }

        let message = match Message::parse(&frame.payload) {
            Some(message) => message,
            None => {
                warn!("empty payload from {:02X}", frame.sender);
                return;
            }
        };

        match message {
            Message::Ping(echo) => {
                debug!("0x02 ping");
                // The reply swaps the type byte, so it is exactly as long
                // as the inbound payload and always fits the wire limit
                let mut reply: Vec<u8, MAX_PAYLOAD_SIZE> = Vec::new();
                let _ = reply.push(MSG_PING_REPLY);
                let _ = reply.extend_from_slice(echo);
                self.send_frame(port, &reply);
                self.flow.mark_ready();
            }
            Message::ControlOffer => {
                self.flow.on_control_offer(now_ms);
                self.send_frame(port, &[MSG_CONTROL_ACK]);
            }
            Message::ControlAck => {
                // The ERV confirming a returned token; nothing to do
            }
            Message::ReadReply(tuples) => {
                self.apply_read_reply(sink, tuples);
                self.flow.clear_reply_pending();
            }
            Message::WriteAck(pairs) => {
                for opcode in pairs {
                    match self.registry.id_for(opcode) {
                        Some(id) => self.registry.get_mut(id).mark_dirty(),
                        None => warn!(
                            "write ack for unknown field {:02X} {:02X}",
                            opcode.high, opcode.low
                        ),
                    }
                }
                self.flow.clear_reply_pending();
            }
            Message::ReadRequest(_) if self.config.listen_only => {
                // Another participant polling; nothing to do with it
            }
            Message::WriteRequest(mut tuples) if self.config.listen_only => {
                while let Some(tuple) = tuples.next() {
                    debug!(
                        "observed write to {:02X}{:02X} ({} bytes)",
                        tuple.opcode.high,
                        tuple.opcode.low,
                        tuple.bytes.len()
                    );
                }
            }
            _ => {
                warn!(
                    "unhandled message type {:02X}: {:02X?}",
                    frame.payload[0],
                    &frame.payload[1..]
                );
            }
        }
    }

    /// Walk a read reply's tuples, store changed values and fan the
    /// reactions out to the sink.
    fn apply_read_reply<S: StateSink>(&mut self, sink: &mut S, mut tuples: FieldTuples<'_>) {
        while let Some(tuple) = tuples.next() {
            // Registered fields hold at most four bytes; longer tuples
            // go to diagnostics with the walk kept aligned
            let id = if tuple.declared_len <= 4 {
                self.registry.id_for(tuple.opcode)
            } else {
                None
            };
            let id = match id {
                Some(id) => id,
                None => {
                    self.unknown.observe(
                        tuple.opcode,
                        tuple.declared_len,
                        tuple.bytes,
                        self.config.scan_unknown,
                    );
                    continue;
                }
            };

            let field = self.registry.get_mut(id);
            if !field.apply_bytes(tuple.bytes) {
                continue;
            }
            let opcode = field.opcode;
            let value = field.value();

            self.publish_reaction(sink, id, value);

            match value {
                Value::Byte(byte) => {
                    debug!("{:02X}{:02X} is now byte {:02X}", opcode.high, opcode.low, byte)
                }
                Value::Int(int) => {
                    debug!("{:02X}{:02X} is now int {}", opcode.high, opcode.low, int)
                }
                Value::Float(float) => {
                    debug!("{:02X}{:02X} is now float {}", opcode.high, opcode.low, float)
                }
                Value::Void => {}
            }
        }

        if tuples.truncated() {
            warn!("read reply ended mid-tuple, remainder dropped");
        }
    }

    /// Publish a changed value to the sink, per field identity.
    fn publish_reaction<S: StateSink>(&self, sink: &mut S, id: FieldId, value: Value) {
        match id {
            FieldId::FanMode => {
                if let Value::Byte(byte) = value {
                    sink.fan_mode_changed(FanMode::from_byte(byte));
                }
            }
            FieldId::SupplyFlowMedium => {
                // Bounds may still be zero before their first poll; the
                // remap then divides by zero and publishes the resulting
                // infinity or NaN. The next bound poll corrects it.
                let min = self.registry.get(FieldId::SupplyFlowMin).value().as_f32();
                let max = self.registry.get(FieldId::SupplyFlowMax).value().as_f32();
                sink.fan_speed_changed(remap(value.as_f32(), min, max, 0.0, 100.0));
            }
            FieldId::Wattage => sink.power_changed(value.as_f32()),
            FieldId::FilterLife => sink.filter_life_changed(value.as_u32()),
            // Probe-to-opcode mapping differs between ERV models, so
            // temperatures are stored but not published yet
            FieldId::TemperatureA | FieldId::TemperatureB => {}
            // Bounds feed the medium remap; no reaction of their own
            FieldId::SupplyFlowMin | FieldId::SupplyFlowMax => {}
        }
    }

    /// Flow-control reply step: at most one transmission per tick.
    fn reply_step<P: BusPort>(&mut self, port: &mut P, now_ms: u32) {
        self.flow
            .check_liveness(now_ms, self.config.ready_timeout_ms);

        if !self.flow.can_transmit() {
            return;
        }

        if let Some(payload) = self.queue.pop() {
            self.send_frame(port, &payload);
            self.flow.note_request_sent();
            return;
        }

        // Nothing queued, hand the token back
        self.send_frame(port, &[MSG_CONTROL_OFFER]);
        self.flow.release();
    }

    /// Periodic traffic: batched field polls, the keepalive and the
    /// discovery sweep.
    fn run_tasks(&mut self, now_ms: u32) {
        if self.flow.is_ready() {
            self.queue_poll_batch(now_ms);
        }

        if now_ms.wrapping_sub(self.last_heartbeat_ms) > self.config.heartbeat_interval_ms {
            self.last_heartbeat_ms = now_ms;
            let mut payload = TxPayload::new();
            let _ = payload.extend_from_slice(&HEARTBEAT_PAYLOAD);
            self.queue.enqueue(payload);
        }

        if self.config.scan_unknown {
            if let Some(request) = self.sweep.next_request(now_ms, self.flow.is_ready()) {
                self.queue.enqueue(request);
            }
        }
    }

    /// Collect due fields into one batched read request.
    fn queue_poll_batch(&mut self, now_ms: u32) {
        // However large the configured cap, a batch cannot outgrow its
        // payload
        let cap = self.config.max_poll_opcodes.min((MAX_TX_PAYLOAD - 1) / 2);

        let mut request = TxPayload::new();
        let mut count = 0;

        for field in self.registry.iter_mut() {
            if count >= cap {
                break;
            }
            if !field.due_for_poll(now_ms) {
                continue;
            }

            // Optimistic, a lost request just waits out the next interval
            field.note_polled(now_ms);
            count += 1;

            if request.is_empty() {
                let _ = request.push(MSG_READ_REQUEST);
            }
            let _ = request.push(field.opcode.high);
            let _ = request.push(field.opcode.low);
        }

        if !request.is_empty() {
            self.queue.enqueue(request);
        }
    }

    /// Frame and transmit a payload, unless listening only.
    fn send_frame<P: BusPort>(&self, port: &mut P, payload: &[u8]) {
        if self.config.listen_only {
            return;
        }

        let mut buffer = [0u8; MAX_FRAME_SIZE];
        match encode_frame(
            self.config.erv_address,
            self.config.local_address,
            payload,
            &mut buffer,
        ) {
            Ok(length) => port.write_all(&buffer[..length]),
            Err(error) => warn!("could not frame outbound message: {:?}", error),
        }
    }
}

/// Linear remap of `value` from one range onto another.
fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::POLL_NEVER;
    use crate::testutil::{MockPort, RecordingSink};
    use boreas_protocol::encode_frame_vec;

    fn driver() -> ErvDriver {
        ErvDriver::new(DriverConfig::default())
    }

    fn feed_from_erv(port: &mut MockPort, payload: &[u8]) {
        let wire = encode_frame_vec(0x01, 0x02, payload).unwrap();
        port.feed(&wire);
    }

    /// Assert the transmit side holds exactly these framed payloads.
    fn expect_sent(port: &MockPort, payloads: &[&[u8]]) {
        let mut expected: heapless::Vec<u8, 512> = heapless::Vec::new();
        for payload in payloads {
            let wire = encode_frame_vec(0x02, 0x01, payload).unwrap();
            expected.extend_from_slice(&wire).unwrap();
        }
        assert_eq!(&port.tx[..], &expected[..]);
    }

    #[test]
    fn test_ping_is_echoed_with_reply_type() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02, 0xAA, 0xBB]);
        driver.poll(&mut port, &mut sink, 10);

        expect_sent(&port, &[&[0x03, 0xAA, 0xBB]]);
        assert!(driver.flow().is_ready());
    }

    #[test]
    fn test_long_ping_body_echoed_in_full() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        // An 80-byte echo body, far past what one queued payload holds
        let mut ping: heapless::Vec<u8, 128> = heapless::Vec::new();
        ping.push(0x02).unwrap();
        for byte in 1..=80u8 {
            ping.push(byte).unwrap();
        }
        feed_from_erv(&mut port, &ping);
        driver.poll(&mut port, &mut sink, 10);

        let mut reply = ping.clone();
        reply[0] = 0x03;
        expect_sent(&port, &[&reply[..]]);
        assert!(driver.flow().is_ready());
    }

    #[test]
    fn test_control_offer_acked_then_released_when_idle() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);

        // Ack during dispatch, then the release because nothing is queued
        expect_sent(&port, &[&[0x05], &[0x04]]);
        assert!(!driver.flow().holds_control());
        assert!(driver.flow().is_ready());
    }

    #[test]
    fn test_control_offer_with_queued_write_keeps_token() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        driver.write_fields(&[(FieldId::FanMode, Value::Byte(0x0B))]);
        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);

        expect_sent(&port, &[&[0x05], &[0x40, 0x01, 0x20, 0x01, 0x0B]]);
        assert!(driver.flow().holds_control());
        assert!(driver.flow().reply_pending());
    }

    #[test]
    fn test_request_response_alternation() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        driver.write_fields(&[(FieldId::FanMode, Value::Byte(0x0A))]);
        driver.write_fields(&[(FieldId::FanMode, Value::Byte(0x0B))]);
        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);

        // First write out, second held back
        assert_eq!(driver.queued_messages(), 1);
        let after_first = port.tx.len();

        // No response, so nothing new goes out
        driver.poll(&mut port, &mut sink, 20);
        assert_eq!(port.tx.len(), after_first);
        assert_eq!(driver.queued_messages(), 1);

        // The write ack unblocks the next send
        feed_from_erv(&mut port, &[0x41, 0x01, 0x20]);
        driver.poll(&mut port, &mut sink, 30);
        assert_eq!(driver.queued_messages(), 0);
        assert!(port.tx.len() > after_first);
    }

    #[test]
    fn test_fan_mode_change_published_once() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x21, 0x01, 0x20, 0x01, 0x0A]);
        driver.poll(&mut port, &mut sink, 10);
        feed_from_erv(&mut port, &[0x21, 0x01, 0x20, 0x01, 0x0A]);
        driver.poll(&mut port, &mut sink, 20);

        assert_eq!(&sink.modes[..], &[FanMode::Max]);
    }

    #[test]
    fn test_supply_flow_remapped_against_bounds() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        // Min 50.0 and max 150.0, stored without publishing
        feed_from_erv(
            &mut port,
            &[
                0x21, 0x23, 0x40, 0x04, 0x00, 0x00, 0x48, 0x42, 0x25, 0x40, 0x04, 0x00, 0x00,
                0x16, 0x43,
            ],
        );
        driver.poll(&mut port, &mut sink, 10);
        assert!(sink.speeds.is_empty());

        // Medium 100.0 lands halfway between the bounds
        feed_from_erv(&mut port, &[0x21, 0x24, 0x40, 0x04, 0x00, 0x00, 0xC8, 0x42]);
        driver.poll(&mut port, &mut sink, 20);
        assert_eq!(&sink.speeds[..], &[50.0]);
    }

    #[test]
    fn test_wattage_and_filter_life_published() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(
            &mut port,
            &[
                0x21, 0x07, 0x50, 0x04, 0x00, 0x00, 0x91, 0x42, 0x01, 0x60, 0x04, 0x55, 0x00,
                0x00, 0x00,
            ],
        );
        driver.poll(&mut port, &mut sink, 10);

        assert_eq!(&sink.watts[..], &[72.5]);
        assert_eq!(&sink.filter[..], &[85]);
    }

    #[test]
    fn test_unknown_tuple_skipped_with_walk_aligned() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        // An unmapped 4-byte register followed by the fan mode
        feed_from_erv(
            &mut port,
            &[
                0x21, 0xAB, 0xCD, 0x04, 0x01, 0x02, 0x03, 0x04, 0x01, 0x20, 0x01, 0x0A,
            ],
        );
        driver.poll(&mut port, &mut sink, 10);

        assert_eq!(&sink.modes[..], &[FanMode::Max]);
        assert_eq!(driver.unknown_fields().len(), 0);
    }

    #[test]
    fn test_unknown_tuple_tracked_when_scanning() {
        let config = DriverConfig {
            scan_unknown: true,
            ..DriverConfig::default()
        };
        let mut driver = ErvDriver::new(config);
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x21, 0xAB, 0xCD, 0x04, 0x01, 0x02, 0x03, 0x04]);
        driver.poll(&mut port, &mut sink, 10);

        assert_eq!(driver.unknown_fields().len(), 1);
    }

    #[test]
    fn test_partial_length_update_keeps_high_bytes() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x21, 0x01, 0x60, 0x04, 0x04, 0x03, 0x02, 0x01]);
        driver.poll(&mut port, &mut sink, 10);
        feed_from_erv(&mut port, &[0x21, 0x01, 0x60, 0x01, 0xAA]);
        driver.poll(&mut port, &mut sink, 20);

        assert_eq!(&sink.filter[..], &[0x0102_0304, 0x0102_03AA]);
    }

    #[test]
    fn test_write_ack_marks_field_dirty() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x41, 0x01, 0x20]);
        driver.poll(&mut port, &mut sink, 10);

        assert!(driver.registry().get(FieldId::FanMode).is_dirty());
        assert!(!driver.registry().get(FieldId::Wattage).is_dirty());
    }

    #[test]
    fn test_write_request_encodes_registered_kinds() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        driver.write_fields(&[
            (FieldId::SupplyFlowMedium, Value::Float(100.0)),
            (FieldId::FanMode, Value::Byte(0x0B)),
        ]);
        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);

        expect_sent(
            &port,
            &[
                &[0x05],
                &[
                    0x40, 0x24, 0x40, 0x04, 0x00, 0x00, 0xC8, 0x42, 0x01, 0x20, 0x01, 0x0B,
                ],
            ],
        );
    }

    #[test]
    fn test_empty_write_not_queued() {
        let mut driver = driver();
        driver.write_fields(&[]);
        assert_eq!(driver.queued_messages(), 0);
    }

    #[test]
    fn test_listen_only_never_transmits() {
        let config = DriverConfig {
            listen_only: true,
            ..DriverConfig::default()
        };
        let mut driver = ErvDriver::new(config);
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02]);
        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);

        assert!(port.tx.is_empty());
    }

    #[test]
    fn test_listen_only_follows_foreign_traffic() {
        let config = DriverConfig {
            listen_only: true,
            ..DriverConfig::default()
        };
        let mut driver = ErvDriver::new(config);
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        // A reply addressed to some other participant
        let wire = encode_frame_vec(0x03, 0x02, &[0x21, 0x01, 0x20, 0x01, 0x0A]).unwrap();
        port.feed(&wire);
        driver.poll(&mut port, &mut sink, 10);

        assert_eq!(&sink.modes[..], &[FanMode::Max]);
    }

    #[test]
    fn test_foreign_traffic_ignored_normally() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        let wire = encode_frame_vec(0x03, 0x02, &[0x21, 0x01, 0x20, 0x01, 0x0A]).unwrap();
        port.feed(&wire);
        driver.poll(&mut port, &mut sink, 10);

        assert!(sink.modes.is_empty());
        assert!(port.tx.is_empty());
    }

    #[test]
    fn test_ping_reply_settles_alternation() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        driver.write_fields(&[(FieldId::FanMode, Value::Byte(0x0A))]);
        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10);
        assert!(driver.flow().reply_pending());

        feed_from_erv(&mut port, &[0x03]);
        driver.poll(&mut port, &mut sink, 20);
        assert!(!driver.flow().reply_pending());
    }

    #[test]
    fn test_heartbeat_queued_on_interval() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        driver.poll(&mut port, &mut sink, 5_001);
        assert_eq!(driver.queued_messages(), 1);

        // Not again until another interval passes
        driver.poll(&mut port, &mut sink, 5_002);
        assert_eq!(driver.queued_messages(), 1);

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 5_010);
        expect_sent(&port, &[&[0x05], &[0x40, 0x00, 0x50, 0x00]]);
    }

    #[test]
    fn test_poll_batch_requests_due_fields() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02]);
        driver.poll(&mut port, &mut sink, 0);
        assert_eq!(driver.queued_messages(), 0);

        // Only the fan mode is due this early
        driver.poll(&mut port, &mut sink, 1_500);
        assert_eq!(driver.queued_messages(), 1);

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 1_600);
        expect_sent(&port, &[&[0x03], &[0x05], &[0x20, 0x01, 0x20]]);
    }

    #[test]
    fn test_poll_batch_respects_opcode_cap() {
        let config = DriverConfig {
            max_poll_opcodes: 2,
            ..DriverConfig::default()
        };
        let mut driver = ErvDriver::new(config);
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02]);
        driver.poll(&mut port, &mut sink, 0);

        // Three fields are due at 9s but the cap holds the batch to two
        driver.poll(&mut port, &mut sink, 9_000);
        assert_eq!(driver.queued_messages(), 2); // batch plus heartbeat

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 9_100);
        expect_sent(&port, &[&[0x03], &[0x05], &[0x20, 0x01, 0x20, 0x24, 0x40]]);
    }

    #[test]
    fn test_quiet_bus_reported_down_and_recovers() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02]);
        driver.poll(&mut port, &mut sink, 0);
        assert!(driver.flow().is_ready());

        driver.poll(&mut port, &mut sink, 10_001);
        assert!(!driver.flow().is_ready());

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 10_100);
        assert!(driver.flow().is_ready());
    }

    #[test]
    fn test_sweep_requests_queued_once_warm() {
        let config = DriverConfig {
            scan_unknown: true,
            ..DriverConfig::default()
        };
        let mut driver = ErvDriver::new(config);
        for field in driver.registry_mut().iter_mut() {
            field.poll_interval_ms = POLL_NEVER;
        }
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x02]);
        driver.poll(&mut port, &mut sink, 0);

        feed_from_erv(&mut port, &[0x04]);
        driver.poll(&mut port, &mut sink, 14_000);
        let before = driver.queued_messages();

        driver.poll(&mut port, &mut sink, 15_100);
        assert_eq!(driver.queued_messages(), before + 1);
    }

    #[test]
    fn test_frame_split_across_polls() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        let wire = encode_frame_vec(0x01, 0x02, &[0x21, 0x01, 0x20, 0x01, 0x0A]).unwrap();
        port.feed(&wire[..7]);
        driver.poll(&mut port, &mut sink, 10);
        assert!(sink.modes.is_empty());

        port.feed(&wire[7..]);
        driver.poll(&mut port, &mut sink, 20);
        assert_eq!(&sink.modes[..], &[FanMode::Max]);
    }

    #[test]
    fn test_corrupt_frame_has_no_effect() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        let mut wire = encode_frame_vec(0x01, 0x02, &[0x21, 0x01, 0x20, 0x01, 0x0A]).unwrap();
        let checksum_index = wire.len() - 2;
        wire[checksum_index] ^= 0x01;
        port.feed(&wire);
        driver.poll(&mut port, &mut sink, 10);

        assert!(sink.modes.is_empty());
        assert!(port.tx.is_empty());
    }

    #[test]
    fn test_unhandled_and_empty_payloads_ignored() {
        let mut driver = driver();
        let mut port = MockPort::new();
        let mut sink = RecordingSink::new();

        feed_from_erv(&mut port, &[0x99, 0x01]);
        feed_from_erv(&mut port, &[]);
        driver.poll(&mut port, &mut sink, 10);

        assert!(port.tx.is_empty());
        assert!(sink.modes.is_empty());
    }
}
