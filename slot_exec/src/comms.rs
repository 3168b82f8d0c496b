//! Serial link management for one slot.
//!
//! Owns the framed-packet decoding and the disconnect policy: a fresh
//! link is given 100 consecutive failed reads before giving up, but once
//! packets have flowed, 10 consecutive failures mean the microcontroller
//! is gone (unplugged, a serial monitor stealing the port, or line noise)
//! and the driver should exit so the supervisor can restart it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Standard
use std::io::{Read, Write};

// Internal
use exch_if::wire::{encode_packet, Packet, PacketReader, Step, PKT_COMMAND};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Consecutive read failures tolerated from a cold start.
const COLD_FAIL_LIMIT: u32 = 100;

/// Consecutive read failures tolerated once solidly connected.
const WARM_FAIL_LIMIT: u32 = 10;

/// Packets received before the link counts as solidly connected.
const WARM_PACKET_COUNT: u32 = 10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Packet-level communication with one microcontroller.
pub struct SlotComms<T: Read + Write> {
    transport: T,
    reader: PacketReader,

    /// My slot's 8-bit hex ID, for log messages.
    slot_id: u8,

    /// If true, we are (still) connected to the microcontroller.
    pub is_connected: bool,

    /// Valid packets received.
    pub packet_count: u32,

    /// Serial reads that produced no valid packet.
    pub fail_count: u32,

    /// Frames with a bad checksum or an unknown command byte.
    pub weird_count: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: Read + Write> SlotComms<T> {
    pub fn new(slot_id: u8, transport: T) -> Self {
        Self {
            transport,
            reader: PacketReader::new(),
            slot_id,
            is_connected: true,
            packet_count: 0,
            fail_count: 0,
            weird_count: 0,
        }
    }

    /// Read one framed packet from the transport.
    ///
    /// Returns `None` when the read window closed without a complete valid
    /// frame; every such window counts toward the disconnect thresholds.
    pub fn read_packet(&mut self) -> Option<Packet> {
        let mut buf = [0u8; 256];

        loop {
            let chunk = match self.transport.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => &buf[..n],
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("slot {:02X} serial read error: {}", self.slot_id, e);
                    break;
                }
            };

            for &byte in chunk {
                match self.reader.feed(byte) {
                    Step::NeedMore => {}
                    Step::BadChecksum => {
                        self.weird_count += 1;
                    }
                    Step::Packet(packet) => {
                        // The serial link is now OK
                        self.packet_count += 1;
                        self.fail_count = 0;
                        return Some(packet);
                    }
                }
            }
        }

        self.fail_count += 1;

        let mut bad = self.fail_count >= COLD_FAIL_LIMIT;
        if self.packet_count >= WARM_PACKET_COUNT && self.fail_count >= WARM_FAIL_LIMIT {
            // Disconnect fast if we were solidly connected before
            bad = true;
        }

        if bad {
            self.is_connected = false;
            info!(
                "slot {:02X} disconnect ({} good, {} weird, {} fail)",
                self.slot_id, self.packet_count, self.weird_count, self.fail_count
            );
        }

        None
    }

    /// Send this command payload to the microcontroller now.
    pub fn send_command_bytes(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.transport
            .write_all(&encode_packet(PKT_COMMAND, payload))?;
        self.transport.flush()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use exch_if::wire::PKT_SENSOR;
    use std::collections::VecDeque;
    use std::io;

    /// In-memory transport: reads from a queue, records writes.
    struct Loopback {
        incoming: VecDeque<u8>,
        outgoing: Vec<u8>,
    }

    impl Loopback {
        fn new() -> Self {
            Self {
                incoming: VecDeque::new(),
                outgoing: Vec::new(),
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.incoming.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.incoming.pop_front() {
                    Some(byte) => {
                        buf[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outgoing.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_packet_receive_resets_fail_count() {
        let mut comms = SlotComms::new(0xD0, Loopback::new());

        // A few empty reads
        for _ in 0..5 {
            assert!(comms.read_packet().is_none());
        }
        assert_eq!(comms.fail_count, 5);

        // Then a sensor frame arrives
        comms
            .transport
            .incoming
            .extend(encode_packet(PKT_SENSOR, &[1, 2, 3]));

        let packet = comms.read_packet().expect("packet");
        assert_eq!(packet.command, PKT_SENSOR);
        assert_eq!(comms.fail_count, 0);
        assert!(comms.is_connected);
    }

    #[test]
    fn test_cold_disconnect_after_100_failures() {
        let mut comms = SlotComms::new(0xD0, Loopback::new());

        for i in 0..100 {
            assert!(comms.read_packet().is_none());
            if i < 99 {
                assert!(comms.is_connected, "disconnected early at {}", i);
            }
        }

        assert!(!comms.is_connected);
    }

    #[test]
    fn test_warm_disconnect_after_10_failures() {
        let mut comms = SlotComms::new(0xA1, Loopback::new());

        // Solidly connected: ten good packets
        for _ in 0..10 {
            comms
                .transport
                .incoming
                .extend(encode_packet(PKT_SENSOR, &[0]));
            assert!(comms.read_packet().is_some());
        }

        // Then the line goes quiet
        for _ in 0..10 {
            assert!(comms.read_packet().is_none());
        }

        assert!(!comms.is_connected);
    }

    #[test]
    fn test_command_frame_written() {
        let mut comms = SlotComms::new(0xD0, Loopback::new());
        comms.send_command_bytes(&[9, 8, 7]).unwrap();

        assert_eq!(comms.transport.outgoing, encode_packet(PKT_COMMAND, &[9, 8, 7]));
    }
}
