//! Framed serial protocol between the slot drivers and their
//! microcontrollers.
//!
//! Every frame is `[SYNC, command, length, payload..., checksum]` where the
//! checksum is the XOR of the command, length and payload bytes. Payloads
//! are the raw `#[repr(C)]` command/sensor structs from [`crate::slots`],
//! so both ends must be compiled against the same layout; the ID handshake
//! exists to verify exactly that before any motor command flows.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use thiserror::Error;

// Internal
use crate::exchange::{bytes_of, pod_read, ExchangeSafe};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Start-of-frame marker.
pub const SYNC: u8 = 0xA5;

/// Serial link speed for every slot.
pub const BAUD_RATE: u32 = 115_200;

/// Milliseconds to wait after opening a port before talking: sending data
/// into the microcontroller's bootloader can hang it.
pub const BOOTLOADER_DELAY_MS: u64 = 2000;

/// ID handshake: payload is `{slot_id, command size, sensor size, sanity}`.
pub const PKT_ID: u8 = 0x1;

/// Microcontroller -> PC sensor struct.
pub const PKT_SENSOR: u8 = 0x5;

/// PC -> microcontroller command struct.
pub const PKT_COMMAND: u8 = 0x7;

/// Printable debug bytes from the microcontroller.
pub const PKT_DEBUG: u8 = 0xD;

/// Printable fatal error: terminates the PC-side driver.
pub const PKT_ERROR: u8 = 0xE;

/// Fixed trailing byte of the ID handshake payload.
pub const ID_SANITY: u8 = 0x5A;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors in the framed serial protocol.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Serial port error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("ID handshake {field} mismatch: expected {expected}, got {got}")]
    IdMismatch {
        field: &'static str,
        expected: u8,
        got: u8,
    },

    #[error("Payload of {got} bytes cannot be read as a {expected}-byte struct")]
    PayloadSize { expected: usize, got: usize },
}

/// Result of feeding one byte into the [`PacketReader`].
#[derive(Debug)]
pub enum Step {
    /// The frame is incomplete, keep feeding.
    NeedMore,

    /// A whole valid frame arrived.
    Packet(Packet),

    /// A frame arrived but its checksum was wrong; the reader has resynced.
    BadChecksum,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Packet {
    pub command: u8,
    pub data: Vec<u8>,
}

/// Incremental frame decoder.
///
/// Feed raw serial bytes in as they arrive; the decoder hunts for the sync
/// marker, so it recovers from line noise by dropping bytes until the next
/// frame start.
pub struct PacketReader {
    state: ReadState,
    command: u8,
    length: u8,
    data: Vec<u8>,
}

enum ReadState {
    Sync,
    Command,
    Length,
    Payload,
    Checksum,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Packet {
    /// Reinterpret the payload as a wire struct.
    pub fn payload_as<T: ExchangeSafe>(&self) -> Result<T, WireError> {
        pod_read(&self.data).ok_or(WireError::PayloadSize {
            expected: std::mem::size_of::<T>(),
            got: self.data.len(),
        })
    }

    /// The payload as printable text (for DEBUG / ERROR frames).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl PacketReader {
    pub fn new() -> Self {
        Self {
            state: ReadState::Sync,
            command: 0,
            length: 0,
            data: Vec::new(),
        }
    }

    /// Feed one received byte into the decoder.
    pub fn feed(&mut self, byte: u8) -> Step {
        match self.state {
            ReadState::Sync => {
                if byte == SYNC {
                    self.state = ReadState::Command;
                }
                Step::NeedMore
            }
            ReadState::Command => {
                self.command = byte;
                self.state = ReadState::Length;
                Step::NeedMore
            }
            ReadState::Length => {
                self.length = byte;
                self.data.clear();
                self.state = if byte == 0 {
                    ReadState::Checksum
                }
                else {
                    ReadState::Payload
                };
                Step::NeedMore
            }
            ReadState::Payload => {
                self.data.push(byte);
                if self.data.len() >= self.length as usize {
                    self.state = ReadState::Checksum;
                }
                Step::NeedMore
            }
            ReadState::Checksum => {
                self.state = ReadState::Sync;

                if byte == checksum(self.command, &self.data) {
                    Step::Packet(Packet {
                        command: self.command,
                        data: std::mem::replace(&mut self.data, Vec::new()),
                    })
                }
                else {
                    Step::BadChecksum
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// XOR checksum over the command, length and payload bytes.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    let mut sum = command ^ (payload.len() as u8);
    for &byte in payload {
        sum ^= byte;
    }
    sum
}

/// Encode one frame.
pub fn encode_packet(command: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() < 256);

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC);
    frame.push(command);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(command, payload));
    frame
}

/// Write one frame carrying a wire struct.
pub fn write_packet<T: ExchangeSafe>(
    writer: &mut dyn std::io::Write,
    command: u8,
    payload: &T,
) -> Result<(), WireError> {
    writer.write_all(&encode_packet(command, bytes_of(payload)))?;
    writer.flush()?;
    Ok(())
}

/// Validate an ID handshake frame against this driver's compiled sizes.
///
/// A mismatch means the firmware and this build disagree on struct layout:
/// the driver must abort rather than exchange garbage motor commands.
pub fn check_id(
    packet: &Packet,
    slot_id: u8,
    command_size: usize,
    sensor_size: usize,
) -> Result<(), WireError> {
    let expect = |field, expected: u8, got: u8| {
        if expected != got {
            Err(WireError::IdMismatch {
                field,
                expected,
                got,
            })
        }
        else {
            Ok(())
        }
    };

    expect("length", 4, packet.data.len() as u8)?;
    expect("slot id", slot_id, packet.data[0])?;
    expect("command bytes", command_size as u8, packet.data[1])?;
    expect("sensor bytes", sensor_size as u8, packet.data[2])?;
    expect("sanity byte", ID_SANITY, packet.data[3])?;

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::slots::DriveCommand;

    fn feed_all(reader: &mut PacketReader, bytes: &[u8]) -> Vec<Step> {
        bytes
            .iter()
            .map(|&b| reader.feed(b))
            .filter(|s| !matches!(s, Step::NeedMore))
            .collect()
    }

    #[test]
    fn test_frame_roundtrip() {
        let command = DriveCommand {
            motor: [10, -20, 30, -40],
            ..Default::default()
        };

        let mut frame = Vec::new();
        write_packet(&mut frame, PKT_COMMAND, &command).unwrap();

        let mut reader = PacketReader::new();
        let steps = feed_all(&mut reader, &frame);

        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::Packet(p) => {
                assert_eq!(p.command, PKT_COMMAND);
                let decoded: DriveCommand = p.payload_as().unwrap();
                assert_eq!(decoded.motor, [10, -20, 30, -40]);
            }
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_checksum_detected() {
        let mut frame = encode_packet(PKT_SENSOR, &[1, 2, 3]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let mut reader = PacketReader::new();
        let steps = feed_all(&mut reader, &frame);

        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], Step::BadChecksum));
    }

    #[test]
    fn test_resync_after_noise() {
        let mut bytes = vec![0x00, 0x37, 0xFF];
        bytes.extend(encode_packet(PKT_DEBUG, b"ok"));

        let mut reader = PacketReader::new();
        let steps = feed_all(&mut reader, &bytes);

        assert_eq!(steps.len(), 1);
        match &steps[0] {
            Step::Packet(p) => assert_eq!(p.text(), "ok"),
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[test]
    fn test_check_id() {
        let packet = Packet {
            command: PKT_ID,
            data: vec![0xD0, 6, 6, ID_SANITY],
        };
        assert!(check_id(&packet, 0xD0, 6, 6).is_ok());
        assert!(check_id(&packet, 0xF0, 6, 6).is_err());
        assert!(check_id(&packet, 0xD0, 8, 6).is_err());
    }
}
