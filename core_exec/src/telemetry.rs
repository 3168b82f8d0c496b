//! Frontend communication: UDP command receive and telemetry broadcast.
//!
//! Both directions carry fixed plain-old-data structs. A datagram whose
//! size does not match the compiled struct is a version mismatch and is
//! dropped with a warning, never partially interpreted.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};

// Standard
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

// Internal
use exch_if::exchange::{bytes_of, pod_read};
use exch_if::state::{BackendState, RobotCommand, Telemetry, COMMAND_PORT, TELEMETRY_PORT};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Network link to the frontend.
pub struct RobotComms {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,

    /// Time of the last telemetry broadcast.
    last_send: f64,

    /// Broadcast counter.
    count: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RobotComms {
    pub fn new() -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, COMMAND_PORT))?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;

        Ok(Self {
            socket,
            broadcast_addr: (Ipv4Addr::BROADCAST, TELEMETRY_PORT).into(),
            last_send: -1.0e9,
            count: 0,
        })
    }

    /// Pull one pending command datagram, or `None` when the queue is
    /// drained.
    pub fn receive_command(&self) -> Option<RobotCommand> {
        let mut buf = [0u8; 2048];

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => {
                    match pod_read::<RobotCommand>(&buf[..len]) {
                        Some(command) => return Some(command),
                        None => {
                            warn!(
                                "COMMAND VERSION MISMATCH! Expected {} bytes, got {}",
                                std::mem::size_of::<RobotCommand>(),
                                len
                            );
                            // Keep draining: a stale frontend may be mixed
                            // in with a current one
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return None;
                }
                Err(e) => {
                    warn!("Command receive error: {}", e);
                    return None;
                }
            }
        }
    }

    /// Broadcast telemetry if the minimum period has elapsed.
    pub fn maybe_broadcast(
        &mut self,
        base: BackendState,
        ack_state: u8,
        cur_time: f64,
        period_s: f64,
    ) {
        if cur_time < self.last_send + period_s {
            return;
        }
        self.last_send = cur_time;
        self.count += 1;

        let telemetry = Telemetry {
            count: self.count,
            ack_state,
            base,
        };

        match self.socket.send_to(bytes_of(&telemetry), self.broadcast_addr) {
            Ok(_) => trace!("Telemetry {} sent", self.count),
            Err(e) => warn!("Telemetry send error: {}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_datagram_size_check() {
        let command = RobotCommand {
            command: RobotCommand::COMMAND_STOP,
            ..Default::default()
        };
        let bytes = bytes_of(&command);

        // Exact size parses
        assert!(pod_read::<RobotCommand>(bytes).is_some());

        // Truncated or padded datagrams are rejected
        assert!(pod_read::<RobotCommand>(&bytes[..bytes.len() - 1]).is_none());
        let mut padded = bytes.to_vec();
        padded.push(0);
        assert!(pod_read::<RobotCommand>(&padded).is_none());
    }
}
