//! # Slot Driver Executable
//!
//! One process per microcontroller slot. The driver owns one serial link:
//! it copies inbound sensor packets into the slot's row of the nanoslot
//! exchange, and outbound command rows from the exchange to the wire. It
//! validates struct sizes against the firmware at handshake, forces safe
//! mode when the backend heartbeat stalls, and exits on disconnect so a
//! supervisor can restart it.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Serial packet link and disconnect policy.
mod comms;

/// Per-slot exchange handling.
mod slots;

/// Raw sensor to engineering-unit parsing.
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use structopt::StructOpt;

// Standard
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

// Internal
use comms::SlotComms;
use slots::{make_handler, BackendWatch, SlotHandler};

use exch_if::channels;
use exch_if::exchange::Exchange;
use exch_if::slots::NanoslotExchange;
use exch_if::wire::{
    check_id, BAUD_RATE, BOOTLOADER_DELAY_MS, PKT_DEBUG, PKT_ERROR, PKT_ID, PKT_SENSOR,
};
use util::logger::{logger_init, LevelFilter};
use util::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "slot_exec", about = "Excahauler slot driver")]
struct Opt {
    /// Slot ID in hex, like D0
    #[structopt(long)]
    slot: String,

    /// Serial device, like /dev/ttyUSB0
    #[structopt(long)]
    dev: String,

    /// Loop pacing in milliseconds (varies by attached hardware)
    #[structopt(long, default_value = "50")]
    period_ms: u64,

    /// Print every command sent
    #[structopt(long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    let opt = Opt::from_args();

    let slot_id = u8::from_str_radix(opt.slot.trim_start_matches("0x"), 16)
        .wrap_err("Slot ID must be hex, like D0")?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new(&format!("slot_{:02x}", slot_id), "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .map_err(|e| eyre!("Failed to initialise logging: {:?}", e))?;

    info!("Slot {:02X} Driver Executable", slot_id);
    info!("Session directory: {:?}\n", session.session_root);

    let mut handler =
        make_handler(slot_id).ok_or_else(|| eyre!("No handler for slot {:02X}", slot_id))?;

    // ---- SERIAL SETUP ----

    let port = serialport::new(&opt.dev, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(20))
        .open()
        .wrap_err_with(|| format!("Can't open serial port {}", opt.dev))?;

    info!("Opened {}", opt.dev);

    // Wait through the bootloader, which can hang if we immediately start
    // sending it data
    thread::sleep(Duration::from_millis(BOOTLOADER_DELAY_MS));

    // ---- EXCHANGE SETUP ----

    let mut exchange = channels::nanoslot().wrap_err("Failed to open the nanoslot exchange")?;

    let nano = exchange.read();
    if !nano.size_sane() && nano.size != 0 {
        return Err(eyre!(
            "Nanoslot exchange size mismatch: region says {} bytes, this build has {}",
            nano.size,
            NanoslotExchange::expected_size()
        ));
    }

    let mut watch = BackendWatch::new(nano.backend_heartbeat);
    let mut comms = SlotComms::new(slot_id, port);

    // ---- MAIN LOOP ----

    info!("Entering driver loop\n");

    let result = run_slot(
        handler.as_mut(),
        &mut comms,
        &mut exchange,
        &mut watch,
        Duration::from_millis(opt.period_ms),
        opt.verbose,
    );

    // Mark ourselves as absent on the exchange, like unplugged
    handler.mark_disconnected(&mut exchange);
    info!("Slot {:02X} driver exiting", slot_id);

    result
}

/// Drive the packet loop until disconnect or fatal error.
fn run_slot(
    handler: &mut dyn SlotHandler,
    comms: &mut SlotComms<impl Read + Write>,
    exchange: &mut Exchange<NanoslotExchange>,
    watch: &mut BackendWatch,
    period: Duration,
    verbose: bool,
) -> Result<(), Report> {
    while comms.is_connected {
        if let Some(packet) = comms.read_packet() {
            let mut need_command = false;

            match packet.command {
                PKT_ID => {
                    // Exit early and safely if struct sizes don't match
                    check_id(
                        &packet,
                        handler.id(),
                        handler.command_size(),
                        handler.sensor_size(),
                    )
                    .wrap_err("ID handshake failed: firmware/driver struct size mismatch")?;
                    need_command = true;
                }
                PKT_SENSOR => match handler.post_sensor(&packet, exchange, period.as_secs_f32())
                {
                    Ok(()) => need_command = true,
                    Err(e) => {
                        warn!("Bad sensor packet: {}", e);
                        comms.weird_count += 1;
                    }
                },
                PKT_DEBUG => {
                    info!("Device debug 0xD: {}", packet.text());
                }
                PKT_ERROR => {
                    // Just stop if the firmware hits errors
                    return Err(eyre!("Device hit error 0xE: {}", packet.text()));
                }
                other => {
                    warn!(
                        "Got unknown packet type {:02x} / length {}",
                        other,
                        packet.data.len()
                    );
                    comms.weird_count += 1;
                }
            }

            if need_command {
                let nano = exchange.read();
                let mode = watch.mode(nano.backend_heartbeat, nano.autonomy.mode);
                let payload = handler.fetch_command(&nano, mode);

                comms
                    .send_command_bytes(&payload)
                    .wrap_err("Failed to send command packet")?;

                if verbose {
                    debug!("Sent {} command bytes, mode {}", payload.len(), mode);
                }
            }
        }

        // Limit this loop speed (varies by what's attached)
        thread::sleep(period);
    }

    Ok(())
}
