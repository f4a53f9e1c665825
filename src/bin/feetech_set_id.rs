// ID change: reassign a servo's bus ID.
//
// Changing a servo's ID is not safe to run against a bus with more than one servo at the
// current ID, so this tool pings the current ID first and refuses to proceed if nothing (or
// more than the expected single reply) answers.

use std::io::{self, Write};

use clap::Parser;
use feetech_bus_driver::config::BusConfig;
use feetech_bus_driver::{AccessMode, RegisterValue, WriteValue};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Change a Feetech servo's bus ID")]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or /dev/tty.usbmodem...
    port: String,

    /// The servo's current ID.
    current_id: u8,

    /// The ID to assign.
    new_id: u8,

    #[arg(long, default_value_t = feetech_bus_driver::config::DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    yes: bool,
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?)).init();

    let args = Args::parse();
    if args.new_id == 0xFE {
        return Err("0xFE (254) is the broadcast address and cannot be assigned to a servo".into());
    }

    let config = BusConfig {
        port: args.port.clone(),
        baud_rate: args.baud_rate,
        timeout_ms: args.timeout_ms,
        control_table: "sts3215".to_string(),
    };
    let mut transactor = config.open()?;

    println!("Verifying servo {} responds before changing its ID...", args.current_id);
    transactor.ping(args.current_id)?;
    println!("  responding");

    if !args.yes && !confirm(&format!("Reassign servo {} to ID {}?", args.current_id, args.new_id))? {
        println!("Aborted.");
        return Ok(());
    }

    transactor.write(args.current_id, "id", WriteValue::Converted(RegisterValue::Number(args.new_id as f64)), true)?;

    println!("Confirming servo now answers to ID {}...", args.new_id);
    transactor.ping(args.new_id)?;
    println!("  responding. ID change complete.");

    let readback = transactor.read(args.new_id, "id", AccessMode::Converted)?;
    println!("  id register now reads: {readback:?}");

    Ok(())
}
