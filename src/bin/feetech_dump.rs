// Register dump: read every register in a model's control table for one servo and print
// its name, raw value, and decoded user value side by side.

use clap::Parser;
use feetech_bus_driver::config::BusConfig;
use feetech_bus_driver::{AccessMode, ReadValue};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Dump every control-table register for one servo")]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or /dev/tty.usbmodem...
    port: String,

    /// Servo ID to read from.
    id: u8,

    #[arg(long, default_value_t = feetech_bus_driver::config::DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?)).init();

    let args = Args::parse();
    let config = BusConfig {
        port: args.port.clone(),
        baud_rate: args.baud_rate,
        timeout_ms: args.timeout_ms,
        control_table: "sts3215".to_string(),
    };
    let mut transactor = config.open()?;

    println!("Dumping registers for servo {} on {}", args.id, args.port);
    println!("{:<24} {:>4} {:>4}  {:<10} {}", "register", "addr", "len", "raw", "decoded");

    let registers = transactor.control_table().registers().to_vec();
    for def in registers {
        let raw = match transactor.read(args.id, def.name, AccessMode::Raw) {
            Ok(ReadValue::Raw(raw)) => format!("0x{raw:X}"),
            Ok(ReadValue::Converted(_)) => unreachable!("raw mode always yields Raw"),
            Err(e) => {
                println!("{:<24} {:>4} {:>4}  {:<10} error: {e}", def.name, def.address, def.length, "-");
                continue;
            }
        };

        let decoded = match transactor.read(args.id, def.name, AccessMode::Converted) {
            Ok(ReadValue::Converted(value)) => format!("{value:?}"),
            Ok(ReadValue::Raw(_)) => unreachable!("converted mode always yields Converted"),
            Err(e) => format!("error: {e}"),
        };

        println!("{:<24} {:>4} {:>4}  {:<10} {}", def.name, def.address, def.length, raw, decoded);
    }

    Ok(())
}
