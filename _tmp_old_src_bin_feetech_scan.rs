// Bus scan: ping every ID in range and report which servos respond.
//
// Read-only: this tool only pings. It never writes to a register.

use clap::Parser;
use feetech_bus_driver::config::BusConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Ping every servo ID on a Feetech bus and report which respond")]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or /dev/tty.usbmodem...
    port: String,

    #[arg(long, default_value_t = feetech_bus_driver::config::DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,

    /// First ID to scan (inclusive).
    #[arg(long, default_value_t = 0)]
    start_id: u8,

    /// Last ID to scan (inclusive). 253 is the highest non-broadcast ID.
    #[arg(long, default_value_t = 253)]
    end_id: u8,
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

    println!("Scanning {} (ids {}..={}, {} baud)...", args.port, args.start_id, args.end_id, args.baud_rate);

    let mut found = Vec::new();
    for id in args.start_id..=args.end_id {
        match transactor.ping(id) {
            Ok(status) => {
                let flags = if status.errors.is_empty() { String::new() } else { format!(" {:?}", status.errors) };
                println!("  id {id:3}: responding{flags}");
                found.push(id);
            }
            Err(feetech_bus_driver::TransactorError::NoResponse { .. }) => {}
            Err(e) => eprintln!("  id {id:3}: error: {e}"),
        }
    }

    println!();
    if found.is_empty() {
        println!("No servos responded.");
    } else {
        println!("{} servo(s) responding: {:?}", found.len(), found);
    }

    Ok(())
}


