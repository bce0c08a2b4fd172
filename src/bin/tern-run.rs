use clap::Parser;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tern::{Access, Machine, Memory, DEV_CONSOLE, PORT_COUNT, ROM_BASE};

/// Console convention used by this runner: bytes written to this port
/// on the console bus go to stdout.
const CONSOLE_WRITE_PORT: u8 = 0x8;

#[derive(Parser, Debug)]
#[command(
    name = "tern-run",
    about = "Load a ROM image and drive the machine from the command line."
)]
struct Args {
    /// ROM image to load.
    rom: PathBuf,

    /// Load and entry address for the ROM image (decimal or 0x-hex).
    #[arg(long, value_parser = parse_addr, default_value_t = ROM_BASE)]
    org: u16,

    /// Maximum number of clock ticks to run.
    #[arg(long, default_value_t = 1_000_000)]
    steps: usize,

    /// Write a machine snapshot here after the run.
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
}

fn parse_addr(raw: &str) -> Result<u16, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|err| format!("invalid address {raw:?}: {err}"))
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let rom = fs::read(&args.rom)?;

    let mut machine = Machine::new();
    machine.register(
        DEV_CONSOLE,
        |ports: &mut [u8; PORT_COUNT], port: u8, access: Access, _memory: &mut Memory| {
            if access == Access::Write && port == CONSOLE_WRITE_PORT {
                let _ = io::stdout().write_all(&[ports[usize::from(port)]]);
            }
        },
    );
    machine.load_rom(&rom, args.org)?;
    machine.set_pc(args.org);

    let executed = machine.run(args.steps);
    let _ = io::stdout().flush();
    eprintln!("{executed} ticks, {}", machine.debug_state());

    if let Some(path) = args.snapshot {
        machine.save_snapshot(&path)?;
        eprintln!("snapshot written to {}", path.display());
    }
    Ok(())
}
