//! retrovm command-line front end.
//!
//! This binary builds a machine and loads executable images into it. It performs:
//! 1. **Machine setup:** Reads an optional JSON machine description and adds `-d` devices.
//! 2. **Loading:** Loads each image in order (ELF, ECOFF, a.out, S-record, `addr:path` raw, or symbol text).
//! 3. **Report:** Prints each load result, the symbol count and the RAM checksum.
//!
//! Log output goes to stderr and is controlled by `-v` or `RUST_LOG`.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use retrovm_core::Config;
use retrovm_core::soc::Machine;
use retrovm_core::soc::devices::DeviceRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "retrovm",
    author,
    version,
    about = "Load executable images into an emulated machine's address space",
    long_about = "Builds a machine from an optional JSON description, maps devices, and loads each image in order.\n\nExamples:\n  retrovm kernel.elf\n  retrovm -d \"zero addr=0x1f000000 len=0x1000\" netbsd.ecoff\n  retrovm 0xbfc00000:prom.bin kernel.srec\n  retrovm -c machine.json --symbols kernel.elf"
)]
struct Cli {
    /// JSON machine description.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra device, e.g. "zero addr=0x1f000000 len=0x1000 name=hole".
    #[arg(short, long = "device")]
    devices: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print every symbol after loading.
    #[arg(long)]
    symbols: bool,

    /// Images to load, in order.
    #[arg(required = true)]
    images: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(message) = run(&cli) {
        eprintln!("\n[!] FATAL: {message}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };

    let registry = DeviceRegistry::with_builtin();
    let mut machine = Machine::new(&config, &registry).map_err(|e| e.to_string())?;

    for spec in &cli.devices {
        let init = registry.parse_spec(spec).map_err(|e| e.to_string())?;
        let id = registry
            .add(&mut machine.bus, &init)
            .map_err(|e| e.to_string())?;
        debug!("cli: '{spec}' mapped as region {id}");
    }

    for name in &cli.images {
        let result = machine.load_image(name).map_err(|e| e.to_string())?;
        println!("[*] {name}: {result}");
    }

    println!("[*] {} symbol(s)", machine.symbols.len());
    if cli.symbols {
        for entry in &machine.symbols {
            println!("    {entry}");
        }
    }
    println!("[*] RAM checksum {:#018x}", machine.bus.checksum());
    Ok(())
}
