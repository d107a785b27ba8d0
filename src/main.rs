use clap::Parser;
use crossbeam_channel::bounded;
use homenet::config::{Config, OutputFormat};
use homenet::{
    Aggregator, DeviceCache, DisplaySink, InterfaceMonitor, JsonSink, PcapSource, SystemResolver,
    TerminalSink,
};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    if config.list_interfaces {
        for (name, desc) in homenet::sniff::list_interfaces()? {
            match desc {
                Some(desc) => println!("{name}\t{desc}"),
                None => println!("{name}"),
            }
        }
        return Ok(());
    }

    init_logging(&config.log_file)?;

    let resolver = Arc::new(SystemResolver);
    let mut monitors = Vec::new();
    for iface in config.interface_names() {
        match PcapSource::open(&iface) {
            Ok(source) => {
                info!(interface = %iface, "capture initialized");
                let cache = DeviceCache::new(resolver.clone());
                monitors.push(InterfaceMonitor::new(iface, Box::new(source), cache));
            }
            Err(e) => warn!(error = %e, "skipping interface"),
        }
    }
    if monitors.is_empty() {
        return Err("no valid interfaces to capture".into());
    }

    let (shutdown_tx, shutdown_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    match config.output {
        OutputFormat::Table => {
            let sink = TerminalSink::new(io::stdout(), config.redraw_interval());
            run(monitors, sink, &config, shutdown_rx)?;
            println!("\nShutting down...");
        }
        OutputFormat::Json => {
            run(monitors, JsonSink::new(io::stdout()), &config, shutdown_rx)?;
        }
    }
    Ok(())
}

fn run<D: DisplaySink>(
    monitors: Vec<InterfaceMonitor>,
    sink: D,
    config: &Config,
    shutdown: crossbeam_channel::Receiver<()>,
) -> Result<(), homenet::MonitorError> {
    let (combined, _sink) = Aggregator::new(monitors, sink)
        .with_refresh(config.refresh_period())
        .run(shutdown)?;
    info!(devices = combined.len(), cycles = combined.cycles(), "monitor finished");
    Ok(())
}

fn init_logging(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
