use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Redrawn terminal table
    Table,
    /// One JSON document per refresh on stdout
    Json,
}

/// Live per-device bandwidth and protocol usage for the local network.
#[derive(Debug, Parser)]
#[command(name = "homenet", version, about)]
pub struct Config {
    /// Comma-separated list of network interfaces to monitor
    #[arg(
        short,
        long,
        value_delimiter = ',',
        required_unless_present = "list_interfaces"
    )]
    pub interfaces: Vec<String>,

    /// Refresh rate in seconds
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log file; the terminal is reserved for the device table
    #[arg(long, default_value = "homenet.log")]
    pub log_file: PathBuf,

    /// Print the interfaces available for capture and exit
    #[arg(long)]
    pub list_interfaces: bool,
}

impl Config {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh)
    }

    /// Minimum gap between table redraws, half the refresh period so tick
    /// jitter never skips a redraw.
    pub fn redraw_interval(&self) -> Duration {
        self.refresh_period() / 2
    }

    /// Requested interfaces with blanks and duplicates removed, order kept.
    pub fn interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.interfaces.iter().map(|s| s.trim()) {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}
