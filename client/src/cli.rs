use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use sispm_types::{OutletIndex, OutletState};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// The specific device's serial number to execute commands on.
    /// This field is optional if you have exactly one device, but required if you have more.
    #[clap(long)]
    pub device: Option<String>,

    /// USB transfer timeout in milliseconds, overrides the configuration file
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Location of the configuration file on disk
    #[clap(long, default_value_os_t = default_config_location())]
    pub config: PathBuf,

    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "warn")]
    pub log_level: LevelFilter,

    /// Print results as JSON
    #[clap(long)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: SubCommands,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// List all connected outlet devices
    List,

    /// Show details about the device
    Info,

    /// Show whether an outlet is powered, by number or 'all'
    Status { outlet: OutletIndex },

    /// Power an outlet on, by number or 'all'
    On { outlet: OutletIndex },

    /// Power an outlet off, by number or 'all'
    Off { outlet: OutletIndex },

    /// Flip the state of an outlet, by number or 'all'
    Toggle { outlet: OutletIndex },

    /// Switch an outlet to the given state, by number or 'all'
    Set {
        outlet: OutletIndex,

        #[clap(value_enum)]
        state: OutletState,
    },

    /// Change and store the client settings
    Config {
        /// Serial of the device to use when --device isn't given
        #[clap(long)]
        default_device: Option<String>,

        /// Forget the stored default device
        #[clap(long, conflicts_with = "default_device")]
        clear_default_device: bool,

        /// Default USB transfer timeout in milliseconds
        #[clap(long)]
        timeout_millis: Option<u64>,
    },
}

fn default_config_location() -> PathBuf {
    match ProjectDirs::from("org", "sispm", "sispm") {
        Some(proj_dirs) => proj_dirs.config_dir().join("settings.json"),
        None => PathBuf::from("sispm-settings.json"),
    }
}

#[repr(usize)]
#[derive(clap::ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}
