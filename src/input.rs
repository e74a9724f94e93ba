//! Provides a means to read, parse and hold configuration options for scans.
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::scanner::{DEFAULT_BATCH_SIZE, DEFAULT_TIMEOUT};

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;
const CONFIG_FILE_NAME: &str = ".tcpsweep.toml";

/// Errors raised while turning user input into a scan.
#[derive(Debug, Error)]
pub enum InputError {
    /// The bounds are outside 1..=65535 or start is above end.
    #[error("Invalid port range. Ports must be between 1 and 65535 and start_port <= end_port.")]
    InvalidRange {
        /// Requested first port.
        start: u32,
        /// Requested last port.
        end: u32,
    },
    /// A timeout of 0 ms, which no handshake can beat.
    #[error("Invalid timeout. The timeout must be at least 1 millisecond.")]
    InvalidTimeout,
    /// The target is not an IPv4 literal.
    #[error("Invalid target {0:?}. Only IPv4 addresses such as 192.168.1.1 are supported.")]
    InvalidTarget(String),
    /// The configuration file exists but could not be read.
    #[error("Could not read configuration file {path}: {source}")]
    ConfigRead {
        /// Location of the file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid TOML for [`Config`].
    #[error("Found {0} in configuration file.")]
    ConfigParse(#[from] toml::de::Error),
}

/// Inclusive range of ports to scan, always within 1..=65535 with `start <= end`.
///
/// [`PortRange::new`] is the only way to build one:
///
/// ```compile_fail
/// # use tcpsweep::input::PortRange;
/// let range = PortRange { start: 10, end: 5 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validates the bounds. Taking `u32` lets out-of-range input such as 70000
    /// be reported as a bad range instead of a parse failure.
    ///
    /// ```rust
    /// # use tcpsweep::input::PortRange;
    /// assert!(PortRange::new(80, 80).is_ok());
    /// assert!(PortRange::new(100, 50).is_err());
    /// assert!(PortRange::new(0, 10).is_err());
    /// assert!(PortRange::new(1, 65_536).is_err());
    /// ```
    pub fn new(start: u32, end: u32) -> Result<Self, InputError> {
        let invalid = || InputError::InvalidRange { start, end };
        let start_port = u16::try_from(start).map_err(|_| invalid())?;
        let end_port = u16::try_from(end).map_err(|_| invalid())?;

        if start_port < LOWEST_PORT_NUMBER || start_port > end_port {
            return Err(invalid());
        }

        Ok(Self {
            start: start_port,
            end: end_port,
        })
    }

    /// First port, included.
    pub const fn start(&self) -> u16 {
        self.start
    }

    /// Last port, included.
    pub const fn end(&self) -> u16 {
        self.end
    }

    /// Ports of the range in ascending order.
    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    /// Number of ports in the range, never zero.
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Always false, a valid range holds at least one port.
    pub const fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tcpsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    arg_required_else_help = true,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nARGS:\n{positionals}\n\nOPTIONS:\n{options}\n\nEXAMPLE:\n    tcpsweep 192.168.1.1 20 100",
)]
#[allow(clippy::struct_excessive_bools)]
/// Simple TCP port scanner.
/// Reports every port in the range that completes a TCP handshake within the timeout.
pub struct Opts {
    /// IPv4 address to scan, for example 192.168.1.1.
    pub target: String,

    /// First port of the range, between 1 and 65535.
    pub start_port: u32,

    /// Last port of the range, between start_port and 65535.
    pub end_port: u32,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Greppable mode. Only output the open port numbers, one per line.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// How many ports are probed at the same time. 1 scans strictly one port
    /// after the other. Depends on the open file limit of your OS. [default: 500]
    #[arg(short, long)]
    pub batch_size: Option<u16>,

    /// The timeout in milliseconds before a port is assumed to be closed. [default: 500]
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub timeout: Option<u32>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    /// Validated port range of the invocation.
    pub fn port_range(&self) -> Result<PortRange, InputError> {
        PortRange::new(self.start_port, self.end_port)
    }

    /// Probes in flight, falling back to [`DEFAULT_BATCH_SIZE`].
    pub fn batch_size(&self) -> u16 {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Per-port timeout, falling back to [`DEFAULT_TIMEOUT`]. A zero timeout
    /// can only come from the config file and is rejected here.
    pub fn scan_timeout(&self) -> Result<Duration, InputError> {
        match self.timeout {
            Some(0) => Err(InputError::InvalidTimeout),
            Some(ms) => Ok(Duration::from_millis(ms.into())),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    /// Merges values found within the user configuration file into the
    /// options. Anything given on the command line wins over the file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_flags(config);
            self.merge_optional(config);
        }
    }

    /// A flag typed on the command line stays on, the file can only turn it on.
    fn merge_flags(&mut self, config: &Config) {
        macro_rules! merge_flags {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = config.$field {
                        self.$field |= e;
                    }
                )+
            }
        }

        merge_flags!(greppable, accessible);
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if self.$field.is_none() {
                        self.$field = config.$field;
                    }
                )+
            }
        }

        merge_optional!(batch_size, timeout, ulimit);
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target: String::new(),
            start_port: u32::from(LOWEST_PORT_NUMBER),
            end_port: u32::from(TOP_PORT_NUMBER),
            no_config: true,
            config_path: None,
            greppable: true,
            accessible: false,
            batch_size: None,
            timeout: None,
            ulimit: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    greppable: Option<bool>,
    accessible: Option<bool>,
    batch_size: Option<u16>,
    timeout: Option<u32>,
    ulimit: Option<u64>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file is the same as an empty one.
    ///
    /// # Format
    ///
    /// greppable = true
    /// accessible = false
    /// batch_size = 1000
    /// timeout = 500
    /// ulimit = 5000
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, InputError> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|source| InputError::ConfigRead {
            path: config_path,
            source,
        })?;

        Self::parse(&content)
    }

    /// Parses TOML text into a Config.
    pub fn parse(content: &str) -> Result<Self, InputError> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml, `None` when there is no home directory.
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(CONFIG_FILE_NAME);
    Some(config_path)
}
