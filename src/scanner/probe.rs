//! A single bounded TCP connect attempt against one IPv4 address and port.
use log::{debug, warn};
use std::{
    fmt,
    future::Future,
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpSocket,
    time,
};

/// Time a probe waits for the handshake when the caller has no preference.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// The address and port a probe connects to.
///
/// Only IPv4 literals are accepted, no name resolution takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    address: Ipv4Addr,
    port: u16,
}

impl Target {
    /// Builds a target, returning `None` for port 0.
    pub fn new(address: Ipv4Addr, port: u16) -> Option<Self> {
        (port != 0).then_some(Self { address, port })
    }

    /// Parses a dotted-decimal IPv4 address.
    ///
    /// ```rust
    /// # use tcpsweep::scanner::Target;
    /// assert!(Target::parse("127.0.0.1", 80).is_some());
    /// assert!(Target::parse("localhost", 80).is_none());
    /// assert!(Target::parse("127.0.0.1", 0).is_none());
    /// ```
    pub fn parse(address: &str, port: u16) -> Option<Self> {
        address
            .parse::<Ipv4Addr>()
            .ok()
            .and_then(|address| Self::new(address, port))
    }

    /// Address part of the target.
    pub const fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Port part of the target.
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn socket_addr(self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Two valued result of a probe. Anything short of a completed handshake is `NotOpen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The handshake completed before the deadline.
    Open,
    /// Refused, reset, silent, or never attempted.
    NotOpen,
}

/// Detailed classification of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    /// The handshake completed before the deadline.
    Open,
    /// The peer refused or reset the connection.
    Closed,
    /// Nothing came back before the deadline.
    Filtered,
    /// No attempt could be made, or it failed locally.
    Error,
}

impl From<PortState> for ProbeOutcome {
    fn from(state: PortState) -> Self {
        match state {
            PortState::Open => Self::Open,
            PortState::Closed | PortState::Filtered | PortState::Error => Self::NotOpen,
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
            Self::Error => "error",
        };
        f.write_str(state)
    }
}

/// Attempts a TCP connect to `address:port` and reports whether it completed
/// within `timeout`.
///
/// Never fails: an unparseable address, port 0, socket exhaustion, refusal and
/// timeouts all come back as [`ProbeOutcome::NotOpen`].
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use tcpsweep::scanner::{probe, ProbeOutcome};
/// # #[tokio::main]
/// # async fn main() {
/// let outcome = probe("127.0.0.1", 22, Duration::from_millis(200)).await;
/// println!("ssh is {}", if outcome == ProbeOutcome::Open { "up" } else { "down" });
/// # }
/// ```
pub async fn probe(address: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let Some(target) = Target::parse(address, port) else {
        debug!("Skipping probe, {address:?} port {port} is not a valid IPv4 target");
        return ProbeOutcome::NotOpen;
    };

    probe_state(target, timeout).await.into()
}

/// Same as [`probe`] but keeps the reason a port is not open.
pub async fn probe_state(target: Target, timeout: Duration) -> PortState {
    let socket = match TcpSocket::new_v4() {
        Ok(socket) => socket,
        Err(e) => {
            log_socket_error(target, &e);
            return PortState::Error;
        }
    };

    // The socket moves into the connect future, dropping that future closes it.
    let state = await_handshake(timeout, async move {
        let mut stream = socket.connect(target.socket_addr()).await?;
        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown stream error {e}");
        }
        Ok::<_, io::Error>(())
    })
    .await;

    debug!("{target} is {state}");
    state
}

/// Waits at most `timeout` for `handshake` and classifies what it produced.
async fn await_handshake<F>(timeout: Duration, handshake: F) -> PortState
where
    F: Future<Output = io::Result<()>>,
{
    match time::timeout(timeout, handshake).await {
        Ok(Ok(())) => PortState::Open,
        Ok(Err(e)) => classify_error(&e),
        Err(_elapsed) => PortState::Filtered,
    }
}

fn classify_error(err: &io::Error) -> PortState {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => PortState::Closed,
        ErrorKind::TimedOut => PortState::Filtered,
        _ => PortState::Error,
    }
}

fn log_socket_error(target: Target, err: &io::Error) {
    if err.to_string().to_lowercase().contains("too many open files") {
        warn!("Too many open files while probing {target}. Please reduce batch size.");
    } else {
        debug!("Could not create a socket for {target}: {err}");
    }
}
