//! Core functionality for actual scanning behaviour.
use crate::input::PortRange;
use log::debug;

mod probe;
pub use probe::{probe, probe_state, PortState, ProbeOutcome, Target, DEFAULT_TIMEOUT};

use futures::{
    future,
    stream::{self, AbortHandle, Abortable},
    Stream, StreamExt,
};
use std::{net::Ipv4Addr, num::NonZero, sync::Arc, time::Duration};

/// Number of probes in flight when the caller does not pick one.
pub const DEFAULT_BATCH_SIZE: u16 = 500;

#[derive(Debug)]
struct ScannerConnector {
    address: Ipv4Addr,
    timeout: Duration,
}

impl ScannerConnector {
    /// Probes a single port of the scanner's address and pairs the port with
    /// its state. Port 0 never reaches the network.
    async fn scan_port(&self, port: u16) -> (u16, PortState) {
        let state = match Target::new(self.address, port) {
            Some(target) => probe_state(target, self.timeout).await,
            None => PortState::Error,
        };
        (port, state)
    }
}

/// The class for the scanner
/// address is the IPv4 address every port is probed on
/// range is the inclusive, already validated, port range
/// batch_size is how many probes may be in flight at once. 1 gives a strictly sequential sweep.
/// timeout is how long each probe waits for the handshake before calling the port not open.
///
/// Results always come out in ascending port order whatever the batch size,
/// since completed probes are released in the order they were started.
#[derive(Debug)]
pub struct Scanner {
    range: PortRange,
    batch_size: NonZero<u16>,
    connector: Arc<ScannerConnector>,
}

impl Scanner {
    /// Builds a scanner. A `batch_size` of 0 is corrected to 1.
    pub fn new(address: Ipv4Addr, range: PortRange, batch_size: u16, timeout: Duration) -> Self {
        Self {
            range,
            batch_size: NonZero::new(batch_size).unwrap_or(NonZero::<u16>::MIN),
            connector: Arc::new(ScannerConnector { address, timeout }),
        }
    }

    /// Every port of the range with its detailed state, in ascending order.
    ///
    /// The stream is lazy: nothing is probed until it is polled, and at most
    /// `batch_size` sockets are open at any moment.
    pub fn sweep_states(&self) -> impl Stream<Item = (u16, PortState)> + Send + 'static {
        debug!(
            "Start scanning {} ports on {}. Batch size {}, timeout {:?}",
            self.range.len(),
            self.connector.address,
            self.batch_size,
            self.connector.timeout
        );

        let connector = Arc::clone(&self.connector);
        stream::iter(self.range.iter())
            .map(move |port| {
                let connector = Arc::clone(&connector);
                async move { connector.scan_port(port).await }
            })
            .buffered(usize::from(self.batch_size.get()))
    }

    /// Open ports of the range in ascending order.
    pub fn sweep(&self) -> impl Stream<Item = u16> + Send + 'static {
        self.sweep_states().filter_map(|(port, state)| {
            future::ready((state == PortState::Open).then_some(port))
        })
    }

    /// Like [`Scanner::sweep`] but can be stopped from elsewhere.
    ///
    /// After [`AbortHandle::abort`] the stream ends on its next poll: no new
    /// probes start, and in-flight probes are dropped along with their sockets.
    pub fn sweep_abortable(&self) -> (Abortable<impl Stream<Item = u16> + Send + 'static>, AbortHandle) {
        stream::abortable(self.sweep())
    }

    /// Runs the whole sweep and returns the open ports.
    pub async fn run(&self) -> Vec<u16> {
        let open_ports = self.sweep().collect::<Vec<_>>().await;
        debug!("Open ports found: {:?}", &open_ports);
        open_ports
    }
}

/// Sweeps `range` on `address` with [`DEFAULT_BATCH_SIZE`] probes in flight.
///
/// An address that is not an IPv4 literal yields an empty sequence, the same
/// as if every probe had come back not open.
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use futures::StreamExt;
/// # use tcpsweep::{input::PortRange, scanner::sweep};
/// # #[tokio::main]
/// # async fn main() {
/// let range = PortRange::new(20, 100).unwrap();
/// let open: Vec<u16> = sweep("192.168.1.1", &range, Duration::from_millis(500))
///     .collect()
///     .await;
/// # }
/// ```
pub fn sweep(
    address: &str,
    range: &PortRange,
    timeout: Duration,
) -> impl Stream<Item = u16> + Send + 'static {
    match address.parse::<Ipv4Addr>() {
        Ok(address) => Scanner::new(address, *range, DEFAULT_BATCH_SIZE, timeout)
            .sweep()
            .left_stream(),
        Err(_) => {
            debug!("Not sweeping {address:?}, it is not an IPv4 address");
            stream::empty().right_stream()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, TcpListener};

    const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

    fn listen_on(port: u16) -> Option<TcpListener> {
        TcpListener::bind((IpAddr::V4(LOCALHOST), port)).ok()
    }

    /// Binds one ephemeral listener plus `extra` more within a small window above it.
    fn cluster_of_listeners(extra: usize) -> Vec<TcpListener> {
        let first = listen_on(0).unwrap();
        let base = first.local_addr().unwrap().port();
        let mut listeners = vec![first];

        for offset in (3..60).step_by(5) {
            if listeners.len() > extra {
                break;
            }
            if let Some(listener) = base.checked_add(offset).and_then(listen_on) {
                listeners.push(listener);
            }
        }
        listeners
    }

    fn ports_of(listeners: &[TcpListener]) -> Vec<u16> {
        let mut ports = listeners
            .iter()
            .map(|l| l.local_addr().unwrap().port())
            .collect::<Vec<_>>();
        ports.sort_unstable();
        ports
    }

    #[tokio::test]
    async fn scanner_runs() {
        // Makes sure the program still runs and doesn't panic
        let range = PortRange::new(1, 1_000).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 10, Duration::from_millis(100));
        scanner.run().await;
    }

    #[tokio::test]
    async fn quad_zero_scanner_runs() {
        let range = PortRange::new(1, 200).unwrap();
        let scanner = Scanner::new(Ipv4Addr::UNSPECIFIED, range, 10, Duration::from_millis(100));
        scanner.run().await;
    }

    #[tokio::test]
    async fn single_listener_is_the_only_result() {
        let listener = listen_on(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let range = PortRange::new(u32::from(port) - 1, u32::from(port) + 2).unwrap();

        let open = sweep("127.0.0.1", &range, Duration::from_millis(200))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(open, vec![port]);
    }

    #[tokio::test]
    async fn results_are_ascending_for_any_batch_size() {
        let listeners = cluster_of_listeners(3);
        let expected = ports_of(&listeners);
        let start = expected[0];
        let range = PortRange::new(u32::from(start), u32::from(start) + 60).unwrap();

        for batch_size in [1, 7, 64] {
            let scanner = Scanner::new(LOCALHOST, range, batch_size, Duration::from_millis(200));
            let open = scanner.run().await;
            assert_eq!(open, expected, "batch size {batch_size}");
        }
    }

    #[tokio::test]
    async fn repeated_sweeps_agree() {
        let listeners = cluster_of_listeners(2);
        let start = ports_of(&listeners)[0];
        let range = PortRange::new(u32::from(start), u32::from(start) + 30).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 16, Duration::from_millis(200));

        assert_eq!(scanner.run().await, scanner.run().await);
    }

    #[tokio::test]
    async fn states_cover_the_whole_range() {
        let listener = listen_on(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let range = PortRange::new(u32::from(port), u32::from(port) + 4).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 4, Duration::from_millis(200));

        let states = scanner.sweep_states().collect::<Vec<_>>().await;

        let ports = states.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        assert_eq!(ports, range.iter().collect::<Vec<_>>());
        assert_eq!(states[0], (port, PortState::Open));
    }

    #[tokio::test]
    async fn single_port_range() {
        let listener = listen_on(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let range = PortRange::new(u32::from(port), u32::from(port)).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 0, Duration::from_millis(200));

        assert_eq!(scanner.run().await, vec![port]);
    }

    #[tokio::test]
    async fn invalid_address_sweeps_nothing() {
        let range = PortRange::new(1, 10).unwrap();
        let open = sweep("localhost", &range, Duration::from_millis(100))
            .collect::<Vec<_>>()
            .await;
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn aborted_before_start_yields_nothing() {
        let listener = listen_on(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let range = PortRange::new(u32::from(port), u32::from(port)).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 1, Duration::from_millis(200));

        let (open, handle) = scanner.sweep_abortable();
        handle.abort();

        assert!(open.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn aborted_mid_sweep_stops_early() {
        let listeners = cluster_of_listeners(2);
        let expected = ports_of(&listeners);
        let start = expected[0];
        let range = PortRange::new(u32::from(start), u32::from(start) + 60).unwrap();
        let scanner = Scanner::new(LOCALHOST, range, 1, Duration::from_millis(200));

        let (mut open, handle) = scanner.sweep_abortable();
        assert_eq!(open.next().await, Some(start));
        handle.abort();

        assert_eq!(open.next().await, None);
        assert!(open.is_aborted());
    }
}
