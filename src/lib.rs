//! This crate exposes the internal functionality of the `tcpsweep` port scanner.
//!
//! tcpsweep answers one question: which TCP ports of an IPv4 host accept a
//! connection within a bounded time. Each port is checked with a plain
//! connect, no raw packets and no privileges needed.
//!
//! ## Architecture Overview
//!
//! 1. **Input Processing**: the target and the port range are parsed and validated
//!    ([`input`]). Ranges outside 1..=65535 or with start above end never reach the scanner.
//! 2. **Probe**: one non-blocking connect per port, bounded by a timeout, classified
//!    as open or not ([`scanner::probe()`]).
//! 3. **Sweep**: the range is probed in ascending order with a bounded number of
//!    probes in flight, open ports are yielded in ascending order ([`scanner::Scanner`]).
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::{net::Ipv4Addr, time::Duration};
//!
//! use tcpsweep::input::PortRange;
//! use tcpsweep::scanner::Scanner;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let range = PortRange::new(1, 1_000)?;
//!
//!     let scanner = Scanner::new(
//!         Ipv4Addr::LOCALHOST,
//!         range,
//!         100,                        // Probes in flight, 1 for a sequential scan
//!         Duration::from_millis(500), // Time to wait for each handshake
//!     );
//!
//!     for port in scanner.run().await {
//!         println!("[+] Port {port} is OPEN");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Probing never fails. A refused connection, a silent host, an unusable
//! address or a socket that could not be created all mean the port is not
//! open. Use [`scanner::probe_state`] or [`scanner::Scanner::sweep_states`] to
//! tell those cases apart.
#![allow(clippy::needless_doctest_main)]
#![warn(missing_docs)]

pub mod tui;

pub mod input;

pub mod scanner;

pub mod ulimit;
