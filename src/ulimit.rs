//! Keeps the number of probes in flight within the process' open file limit.
//!
//! Every in-flight probe holds one socket, so a batch size above the soft
//! `NOFILE` limit would make probes fail locally instead of reaching the target.
use crate::input::Opts;
use crate::{detail, warning};
use log::info;

const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;
// Safest batch size when the file limit is unknown or too small
const AVERAGE_BATCH_SIZE: u16 = 3000;
// Descriptors kept free for stdio, the runtime and the config file
const RESERVED_DESCRIPTORS: u64 = 100;

/// Raises the soft open file limit when `--ulimit` asked for it and returns
/// the limit in effect afterwards.
#[cfg(unix)]
pub fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            info!("Could not read the open file limit, assuming {DEFAULT_FILE_DESCRIPTORS_LIMIT}: {e}");
            DEFAULT_FILE_DESCRIPTORS_LIMIT
        }
    }
}

/// There is no portable file limit to adjust on this platform.
#[cfg(not(unix))]
pub fn adjust_ulimit_size(_opts: &Opts) -> u64 {
    DEFAULT_FILE_DESCRIPTORS_LIMIT
}

/// Picks a batch size the file limit `ulimit` can sustain, starting from the
/// requested one.
pub fn infer_batch_size(opts: &Opts, ulimit: u64) -> u16 {
    let mut batch_size: u64 = opts.batch_size().into();

    // Adjust the batch size when the ulimit value is lower than the desired batch size
    if ulimit < batch_size {
        warning!("File limit is lower than the batch size. Consider upping with --ulimit. May cause harm to sensitive servers",
            opts.greppable, opts.accessible
        );

        // When the OS supports high file limits like 8000, but the user
        // selected a batch size higher than this we should reduce it to
        // a lower number.
        if ulimit < AVERAGE_BATCH_SIZE.into() {
            // very small limit, keep half of it for probes
            warning!("Your file limit is very small, which negatively impacts tcpsweep's speed. Up the Ulimit with '--ulimit 5000'. ", opts.greppable, opts.accessible);
            info!("Halving batch_size because ulimit is smaller than average batch size");
            batch_size = ulimit / 2;
        } else if ulimit > DEFAULT_FILE_DESCRIPTORS_LIMIT {
            info!("Batch size is now average batch size");
            batch_size = AVERAGE_BATCH_SIZE.into();
        } else {
            batch_size = ulimit - RESERVED_DESCRIPTORS;
        }
    }
    // When the ulimit is higher than the batch size let the user know that the
    // batch size can be increased unless they specified the ulimit themselves.
    else if ulimit + 2 > batch_size && opts.ulimit.is_none() {
        detail!(format!("File limit higher than batch size. Can increase speed by increasing batch size '-b {}'.", ulimit.saturating_sub(RESERVED_DESCRIPTORS)), opts.greppable, opts.accessible);
    }

    u16::try_from(batch_size).unwrap_or(u16::MAX).max(1)
}
