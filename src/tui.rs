//! Utilities for terminal output during scanning.

/// Terminal User Interface Module for tcpsweep
/// Defines macros to use
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        // if not greppable then print, otherwise no else statement so do not print.
        if !$greppable {
            if $accessible {
                // Don't print the ascii art
                eprintln!("{}", $name);
            } else {
                eprintln!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
            }
        }
    };
}

/// Prints an informational line, suppressed in greppable mode.
#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
            }
        }
    };
}

/// Prints one open port. Greppable mode prints only the number.
#[macro_export]
macro_rules! output {
    ($port:expr, $greppable:expr) => {
        if $greppable {
            println!("{}", $port);
        } else {
            println!("[+] Port {} is OPEN", $port);
        }
    };
}
