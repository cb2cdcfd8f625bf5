//! Coroutine runtime tuning from the environment.
//!
//! `SERVANT_STACK_SIZE` sets the stack of every request coroutine, in bytes,
//! decimal (`65536`) or hex (`0x10000`). Command and file handlers call into
//! process spawning and file IO from that stack, so the default is larger
//! than `may`'s own.

use std::env;

pub const DEFAULT_STACK_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub stack_size: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let stack_size = env::var("SERVANT_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }

    /// Apply to the global `may` configuration. Call before the listener starts.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
