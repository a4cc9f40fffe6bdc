//! Capability policy and audit counters.
//!
//! Every privileged operation the worker can request belongs to exactly one
//! capability area. Each area has an allow flag (deny by default) and a call
//! counter that only moves when an operation was actually performed — a
//! denied or malformed request leaves the counter alone.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The closed set of capability areas the broker arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Writing files under the broker's configured root directory.
    FileWrite,
    /// Reading and replacing the shared clipboard text.
    Clipboard,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::FileWrite, Capability::Clipboard];

    pub fn name(self) -> &'static str {
        match self {
            Capability::FileWrite => "file-write",
            Capability::Clipboard => "clipboard",
        }
    }

    fn index(self) -> usize {
        match self {
            Capability::FileWrite => 0,
            Capability::Clipboard => 1,
        }
    }
}

#[derive(Debug, Default)]
struct Area {
    allowed: AtomicBool,
    calls: AtomicU64,
}

/// Per-capability allow flags plus audit counters.
///
/// Flags and counters are independent atomics, so service threads consult
/// the table without locking and policy changes take effect for the next
/// request on every connection.
#[derive(Debug, Default)]
pub struct PolicyTable {
    areas: [Area; Capability::ALL.len()],
}

impl PolicyTable {
    /// A table that denies every capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow or deny one capability area.
    pub fn set(&self, capability: Capability, allow: bool) {
        self.areas[capability.index()]
            .allowed
            .store(allow, Ordering::Relaxed);
        tracing::info!(capability = capability.name(), allow, "policy updated");
    }

    /// Is this capability currently allowed?
    pub fn query(&self, capability: Capability) -> bool {
        self.areas[capability.index()].allowed.load(Ordering::Relaxed)
    }

    /// Record one performed (not merely requested) operation.
    pub fn log_call(&self, capability: Capability) {
        self.areas[capability.index()]
            .calls
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Operations performed so far in this capability area.
    pub fn calls(&self, capability: Capability) -> u64 {
        self.areas[capability.index()].calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_everything_by_default() {
        let table = PolicyTable::new();
        for capability in Capability::ALL {
            assert!(!table.query(capability));
            assert_eq!(table.calls(capability), 0);
        }
    }

    #[test]
    fn flags_are_independent() {
        let table = PolicyTable::new();
        table.set(Capability::FileWrite, true);
        assert!(table.query(Capability::FileWrite));
        assert!(!table.query(Capability::Clipboard));

        table.set(Capability::FileWrite, false);
        assert!(!table.query(Capability::FileWrite));
    }

    #[test]
    fn counters_are_per_area() {
        let table = PolicyTable::new();
        table.log_call(Capability::FileWrite);
        table.log_call(Capability::FileWrite);
        table.log_call(Capability::Clipboard);

        assert_eq!(table.calls(Capability::FileWrite), 2);
        assert_eq!(table.calls(Capability::Clipboard), 1);
    }

    #[test]
    fn counters_survive_concurrent_increments() {
        let table = std::sync::Arc::new(PolicyTable::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let table = std::sync::Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        table.log_call(Capability::Clipboard);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(table.calls(Capability::Clipboard), 1000);
    }
}
