#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ports checked when no explicit list or range is given.
///
/// Grouped by the ecosystems that conventionally bind them. Several
/// frameworks share ports, so the list is de-duplicated on use.
pub const DEFAULT_DEV_PORTS: &[u16] = &[
    // Node.js, React, Next.js, Remix, Rails, Bun
    3000, 3001, 3002, 3003, 3004, 3005,
    // Go, Rust, Phoenix, general dev servers
    4000, 4001, 4002, 4003,
    // Angular
    4200, 4201,
    // Flask, .NET
    5000, 5001,
    // Vite, SvelteKit
    5173, 5174, 5175, 5176, 5177,
    6000, 6001,
    // Phoenix LiveView
    7000, 7001, 7002,
    // Django, FastAPI, Uvicorn, Deno
    8000, 8001,
    // Spring Boot, generic HTTP
    8080, 8081, 8082, 8888,
    // Play framework, Scala
    9000, 9001, 9002,
];

/// Ports of databases and brokers that are never touched.
pub const DEFAULT_PROTECTED_PORTS: &[u16] = &[
    5432,  // PostgreSQL
    6379,  // Redis
    3306,  // MySQL
    27017, // MongoDB
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ports {
    /// Ports whose listeners are always reported as protected and never
    /// signalled, whatever their command line looks like.
    pub protected: BTreeSet<u16>,

    /// Ports scanned when the invocation does not name any. Order is kept,
    /// duplicates are ignored.
    pub scan: Vec<u16>,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            protected: DEFAULT_PROTECTED_PORTS.iter().copied().collect(),
            scan: DEFAULT_DEV_PORTS.to_vec(),
        }
    }
}

impl Ports {
    pub fn is_protected(&self, port: u16) -> bool {
        self.protected.contains(&port)
    }

    /// The scan list without repeats, first occurrence wins.
    pub fn scan_list(&self) -> Vec<u16> {
        let mut seen = BTreeSet::new();
        self.scan
            .iter()
            .copied()
            .filter(|port| *port != 0 && seen.insert(*port))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_scan_list_has_no_repeats() {
        let ports = Ports::default();
        let list = ports.scan_list();
        let unique: BTreeSet<_> = list.iter().collect();
        assert_eq!(list.len(), unique.len());
        assert_eq!(list.first(), Some(&3000));
        assert!(list.contains(&5173));
    }

    #[test]
    fn databases_are_protected_by_default() {
        let ports = Ports::default();
        for port in [5432, 6379, 3306, 27017] {
            assert!(ports.is_protected(port), "{port} should be protected");
        }
        assert!(!ports.is_protected(3000));
    }

    #[test]
    fn scan_list_drops_port_zero() {
        let ports = Ports {
            protected: BTreeSet::new(),
            scan: vec![0, 8080, 8080, 3000],
        };
        assert_eq!(ports.scan_list(), vec![8080, 3000]);
    }

    proptest! {
        #[test]
        fn scan_list_covers_input_without_repeats(
            scan in prop::collection::vec(any::<u16>(), 0..64),
        ) {
            let ports = Ports { protected: BTreeSet::new(), scan: scan.clone() };
            let list = ports.scan_list();

            let unique: BTreeSet<u16> = list.iter().copied().collect();
            prop_assert_eq!(unique.len(), list.len());
            prop_assert!(!unique.contains(&0));
            prop_assert!(scan.iter().filter(|port| **port != 0).all(|port| unique.contains(port)));
            if let Some(first) = scan.iter().find(|port| **port != 0) {
                prop_assert_eq!(list.first(), Some(first));
            }
        }
    }
}
