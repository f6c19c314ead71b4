use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::SystemBus;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BusSnapshot {
    /// Register values per peripheral, keyed by byte offset.
    pub peripherals: BTreeMap<String, BTreeMap<u32, u32>>,
    pub sysclk_hz: Option<u32>,
    pub cycles: u64,
    pub faults: Vec<String>,
}

/// One register whose value differs between two snapshots.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChange<'a> {
    pub peripheral: &'a str,
    pub offset: u32,
    pub before: Option<u32>,
    pub after: Option<u32>,
}

impl BusSnapshot {
    pub fn capture(bus: &SystemBus) -> Self {
        let peripherals = bus
            .peripherals
            .iter()
            .map(|p| (p.name.clone(), p.dev.registers().into_iter().collect()))
            .collect();
        Self {
            peripherals,
            sysclk_hz: bus.sysctl().map(|s| s.sysclk_hz()),
            cycles: bus.cycles(),
            faults: bus.faults().iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn register(&self, peripheral: &str, offset: u32) -> Option<u32> {
        self.peripherals.get(peripheral)?.get(&offset).copied()
    }

    /// Registers changed from `self` to `later`, in peripheral then offset order.
    pub fn diff<'a>(&'a self, later: &'a BusSnapshot) -> Vec<RegisterChange<'a>> {
        let mut changes = Vec::new();
        let names: std::collections::BTreeSet<&String> =
            self.peripherals.keys().chain(later.peripherals.keys()).collect();
        for name in names {
            let empty = BTreeMap::new();
            let before = self.peripherals.get(name).unwrap_or(&empty);
            let after = later.peripherals.get(name).unwrap_or(&empty);
            let offsets: std::collections::BTreeSet<&u32> = before.keys().chain(after.keys()).collect();
            for offset in offsets {
                let b = before.get(offset).copied();
                let a = after.get(offset).copied();
                if a != b {
                    changes.push(RegisterChange {
                        peripheral: name.as_str(),
                        offset: *offset,
                        before: b,
                        after: a,
                    });
                }
            }
        }
        changes
    }
}
