use crate::{AccessObserver, SimulationError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
pub struct AccessMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    faults: AtomicU64,
    start_time: Instant,
}

impl Default for AccessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessMetrics {
    pub fn new() -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.faults.store(0, Ordering::SeqCst);
    }

    pub fn get_reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn get_writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get_faults(&self) -> u64 {
        self.faults.load(Ordering::SeqCst)
    }

    /// Register accesses per second of wall time.
    pub fn get_aps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.get_reads() + self.get_writes()) as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl AccessObserver for AccessMetrics {
    fn on_read(&self, _addr: u32, _value: u32) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_write(&self, _addr: u32, _value: u32) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_fault(&self, _fault: &SimulationError) {
        self.faults.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Access {
    pub kind: AccessKind,
    pub addr: u32,
    pub value: u32,
}

/// Ordered log of every register access on the bus.
#[derive(Debug, Default)]
pub struct AccessTrace {
    accesses: Mutex<Vec<Access>>,
}

impl AccessTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accesses(&self) -> Vec<Access> {
        self.accesses.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn writes_to(&self, addr: u32) -> Vec<u32> {
        self.accesses()
            .into_iter()
            .filter(|a| a.kind == AccessKind::Write && a.addr == addr)
            .map(|a| a.value)
            .collect()
    }

    /// Position of the first write to `addr`.
    pub fn first_write(&self, addr: u32) -> Option<usize> {
        self.accesses()
            .iter()
            .position(|a| a.kind == AccessKind::Write && a.addr == addr)
    }

    fn push(&self, access: Access) {
        if let Ok(mut log) = self.accesses.lock() {
            log.push(access);
        }
    }
}

impl AccessObserver for AccessTrace {
    fn on_read(&self, addr: u32, value: u32) {
        self.push(Access { kind: AccessKind::Read, addr, value });
    }

    fn on_write(&self, addr: u32, value: u32) {
        self.push(Access { kind: AccessKind::Write, addr, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let m = AccessMetrics::new();
        m.on_read(0, 0);
        m.on_write(0, 1);
        m.on_write(4, 1);
        m.on_fault(&SimulationError::RxUnderflow);
        assert_eq!(m.get_reads(), 1);
        assert_eq!(m.get_writes(), 2);
        assert_eq!(m.get_faults(), 1);
        m.reset();
        assert_eq!(m.get_writes(), 0);
    }

    #[test]
    fn trace_keeps_order() {
        let t = AccessTrace::new();
        t.on_write(0x24, 27);
        t.on_read(0x18, 0x90);
        t.on_write(0x28, 8);
        assert_eq!(t.first_write(0x28), Some(2));
        assert_eq!(t.writes_to(0x24), vec![27]);
        assert_eq!(t.accesses()[1].kind, AccessKind::Read);
    }
}
