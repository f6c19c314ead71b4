//! Busy-wait primitives.
//!
//! Every hardware wait in the driver is expressed as a named readiness predicate
//! handed to [`WaitPolicy::wait_until`]. The default policy spins forever; the
//! bounded policy gives up after a fixed number of polls.

/// How long a hardware wait may spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Spin until the condition holds, however long that takes.
    #[default]
    Forever,
    /// Give up after `max_polls` unsuccessful evaluations of the condition.
    Bounded { max_polls: u32 },
}

/// A bounded wait ran out of polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout {
    pub polls: u32,
}

impl WaitPolicy {
    /// Evaluate `ready` until it returns `true`. Returns the number of polls that
    /// came back not-ready.
    pub fn wait_until<F>(self, mut ready: F) -> Result<u32, PollTimeout>
    where
        F: FnMut() -> bool,
    {
        let WaitPolicy::Bounded { max_polls } = self else {
            return Ok(spin_until(ready));
        };
        let mut polls: u32 = 0;
        loop {
            if ready() {
                return Ok(polls);
            }
            polls = polls.saturating_add(1);
            if polls >= max_polls {
                return Err(PollTimeout { polls });
            }
            core::hint::spin_loop();
        }
    }
}

/// Evaluate `ready` until it returns `true`, with no limit. Returns the number of
/// polls that came back not-ready.
pub fn spin_until<F>(mut ready: F) -> u32
where
    F: FnMut() -> bool,
{
    let mut polls: u32 = 0;
    while !ready() {
        polls = polls.saturating_add(1);
        core::hint::spin_loop();
    }
    polls
}

/// Source of fixed busy-wait delays.
pub trait DelayCycles {
    fn delay_cycles(&mut self, cycles: u32);
}

/// Counts down in a spin loop; needs nothing from the platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl DelayCycles for SpinDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}
