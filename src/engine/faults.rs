//! Fault injection
//!
//! Failure hooks consulted by the engine at well-defined points, so the
//! wrapper's recovery paths can be driven deterministically instead of
//! waiting for a real cluster to misbehave. Every fault is one-shot: it is
//! consumed the first time it fires.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A link failure injected into the next sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFault {
    /// The link drops before any command runs: no effects, no reply
    DropBeforeExecute,

    /// The link drops after the commands ran: effects persist, reply lost.
    /// The two are indistinguishable from the caller's side, which is why
    /// connection-error retries can duplicate effects.
    DropAfterExecute,
}

/// Mutable fault state shared by every session on an engine.
#[derive(Default)]
pub struct FaultPlan {
    /// Slots currently "migrating": the next command addressed to one fails
    /// with a retriable server error, then the slot settles.
    migrating_slots: Mutex<HashSet<u16>>,

    /// Queue of link faults, consumed one per sub-request.
    link_faults: Mutex<VecDeque<LinkFault>>,

    /// Refuse new connections entirely.
    unreachable: AtomicBool,

    /// Swallow the next async request: no reply, no callback. Drives the
    /// caller-side timeout path.
    swallow_next: AtomicBool,
}

impl FaultPlan {
    /// Marks a slot as migrating until the next command touches it.
    pub fn migrate_slot(&self, slot: u16) {
        self.migrating_slots.lock().insert(slot);
    }

    /// Consumes a pending migration on `slot`, if any.
    pub fn take_migration(&self, slot: u16) -> bool {
        self.migrating_slots.lock().remove(&slot)
    }

    /// Queues a link fault for a future sub-request.
    pub fn inject_link_fault(&self, fault: LinkFault) {
        self.link_faults.lock().push_back(fault);
    }

    /// Consumes the next queued link fault, if any.
    pub fn take_link_fault(&self) -> Option<LinkFault> {
        self.link_faults.lock().pop_front()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::SeqCst)
    }

    /// Arms the swallow fault for the next async request.
    pub fn swallow_next_request(&self) {
        self.swallow_next.store(true, Ordering::SeqCst);
    }

    /// Consumes the swallow fault, if armed.
    pub fn take_swallow(&self) -> bool {
        self.swallow_next.swap(false, Ordering::SeqCst)
    }
}
