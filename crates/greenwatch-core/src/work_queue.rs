//! Interrupt-safe deferred work queue
//!
//! Interrupt handlers hand work to the main loop by submitting a statically
//! allocated work item. Every item owns one slot of a fixed arena; the list is
//! linked through slot indices so nothing is ever allocated near interrupt
//! code. Each slot carries an `enqueued` flag so an interrupt that fires again
//! before the main loop drains the queue does not link the item twice.
//!
//! Items are pushed at the head, so [`WorkQueue::drain_all`] runs them in LIFO
//! order relative to submission.
//!
//! ```rust,ignore
//! static WORK: WorkQueue<App, 2> = WorkQueue::new([App::on_serial_rx, App::on_adc]);
//!
//! // interrupt context
//! WORK.submit(SERIAL_RX);
//!
//! // main loop
//! WORK.drain_all(&mut app);
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Handle naming one statically allocated work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkId(u8);

impl WorkId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

struct Links<const N: usize> {
    head: Option<u8>,
    next: [Option<u8>; N],
    enqueued: [bool; N],
}

impl<const N: usize> Links<N> {
    const fn new() -> Self {
        Self {
            head: None,
            next: [None; N],
            enqueued: [false; N],
        }
    }
}

/// Fixed set of work items with a singly linked pending list.
///
/// `C` is the main-loop context every callback receives.
pub struct WorkQueue<C, const N: usize> {
    callbacks: [fn(&mut C); N],
    links: Mutex<CriticalSectionRawMutex, RefCell<Links<N>>>,
}

impl<C, const N: usize> WorkQueue<C, N> {
    /// Create a queue whose item `i` runs `callbacks[i]`.
    pub const fn new(callbacks: [fn(&mut C); N]) -> Self {
        assert!(N <= u8::MAX as usize, "work queue slots are indexed by u8");
        Self {
            callbacks,
            links: Mutex::new(RefCell::new(Links::new())),
        }
    }

    /// Link `id` at the head of the pending list.
    ///
    /// Safe to call from interrupt context. Returns `false` when the item was
    /// already pending, in which case the list is left untouched.
    pub fn submit(&self, id: WorkId) -> bool {
        let index = id.index();
        debug_assert!(index < N, "work item {} out of range", index);
        if index >= N {
            return false;
        }

        self.links.lock(|links| {
            let mut links = links.borrow_mut();
            if links.enqueued[index] {
                return false;
            }
            links.enqueued[index] = true;
            links.next[index] = links.head;
            links.head = Some(index as u8);
            true
        })
    }

    /// Whether `id` is currently linked.
    pub fn is_pending(&self, id: WorkId) -> bool {
        let index = id.index();
        index < N && self.links.lock(|links| links.borrow().enqueued[index])
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock(|links| links.borrow().head.is_none())
    }

    /// Unlink the head item, clearing its flag so it can be submitted again.
    fn pop(&self) -> Option<usize> {
        self.links.lock(|links| {
            let mut links = links.borrow_mut();
            let index = links.head? as usize;
            links.head = links.next[index].take();
            links.enqueued[index] = false;
            Some(index)
        })
    }

    /// Run every pending item until the list is empty.
    ///
    /// Main-loop only. Callbacks run with interrupts unmasked and may cause new
    /// submissions, which are picked up before this returns. Returns the number
    /// of callbacks invoked.
    pub fn drain_all(&self, ctx: &mut C) -> usize {
        let mut invoked = 0;
        while let Some(index) = self.pop() {
            (self.callbacks[index])(ctx);
            invoked += 1;
        }
        invoked
    }
}
