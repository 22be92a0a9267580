// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 lf-concurrent contributors
//
// Retire manager: binds a retired address to its deleter, defers the
// deleter until no hazard slot observes the address, and drives that check
// from a lazily-spawned background prune thread. Mirrors the original's
// `regist_delete_ptr` / `try_clean_up_delete_ptr` / `post_trigger_gc`
// split, plus its fast path that skips the retire queue entirely when the
// address is not currently hazarded at retire time.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::hazard;
use crate::logging::{self, Severity};

struct RetireNode {
    addr: usize,
    deleter: Option<Box<dyn FnOnce(usize) + Send>>,
    next: *mut RetireNode,
}

static RETIRE_HEAD: AtomicPtr<RetireNode> = AtomicPtr::new(ptr::null_mut());
static PENDING_COUNT: AtomicU64 = AtomicU64::new(0);

fn push_node(node: *mut RetireNode) {
    loop {
        let head = RETIRE_HEAD.load(Ordering::Acquire);
        unsafe {
            (*node).next = head;
        }
        if RETIRE_HEAD
            .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
    }
}

/// Drain the whole retire stack into a thread-private chain; returns the
/// head of that chain (or null if the stack was empty).
fn drain() -> *mut RetireNode {
    RETIRE_HEAD.swap(ptr::null_mut(), Ordering::AcqRel)
}

/// Retire `ptr` with `deleter`. If `ptr` is not currently hazarded, `deleter`
/// runs inline on the calling thread and no retire node is allocated.
/// Otherwise a retire node is queued and the prune daemon is (lazily)
/// started.
///
/// # Safety
/// `ptr` must not be dereferenced by the caller after this call, and
/// `deleter` must be the sole disposer of `ptr`.
pub unsafe fn retire<T>(ptr: *mut T, deleter: impl FnOnce(*mut T) + Send + 'static) {
    let addr = ptr as usize;
    if !hazard::is_hazard(addr) {
        deleter(ptr);
        return;
    }
    retire_always_store(ptr, deleter);
}

/// Like [`retire`] but always queues a retire node, even if the address is
/// not currently hazarded. Useful for tests that want deterministic
/// prune-thread involvement.
///
/// # Safety
/// Same contract as [`retire`].
pub unsafe fn retire_always_store<T>(ptr: *mut T, deleter: impl FnOnce(*mut T) + Send + 'static) {
    let addr = ptr as usize;
    let node = Box::new(RetireNode {
        addr,
        deleter: Some(Box::new(move |addr| deleter(addr as *mut T))),
        next: ptr::null_mut(),
    });
    push_node(Box::into_raw(node));
    PENDING_COUNT.fetch_add(1, Ordering::Relaxed);
    ensure_daemon_started();
}

/// Number of retire nodes currently queued awaiting a safe prune.
pub fn pending_count() -> u64 {
    PENDING_COUNT.load(Ordering::Relaxed)
}

/// Run one prune sweep inline on the calling thread: every queued node
/// whose address is no longer hazarded is deleted; the rest are re-queued.
pub fn prune_once() {
    let mut cur = drain();
    while !cur.is_null() {
        let node = unsafe { Box::from_raw(cur) };
        cur = node.next;
        let RetireNode {
            addr, mut deleter, ..
        } = *node;
        if hazard::is_hazard(addr) {
            let revived = Box::new(RetireNode {
                addr,
                deleter: deleter.take(),
                next: ptr::null_mut(),
            });
            push_node(Box::into_raw(revived));
        } else {
            if let Some(deleter) = deleter.take() {
                deleter(addr);
            }
            PENDING_COUNT.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

struct DaemonWake {
    mutex: Mutex<()>,
    condvar: Condvar,
}

static WAKE: Lazy<DaemonWake> = Lazy::new(|| DaemonWake {
    mutex: Mutex::new(()),
    condvar: Condvar::new(),
});
static STOP_FLAG: AtomicBool = AtomicBool::new(false);
static DAEMON_STARTED: AtomicBool = AtomicBool::new(false);
static DAEMON_HANDLE: Lazy<Mutex<Option<JoinHandle<()>>>> = Lazy::new(|| Mutex::new(None));

const SWEEP_INTERVAL: Duration = Duration::from_millis(10);

fn ensure_daemon_started() {
    if DAEMON_STARTED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    STOP_FLAG.store(false, Ordering::Release);
    let handle = std::thread::Builder::new()
        .name("lf-concurrent-prune".into())
        .spawn(prune_daemon_loop)
        .expect("failed to spawn prune daemon thread");
    *DAEMON_HANDLE.lock() = Some(handle);
}

fn prune_daemon_loop() {
    while !STOP_FLAG.load(Ordering::Acquire) {
        prune_once();
        let mut guard = WAKE.mutex.lock();
        WAKE.condvar.wait_for(&mut guard, SWEEP_INTERVAL);
    }
}

/// Stop the prune daemon and join it. Any retire nodes still queued after
/// the daemon stops are drained forcibly (their deleters run regardless of
/// hazard status) and a single `RetireLeakOnShutdown` WARN is logged if the
/// queue was non-empty.
pub fn stop_prune_thread() {
    STOP_FLAG.store(true, Ordering::Release);
    WAKE.condvar.notify_all();
    if let Some(handle) = DAEMON_HANDLE.lock().take() {
        let _ = handle.join();
    }
    DAEMON_STARTED.store(false, Ordering::Release);

    let mut cur = drain();
    let mut leaked = 0u64;
    while !cur.is_null() {
        let node = unsafe { Box::from_raw(cur) };
        cur = node.next;
        let RetireNode {
            addr, mut deleter, ..
        } = *node;
        if let Some(deleter) = deleter.take() {
            deleter(addr);
        }
        PENDING_COUNT.fetch_sub(1, Ordering::Relaxed);
        leaked += 1;
    }
    if leaked > 0 {
        logging::log(
            Severity::Warn,
            format!("RetireLeakOnShutdown: {leaked} retire node(s) disposed best-effort at shutdown"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn inline_delete_when_not_hazarded() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let d = dropped.clone();
        let mut value = 5u32;
        let p: *mut u32 = &mut value;
        unsafe {
            retire(p, move |_p| {
                d.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(pending_count(), 0);
    }

    #[test]
    fn queued_while_hazarded_then_pruned_after_release() {
        let mut value = 9u32;
        let p: *mut u32 = &mut value;
        let hp = hazard::acquire_addr(p as usize);

        let dropped = Arc::new(AtomicUsize::new(0));
        let d = dropped.clone();
        unsafe {
            retire_always_store(p, move |_p| {
                d.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        prune_once();
        assert_eq!(dropped.load(Ordering::SeqCst), 0, "still hazarded, must not delete");

        drop(hp);
        prune_once();
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
}
