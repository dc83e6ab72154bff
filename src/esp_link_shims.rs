//! ESP-IDF runtime symbol providers for `critical-section` and
//! `embassy-time`.
//!
//! The link uses embassy-sync primitives and `with_timeout` from plain
//! FreeRTOS threads, so the firmware supplies both drivers itself:
//!
//! - critical sections: one re-entrant process-wide lock
//! - time: `esp_timer_get_time()` plus a single wake thread serving a
//!   deadline queue

use core::cell::{Cell, RefCell};
use core::task::Waker;
use core::time::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};

static CRITICAL_SECTION_MUTEX: Mutex<()> = Mutex::new(());

thread_local! {
    static CRITICAL_SECTION_DEPTH: Cell<u8> = const { Cell::new(0) };
    static CRITICAL_SECTION_GUARD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    CRITICAL_SECTION_DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            let lock = CRITICAL_SECTION_MUTEX
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            CRITICAL_SECTION_GUARD.with(|guard| *guard.borrow_mut() = Some(lock));
        }
        depth.set(d.saturating_add(1));
        d
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_token: u8) {
    CRITICAL_SECTION_DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            return;
        }
        depth.set(d - 1);
        if d == 1 {
            CRITICAL_SECTION_GUARD.with(|guard| *guard.borrow_mut() = None);
        }
    });
}

#[unsafe(no_mangle)]
fn _embassy_time_now() -> u64 {
    // SAFETY: reads the free-running high-resolution timer.
    unsafe { esp_idf_svc::sys::esp_timer_get_time() as u64 }
}

struct WakeQueue {
    pending: Mutex<Vec<(u64, Waker)>>,
    changed: Condvar,
}

fn wake_queue() -> &'static WakeQueue {
    static QUEUE: OnceLock<WakeQueue> = OnceLock::new();
    QUEUE.get_or_init(|| {
        std::thread::Builder::new()
            .name("time-wake".into())
            .stack_size(3 * 1024)
            .spawn(run_wake_thread)
            .map_err(|e| log::error!("TIME: wake thread spawn failed: {}", e))
            .ok();
        WakeQueue {
            pending: Mutex::new(Vec::new()),
            changed: Condvar::new(),
        }
    })
}

fn run_wake_thread() {
    let q = wake_queue();
    let mut pending = q.pending.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
        let now = _embassy_time_now();
        pending.retain(|(at, waker)| {
            if *at <= now {
                waker.wake_by_ref();
                false
            } else {
                true
            }
        });

        pending = match pending.iter().map(|(at, _)| *at).min() {
            Some(next) => {
                q.changed
                    .wait_timeout(pending, Duration::from_micros(next - now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => q
                .changed
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}

#[unsafe(no_mangle)]
fn _embassy_time_schedule_wake(at: u64, waker: &Waker) {
    let q = wake_queue();
    let mut pending = q.pending.lock().unwrap_or_else(PoisonError::into_inner);
    match pending.iter_mut().find(|(_, w)| w.will_wake(waker)) {
        Some(entry) => entry.0 = entry.0.min(at),
        None => pending.push((at, waker.clone())),
    }
    drop(pending);
    q.changed.notify_one();
}
