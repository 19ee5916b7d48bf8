use core::sync::atomic::{AtomicI32, Ordering};

/// A futex-backed mutex. std's Mutex may allocate on first contention,
/// which is off-limits inside an allocator, so the arenas and the large
/// table carry this instead.
pub struct RawMutex {
    /// 0 = unlocked, 1 = locked, 2 = locked with waiters
    state: AtomicI32,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(0),
        }
    }

    /// Acquire without blocking. Returns true on success. This is what the
    /// arena router probes with: a contended arena is skipped, not waited on.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn lock(&self) {
        if self
            .state
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        self.lock_contended();
    }

    #[cold]
    fn lock_contended(&self) {
        loop {
            let prev = self.state.swap(2, Ordering::Acquire);
            if prev == 0 {
                return;
            }
            #[cfg(target_os = "linux")]
            unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    &self.state as *const AtomicI32,
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    2i32,
                    core::ptr::null::<libc::timespec>(),
                );
            }
            #[cfg(not(target_os = "linux"))]
            core::hint::spin_loop();
        }
    }

    #[inline]
    pub fn unlock(&self) {
        if self.state.swap(0, Ordering::Release) == 2 {
            self.wake_one();
        }
    }

    #[cold]
    fn wake_one(&self) {
        #[cfg(target_os = "linux")]
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                &self.state as *const AtomicI32,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_lock_reports_contention() {
        let m = RawMutex::new();
        assert!(m.try_lock());
        assert!(!m.try_lock());
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn lock_excludes_across_threads() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Shared {
            mutex: RawMutex,
            value: AtomicUsize,
        }

        let shared = Arc::new(Shared {
            mutex: RawMutex::new(),
            value: AtomicUsize::new(0),
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        shared.mutex.lock();
                        // Non-atomic-looking increment under the lock.
                        let v = shared.value.load(Ordering::Relaxed);
                        shared.value.store(v + 1, Ordering::Relaxed);
                        shared.mutex.unlock();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.value.load(Ordering::Relaxed), 40_000);
    }
}
