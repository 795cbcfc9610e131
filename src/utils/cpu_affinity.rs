//! Pinning of the driver thread for the profiling stage.
//!
//! Child processes inherit the affinity mask of the thread that spawns them,
//! so pinning the driver pins every profiler run to the same core.

#[cfg(target_os = "linux")]
mod platform {
    pub type Mask = libc::cpu_set_t;

    pub fn core_count() -> Option<usize> {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n <= 0 {
            None
        } else {
            Some(n as usize)
        }
    }

    pub fn current_mask() -> Option<Mask> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) == 0 {
                Some(set)
            } else {
                None
            }
        }
    }

    pub fn pin(core: usize) -> bool {
        if core >= libc::CPU_SETSIZE as usize {
            return false;
        }
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core, &mut set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
        }
    }

    pub fn restore(mask: &Mask) -> bool {
        unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), mask) == 0 }
    }
}

// Other platforms run unpinned.
#[cfg(not(target_os = "linux"))]
mod platform {
    pub type Mask = ();

    pub fn core_count() -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    pub fn current_mask() -> Option<Mask> {
        None
    }

    pub fn pin(_core: usize) -> bool {
        false
    }

    pub fn restore(_mask: &Mask) -> bool {
        true
    }
}

/// Number of online cores, if the platform can tell.
pub fn core_count() -> Option<usize> {
    platform::core_count()
}

/// RAII guard: pins the current thread on creation, restores the previous
/// affinity on drop.
///
/// ```ignore
/// {
///     let _pin = CpuPinGuard::with_core(2);
///     // every profiler spawned here runs on core 2
/// }
/// ```
pub struct CpuPinGuard {
    core: Option<usize>,
    saved: Option<platform::Mask>,
}

impl CpuPinGuard {
    /// Pin to `core`. Pinning failures are logged; the run continues unpinned.
    pub fn with_core(core: usize) -> Self {
        let saved = platform::current_mask();
        if platform::pin(core) {
            log::debug!("driver thread pinned to core {core}");
            Self {
                core: Some(core),
                saved,
            }
        } else {
            log::warn!("cannot pin to core {core}, profiling unpinned");
            Self { core: None, saved }
        }
    }

    /// The core this thread is pinned to, if any.
    pub fn core_id(&self) -> Option<usize> {
        self.core
    }

    pub fn is_pinned(&self) -> bool {
        self.core.is_some()
    }
}

impl Drop for CpuPinGuard {
    fn drop(&mut self) {
        if self.core.is_some() {
            if let Some(mask) = &self.saved {
                platform::restore(mask);
            }
        }
    }
}
