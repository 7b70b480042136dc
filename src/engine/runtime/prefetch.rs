/// Hints the CPU to pull the cache line holding `data` ahead of use. Never blocks or faults.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn prefetch_read(data: &[u8]) {
    use std::arch::x86_64::*;

    if data.is_empty() {
        return;
    }
    // SAFETY: prefetching is a pure hint and the pointer comes from a live slice
    #[allow(unused_unsafe)]
    unsafe {
        _mm_prefetch(data.as_ptr() as *const i8, _MM_HINT_T0);
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn prefetch_read(_data: &[u8]) {}
