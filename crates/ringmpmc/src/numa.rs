//! NUMA cluster probe.
//!
//! A locality heuristic, never a correctness gate: segments remember which
//! cluster last worked on them and retry loops are biased toward it. With the
//! `numa` feature off (or on non-Linux targets) every probe degrades to a
//! constant cluster 0 and the bias logic becomes a no-op.

/// Returns true if cluster identifiers carry real information.
#[cfg(all(feature = "numa", target_os = "linux"))]
#[inline]
pub(crate) fn numa_available() -> bool {
    true
}

/// The NUMA node the calling thread is currently scheduled on.
#[cfg(all(feature = "numa", target_os = "linux"))]
pub(crate) fn current_cluster() -> u64 {
    let mut cpu: libc::c_uint = 0;
    let mut node: libc::c_uint = 0;
    // getcpu(2) fills the node the caller runs on; glibc has no portable
    // wrapper for the node argument, so go through the raw syscall.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_getcpu,
            std::ptr::addr_of_mut!(cpu),
            std::ptr::addr_of_mut!(node),
            std::ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc == 0 {
        u64::from(node)
    } else {
        0
    }
}

#[cfg(not(all(feature = "numa", target_os = "linux")))]
#[inline]
pub(crate) fn numa_available() -> bool {
    false
}

#[cfg(not(all(feature = "numa", target_os = "linux")))]
#[inline]
pub(crate) fn current_cluster() -> u64 {
    0
}
