//! Executable memory. Pages are mapped read-write, filled, then flipped
//! to read-execute and never written again.

use std::io;
use std::ptr::NonNull;

use crate::lir::lower::MachineCode;

/// Uniform kernel entry: argument pointers in `rdi`, result buffer in `rsi`.
#[cfg(target_arch = "x86_64")]
pub type KernelFn = unsafe extern "sysv64" fn(args: *const *const u8, ret: *mut u8);

#[cfg(not(target_arch = "x86_64"))]
pub type KernelFn = unsafe extern "C" fn(args: *const *const u8, ret: *mut u8);

/// Machine code mapped into executable pages, unmapped on drop.
pub struct ExecutableBuffer {
    ptr: NonNull<u8>,
    /// Mapped length, a whole number of pages.
    capacity: usize,
    len: usize,
}

// The mapping is immutable once published.
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

impl ExecutableBuffer {
    #[cfg(unix)]
    pub fn new(code: &MachineCode) -> io::Result<Self> {
        let page = page_size();
        let len = code.bytes.len();
        let capacity = len.max(1).div_ceil(page) * page;
        // SAFETY: fresh anonymous private mapping; no existing memory is touched.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(raw as *mut u8).ok_or_else(|| io::Error::other("mmap returned null"))?;
        let buffer = ExecutableBuffer { ptr, capacity, len };
        // SAFETY: the mapping is `capacity >= len` bytes and writable.
        unsafe {
            std::ptr::copy_nonoverlapping(code.bytes.as_ptr(), ptr.as_ptr(), len);
        }
        // SAFETY: same mapping, now sealed.
        let rc = unsafe { libc::mprotect(raw, capacity, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            // `buffer` unmaps on drop.
            return Err(io::Error::last_os_error());
        }
        tracing::trace!(len, capacity, "mapped executable buffer");
        Ok(buffer)
    }

    #[cfg(not(unix))]
    pub fn new(_code: &MachineCode) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "executable memory is only supported on unix hosts",
        ))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The mapped code and constants.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: `len` bytes were initialized in `new` and are never written again.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Entry point at offset 0.
    ///
    /// Calling it is only sound when the code was compiled for a feature
    /// level the host supports.
    pub fn entry(&self) -> KernelFn {
        // SAFETY: the buffer starts with a function following the kernel ABI.
        unsafe { std::mem::transmute::<*mut u8, KernelFn>(self.ptr.as_ptr()) }
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        #[cfg(unix)]
        // SAFETY: unmapping exactly the region mapped in `new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.capacity);
        }
    }
}

impl std::fmt::Debug for ExecutableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}
