// Shared memory backend abstraction for POSIX hosts
// Uses shm_open + mmap for anonymous objects, open + mmap for file-backed stores

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::{IntoRawFd, RawFd};
use std::ptr::NonNull;

use libc::c_void;

/// Shared memory backend trait over a mapped, shared, read-write region
pub trait SharedMemoryBackend: Send + Sync + std::fmt::Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying file descriptor
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Unix file descriptor
    Fd(RawFd),
}

/// Create a new POSIX shared-memory object of exactly `size` bytes.
///
/// The name follows `shm_open` semantics ("/name"). Fails with
/// `AlreadyExists` if an object of that name is already present; the caller
/// decides whether to fall back to attaching.
pub fn create_shm_object(name: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(MappedRegion::create_shm(name, size)?))
}

/// Attach to an existing POSIX shared-memory object, mapping its full extent.
pub fn attach_shm_object(name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(MappedRegion::open_shm(name)?))
}

/// Create a new file-backed region at `path` of exactly `size` bytes.
///
/// Fails with `AlreadyExists` if the file is already present.
pub fn create_file_region(path: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(MappedRegion::create_file(path, size)?))
}

/// Attach to an existing file-backed region, mapping its full extent.
pub fn attach_file_region(path: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(MappedRegion::open_file(path)?))
}

/// Remove a shared-memory object name.
///
/// Established mappings stay valid; the object is reclaimed once the last
/// process unmaps it.
pub fn unlink_shm_object(name: &str) -> io::Result<()> {
    let c_name = cstr_name(name)?;
    let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn cstr_name(name: &str) -> io::Result<CString> {
    CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "embedded NUL in object name"))
}

#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    fd: RawFd,
}

unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Create a new shared-memory object; O_EXCL makes creation race-free
    /// across processes.
    pub fn create_shm(name: &str, size: usize) -> io::Result<Self> {
        let c_name = cstr_name(name)?;
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Self::truncate_and_map(fd, size)
    }

    /// Attach to an existing shared-memory object.
    pub fn open_shm(name: &str) -> io::Result<Self> {
        let c_name = cstr_name(name)?;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Self::map_existing(fd)
    }

    /// Create a new backing file; `create_new` supplies the O_EXCL semantics.
    pub fn create_file(path: &str, size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Self::truncate_and_map(file.into_raw_fd(), size)
    }

    /// Open an existing backing file read-write.
    pub fn open_file(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::map_existing(file.into_raw_fd())
    }

    fn truncate_and_map(fd: RawFd, size: usize) -> io::Result<Self> {
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Self::map(fd, size)
    }

    fn map_existing(fd: RawFd) -> io::Result<Self> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let size = st.st_size as usize;
        if size == 0 {
            unsafe { libc::close(fd) };
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "zero-length backing object",
            ));
        }
        Self::map(fd, size)
    }

    fn map(fd: RawFd, size: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok(Self { ptr, size, fd }),
            None => {
                unsafe { libc::close(fd) };
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "mmap returned a null mapping",
                ))
            }
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut c_void, self.size);
            libc::close(self.fd);
        }
    }
}

impl SharedMemoryBackend for MappedRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}
