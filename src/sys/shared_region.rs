//! Named, fixed-size shared memory regions.
//!
//! On POSIX the region is a memory-mapped file `<path>/<name>` so unrelated
//! processes can find it by name; on Windows it is a pagefile-backed named
//! mapping under `Global\`. The region is zero-filled on first creation and
//! every participant must request the same capacity.

use std::io;
use std::path::Path;

/// Windows mapping-name namespace for queue regions.
#[cfg(windows)]
const MAPPING_PREFIX: &str = "Global\\CT_IP_";

#[cfg(unix)]
mod unix_imp {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};
    use std::ptr::{self, NonNull};
    use std::time::Duration;

    fn last_error<T>() -> io::Result<T> {
        Err(io::Error::last_os_error())
    }

    /// A named region backed by a memory-mapped file.
    ///
    /// The handle that created the backing file unlinks it on drop; existing
    /// mappings in other processes stay valid until they unmap.
    #[derive(Debug)]
    pub struct SharedRegion {
        ptr: NonNull<u8>,
        bytes_capacity: i64,
        fd: libc::c_int,
        file_path: PathBuf,
        created: bool,
    }

    unsafe impl Send for SharedRegion {}
    unsafe impl Sync for SharedRegion {}

    impl SharedRegion {
        /// Opens the region, creating and zero-filling it if absent.
        ///
        /// An existing backing file must already have exactly
        /// `bytes_capacity` bytes; a mismatch means another participant was
        /// configured differently and is rejected.
        pub fn create_or_open(name: &str, path: &Path, bytes_capacity: i64) -> io::Result<Self> {
            let file_path = path.join(name);
            let c_path = CString::new(file_path.as_os_str().as_bytes())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;

            let mut created = true;
            let mut fd = unsafe {
                libc::open(
                    c_path.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_RDWR | libc::O_CLOEXEC,
                    0o777 as libc::c_uint,
                )
            };
            if fd < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EEXIST) {
                    return Err(err);
                }
                created = false;
                fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
                if fd < 0 {
                    return last_error();
                }
            }

            if created {
                // The process umask may have stripped bits from the create
                // mode; all intended participants must be able to open it.
                unsafe { libc::fchmod(fd, 0o777) };
                if unsafe { libc::ftruncate(fd, bytes_capacity) } != 0 {
                    let err = io::Error::last_os_error();
                    unsafe {
                        libc::close(fd);
                        libc::unlink(c_path.as_ptr());
                    }
                    return Err(err);
                }
                log::debug!(
                    "created shared region '{}' ({bytes_capacity} bytes)",
                    file_path.display()
                );
            } else if let Err(err) = verify_size(fd, bytes_capacity) {
                unsafe { libc::close(fd) };
                return Err(err);
            }

            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    bytes_capacity as usize,
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

            Ok(Self {
                ptr: NonNull::new(ptr as *mut u8).expect("mmap returned NULL"),
                bytes_capacity,
                fd,
                file_path,
                created,
            })
        }

        #[inline]
        pub fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        #[inline]
        pub fn bytes_capacity(&self) -> i64 {
            self.bytes_capacity
        }
    }

    /// Waits briefly for a concurrent creator to size the file, then checks
    /// that the capacity matches.
    fn verify_size(fd: libc::c_int, bytes_capacity: i64) -> io::Result<()> {
        for _ in 0..100 {
            let mut stat = unsafe { std::mem::zeroed::<libc::stat>() };
            if unsafe { libc::fstat(fd, &mut stat) } != 0 {
                return last_error();
            }
            if stat.st_size as i64 == bytes_capacity {
                return Ok(());
            }
            if stat.st_size != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "shared region is {} bytes, expected {bytes_capacity}",
                        stat.st_size
                    ),
                ));
            }
            // The creator holds O_EXCL but may not have called ftruncate yet.
            std::thread::sleep(Duration::from_millis(1));
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "shared region was never sized by its creator",
        ))
    }

    impl Drop for SharedRegion {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.bytes_capacity as usize);
                libc::close(self.fd);
            }
            if self.created {
                if let Ok(c_path) = CString::new(self.file_path.as_os_str().as_bytes()) {
                    unsafe { libc::unlink(c_path.as_ptr()) };
                }
                log::debug!("unlinked shared region '{}'", self.file_path.display());
            }
        }
    }
}

#[cfg(unix)]
pub use unix_imp::SharedRegion;

#[cfg(windows)]
mod windows_imp {
    use std::io;
    use std::path::Path;
    use std::ptr::NonNull;

    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
    use windows_sys::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
        MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
    };

    /// A named pagefile-backed mapping. Windows destroys it with the last
    /// handle, so there is no unlink step and `path` is ignored.
    #[derive(Debug)]
    pub struct SharedRegion {
        ptr: NonNull<u8>,
        bytes_capacity: i64,
        mapping: HANDLE,
    }

    unsafe impl Send for SharedRegion {}
    unsafe impl Sync for SharedRegion {}

    impl SharedRegion {
        pub fn create_or_open(name: &str, _path: &Path, bytes_capacity: i64) -> io::Result<Self> {
            let wide: Vec<u16> = format!("{}{}", super::MAPPING_PREFIX, name)
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();
            let descriptor = crate::sys::signal::world_descriptor()
                .map_err(|err| io::Error::new(io::ErrorKind::PermissionDenied, err.to_string()))?;
            let attributes = SECURITY_ATTRIBUTES {
                nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
                lpSecurityDescriptor: descriptor.as_ptr(),
                bInheritHandle: 0,
            };
            let mapping = unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    &attributes,
                    PAGE_READWRITE,
                    (bytes_capacity as u64 >> 32) as u32,
                    bytes_capacity as u32,
                    wide.as_ptr(),
                )
            };
            if mapping.is_null() {
                return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
            }

            let view: MEMORY_MAPPED_VIEW_ADDRESS = unsafe {
                MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, bytes_capacity as usize)
            };
            let Some(ptr) = NonNull::new(view.Value as *mut u8) else {
                let err = io::Error::from_raw_os_error(unsafe { GetLastError() } as i32);
                unsafe { CloseHandle(mapping) };
                return Err(err);
            };

            Ok(Self {
                ptr,
                bytes_capacity,
                mapping,
            })
        }

        #[inline]
        pub fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        #[inline]
        pub fn bytes_capacity(&self) -> i64 {
            self.bytes_capacity
        }
    }

    impl Drop for SharedRegion {
        fn drop(&mut self) {
            unsafe {
                UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                    Value: self.ptr.as_ptr() as _,
                });
                CloseHandle(self.mapping);
            }
        }
    }
}

#[cfg(windows)]
pub use windows_imp::SharedRegion;

/// Removes a region's backing file without opening it. POSIX only; Windows
/// mappings disappear with their last handle.
#[cfg(unix)]
pub fn unlink(name: &str, path: &Path) -> io::Result<()> {
    std::fs::remove_file(path.join(name))
}

#[cfg(windows)]
pub fn unlink(_name: &str, _path: &Path) -> io::Result<()> {
    Ok(())
}
