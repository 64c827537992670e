//! Named cross-process counting semaphore coupling publishers to subscribers.
//!
//! The semaphore is a wake-up hint only: queue correctness never depends on
//! it, and subscribers make progress by polling even if a release is lost.
//! Names live in the kernel-global namespace (`/<name>` on POSIX,
//! `Global\<name>` on Windows).

#[cfg(unix)]
use std::collections::HashSet;
#[cfg(unix)]
use std::sync::Once;
use std::time::Duration;

#[cfg(unix)]
use lazy_static::lazy_static;
#[cfg(unix)]
use parking_lot::Mutex;
use thiserror::Error;

/// Largest initial count accepted when creating a semaphore. Matches the
/// smallest `SEM_VALUE_MAX` among supported platforms.
pub const MAX_INITIAL_COUNT: u32 = 32_767;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("initial count {0} exceeds {MAX_INITIAL_COUNT}")]
    InitialCountTooLarge(u32),

    #[error("semaphore name is too long for this platform")]
    NameTooLong,

    #[error("permission denied on the semaphore")]
    Unauthorized,

    #[error("a semaphore with that name already exists")]
    AlreadyExists,

    #[error("the wait was interrupted")]
    Interrupted,

    #[error("the semaphore handle is invalid")]
    Invalid,

    #[error("the semaphore count is at its maximum")]
    Overflow,

    #[error("no semaphore with that name exists")]
    NotFound,

    #[error("out of memory while creating the semaphore")]
    OutOfMemory,

    #[error("too many open handles")]
    TooManyOpen,

    #[error("unexpected semaphore failure (os error {0})")]
    Os(i32),
}

#[cfg(unix)]
lazy_static! {
    /// POSIX semaphore names created by this process that still need an
    /// unlink. Kernel-global names outlive the process unless removed.
    static ref UNLINK_ON_EXIT: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

#[cfg(unix)]
static EXIT_HOOK: Once = Once::new();

#[cfg(unix)]
fn register_created(name: &str) {
    UNLINK_ON_EXIT.lock().insert(name.to_owned());
    EXIT_HOOK.call_once(|| {
        // Best effort: the host application may already own the handler.
        let result = ctrlc::set_handler(|| {
            let names: Vec<String> = UNLINK_ON_EXIT.lock().drain().collect();
            for name in names {
                let _ = Signal::unlink(&name);
            }
            std::process::exit(130);
        });
        if let Err(err) = result {
            log::debug!("could not install semaphore cleanup handler: {err}");
        }
    });
}

#[cfg(unix)]
fn unregister_created(name: &str) {
    UNLINK_ON_EXIT.lock().remove(name);
}

#[cfg(unix)]
fn platform_name(name: &str) -> String {
    format!("/{name}")
}

#[cfg(unix)]
fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(unix)]
fn map_errno(code: i32) -> SignalError {
    match code {
        libc::EACCES | libc::EPERM => SignalError::Unauthorized,
        libc::EEXIST => SignalError::AlreadyExists,
        libc::EINTR => SignalError::Interrupted,
        libc::EINVAL => SignalError::Invalid,
        libc::EOVERFLOW => SignalError::Overflow,
        libc::ENOENT => SignalError::NotFound,
        libc::ENOMEM => SignalError::OutOfMemory,
        libc::EMFILE | libc::ENFILE => SignalError::TooManyOpen,
        libc::ENAMETOOLONG => SignalError::NameTooLong,
        other => SignalError::Os(other),
    }
}

/// A named counting semaphore shared across processes.
///
/// `release` increments the count and wakes one waiter; `wait` decrements it,
/// blocking up to an optional timeout. The handle that created the name
/// unlinks it on drop; handles that merely opened it leave the name alone.
#[cfg(unix)]
pub struct Signal {
    sem: *mut libc::sem_t,
    name: String,
    created: bool,
}

#[cfg(unix)]
unsafe impl Send for Signal {}
#[cfg(unix)]
unsafe impl Sync for Signal {}

#[cfg(unix)]
impl Signal {
    /// Opens the named semaphore, creating it with `initial_count` if absent.
    ///
    /// The semaphore is created with mode `0o777` so any local process may
    /// open it.
    pub fn create_or_open(name: &str, initial_count: u32) -> Result<Self, SignalError> {
        if initial_count > MAX_INITIAL_COUNT {
            return Err(SignalError::InitialCountTooLarge(initial_count));
        }
        let path = platform_name(name);

        // macOS rejects names past PSEMNAMLEN (31, including the NUL).
        #[cfg(target_os = "macos")]
        if path.len() + 1 > 31 {
            return Err(SignalError::NameTooLong);
        }

        let c_path = std::ffi::CString::new(path).map_err(|_| SignalError::Invalid)?;

        let mut created = true;
        let mut sem = unsafe {
            libc::sem_open(
                c_path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o777 as libc::c_uint,
                initial_count,
            )
        };
        if sem == libc::SEM_FAILED && errno() == libc::EEXIST {
            created = false;
            sem = unsafe { libc::sem_open(c_path.as_ptr(), 0) };
        }
        if sem == libc::SEM_FAILED {
            return Err(map_errno(errno()));
        }

        if created {
            register_created(name);
            log::debug!("created semaphore '{name}' with count {initial_count}");
        }
        Ok(Self {
            sem,
            name: name.to_owned(),
            created,
        })
    }

    /// Increments the count, waking one blocked waiter.
    pub fn release(&self) -> Result<(), SignalError> {
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(map_errno(errno()))
        }
    }

    /// Waits for the count to become positive and decrements it.
    ///
    /// `None` blocks indefinitely, `Some(Duration::ZERO)` polls, and any
    /// other timeout blocks up to that long. Returns `Ok(false)` on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<bool, SignalError> {
        match timeout {
            None => {
                if unsafe { libc::sem_wait(self.sem) } == 0 {
                    Ok(true)
                } else {
                    Err(map_errno(errno()))
                }
            }
            Some(t) if t.is_zero() => {
                if unsafe { libc::sem_trywait(self.sem) } == 0 {
                    Ok(true)
                } else {
                    match errno() {
                        libc::EAGAIN => Ok(false),
                        code => Err(map_errno(code)),
                    }
                }
            }
            Some(t) => self.wait_timed(t),
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn wait_timed(&self, timeout: Duration) -> Result<bool, SignalError> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return Err(map_errno(errno()));
        }
        let nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
        let deadline = libc::timespec {
            tv_sec: now.tv_sec
                + timeout.as_secs() as libc::time_t
                + (nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: (nanos % 1_000_000_000) as _,
        };
        if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
            Ok(true)
        } else {
            match errno() {
                libc::ETIMEDOUT => Ok(false),
                code => Err(map_errno(code)),
            }
        }
    }

    /// macOS has no `sem_timedwait`; poll `sem_trywait` with a yield.
    #[cfg(target_os = "macos")]
    fn wait_timed(&self, timeout: Duration) -> Result<bool, SignalError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EAGAIN => {}
                code => return Err(map_errno(code)),
            }
            if std::time::Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::yield_now();
        }
    }

    /// Removes the name from the system. Open handles stay usable.
    pub fn unlink(name: &str) -> Result<(), SignalError> {
        let c_path =
            std::ffi::CString::new(platform_name(name)).map_err(|_| SignalError::Invalid)?;
        if unsafe { libc::sem_unlink(c_path.as_ptr()) } == 0 {
            unregister_created(name);
            log::debug!("unlinked semaphore '{name}'");
            Ok(())
        } else {
            Err(map_errno(errno()))
        }
    }
}

#[cfg(unix)]
impl Drop for Signal {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
        if self.created {
            let _ = Self::unlink(&self.name);
        }
    }
}

#[cfg(windows)]
mod windows_imp {
    use super::{SignalError, MAX_INITIAL_COUNT};
    use std::time::Duration;

    use windows_sys::Win32::Foundation::{
        CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS,
        ERROR_FILE_NOT_FOUND, ERROR_INVALID_HANDLE, ERROR_NOT_ENOUGH_MEMORY,
        ERROR_TOO_MANY_OPEN_FILES, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT,
    };
    use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
    use windows_sys::Win32::System::Threading::{
        CreateSemaphoreExW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
        SEMAPHORE_ALL_ACCESS,
    };

    pub(super) fn map_last_error(code: u32) -> SignalError {
        match code {
            ERROR_ACCESS_DENIED => SignalError::Unauthorized,
            ERROR_ALREADY_EXISTS => SignalError::AlreadyExists,
            ERROR_FILE_NOT_FOUND => SignalError::NotFound,
            ERROR_INVALID_HANDLE => SignalError::Invalid,
            ERROR_NOT_ENOUGH_MEMORY => SignalError::OutOfMemory,
            ERROR_TOO_MANY_OPEN_FILES => SignalError::TooManyOpen,
            other => SignalError::Os(other as i32),
        }
    }

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// A named counting semaphore shared across sessions via the `Global\`
    /// namespace. Windows destroys the object with its last handle, so there
    /// is no unlink step.
    pub struct Signal {
        handle: HANDLE,
    }

    unsafe impl Send for Signal {}
    unsafe impl Sync for Signal {}

    impl Signal {
        pub fn create_or_open(name: &str, initial_count: u32) -> Result<Self, SignalError> {
            if initial_count > MAX_INITIAL_COUNT {
                return Err(SignalError::InitialCountTooLarge(initial_count));
            }
            let path = wide(&format!("Global\\{name}"));
            let descriptor = super::world_dacl::descriptor()?;
            let attributes = SECURITY_ATTRIBUTES {
                nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
                lpSecurityDescriptor: descriptor.as_ptr(),
                bInheritHandle: 0,
            };
            let handle = unsafe {
                CreateSemaphoreExW(
                    &attributes,
                    initial_count as i32,
                    i32::MAX,
                    path.as_ptr(),
                    0,
                    SEMAPHORE_ALL_ACCESS,
                )
            };
            if handle.is_null() {
                return Err(map_last_error(unsafe { GetLastError() }));
            }
            // ERROR_ALREADY_EXISTS just means we opened an existing object.
            Ok(Self { handle })
        }

        pub fn release(&self) -> Result<(), SignalError> {
            let ok = unsafe { ReleaseSemaphore(self.handle, 1, std::ptr::null_mut()) };
            if ok != 0 {
                Ok(())
            } else {
                match unsafe { GetLastError() } {
                    // The count would exceed the maximum.
                    0x12A => Err(SignalError::Overflow), // ERROR_TOO_MANY_POSTS
                    code => Err(map_last_error(code)),
                }
            }
        }

        pub fn wait(&self, timeout: Option<Duration>) -> Result<bool, SignalError> {
            let millis = match timeout {
                None => INFINITE,
                Some(t) => t.as_millis().min(u128::from(INFINITE - 1)) as u32,
            };
            match unsafe { WaitForSingleObject(self.handle, millis) } {
                WAIT_OBJECT_0 => Ok(true),
                WAIT_TIMEOUT => Ok(false),
                _ => Err(map_last_error(unsafe { GetLastError() })),
            }
        }

        /// Windows cleans named objects up with the last handle; nothing to do.
        pub fn unlink(_name: &str) -> Result<(), SignalError> {
            Ok(())
        }
    }

    impl Drop for Signal {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(windows)]
pub use windows_imp::Signal;

#[cfg(windows)]
pub(crate) use world_dacl::descriptor as world_descriptor;

/// Builds a security descriptor granting the World SID full control, so any
/// local process may open the named objects.
#[cfg(windows)]
mod world_dacl {
    use super::SignalError;

    use windows_sys::Win32::Foundation::{GetLastError, LocalFree};
    use windows_sys::Win32::Security::Authorization::{
        ConvertStringSecurityDescriptorToSecurityDescriptorW, SDDL_REVISION_1,
    };
    use windows_sys::Win32::Security::PSECURITY_DESCRIPTOR;

    pub(crate) struct Descriptor(PSECURITY_DESCRIPTOR);

    impl Descriptor {
        pub(crate) fn as_ptr(&self) -> PSECURITY_DESCRIPTOR {
            self.0
        }
    }

    impl Drop for Descriptor {
        fn drop(&mut self) {
            unsafe { LocalFree(self.0) };
        }
    }

    pub(crate) fn descriptor() -> Result<Descriptor, SignalError> {
        // D: discretionary ACL, A: allow, GA: generic all, WD: everyone.
        let sddl: Vec<u16> = "D:(A;;GA;;;WD)"
            .encode_utf16()
            .chain(std::iter::once(0))
            .collect();
        let mut descriptor: PSECURITY_DESCRIPTOR = std::ptr::null_mut();
        let ok = unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                sddl.as_ptr(),
                SDDL_REVISION_1,
                &mut descriptor,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(super::windows_imp::map_last_error(unsafe { GetLastError() }));
        }
        Ok(Descriptor(descriptor))
    }
}
