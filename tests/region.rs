// SharedRegion behavior: cross-handle visibility, size checking, cleanup.

use shmq::names::random_name;
use shmq::sys::shared_region::{self, SharedRegion};

fn temp() -> std::path::PathBuf {
    std::env::temp_dir()
}

#[test]
fn two_handles_see_the_same_bytes() {
    let name = random_name(16);
    let creator = SharedRegion::create_or_open(&name, &temp(), 4096).unwrap();
    let opener = SharedRegion::create_or_open(&name, &temp(), 4096).unwrap();

    unsafe {
        creator.as_ptr().add(100).write(0x5A);
    }
    let observed = unsafe { opener.as_ptr().add(100).read() };
    assert_eq!(observed, 0x5A);
}

#[test]
fn fresh_regions_are_zero_filled() {
    let name = random_name(16);
    let region = SharedRegion::create_or_open(&name, &temp(), 1024).unwrap();

    let bytes = unsafe { std::slice::from_raw_parts(region.as_ptr(), 1024) };
    assert!(bytes.iter().all(|&b| b == 0));
    assert_eq!(region.bytes_capacity(), 1024);
}

#[cfg(unix)]
#[test]
fn capacity_mismatch_is_rejected() {
    let name = random_name(16);
    let _creator = SharedRegion::create_or_open(&name, &temp(), 4096).unwrap();

    let err = SharedRegion::create_or_open(&name, &temp(), 8192).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[cfg(unix)]
#[test]
fn creator_unlinks_its_backing_file_on_drop() {
    let name = random_name(16);
    let file = temp().join(&name);

    let region = SharedRegion::create_or_open(&name, &temp(), 512).unwrap();
    assert!(file.exists());
    drop(region);
    assert!(!file.exists());
}

#[cfg(unix)]
#[test]
fn explicit_unlink_removes_the_backing_file() {
    let name = random_name(16);
    let file = temp().join(&name);

    // An opener does not unlink on drop, so the file would normally outlive
    // it; the explicit unlink is for exactly that case.
    let creator = SharedRegion::create_or_open(&name, &temp(), 512).unwrap();
    let opener = SharedRegion::create_or_open(&name, &temp(), 512).unwrap();
    drop(opener);
    assert!(file.exists());

    shared_region::unlink(&name, &temp()).unwrap();
    assert!(!file.exists());

    // The creator's drop tolerates the missing file.
    drop(creator);
}
