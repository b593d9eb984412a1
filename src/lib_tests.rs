// Tests for lib.rs: interrupt flag and error formatting

use super::*;
use serial_test::serial;

// ==================== INTERRUPT HANDLING TESTS ====================

#[test]
#[serial]
fn test_interrupt_initially_not_set() {
    reset_interrupted();
    assert!(
        !is_interrupted(),
        "Interrupt flag should initially be not set"
    );
}

#[test]
#[serial]
fn test_set_interrupt_flag() {
    reset_interrupted();
    set_interrupted();
    assert!(is_interrupted(), "Interrupt flag should be set");
    reset_interrupted();
}

#[test]
#[serial]
fn test_reset_clears_flag() {
    set_interrupted();
    reset_interrupted();
    assert!(!is_interrupted());
}

// ==================== SCAN ERROR TESTS ====================

#[test]
fn test_scan_error_from_io() {
    let err: ScanError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, ScanError::Io(_)));
    assert!(err.to_string().contains("I/O error"));
}

#[test]
fn test_read_failed_carries_block_and_source() {
    let err = ScanError::ReadFailed {
        block: 42,
        source: std::io::Error::from_raw_os_error(libc::EBADF),
    };
    let msg = err.to_string();
    assert!(msg.contains("block 42"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_wrong_offset_message() {
    let err = ScanError::WrongOffset {
        expected: 4096,
        actual: 0,
    };
    assert!(err.to_string().contains("expected 4096"));
}

#[test]
fn test_range_file_error_names_location() {
    let err = ScanError::RangeFile {
        path: PathBuf::from("/tmp/ranges.txt"),
        line: 3,
        reason: "range end not after start".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "/tmp/ranges.txt:3: range end not after start"
    );
}

#[test]
fn test_device_too_small_message() {
    let err = ScanError::DeviceTooSmall {
        bytes: 1000,
        block_bytes: 131072,
    };
    assert!(err.to_string().contains("1000 bytes"));
    assert!(err.to_string().contains("131072"));
}
