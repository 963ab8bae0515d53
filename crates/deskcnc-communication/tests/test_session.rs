mod common;

use common::{ScriptedDevice, IMAGE_LEN};
use deskcnc_core::{ConnectionError, ConnectionState, ControllerError, Error};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

#[test]
fn test_bring_up_uploads_firmware_in_chunks() {
    let device = ScriptedDevice::new();
    let mut session = device.session();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    session.restart().unwrap();

    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(session.restart_count(), 1);
    device.inspect(|d| {
        assert_eq!(d.opens, 1);
        assert_eq!(d.resets, 1);
        assert_eq!(d.uploads, 1);
        assert_eq!(d.firmware_writes, vec![64, 64, IMAGE_LEN - 128]);
    });
}

#[test]
fn test_open_failures_are_retried() {
    let device = ScriptedDevice::new();
    device.configure(|d| d.open_failures = 2);
    let mut session = device.session();

    session.restart().unwrap();

    device.inspect(|d| {
        assert_eq!(d.open_attempts, 3);
        assert_eq!(d.opens, 1);
    });
    assert_eq!(session.state(), ConnectionState::Ready);
}

#[test]
fn test_reset_resent_until_signature() {
    let device = ScriptedDevice::new();
    device.configure(|d| d.bad_reset_signatures = 2);
    let mut session = device.session();
    session.open().unwrap();

    assert!(!session.reset().unwrap());
    assert!(!session.reset().unwrap());
    assert!(session.reset().unwrap());

    session.close();
    session.restart().unwrap();
    assert_eq!(device.inspect(|d| d.resets), 4);
}

#[test]
fn test_firmware_mismatch_reuploads() {
    let device = ScriptedDevice::new();
    device.configure(|d| d.bad_firmware_echoes = 1);
    let mut session = device.session();

    session.restart().unwrap();

    device.inspect(|d| {
        assert_eq!(d.resets, 1);
        assert_eq!(d.firmware_writes.len(), 6);
        assert_eq!(d.uploads, 1);
    });
}

#[test]
fn test_io_without_port_is_not_connected() {
    let device = ScriptedDevice::new();
    let mut session = device.session();

    let err = session.write_all(&[0x01]).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::NotConnected)
    ));
    assert!(session.read_up_to(1).unwrap_err().is_connection_error());
}

#[test]
fn test_read_returns_partial_data_on_timeout() {
    let device = ScriptedDevice::new();
    let mut session = device.session();
    session.open().unwrap();
    session.write_all(&deskcnc_communication::firmware::deskcnc::frame::RESET_FRAME).unwrap();

    // Six bytes are waiting
    let response = session.read_up_to(32).unwrap();
    assert_eq!(response.len(), 6);
    assert!(session.read_up_to(4).unwrap().is_empty());
}

#[test]
fn test_interrupt_before_bring_up() {
    let device = ScriptedDevice::new();
    let mut session = device.session();
    session.interrupt_handle().store(true, Ordering::SeqCst);

    let err = session.restart().unwrap_err();
    assert!(matches!(err, Error::Controller(ControllerError::Cancelled)));
    assert_eq!(device.inspect(|d| d.open_attempts), 0);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[test]
fn test_stuck_bring_up_is_observable_and_interruptible() {
    let device = ScriptedDevice::new();
    device.configure(|d| d.bad_reset_signatures = u32::MAX);
    let mut session = device.session();

    let state = session.state_handle();
    let interrupt = session.interrupt_handle();
    let watcher = thread::spawn(move || {
        while state.get() != ConnectionState::Resetting {
            thread::sleep(Duration::from_millis(1));
        }
        interrupt.store(true, Ordering::SeqCst);
    });

    let err = session.restart().unwrap_err();
    watcher.join().unwrap();

    assert!(matches!(err, Error::Controller(ControllerError::Cancelled)));
    assert!(device.inspect(|d| d.resets) >= 1);
    assert!(!session.is_open());
}
