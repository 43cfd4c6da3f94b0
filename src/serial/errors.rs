use crate::Error;
use serde::Serialize;
use std::fmt;
use std::io::{self, ErrorKind};

/// Why an exchange with the controller failed at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialFailureKind {
    PermissionDenied,
    DeviceMissing,
    Disconnected,
    Timeout,
    /// The controller answered with bytes that are not display text.
    Framing,
    /// Another process holds the UART.
    Busy,
    Unknown,
}

impl SerialFailureKind {
    /// Operator-facing hint shown next to the failure.
    pub fn hint(&self) -> &'static str {
        match self {
            SerialFailureKind::PermissionDenied => "add the user to the dialout group",
            SerialFailureKind::DeviceMissing => "check the device path and that the VMC adapter is plugged in",
            SerialFailureKind::Disconnected => "check the VMC serial cable",
            SerialFailureKind::Timeout => "VMC did not answer in time",
            SerialFailureKind::Framing => "check baud rate and wiring to the VMC",
            SerialFailureKind::Busy => "another program has the UART open",
            SerialFailureKind::Unknown => "check the connection",
        }
    }
}

impl fmt::Display for SerialFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SerialFailureKind::PermissionDenied => "permission_denied",
            SerialFailureKind::DeviceMissing => "device_missing",
            SerialFailureKind::Disconnected => "disconnected",
            SerialFailureKind::Timeout => "timeout",
            SerialFailureKind::Framing => "framing",
            SerialFailureKind::Busy => "busy",
            SerialFailureKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Only I/O errors come off the wire; anything else is not a link failure.
pub fn classify_error(err: &Error) -> SerialFailureKind {
    match err {
        Error::Io(io_err) => classify_io_error(io_err),
        _ => SerialFailureKind::Unknown,
    }
}

pub fn classify_io_error(err: &io::Error) -> SerialFailureKind {
    match (err.kind(), err.raw_os_error()) {
        (ErrorKind::PermissionDenied, _) | (_, Some(13)) => SerialFailureKind::PermissionDenied,
        // ENXIO / ENODEV: USB adapter pulled
        (ErrorKind::NotFound, _) | (_, Some(6 | 19)) => SerialFailureKind::DeviceMissing,
        (ErrorKind::TimedOut | ErrorKind::WouldBlock, _) | (_, Some(110)) => {
            SerialFailureKind::Timeout
        }
        (ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted, _)
        | (_, Some(5)) => SerialFailureKind::Disconnected,
        (ErrorKind::InvalidData, _) => SerialFailureKind::Framing,
        (_, Some(16)) => SerialFailureKind::Busy,
        _ => SerialFailureKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unplugged_adapter_is_disconnected() {
        let broken = io::Error::new(ErrorKind::BrokenPipe, "broken");
        assert_eq!(classify_io_error(&broken), SerialFailureKind::Disconnected);
        let eio = io::Error::from_raw_os_error(5);
        assert_eq!(classify_io_error(&eio), SerialFailureKind::Disconnected);
    }

    #[test]
    fn missing_and_locked_ports() {
        let missing = Error::Io(io::Error::new(ErrorKind::NotFound, "gone"));
        assert_eq!(classify_error(&missing), SerialFailureKind::DeviceMissing);
        let busy = io::Error::from_raw_os_error(16);
        assert_eq!(classify_io_error(&busy), SerialFailureKind::Busy);
        assert_eq!(
            classify_io_error(&io::Error::from_raw_os_error(13)),
            SerialFailureKind::PermissionDenied
        );
    }

    #[test]
    fn non_io_errors_are_not_link_failures() {
        let err = Error::InvalidArgs("bad".into());
        assert_eq!(classify_error(&err), SerialFailureKind::Unknown);
    }

    #[test]
    fn display_matches_json_name() {
        let json = serde_json::to_string(&SerialFailureKind::DeviceMissing).unwrap();
        assert_eq!(json, format!("\"{}\"", SerialFailureKind::DeviceMissing));
        assert!(SerialFailureKind::Disconnected.hint().contains("VMC"));
    }
}
