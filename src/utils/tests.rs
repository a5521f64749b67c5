use super::Error;
use super::logging;
use std::io;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("bogus");
}

#[test]
fn test_timeout_is_marked() {
    assert!(Error::Timeout { op: "read" }.is_timeout());
    assert!(!Error::Closed.is_timeout());
    assert!(!Error::Transport("boom".into()).is_timeout());
}

#[test]
fn test_io_error_kinds() {
    let err: io::Error = Error::Timeout { op: "publish" }.into();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert_eq!(err.to_string(), "publish timed out");

    let err: io::Error = Error::Closed.into();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);

    let err: io::Error = Error::AddressType {
        network: "udp".into(),
    }
    .into();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_url_error_converts() {
    let err: Error = url::Url::parse("not a url").unwrap_err().into();
    assert!(matches!(err, Error::InvalidUri(_)));
}
