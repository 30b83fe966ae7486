use std::fmt;
use std::io;

/// Unified error type for output message and autosend operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from network operations
    Io(io::Error),

    /// Fresh allocation failed while the free list was empty
    AllocationFailed { requested: usize },

    /// A write would overflow the fixed message capacity
    MessageFull { requested: usize, available: usize },

    /// Connection closed by peer or by the server
    ConnectionClosed,

    /// The autosend dispatch task is no longer running
    DispatcherClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::AllocationFailed { requested } => {
                write!(f, "Allocation failed: {} bytes", requested)
            }
            Error::MessageFull {
                requested,
                available,
            } => write!(
                f,
                "Message full: {} bytes requested, {} available",
                requested, available
            ),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::DispatcherClosed => write!(f, "Autosend dispatcher closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::Io(e)
        }
    }
}

/// Result type alias for outmsg operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_maps_to_closed() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::ConnectionClosed));

        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_display() {
        let err = Error::MessageFull {
            requested: 10,
            available: 4,
        };
        assert_eq!(
            err.to_string(),
            "Message full: 10 bytes requested, 4 available"
        );
    }
}
