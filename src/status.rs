//! RPC status codes carried in the `grpc-status` response header.

use http::HeaderMap;

/// RPC status codes (<https://grpc.github.io/grpc/core/md_doc_statuscodes.html>).
///
/// `Ok` (0) is success; every other code is an application- or
/// framework-level failure. The HTTP `:status` stays 200 regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Status {
    /// Parse a status code from an integer value.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// The integer value carried on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Extract the status from a response header map.
    ///
    /// A missing or unparseable `grpc-status` header maps to `Unknown`: a
    /// conforming server always sets the header, so its absence indicates a
    /// broken peer rather than success.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(crate::message::GRPC_STATUS)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u8>().ok())
            .map(Self::from_u8)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            Self::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            Self::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            Self::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::OutOfRange => write!(f, "OUT_OF_RANGE"),
            Self::Unimplemented => write!(f, "UNIMPLEMENTED"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::DataLoss => write!(f, "DATA_LOSS"),
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for code in 0..=16u8 {
            let status = Status::from_u8(code);
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn unknown_status_code() {
        assert_eq!(Status::from_u8(99), Status::Unknown);
        assert_eq!(Status::from_u8(255), Status::Unknown);
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::Ok.to_string(), "OK");
        assert_eq!(Status::Unimplemented.to_string(), "UNIMPLEMENTED");
        assert_eq!(Status::Unauthenticated.to_string(), "UNAUTHENTICATED");
    }

    #[test]
    fn status_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(crate::message::GRPC_STATUS, "0".parse().unwrap());
        assert_eq!(Status::from_headers(&headers), Status::Ok);

        headers.insert(crate::message::GRPC_STATUS, "12".parse().unwrap());
        assert_eq!(Status::from_headers(&headers), Status::Unimplemented);
    }

    #[test]
    fn status_missing_header_is_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(Status::from_headers(&headers), Status::Unknown);
    }

    #[test]
    fn status_garbage_header_is_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert(crate::message::GRPC_STATUS, "banana".parse().unwrap());
        assert_eq!(Status::from_headers(&headers), Status::Unknown);
    }
}
