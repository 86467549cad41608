#![forbid(unsafe_code)]

//! Failures of the fetch, decode and exchange-rate layers.

use std::fmt;

/// A request that produced no usable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Nothing is served at `url`.
    Unreachable { url: String },
    /// The server answered with a non-success status.
    Status { url: String, code: u16 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { url } => write!(f, "{url} is unreachable"),
            Self::Status { url, code } => write!(f, "{url} answered with status {code}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// A body that could not be turned into the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The body is not valid JSON for the target type.
    Json(String),
    /// The rates table has no entry for `code`.
    MissingRate { code: &'static str },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(detail) => write!(f, "malformed response: {detail}"),
            Self::MissingRate { code } => write!(f, "no exchange rate for {code}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Failure of a [`CurrencyService`](crate::currency::CurrencyService) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    Fetch(FetchError),
    Decode(DecodeError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "exchange rate request failed: {err}"),
            Self::Decode(err) => write!(f, "exchange rate response unusable: {err}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Decode(err) => Some(err),
        }
    }
}

impl From<FetchError> for ServiceError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl From<DecodeError> for ServiceError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn display_messages() {
        let err = FetchError::Status {
            url: "mock://rates".into(),
            code: 503,
        };
        assert_eq!(err.to_string(), "mock://rates answered with status 503");
        assert_eq!(
            DecodeError::MissingRate { code: "JPY" }.to_string(),
            "no exchange rate for JPY"
        );
    }

    #[test]
    fn service_error_exposes_source() {
        let err = ServiceError::from(DecodeError::Json("eof".into()));
        assert!(err.to_string().contains("unusable"));
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("malformed response: eof".to_string())
        );
    }

    #[test]
    fn json_errors_convert() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::Json(_)));
    }
}
