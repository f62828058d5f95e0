//! Error types for v3lp.

use std::{io, time::Duration};

use alloy::{
    primitives::{Address, TxHash},
    providers::PendingTransactionError,
    transports::{RpcError, TransportError, TransportErrorKind},
};
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while managing a position.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed settings (private key, RPC URL, ...).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown chain id {0}")]
    UnknownChain(String),

    /// The request was rejected before any calldata was built.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no pool deployed at {0}")]
    PoolNotFound(Address),

    /// Transport level failure talking to the provider.
    #[error("rpc error: {0}")]
    Rpc(#[from] TransportError),

    /// A contract call failed or its return data could not be decoded.
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    /// The node refused to accept a transaction, usually because it would
    /// revert during gas estimation.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Failures of the fixed point tick and liquidity math.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    #[error("tick {0} outside of [MIN_TICK, MAX_TICK]")]
    TickOutOfBounds(i32),

    #[error("tick spacing must be positive")]
    InvalidTickSpacing,

    #[error("result does not fit in the target type")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,
}

impl From<PendingTransactionError> for Error {
    fn from(value: PendingTransactionError) -> Self {
        match value {
            PendingTransactionError::TransportError(err) => Error::Rpc(err),
            other => Error::Rpc(RpcError::local_usage_str(&other.to_string())),
        }
    }
}

impl Error {
    /// Classifies a failure to hand a transaction to the node.
    pub(crate) fn from_submission(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Error::Rejected(payload.message.to_string()),
            other => Error::Rpc(other),
        }
    }

    /// Whether a read that failed with this error may be attempted again.
    ///
    /// Only transport hiccups qualify. A JSON-RPC error response means the
    /// node understood and refused the request, so asking again won't help.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Rpc(err) => is_transient(err),
            Error::Contract(alloy::contract::Error::TransportError(err)) => is_transient(err),
            Error::Timeout(_) => true,
            _ => false,
        }
    }

    /// Process exit status used by the command line for this class of error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) | Error::UnknownChain(_) => 78,
            Error::Validation(_) | Error::Math(_) => 65,
            Error::Rpc(_) | Error::Timeout(_) | Error::PoolNotFound(_) => 69,
            Error::Contract(alloy::contract::Error::TransportError(_)) => 69,
            Error::Reverted(_) | Error::Rejected(_) => 70,
            Error::Contract(_) => 1,
        }
    }
}

fn is_transient(err: &TransportError) -> bool {
    match err {
        RpcError::Transport(TransportErrorKind::Custom(err)) => is_connection_error(&**err),
        RpcError::Transport(kind) => kind.recoverable() || kind.is_retry_err(),
        RpcError::ErrorResp(payload) => payload.code == 429,
        _ => false,
    }
}

/// Whether an HTTP client error was caused by the connection dropping or
/// never being established.
fn is_connection_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(err) = source {
        let dropped = err.downcast_ref::<io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            )
        });
        if dropped {
            return true;
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let config = Error::Config("missing PROVIDER_RPC".into());
        let chain = Error::UnknownChain("1".into());
        let validation = Error::Validation("fee tier 42".into());
        let revert = Error::Reverted(TxHash::ZERO);
        let timeout = Error::Timeout(Duration::from_secs(1));

        assert_eq!(config.exit_code(), chain.exit_code());
        assert_ne!(config.exit_code(), validation.exit_code());
        assert_ne!(validation.exit_code(), revert.exit_code());
        assert_ne!(revert.exit_code(), timeout.exit_code());
        assert_ne!(timeout.exit_code(), 0);
    }

    #[test]
    fn test_transport_failures_exit_as_rpc() {
        let gone = || RpcError::Transport(TransportErrorKind::BackendGone);
        assert_eq!(Error::Rpc(gone()).exit_code(), 69);
        assert_eq!(
            Error::Contract(alloy::contract::Error::TransportError(gone())).exit_code(),
            69
        );
        assert_eq!(
            Error::Contract(alloy::contract::Error::UnknownFunction("foo".into())).exit_code(),
            1
        );
    }

    #[test]
    fn test_connection_errors_are_retryable() {
        for kind in [io::ErrorKind::ConnectionRefused, io::ErrorKind::ConnectionReset] {
            let err = TransportErrorKind::custom(io::Error::from(kind));
            assert!(Error::Rpc(err).is_retryable(), "{kind:?}");
        }
        let err = TransportErrorKind::custom(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(Error::Contract(alloy::contract::Error::TransportError(err)).is_retryable());

        assert!(!Error::Rpc(TransportErrorKind::custom_str("bad response")).is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::Reverted(TxHash::ZERO).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::Rpc(RpcError::local_usage_str("no signer")).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::from(MathError::TickOutOfBounds(900_000));
        assert_eq!(
            err.to_string(),
            "math error: tick 900000 outside of [MIN_TICK, MAX_TICK]"
        );
    }
}
