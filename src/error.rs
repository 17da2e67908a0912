use std::fmt::Display;

use alloy::{
    contract,
    providers::{MulticallError, PendingTransactionError},
    sol_types, transports,
};

pub type CoreResult<T> = Result<T, CoreError>;

/// Error produced by the state core.
///
/// The RPC-facing variants mirror what the provider can report as a result
/// of a call or transaction; the rest are domain conditions surfaced by
/// the aggregators.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected empty RPC response")]
    NullResp,

    #[error("transaction ran out of gas")]
    OutOfGas,

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction timed out")]
    Timeout,

    #[error("unsupported network: chain id {0}")]
    UnsupportedNetwork(u64),

    #[error("no account connected")]
    NoAccount,

    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// Torn order-book read: a non-first page came back entirely empty
    /// while the side is known non-empty. Recoverable, the whole paging
    /// sequence is retried.
    #[error("inconsistent order book page, side: {0}, from offer: {1}")]
    InconsistentPage(&'static str, u64),

    #[error("order book retries exhausted after {0} attempts")]
    PagingRetriesExhausted(usize),

    /// Registry points at a proxy whose recorded owner is someone else,
    /// treated the same as having no proxy by callers that only log it.
    #[error("proxy {0} not owned by account {1}")]
    ProxyOwnerMismatch(alloy::primitives::Address, alloy::primitives::Address),
}

impl From<contract::Error> for CoreError {
    fn from(value: contract::Error) -> Self {
        match value {
            contract::Error::UnknownFunction(_) => Self::Fatal(value.to_string()),
            contract::Error::UnknownSelector(_) => Self::Fatal(value.to_string()),
            contract::Error::NotADeploymentTransaction => Self::Fatal(value.to_string()),
            contract::Error::ContractNotDeployed => Self::Fatal(value.to_string()),
            contract::Error::ZeroData(_, _) => Self::Fatal(value.to_string()),
            contract::Error::AbiError(_) => Self::Fatal(value.to_string()),
            contract::Error::TransportError(rpc_err) => Self::from(rpc_err),
            contract::Error::PendingTransactionError(err) => err.into(),
        }
    }
}

impl From<PendingTransactionError> for CoreError {
    fn from(value: PendingTransactionError) -> Self {
        match value {
            PendingTransactionError::FailedToRegister => Self::Fatal(value.to_string()),
            PendingTransactionError::TransportError(rpc_err) => Self::from(rpc_err),
            PendingTransactionError::Recv(_) => Self::Transport(value.to_string()),
            PendingTransactionError::TxWatcher(err) => match err {
                alloy::providers::WatchTxError::Timeout => Self::Timeout,
            },
        }
    }
}

impl<E: Display> From<transports::RpcError<E>> for CoreError {
    fn from(value: transports::RpcError<E>) -> Self {
        match value {
            transports::RpcError::ErrorResp(ref resp) => {
                // Heuristic to determine if eth_call failed due to OutOfGas or
                // if transaction was reverted during the gas estimation
                let msg = resp.message.to_ascii_lowercase();
                if (resp.code == -32603) && (msg.contains("gas") || msg.contains("oog")) {
                    Self::OutOfGas
                } else if ((resp.code == -32600 || resp.code == -32601 || resp.code == -32602)
                    && (msg.contains("invalid") || msg.contains("not found")))
                    || (resp.code == -32603
                        && (msg.contains("block by number") || msg.contains("getting block")))
                {
                    Self::InvalidRequest(msg)
                } else if resp.code == 3 && msg.contains("reverted") {
                    Self::Reverted(value.to_string())
                } else {
                    Self::Transport(value.to_string())
                }
            }
            transports::RpcError::NullResp => Self::NullResp,
            _ => Self::Transport(value.to_string()),
        }
    }
}

impl From<sol_types::Error> for CoreError {
    fn from(value: sol_types::Error) -> Self {
        Self::Fatal(value.to_string())
    }
}

impl From<MulticallError> for CoreError {
    fn from(value: MulticallError) -> Self {
        match value {
            MulticallError::ValueTx => Self::InvalidRequest(value.to_string()),
            MulticallError::DecodeError(_) => Self::Fatal(value.to_string()),
            MulticallError::NoReturnData => Self::NullResp,
            MulticallError::CallFailed(bytes) => Self::Reverted(bytes.to_string()),
            MulticallError::TransportError(rpc_err) => Self::from(rpc_err),
        }
    }
}

impl CoreError {
    /// True for the torn order-book read class that the loader retries
    /// automatically; every other error propagates to the caller.
    pub fn is_inconsistent_page(&self) -> bool {
        matches!(self, Self::InconsistentPage(_, _))
    }
}
