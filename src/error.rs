//! Error taxonomy used where callers need to branch on failure kind (the
//! Execution Service's retry-vs-giveup decision, mainly). Most call sites
//! still propagate with `eyre::Result` and attach context via `eyre::eyre!`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient chain error: {0}")]
    TransientChain(String),

    #[error("permanent chain error: {0}")]
    PermanentChain(String),

    #[error("invalid price data: {0}")]
    InvalidPriceData(String),

    #[error("numeric overflow: {0}")]
    NumericOverflow(String),

    #[error("no swap route found between {token_in} and {token_out}")]
    RouteNotFound {
        token_in: String,
        token_out: String,
    },
}

impl BotError {
    /// Whether the Execution Service should schedule a retry for this error,
    /// as opposed to treating the position as permanently skipped this cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::TransientChain(_))
    }
}

/// Best-effort classification of an opaque `eyre::Report` surfaced from the
/// Engine into the taxonomy above, by inspecting the error chain's rendered
/// text. The Engine itself returns `eyre::Result` for genuine RPC/transport
/// failures (everything else is a typed `LiquidationSkipReason`), so this is
/// the one place that turns that text back into something the Execution
/// Service can branch on.
pub fn classify_chain_error(err: &eyre::Report) -> BotError {
    let message = format!("{err:#}").to_lowercase();

    if message.contains("revert") || message.contains("execution reverted") {
        BotError::PermanentChain(message)
    } else if message.contains("price") || message.contains("oracle") {
        BotError::InvalidPriceData(message)
    } else if message.contains("overflow") {
        BotError::NumericOverflow(message)
    } else if message.contains("timeout")
        || message.contains("connection")
        || message.contains("transport")
        || message.contains("rate limit")
    {
        BotError::TransientChain(message)
    } else {
        // Unrecognized failures default to transient: an unclassified RPC
        // hiccup is more often a flaky provider than a permanently broken
        // position, so the Execution Service still gets a chance to retry.
        BotError::TransientChain(message)
    }
}
