/// Failure of a single interaction with the portal.
///
/// [`ApiError::Authentication`] and [`ApiError::ContractResolution`] require the user
/// to fix the configuration; everything else is expected to go away by the next poll.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ApiError {
    #[display("authentication failed: {reason}")]
    Authentication { reason: String },

    #[display("could not resolve the contract: {reason}")]
    ContractResolution { reason: String },

    #[display("`{path}` failed: {source}")]
    Transport { path: String, source: reqwest::Error },

    #[display("malformed response from `{path}`: {source}")]
    MalformedResponse { path: String, source: serde_json::Error },

    #[display("the poll timed out")]
    TimedOut,
}

impl ApiError {
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication { reason: reason.into() }
    }

    pub fn contract_resolution(reason: impl Into<String>) -> Self {
        Self::ContractResolution { reason: reason.into() }
    }

    pub fn transport(path: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport { path: path.into(), source }
    }

    /// Whether the next poll may succeed without the user doing anything.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse { .. } | Self::TimedOut)
    }
}
