use thiserror::Error;

/// Events the form session refuses in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form is not on the configure step")]
    NotConfiguring,
    #[error("form is not on the review step")]
    NotReviewing,
    #[error("a submission is already in flight")]
    Busy,
    #[error("the application has already been submitted")]
    AlreadySubmitted,
    #[error("amount must be a finite, non-negative number")]
    InvalidAmount,
    #[error("term is fixed by the selected collateral")]
    TermFixed,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to encode analytics payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("analytics transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analytics collector answered with status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum FlagStoreError {
    #[error("flag file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("flag file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
