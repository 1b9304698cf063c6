use thiserror::Error;

/// Error kinds surfaced by the data access layer.
///
/// `UnknownMetric` is soft: batch callers skip the metric instead of
/// aborting. `Persistence` never escapes the `get_or_fetch_*` operations;
/// those log it and fall back to the data already fetched from upstream.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data found for {ticker}: {context}")]
    NoData { ticker: String, context: String },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
