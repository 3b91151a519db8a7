use thiserror::Error;

/// Any failure to get a page body: transport, timeout or non-2xx status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Client(_) => false,
            FetchError::Request { source, .. } => source.is_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not a journal array: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("a harvest is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
