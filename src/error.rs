use thiserror::Error;

/// Failure talking to the remote file store. Any of these aborts the current cycle.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store returned status {status} while {op} `{path}`")]
    Unavailable {
        op: &'static str,
        path: String,
        status: u16,
    },
    #[error("remote store request failed while {op} `{path}`")]
    Transport {
        op: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("remote store i/o failed while {op} `{path}`")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed remote response for `{path}`: {reason}")]
    Malformed { path: String, reason: String },
    #[error("invalid remote store location `{0}`")]
    InvalidLocation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001Locked,
    E002RemoteUnavailable,
    E003InvalidMetadata,
    E004MissingRawImage,
    E005BackingFileBusy,
    E006ThumbnailDecode,
    E007StoreCorrupt,
    E008ConfigInvalid,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002RemoteUnavailable => "E002_REMOTE_UNAVAILABLE",
            Self::E003InvalidMetadata => "E003_INVALID_METADATA",
            Self::E004MissingRawImage => "E004_MISSING_RAW_IMAGE",
            Self::E005BackingFileBusy => "E005_BACKING_FILE_BUSY",
            Self::E006ThumbnailDecode => "E006_THUMBNAIL_DECODE",
            Self::E007StoreCorrupt => "E007_STORE_CORRUPT",
            Self::E008ConfigInvalid => "E008_CONFIG_INVALID",
        }
    }

    /// Best-effort classification of an error that aborted a cycle.
    pub fn classify(err: &anyhow::Error) -> Option<Self> {
        for cause in err.chain() {
            if cause.is::<RemoteError>() {
                return Some(Self::E002RemoteUnavailable);
            }
            if cause.is::<crate::noaa::thumbnail::ThumbnailError>() {
                return Some(Self::E006ThumbnailDecode);
            }
            if cause.is::<serde_json::Error>() {
                return Some(Self::E007StoreCorrupt);
            }
        }
        None
    }
}
