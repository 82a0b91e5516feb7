use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Message shown in the chat for every failure that is not user-facing.
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again.";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to request post from {url}: {reason}")]
    PostRequest { url: String, reason: String },

    #[error("This subreddit is private.")]
    SubredditPrivate { target: String },

    #[error("This subreddit doesn't exist.")]
    SubredditNotFound { target: String },

    #[error("The retrieval of the post {url} failed: {reason}")]
    PostRetrieval { url: String, reason: String },

    #[error("{service} returned {status} for {processed_url} (media url {url})")]
    MediaRetrieval {
        service: &'static str,
        url: String,
        processed_url: String,
        status: u16,
    },

    #[error("Authentication on {service} failed: {response}")]
    Authentication {
        service: &'static str,
        response: String,
    },

    #[error("Media is too big to be sent.")]
    MediaTooBig { url: String, size: u64 },

    #[error("There has been an error in sending the post {permalink}: {reason}")]
    PostSend { permalink: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML deserialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Url parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Telegram error: {0}")]
    Telegram(#[from] crate::telegram::TelegramError),

    #[error("Lock error: {0}")]
    Lock(String),
}

/// Closed classification of [`Error`], used by the retry loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Request,
    SubredditPrivate,
    SubredditNotFound,
    PostRetrieval,
    MediaRetrieval,
    Authentication,
    MediaTooBig,
    DeliverySend,
    Internal,
}

impl ErrorKind {
    /// Retrying the same request cannot change the outcome.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SubredditPrivate
                | Self::SubredditNotFound
                | Self::Authentication
                | Self::MediaTooBig
        )
    }

    /// The error is caused by the user's request, not by a defect or outage.
    pub fn is_user_facing(self) -> bool {
        matches!(
            self,
            Self::SubredditPrivate | Self::SubredditNotFound | Self::MediaTooBig
        )
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PostRequest { .. } => ErrorKind::Request,
            Self::SubredditPrivate { .. } => ErrorKind::SubredditPrivate,
            Self::SubredditNotFound { .. } => ErrorKind::SubredditNotFound,
            Self::PostRetrieval { .. } => ErrorKind::PostRetrieval,
            Self::MediaRetrieval { .. } => ErrorKind::MediaRetrieval,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::MediaTooBig { .. } => ErrorKind::MediaTooBig,
            Self::PostSend { .. } => ErrorKind::DeliverySend,
            Self::Io(_)
            | Self::Network(_)
            | Self::Json(_)
            | Self::Yaml(_)
            | Self::UrlParse(_)
            | Self::Telegram(_)
            | Self::Lock(_) => ErrorKind::Internal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Errors already carrying their request context. Everything else gets
    /// wrapped before leaving the assembler.
    pub fn is_domain(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Text to show in the chat.
    pub fn user_message(&self) -> String {
        if self.kind().is_user_facing() {
            self.to_string()
        } else {
            GENERIC_FAILURE.to_owned()
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
