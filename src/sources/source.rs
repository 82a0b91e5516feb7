/// Resolved media, ready to be sent by url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    url: String,
    kind: MediaKind,
    size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// JPEG, PNG, etc. NOT GIF
    Photo,
    /// MP4 only
    Video,
    /// GIF or a soundless clip, sent as a document
    Animation,
    /// Link to a video host. Nothing is fetched, the link goes in the text
    ExternalVideo,
}

/// A reddit post with its media resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// `r/` prefixed subreddit the post was published (or crossposted) in
    pub subreddit: String,
    pub permalink: String,
    /// Escaped title
    pub title: String,
    /// Escaped text. May be empty
    pub text: String,
    pub media: Option<MediaAsset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    Text,
    Photo,
    Video,
    Animation,
    ExternalVideo,
}

impl MediaAsset {
    pub(crate) fn new(url: impl Into<String>, kind: MediaKind, size: Option<u64>) -> Self {
        Self {
            url: url.into(),
            kind,
            size,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Bytes that will be transferred, when known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

impl PostKind {
    /// Rendered as a plain text message, with no attachment.
    pub fn is_text_like(self) -> bool {
        matches!(self, Self::Text | Self::ExternalVideo)
    }
}

impl Post {
    pub fn kind(&self) -> PostKind {
        match self.media.as_ref().map(MediaAsset::kind) {
            None => PostKind::Text,
            Some(MediaKind::Photo) => PostKind::Photo,
            Some(MediaKind::Video) => PostKind::Video,
            Some(MediaKind::Animation) => PostKind::Animation,
            Some(MediaKind::ExternalVideo) => PostKind::ExternalVideo,
        }
    }

    pub fn subreddit_url(&self) -> String {
        format!("https://www.reddit.com/{}", self.subreddit)
    }

    pub fn post_url(&self) -> String {
        format!("https://reddit.com{}", self.permalink)
    }

    /// Markdown message body (or caption). Footer links back to the post and
    /// the subreddit, which is also where refreshes read the subreddit from.
    pub fn message(&self) -> String {
        format!(
            " *{}*\n{}\n\n[Link to post]({}) | [{}]({})",
            self.title,
            self.text,
            self.post_url(),
            self.subreddit,
            self.subreddit_url()
        )
    }
}
