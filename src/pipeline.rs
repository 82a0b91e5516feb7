use reqwest::Client;
use tracing::{debug, error};

use crate::{
    config::{Config, Limits},
    error::{Error, Result},
    services::Services,
    sources::{
        reddit::{PostData, RawPost, RedditClient, Target},
        MediaKind, Post,
    },
    text::{escape_markdown, truncate},
};

/// Everything a request needs, shared by all of them.
pub struct Pipeline {
    reddit: RedditClient,
    services: Services,
    limits: Limits,
}

/// Self posts link to their own comments page.
fn is_text_post(url: &str) -> bool {
    url.contains("/comments/")
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::new();
        Ok(Self {
            reddit: RedditClient::new(client.clone(), &config.reddit)?,
            services: Services::new(client, config),
            limits: config.limits,
        })
    }

    pub fn reddit(&self) -> &RedditClient {
        &self.reddit
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Fetches one post from `target` and resolves its media.
    pub async fn get_post(&self, target: Target<'_>) -> Result<Post> {
        let raw = self.reddit.fetch_raw(target).await?;
        self.assemble(raw).await
    }

    /// Builds the renderable post. Failures without request context become
    /// [`Error::PostRetrieval`].
    pub async fn assemble(&self, raw: RawPost) -> Result<Post> {
        let RawPost { url, data } = raw;
        self.build(&data).await.map_err(|e| {
            if e.is_domain() {
                e
            } else {
                error!("Failed to build post from {url}: {e}");
                Error::PostRetrieval {
                    url,
                    reason: e.to_string(),
                }
            }
        })
    }

    async fn build(&self, data: &PostData) -> Result<Post> {
        let title = escape_markdown(&truncate(&data.title, self.limits.max_title_length));
        let mut text = escape_markdown(&truncate(&data.selftext, self.limits.max_post_length));

        let media = if is_text_post(&data.url) {
            None
        } else {
            Some(self.services.resolve(&data.url, data).await?)
        };
        if let Some(video) = media.as_ref().filter(|m| m.kind() == MediaKind::ExternalVideo) {
            text = format!("{text}\n\n[Link to youtube video]({})", video.url());
        }
        debug!("Built post {} from {}", data.permalink, data.subreddit_name_prefixed);

        Ok(Post {
            subreddit: data.subreddit_name_prefixed.clone(),
            permalink: data.permalink.clone(),
            title,
            text,
            media,
        })
    }
}
