use std::fmt::Display;

use futures::future::join_all;
use rand::Rng;
use reqwest::{header::USER_AGENT, redirect::Policy, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::RedditConfig,
    error::{Error, Result},
};

/// What to fetch a post from.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// `r/` prefixed name. A random post is requested.
    Subreddit(&'a str),
    /// Full link to a post.
    Link(&'a str),
}

pub struct RedditClient {
    client: Client,
    /// Does not follow redirects, used to read where share links point to.
    share_client: Client,
    user_agent: String,
    base_url: String,
}

/// One post of a listing, as returned by the API.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PostData {
    pub subreddit_name_prefixed: String,
    pub permalink: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub url: String,
    #[serde(default)]
    pub media: Option<PostMedia>,
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
    #[serde(default)]
    pub crosspost_parent_list: Option<Vec<CrosspostParent>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PostMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
    #[serde(default)]
    pub oembed: Option<Oembed>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RedditVideo {
    #[serde(default)]
    pub fallback_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Oembed {
    #[serde(default)]
    pub url: Option<String>,
}

/// Crossposts have `media = null`; the video lives in the parent post.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CrosspostParent {
    #[serde(default)]
    pub secure_media: Option<PostMedia>,
}

/// A single post picked out of a successful response.
#[derive(Debug, Clone)]
pub struct RawPost {
    /// Url the post was requested from
    pub url: String,
    pub data: PostData,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}
#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}
#[derive(Deserialize)]
struct ListingChild {
    data: PostData,
}

const REDDIT_DOMAINS: [&str; 3] = ["reddit.com", "redd.it", "reddit.app.link"];

impl<'a> Target<'a> {
    pub fn json_url(&self, base_url: &str) -> String {
        match self {
            Self::Subreddit(name) => {
                format!("{}/{name}/random.json", base_url.trim_end_matches('/'))
            }
            Self::Link(url) => format!("{}.json", url.trim_end_matches('/')),
        }
    }
}

impl<'a> Display for Target<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subreddit(name) => f.write_str(name),
            Self::Link(url) => f.write_str(url),
        }
    }
}

impl PostData {
    pub fn crosspost_fallback_url(&self) -> Option<&str> {
        self.crosspost_parent_list
            .as_ref()?
            .first()?
            .secure_media
            .as_ref()?
            .fallback_url()
    }

    pub fn fallback_url(&self) -> Option<&str> {
        self.media.as_ref()?.fallback_url()
    }

    pub fn is_crosspost(&self) -> bool {
        self.crosspost_parent_list
            .as_ref()
            .map(|list| !list.is_empty())
            .unwrap_or_default()
    }

    pub fn oembed_url(&self) -> Option<&str> {
        self.media.as_ref()?.oembed.as_ref()?.url.as_deref()
    }
}

impl PostMedia {
    fn fallback_url(&self) -> Option<&str> {
        self.reddit_video.as_ref()?.fallback_url.as_deref()
    }
}

/// Whether `text` mentions any reddit link.
pub fn has_reddit_link(text: &str) -> bool {
    let text = text.to_lowercase();
    REDDIT_DOMAINS.iter().any(|d| text.contains(d))
}

/// Post url a share page redirects to, if the page carries one.
pub fn share_link_target(body: &str) -> Option<String> {
    let start = body.find("https://")?;
    let end = body[start..].find('"').map(|i| start + i)?;
    let url = strip_share_query(&body[start..end]);
    (!url.is_empty()).then(|| url.to_owned())
}

fn strip_share_query(url: &str) -> &str {
    url.split("/?").next().unwrap_or(url)
}

impl RedditClient {
    pub fn new(client: Client, config: &RedditConfig) -> Result<Self> {
        let share_client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self {
            client,
            share_client,
            user_agent: config.user_agent.clone(),
            base_url: config.base_url.clone(),
        })
    }

    /// Requests `target` and picks one post out of the response.
    pub async fn fetch_raw(&self, target: Target<'_>) -> Result<RawPost> {
        let url = target.json_url(&self.base_url);
        debug!("Requesting {url}");

        let res = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| Error::PostRequest {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        // nonexistent subreddits may answer 200 through a redirect to search
        let redirected_to_search =
            res.url().as_str() != url && res.url().path().contains("search.json");
        let body = res.text().await.map_err(|e| Error::PostRequest {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let json: Value = serde_json::from_str(&body).map_err(|e| Error::PostRequest {
            url: url.clone(),
            reason: format!("invalid json: {e}"),
        })?;

        let posts = classify(target, &url, json, redirected_to_search)?;
        let data = choose(posts).ok_or_else(|| Error::SubredditNotFound {
            target: target.to_string(),
        })?;
        Ok(RawPost { url, data })
    }

    /// Post links found in a chat message. Share links are resolved.
    pub async fn post_urls(&self, text: &str) -> Vec<String> {
        let jobs = text.split_whitespace().map(|word| self.post_url(word));
        join_all(jobs).await.into_iter().flatten().collect()
    }

    async fn post_url(&self, word: &str) -> Option<String> {
        if word.to_lowercase().contains("reddit.app.link") {
            return self.resolve_share_link(word).await;
        }
        link_post_url(word)
    }

    async fn resolve_share_link(&self, link: &str) -> Option<String> {
        let res = self
            .share_client
            .get(link)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await;
        let body = match res {
            Ok(res) => res.text().await,
            Err(e) => Err(e),
        };
        match body {
            Ok(body) => share_link_target(&body),
            Err(e) => {
                warn!("Failed to resolve share link {link}: {e}");
                None
            }
        }
    }
}

/// Post url for a `reddit.com` or `redd.it` link, as written in a message.
pub fn link_post_url(word: &str) -> Option<String> {
    let owned;
    let word: &str = if word.contains("://") {
        word
    } else {
        owned = format!("https://{word}");
        owned.as_str()
    };
    let mut url = Url::parse(word).ok()?;
    let host = url.host_str()?.to_lowercase();

    if host == "redd.it" {
        let id = url.path().trim_matches('/');
        (!id.is_empty()).then(|| format!("https://www.reddit.com/comments/{id}"))
    } else if host == "reddit.com" || host.ends_with(".reddit.com") {
        // `.json` goes on the path
        url.set_query(None);
        url.set_fragment(None);
        Some(url.to_string())
    } else {
        None
    }
}

fn classify(
    target: Target<'_>,
    url: &str,
    json: Value,
    redirected_to_search: bool,
) -> Result<Vec<PostData>> {
    // some listings come wrapped in a list, some do not
    let json = match json {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => {
                return Err(Error::SubredditNotFound {
                    target: target.to_string(),
                })
            }
        },
        json => json,
    };

    if json.get("reason").and_then(Value::as_str) == Some("private") {
        return Err(Error::SubredditPrivate {
            target: target.to_string(),
        });
    }
    if json.get("error").and_then(Value::as_u64) == Some(404) || redirected_to_search {
        return Err(Error::SubredditNotFound {
            target: target.to_string(),
        });
    }

    let listing: Listing = serde_json::from_value(json).map_err(|e| Error::PostRetrieval {
        url: url.to_owned(),
        reason: format!("unexpected listing: {e}"),
    })?;
    Ok(listing.data.children.into_iter().map(|c| c.data).collect())
}

fn choose(mut posts: Vec<PostData>) -> Option<PostData> {
    if posts.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..posts.len());
    Some(posts.swap_remove(idx))
}
