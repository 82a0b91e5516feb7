use reqwest::Client;
use tracing::warn;
use url::Url;

use super::{plain_get, Service, ServiceResponse};
use crate::{
    error::{Error, Result},
    sources::{reddit::PostData, MediaAsset, MediaKind},
};

/// Guess used when the post carries no fallback url.
const DEFAULT_RENDITION: &str = "DASH_1_2_M";
/// Tried when the first candidate does not exist.
const ALTERNATE_RENDITION: &str = "DASH_1080";

/// Reddit hosted videos. No API, only the CDN.
pub struct Vreddit {
    client: Client,
}

impl Vreddit {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// `https://v.redd.it/{id}/DASH_1080` for any url of video `{id}`.
fn alternate_url(target: &str) -> Result<String> {
    let mut url = Url::parse(target)?;
    let id = url
        .path_segments()
        .and_then(|mut s| s.next())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::PostRetrieval {
            url: target.to_owned(),
            reason: "no video id in url".to_owned(),
        })?;
    url.set_path(&format!("{id}/{ALTERNATE_RENDITION}"));
    url.set_query(None);
    Ok(url.to_string())
}

impl Service for Vreddit {
    const NAME: &'static str = "Vreddit";

    /// The api is not consistent about where the fallback url lives.
    fn preprocess(&self, url: &str, post: &PostData) -> Result<String> {
        let fallback_url = if post.is_crosspost() {
            post.crosspost_fallback_url()
        } else {
            post.fallback_url()
        };
        Ok(match fallback_url {
            Some(fallback_url) => fallback_url.to_owned(),
            None => format!("{}/{DEFAULT_RENDITION}", url.trim_end_matches('/')),
        })
    }

    async fn fetch(&self, target: &str) -> Result<ServiceResponse> {
        let probe = self.client.head(target).send().await?;
        if probe.status().is_success() {
            return plain_get(&self.client, target).await;
        }

        let alternate = alternate_url(target)?;
        warn!("{target} answered {}, trying {alternate}", probe.status());
        plain_get(&self.client, &alternate).await
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset> {
        // fallback streams carry no audio
        Ok(MediaAsset::new(
            response.url,
            MediaKind::Animation,
            response.content_length,
        ))
    }
}
