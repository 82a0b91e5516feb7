use std::sync::Mutex;

use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

use super::{get_with_body, last_segment, Service, ServiceResponse};
use crate::{
    config::{GfycatConfig, SMALL_ANIMATION_SIZE},
    error::{Error, Result},
    sources::{reddit::PostData, MediaAsset, MediaKind},
};

/// Gfycat clips. OAuth client-credentials service.
pub struct Gfycat {
    client: Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    max_media_size: u64,
    /// Written only by `authenticate`. A stale token costs one more 401.
    token: Mutex<Option<String>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GfyResponse {
    gfy_item: GfyItem,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GfyItem {
    webm_url: String,
    webm_size: u64,
    max5mb_gif: String,
}

impl Gfycat {
    pub fn new(client: Client, config: &GfycatConfig, max_media_size: u64) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            max_media_size,
            token: Mutex::new(None),
        }
    }
}

impl Service for Gfycat {
    const NAME: &'static str = "Gfycat";
    const AUTHENTICATED: bool = true;

    /// Landing pages append a readable name after a dash: `/SomeId-some-name`.
    fn preprocess(&self, url: &str, _post: &PostData) -> Result<String> {
        let parsed = Url::parse(url)?;
        let id = last_segment(&parsed)
            .and_then(|s| s.split('-').next())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::PostRetrieval {
                url: url.to_owned(),
                reason: "no gfycat id in url".to_owned(),
            })?;
        Ok(format!("{}/v1/gfycats/{id}", self.api_url))
    }

    async fn fetch(&self, target: &str) -> Result<ServiceResponse> {
        let token = self.token.lock()?.clone();
        let request = match token {
            Some(token) => self.client.get(target).bearer_auth(token),
            None => self.client.get(target),
        };
        get_with_body(request).await
    }

    async fn authenticate(&self) -> Result<()> {
        let body = serde_json::to_string(&TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        })?;
        let res = self
            .client
            .post(format!("{}/v1/oauth/token", self.api_url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            error!("Gfycat authentication failed with {status}: {text}");
            return Err(Error::Authentication {
                service: Self::NAME,
                response: text,
            });
        }

        let TokenResponse { access_token } = serde_json::from_str(&text)?;
        *self.token.lock()? = Some(access_token);
        info!("Gfycat access token refreshed");
        Ok(())
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset> {
        let GfyResponse { gfy_item } = serde_json::from_str(&response.body)?;

        // too big to send by url: swap for the small gif rendition
        if gfy_item.webm_size > self.max_media_size {
            return Ok(MediaAsset::new(
                gfy_item.max5mb_gif,
                MediaKind::Animation,
                Some(SMALL_ANIMATION_SIZE),
            ));
        }
        // telegram does not play webm
        Ok(MediaAsset::new(
            gfy_item.webm_url.replace(".webm", ".mp4"),
            MediaKind::Video,
            Some(gfy_item.webm_size),
        ))
    }
}
