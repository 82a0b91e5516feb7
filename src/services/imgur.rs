use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;
use url::Url;

use super::{get_with_body, last_segment, Service, ServiceResponse};
use crate::{
    config::ImgurConfig,
    error::{Error, Result},
    sources::{reddit::PostData, MediaAsset, MediaKind},
};

/// Imgur images, gifs and videos.
pub struct Imgur {
    client: Client,
    api_url: String,
    client_id: String,
}

#[derive(Deserialize)]
struct ImgurResponse {
    data: ImgurItem,
}

#[derive(Deserialize)]
struct ImgurItem {
    /// MIME type. Missing on gallery wrappers
    #[serde(default, rename = "type")]
    mime: Option<String>,
    #[serde(default)]
    animated: bool,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    /// Transcoded rendition of animated items
    #[serde(default)]
    mp4: Option<String>,
    #[serde(default)]
    mp4_size: Option<u64>,
    #[serde(default)]
    images: Vec<ImgurItem>,
}

impl Imgur {
    pub fn new(client: Client, config: &ImgurConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            client_id: config.client_id.clone(),
        }
    }
}

impl ImgurItem {
    fn is_still_image(&self) -> bool {
        match &self.mime {
            Some(mime) => mime.starts_with("image/") && mime != "image/gif" && !self.animated,
            None => false,
        }
    }
}

impl Service for Imgur {
    const NAME: &'static str = "Imgur";

    fn preprocess(&self, url: &str, _post: &PostData) -> Result<String> {
        let parsed = Url::parse(url)?;
        let segment = last_segment(&parsed).ok_or_else(|| Error::PostRetrieval {
            url: url.to_owned(),
            reason: "no imgur id in url".to_owned(),
        })?;
        let id = segment.rsplit_once('.').map(|(id, _)| id).unwrap_or(segment);
        let route = if url.contains("gallery") { "gallery" } else { "image" };
        Ok(format!("{}/3/{route}/{id}", self.api_url))
    }

    async fn fetch(&self, target: &str) -> Result<ServiceResponse> {
        let request = self
            .client
            .get(target)
            .header(AUTHORIZATION, format!("Client-ID {}", self.client_id));
        get_with_body(request).await
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset> {
        let ImgurResponse { mut data } = serde_json::from_str(&response.body)?;
        // galleries wrap the actual item
        let item = if data.images.is_empty() {
            data
        } else {
            data.images.swap_remove(0)
        };

        let (url, kind, size) = if item.is_still_image() {
            (item.link, MediaKind::Photo, item.size)
        } else {
            (item.mp4, MediaKind::Video, item.mp4_size)
        };
        let url = url.ok_or_else(|| Error::PostRetrieval {
            url: response.url,
            reason: format!("imgur item without {kind:?} url"),
        })?;
        Ok(MediaAsset::new(url, kind, size))
    }
}
