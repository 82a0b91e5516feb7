use reqwest::Client;

use super::{plain_get, Service, ServiceResponse};
use crate::{
    error::Result,
    sources::{MediaAsset, MediaKind},
};

/// Any host without a dedicated service. Media is classified by extension.
pub struct Generic {
    client: Client,
}

impl Generic {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn kind_of(url: &str) -> MediaKind {
    if url.contains(".gif") {
        MediaKind::Animation
    } else if url.contains(".mp4") {
        MediaKind::Video
    } else {
        MediaKind::Photo
    }
}

impl Service for Generic {
    const NAME: &'static str = "Generic";

    async fn fetch(&self, target: &str) -> Result<ServiceResponse> {
        plain_get(&self.client, target).await
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset> {
        let kind = kind_of(&response.url);
        Ok(MediaAsset::new(response.url, kind, response.content_length))
    }
}
