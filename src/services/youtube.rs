use super::{Service, ServiceResponse};
use crate::{
    error::Result,
    sources::{reddit::PostData, MediaAsset, MediaKind},
};

/// Youtube links. Nothing is fetched; the link ends up in the message text.
pub struct Youtube;

impl Service for Youtube {
    const NAME: &'static str = "Youtube";
    const EXTERNAL: bool = false;

    /// Landing urls are sometimes attribution redirects; the oembed url is
    /// the video itself.
    fn preprocess(&self, url: &str, post: &PostData) -> Result<String> {
        Ok(post.oembed_url().unwrap_or(url).to_owned())
    }

    async fn fetch(&self, target: &str) -> Result<ServiceResponse> {
        Ok(ServiceResponse::local(target))
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset> {
        Ok(MediaAsset::new(response.url, MediaKind::ExternalVideo, None))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::resolve;

    fn post(media: serde_json::Value) -> PostData {
        serde_json::from_value(json!({
            "subreddit_name_prefixed": "r/videos",
            "permalink": "/r/videos/comments/x/",
            "title": "t",
            "url": "https://www.youtube.com/watch?v=DJxchZ7qAzE",
            "media": media,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn prefers_oembed_url() {
        let data = post(json!({"oembed": {"url": "https://www.youtube.com/watch?v=DJxchZ7qAzE"}}));
        let asset = resolve(
            &Youtube,
            "https://www.youtube.com/attribution_link?a=o3Cq80oOnoc&u=%2Fwatch%3Fv%3D3OSc_psp4k0",
            &data,
        )
        .await
        .unwrap();
        assert_eq!(asset.url(), "https://www.youtube.com/watch?v=DJxchZ7qAzE");
        assert_eq!(asset.kind(), MediaKind::ExternalVideo);
        assert_eq!(asset.size(), None);
    }

    #[tokio::test]
    async fn keeps_landing_url_without_oembed() {
        for media in [json!({"oembed": {}}), json!(null)] {
            let asset = resolve(&Youtube, "https://youtu.be/DJxchZ7qAzE", &post(media))
                .await
                .unwrap();
            assert_eq!(asset.url(), "https://youtu.be/DJxchZ7qAzE");
        }
    }
}
