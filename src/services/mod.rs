//! Media hosting services.
//!
//! Every service turns the landing url found in a post into a [`MediaAsset`]
//! through the same steps, driven by [`resolve`]:
//!
//! 1. [`Service::preprocess`] rewrites the landing url into the request target;
//! 2. [`Service::fetch`] requests it;
//! 3. on `401` an authenticated service runs [`Service::authenticate`] and
//!    fetches once more;
//! 4. [`Service::postprocess`] builds the asset from the response.
//!
//! [`Services`] owns one instance of each service and picks one by host.

mod generic;
mod gfycat;
mod imgur;
mod vreddit;
mod youtube;

use reqwest::{header::CONTENT_LENGTH, Client, RequestBuilder, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    sources::{reddit::PostData, MediaAsset},
};

pub use generic::Generic;
pub use gfycat::Gfycat;
pub use imgur::Imgur;
pub use vreddit::Vreddit;
pub use youtube::Youtube;

/// What a service got back for its request target.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    /// Final url, after redirects
    pub url: String,
    pub status: StatusCode,
    pub content_length: Option<u64>,
    /// Empty unless the service reads it
    pub body: String,
}

#[allow(async_fn_in_trait)]
pub trait Service {
    const NAME: &'static str;
    /// Whether `fetch` reaches out to the network.
    const EXTERNAL: bool = true;
    /// Whether `fetch` needs credentials obtained by `authenticate`.
    const AUTHENTICATED: bool = false;

    /// Request target for the landing `url`. `post` carries the fallback
    /// urls some services prefer.
    fn preprocess(&self, url: &str, _post: &PostData) -> Result<String> {
        Ok(url.to_owned())
    }

    async fn fetch(&self, target: &str) -> Result<ServiceResponse>;

    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    fn postprocess(&self, response: ServiceResponse) -> Result<MediaAsset>;
}

/// Runs the resolution steps of `service` for the landing `url`.
pub async fn resolve<S: Service>(service: &S, url: &str, post: &PostData) -> Result<MediaAsset> {
    let target = service.preprocess(url, post)?;
    debug!("{}: resolving {url} through {target}", S::NAME);

    let mut response = service.fetch(&target).await?;
    if S::EXTERNAL {
        if S::AUTHENTICATED && response.status == StatusCode::UNAUTHORIZED {
            info!("{}: credentials rejected, authenticating", S::NAME);
            service.authenticate().await?;
            response = service.fetch(&target).await?;
        }
        if !response.status.is_success() {
            warn!("{}: {} answered {}", S::NAME, target, response.status);
            return Err(Error::MediaRetrieval {
                service: S::NAME,
                url: url.to_owned(),
                processed_url: target,
                status: response.status.as_u16(),
            });
        }
    }
    service.postprocess(response)
}

impl ServiceResponse {
    /// Response of a service that does not go to the network.
    pub fn local(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            status: StatusCode::OK,
            content_length: None,
            body: String::new(),
        }
    }

    /// Keeps status and headers, drops the body unread.
    pub fn headers_only(res: &reqwest::Response) -> Self {
        let content_length = res
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Self {
            url: res.url().to_string(),
            status: res.status(),
            content_length,
            body: String::new(),
        }
    }

    pub async fn with_body(res: reqwest::Response) -> Result<Self> {
        let mut response = Self::headers_only(&res);
        response.body = res.text().await?;
        Ok(response)
    }
}

/// GET that only waits for the headers. Media bodies are never downloaded.
pub(crate) async fn plain_get(client: &Client, url: &str) -> Result<ServiceResponse> {
    let res = client.get(url).send().await?;
    Ok(ServiceResponse::headers_only(&res))
}

pub(crate) async fn get_with_body(request: RequestBuilder) -> Result<ServiceResponse> {
    let res = request.send().await?;
    ServiceResponse::with_body(res).await
}

/// Last non-empty segment of the url path.
pub(crate) fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|s| !s.is_empty()).last()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gfycat,
    Vreddit,
    Imgur,
    Youtube,
    Generic,
}

impl Provider {
    pub fn for_host(host: &str) -> Self {
        if host.contains("gfycat.com") {
            Self::Gfycat
        } else if host.contains("v.redd.it") {
            Self::Vreddit
        } else if host.contains("imgur.com") {
            Self::Imgur
        } else if host.contains("youtube.com") || host.contains("youtu.be") {
            Self::Youtube
        } else {
            Self::Generic
        }
    }
}

/// One long-lived instance of every service.
pub struct Services {
    gfycat: Gfycat,
    vreddit: Vreddit,
    imgur: Imgur,
    youtube: Youtube,
    generic: Generic,
}

impl Services {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            gfycat: Gfycat::new(client.clone(), &config.gfycat, config.limits.max_media_size),
            vreddit: Vreddit::new(client.clone()),
            imgur: Imgur::new(client.clone(), &config.imgur),
            youtube: Youtube,
            generic: Generic::new(client),
        }
    }

    /// Resolves the landing `url` with the service matching its host.
    pub async fn resolve(&self, url: &str, post: &PostData) -> Result<MediaAsset> {
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().unwrap_or_default();

        match Provider::for_host(host) {
            Provider::Gfycat => resolve(&self.gfycat, url, post).await,
            Provider::Vreddit => resolve(&self.vreddit, url, post).await,
            Provider::Imgur => resolve(&self.imgur, url, post).await,
            Provider::Youtube => resolve(&self.youtube, url, post).await,
            Provider::Generic => {
                warn!("No suitable service found for host {host}");
                resolve(&self.generic, url, post).await
            }
        }
    }
}
