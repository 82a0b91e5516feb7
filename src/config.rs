use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::error::Result;

#[derive(Deserialize, Default, Clone, Debug)]
pub struct Config {
    pub telegram_token: String,

    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub gfycat: GfycatConfig,
    #[serde(default)]
    pub imgur: ImgurConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedditConfig {
    /// Sent as `User-Agent`; reddit throttles generic agents hard.
    pub user_agent: String,
    pub base_url: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GfycatConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ImgurConfig {
    pub client_id: String,
    pub api_url: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_url: String,
    /// Long polling timeout for `getUpdates`, in seconds.
    pub poll_timeout: u64,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub max_tries: usize,
    /// Biggest file the bot API accepts by url.
    pub max_media_size: u64,
    pub max_post_length: usize,
    pub max_title_length: usize,
}

/// Size reported for the pre-rendered small gif variants. Providers do not
/// report the real one.
pub const SMALL_ANIMATION_SIZE: u64 = 5_000_000;

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(file)?)
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "telereddit".to_owned(),
            base_url: "https://www.reddit.com".to_owned(),
        }
    }
}

impl Default for GfycatConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_url: "https://api.gfycat.com".to_owned(),
        }
    }
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            api_url: "https://api.imgur.com".to_owned(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.telegram.org".to_owned(),
            poll_timeout: 30,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tries: 4,
            max_media_size: 20_000_000,
            max_post_length: 500,
            max_title_length: 200,
        }
    }
}
