use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    pipeline::Pipeline,
    sources::{reddit::Target, Post},
    text::subreddit_name,
};

/// Buttons attached under a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
    /// delete, refresh, more
    Edit,
    /// delete, retry refresh, more
    EditFailed,
    /// delete, more
    NoEdit,
    /// delete
    Delete,
}

/// A message already in the chat.
#[derive(Debug, Clone)]
pub struct ShownMessage {
    pub chat_id: i64,
    pub message_id: i64,
    /// Markdown text or caption, as rendered by [`Post::message`]
    pub text: String,
    pub has_media: bool,
}

/// Where posts end up.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send_post(&self, chat_id: i64, post: &Post, keyboard: Keyboard) -> Result<()>;

    /// Replaces `message` with `post`, keeping the edit keyboard.
    async fn edit_post(&self, message: &ShownMessage, post: &Post) -> Result<()>;

    async fn send_text(&self, chat_id: i64, text: &str, keyboard: Option<Keyboard>) -> Result<()>;

    async fn set_keyboard(&self, message: &ShownMessage, keyboard: Keyboard) -> Result<()>;
}

#[derive(Debug)]
pub enum Refresh {
    Edited(Post),
    /// Every candidate was rejected or failed.
    Failed,
    /// The message names no subreddit to draw from.
    NoSubreddit,
}

/// Serves one request from one chat.
pub struct Linker<'a, T> {
    pipeline: &'a Pipeline,
    transport: &'a T,
    chat_id: i64,
}

impl<'a, T: Transport> Linker<'a, T> {
    pub fn new(pipeline: &'a Pipeline, transport: &'a T, chat_id: i64) -> Self {
        Self {
            pipeline,
            transport,
            chat_id,
        }
    }

    fn max_tries(&self) -> usize {
        self.pipeline.limits().max_tries.max(1)
    }

    /// Sends a random post from `subreddit`. The last error is reported in
    /// the chat and returned.
    pub async fn send_random(&self, subreddit: &str) -> Result<Post> {
        info!("Sending random post from {subreddit} to {}", self.chat_id);
        let mut attempt = 1;
        loop {
            match self.send_post(Target::Subreddit(subreddit), Keyboard::Edit).await {
                Ok(post) => return Ok(post),
                Err(e) if e.is_terminal() || attempt >= self.max_tries() => {
                    self.report(&e, Some(Keyboard::Delete)).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {attempt} for {subreddit} failed: {e}");
                    attempt += 1;
                }
            }
        }
    }

    /// Sends the post at `url`, once.
    pub async fn send_from_link(&self, url: &str) -> Result<Post> {
        info!("Sending post {url} to {}", self.chat_id);
        let res = self.send_post(Target::Link(url), Keyboard::NoEdit).await;
        if let Err(e) = &res {
            self.report(e, None).await;
        }
        res
    }

    /// Replaces `shown` with another post from the subreddit it came from.
    pub async fn refresh(&self, shown: &ShownMessage) -> Result<Refresh> {
        let Some(subreddit) = subreddit_name(&shown.text, true) else {
            warn!("No subreddit in message {}", shown.message_id);
            return Ok(Refresh::NoSubreddit);
        };

        for attempt in 1..=self.max_tries() {
            match self.try_edit(shown, subreddit).await {
                Ok(Some(post)) => return Ok(Refresh::Edited(post)),
                Ok(None) => {}
                Err(e) if e.is_terminal() => {
                    warn!("Refresh of {} stopped: {e}", shown.message_id);
                    break;
                }
                Err(e) => warn!("Refresh attempt {attempt} for {subreddit} failed: {e}"),
            }
        }

        self.transport.set_keyboard(shown, Keyboard::EditFailed).await?;
        Ok(Refresh::Failed)
    }

    async fn send_post(&self, target: Target<'_>, keyboard: Keyboard) -> Result<Post> {
        let post = self.pipeline.get_post(target).await?;
        self.check_size(&post)?;
        self.transport.send_post(self.chat_id, &post, keyboard).await?;
        Ok(post)
    }

    /// `None` if the candidate cannot replace `shown`.
    async fn try_edit(&self, shown: &ShownMessage, subreddit: &str) -> Result<Option<Post>> {
        let post = self.pipeline.get_post(Target::Subreddit(subreddit)).await?;
        if post.message().trim() == shown.text.trim() {
            debug!("Candidate {} is the shown post", post.permalink);
            return Ok(None);
        }
        // media can't be added to or removed from a sent message
        if shown.has_media == post.kind().is_text_like() {
            debug!("Candidate {} is a {:?} post", post.permalink, post.kind());
            return Ok(None);
        }
        self.check_size(&post)?;

        self.transport.edit_post(shown, &post).await?;
        Ok(Some(post))
    }

    fn check_size(&self, post: &Post) -> Result<()> {
        let max = self.pipeline.limits().max_media_size;
        match &post.media {
            Some(media) if media.size().is_some_and(|size| size > max) => Err(Error::MediaTooBig {
                url: media.url().to_owned(),
                size: media.size().unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }

    async fn report(&self, err: &Error, keyboard: Option<Keyboard>) {
        if err.kind().is_user_facing() {
            info!("Reporting to {}: {err}", self.chat_id);
        } else {
            error!("Request from {} failed: {err}", self.chat_id);
        }
        if let Err(e) = self
            .transport
            .send_text(self.chat_id, &err.user_message(), keyboard)
            .await
        {
            error!("Failed to report error to {}: {e}", self.chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::{
        config::{Config, GfycatConfig, Limits, RedditConfig},
        error::GENERIC_FAILURE,
        sources::reddit::tests::{listing, post_json},
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        SendPost(String, Keyboard),
        EditPost(i64, String),
        SendText(String, Option<Keyboard>),
        SetKeyboard(i64, Keyboard),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        failing_sends: AtomicUsize,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Transport for Recorder {
        async fn send_post(&self, _chat_id: i64, post: &Post, keyboard: Keyboard) -> Result<()> {
            let failing = self.failing_sends.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_sends.store(failing - 1, Ordering::SeqCst);
                return Err(Error::PostSend {
                    permalink: post.permalink.clone(),
                    reason: "Bad Request: wrong file identifier".into(),
                });
            }
            self.push(Call::SendPost(post.permalink.clone(), keyboard));
            Ok(())
        }

        async fn edit_post(&self, message: &ShownMessage, post: &Post) -> Result<()> {
            self.push(Call::EditPost(message.message_id, post.permalink.clone()));
            Ok(())
        }

        async fn send_text(
            &self,
            _chat_id: i64,
            text: &str,
            keyboard: Option<Keyboard>,
        ) -> Result<()> {
            self.push(Call::SendText(text.to_owned(), keyboard));
            Ok(())
        }

        async fn set_keyboard(&self, message: &ShownMessage, keyboard: Keyboard) -> Result<()> {
            self.push(Call::SetKeyboard(message.message_id, keyboard));
            Ok(())
        }
    }

    fn pipeline(server: &ServerGuard, limits: Limits) -> Pipeline {
        let config = Config {
            reddit: RedditConfig {
                base_url: server.url(),
                ..Default::default()
            },
            gfycat: GfycatConfig {
                api_url: server.url(),
                ..Default::default()
            },
            limits,
            ..Default::default()
        };
        Pipeline::new(&config).unwrap()
    }

    fn text_post(title: &str) -> String {
        let url = format!("https://www.reddit.com/r/test/comments/{title}/");
        listing(vec![post_json(title, &url)])
    }

    /// What `text_post(title)` renders to.
    fn shown_text(title: &str) -> String {
        Post {
            subreddit: "r/test".into(),
            permalink: format!("/r/test/comments/{title}/"),
            title: title.into(),
            text: String::new(),
            media: None,
        }
        .message()
    }

    fn shown(text: String, has_media: bool) -> ShownMessage {
        ShownMessage {
            chat_id: 1,
            message_id: 42,
            text,
            has_media,
        }
    }

    #[tokio::test]
    async fn private_subreddit_is_tried_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/secret/random.json")
            .with_status(403)
            .with_body(r#"{"reason": "private", "message": "Forbidden", "error": 403}"#)
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/secret")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubredditPrivate { .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText("This subreddit is private.".into(), Some(Keyboard::Delete))]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_subreddit_is_tried_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/doesnotexist123456/random.json")
            .with_body(listing(vec![]))
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/doesnotexist123456")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SubredditNotFound { .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText("This subreddit doesn't exist.".into(), Some(Keyboard::Delete))]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retryable_failures_use_every_attempt() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/pics/random.json")
            .with_status(503)
            .with_body("<html>unavailable</html>")
            .expect(4)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/pics")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PostRequest { .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText(GENERIC_FAILURE.into(), Some(Keyboard::Delete))]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_failure_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("abc"))
            .expect(2)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder {
            failing_sends: AtomicUsize::new(1),
            ..Default::default()
        };

        let post = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/test")
            .await
            .unwrap();
        assert_eq!(post.permalink, "/r/test/comments/abc/");
        assert_eq!(
            recorder.calls(),
            vec![Call::SendPost("/r/test/comments/abc/".into(), Keyboard::Edit)]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn oversized_media_is_never_sent() {
        let mut server = Server::new_async().await;
        let media_url = format!("{}/media/big.jpg", server.url());
        let post_mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(listing(vec![post_json("big", &media_url)]))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/media/big.jpg")
            .with_body("0123456789")
            .create_async()
            .await;
        let limits = Limits {
            max_media_size: 5,
            ..Default::default()
        };
        let pipeline = pipeline(&server, limits);
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaTooBig { size: 10, .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText("Media is too big to be sent.".into(), Some(Keyboard::Delete))]
        );
        post_mock.assert_async().await;
    }

    #[tokio::test]
    async fn media_failures_use_every_attempt() {
        let mut server = Server::new_async().await;
        let media_url = format!("{}/media/gone.jpg", server.url());
        let post_mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(listing(vec![post_json("gone", &media_url)]))
            .expect(4)
            .create_async()
            .await;
        let media_mock = server
            .mock("GET", "/media/gone.jpg")
            .with_status(404)
            .expect(4)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MediaRetrieval { status: 404, .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText(GENERIC_FAILURE.into(), Some(Keyboard::Delete))]
        );
        post_mock.assert_async().await;
        media_mock.assert_async().await;
    }

    #[tokio::test]
    async fn authentication_failure_stops_retries() {
        let mut server = Server::new_async().await;
        let post_mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(listing(vec![post_json("clip", "https://gfycat.com/Some-name")]))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/gfycats/Some")
            .with_status(401)
            .create_async()
            .await;
        let token_mock = server
            .mock("POST", "/v1/oauth/token")
            .with_status(403)
            .with_body("invalid client")
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let err = Linker::new(&pipeline, &recorder, 1)
            .send_random("r/test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(
            recorder.calls(),
            vec![Call::SendText(GENERIC_FAILURE.into(), Some(Keyboard::Delete))]
        );
        post_mock.assert_async().await;
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn link_is_sent_without_edit_button() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/r/test/comments/abc/title.json")
            .with_body(text_post("abc"))
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let link = format!("{}/r/test/comments/abc/title", server.url());
        Linker::new(&pipeline, &recorder, 1)
            .send_from_link(&link)
            .await
            .unwrap();
        assert_eq!(
            recorder.calls(),
            vec![Call::SendPost("/r/test/comments/abc/".into(), Keyboard::NoEdit)]
        );
    }

    #[tokio::test]
    async fn link_failure_is_reported_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/test/comments/abc/title.json")
            .with_status(500)
            .with_body("oops")
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let link = format!("{}/r/test/comments/abc/title", server.url());
        let err = Linker::new(&pipeline, &recorder, 1)
            .send_from_link(&link)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PostRequest { .. }));
        assert_eq!(recorder.calls(), vec![Call::SendText(GENERIC_FAILURE.into(), None)]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_never_shows_same_post() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("abc"))
            .expect(4)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown(shown_text("abc"), false))
            .await
            .unwrap();
        assert!(matches!(res, Refresh::Failed));
        assert_eq!(recorder.calls(), vec![Call::SetKeyboard(42, Keyboard::EditFailed)]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_edits_with_new_post() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("xyz"))
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown(shown_text("abc"), false))
            .await
            .unwrap();
        match res {
            Refresh::Edited(post) => assert_eq!(post.title, "xyz"),
            res => panic!("unexpected refresh {res:?}"),
        }
        assert_eq!(
            recorder.calls(),
            vec![Call::EditPost(42, "/r/test/comments/xyz/".into())]
        );
    }

    #[tokio::test]
    async fn refresh_skips_shown_post_and_takes_next() {
        let mut server = Server::new_async().await;
        let same = server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("abc"))
            .expect(1)
            .create_async()
            .await;
        let other = server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("xyz"))
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown(shown_text("abc"), false))
            .await
            .unwrap();
        match res {
            Refresh::Edited(post) => assert_eq!(post.title, "xyz"),
            res => panic!("unexpected refresh {res:?}"),
        }
        assert_eq!(
            recorder.calls(),
            vec![Call::EditPost(42, "/r/test/comments/xyz/".into())]
        );
        same.assert_async().await;
        other.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_keeps_media_presence() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(text_post("xyz"))
            .expect(4)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown(shown_text("abc"), true))
            .await
            .unwrap();
        assert!(matches!(res, Refresh::Failed));
        assert_eq!(recorder.calls(), vec![Call::SetKeyboard(42, Keyboard::EditFailed)]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_stops_on_terminal_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/r/test/random.json")
            .with_body(json!({"reason": "private", "error": 403}).to_string())
            .expect(1)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown(shown_text("abc"), false))
            .await
            .unwrap();
        assert!(matches!(res, Refresh::Failed));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_needs_a_subreddit() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let pipeline = pipeline(&server, Limits::default());
        let recorder = Recorder::default();

        let res = Linker::new(&pipeline, &recorder, 1)
            .refresh(&shown("no name here".into(), false))
            .await
            .unwrap();
        assert!(matches!(res, Refresh::NoSubreddit));
        assert!(recorder.calls().is_empty());
        mock.assert_async().await;
    }
}
