use tracing::{debug, error, info};

use crate::{
    linker::{Linker, Refresh},
    pipeline::Pipeline,
    sources::reddit::has_reddit_link,
    telegram::{Action, CallbackQuery, Message, TelegramClient, Update},
    text::{subreddit_name, subreddit_names},
};

/// What a chat message asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Request<'a> {
    /// Post links to resolve
    Links,
    /// Random posts from these subreddits
    Subreddits(Vec<&'a str>),
    None,
}

impl<'a> Request<'a> {
    pub fn from_text(text: &'a str) -> Self {
        if has_reddit_link(text) {
            return Self::Links;
        }
        let names = subreddit_names(text);
        if names.is_empty() {
            Self::None
        } else {
            Self::Subreddits(names)
        }
    }
}

pub struct Bot {
    pub pipeline: Pipeline,
    pub telegram: TelegramClient,
}

impl Bot {
    pub fn new(pipeline: Pipeline, telegram: TelegramClient) -> Self {
        Self { pipeline, telegram }
    }

    pub async fn handle(&self, update: Update) {
        if let Some(message) = update.message {
            self.on_message(message).await;
        } else if let Some(query) = update.callback_query {
            self.on_callback(query).await;
        }
    }

    async fn on_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let linker = Linker::new(&self.pipeline, &self.telegram, message.chat.id);

        // failures are reported to the chat by the linker
        match Request::from_text(text) {
            Request::Links => {
                for url in self.pipeline.reddit().post_urls(text).await {
                    linker.send_from_link(&url).await.ok();
                }
            }
            Request::Subreddits(names) => {
                for name in names {
                    linker.send_random(name).await.ok();
                }
            }
            Request::None => debug!("Ignoring message {}", message.message_id),
        }
    }

    async fn on_callback(&self, query: CallbackQuery) {
        if let Err(e) = self.telegram.answer_callback_query(&query.id).await {
            error!("Failed to answer callback {}: {e}", query.id);
        }
        let action = query.data.as_deref().and_then(Action::parse);
        let (Some(message), Some(action)) = (query.message, action) else {
            return;
        };
        let shown = message.shown();
        let linker = Linker::new(&self.pipeline, &self.telegram, shown.chat_id);

        match action {
            Action::Delete => {
                let res = self
                    .telegram
                    .delete_message(shown.chat_id, shown.message_id)
                    .await;
                if let Err(e) = res {
                    error!("Failed to delete message {}: {e}", shown.message_id);
                }
            }
            Action::Edit => match linker.refresh(&shown).await {
                Ok(Refresh::Edited(post)) => {
                    info!("Message {} now shows {}", shown.message_id, post.permalink)
                }
                Ok(_) => {}
                Err(e) => error!("Failed to refresh message {}: {e}", shown.message_id),
            },
            Action::More => {
                if let Some(subreddit) = subreddit_name(&shown.text, true) {
                    linker.send_random(subreddit).await.ok();
                }
            }
        }
    }
}
