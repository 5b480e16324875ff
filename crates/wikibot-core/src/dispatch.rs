//! Update classification, command handling and the search path.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    formatting::{code, escape_html, link},
    ingest::UpdateHandler,
    lookup::{LookupCache, SearchResults},
    messaging::{
        port::MessagingPort,
        types::{IncomingUpdate, InlineKeyboard, OutgoingReply, UpdateKind},
    },
    registry::TitleRegistry,
    user_state::UserStateStore,
    Result,
};

/// Alternatives offered next to the lead article.
pub const MAX_SUGGESTIONS: usize = 3;

/// Bot commands. Anything unrecognised is `Help`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SetLang(Option<String>),
    GetLang,
    History,
    Help,
}

impl Command {
    pub fn from_parts(name: &str, args: &[String]) -> Self {
        match name.to_lowercase().as_str() {
            "setlang" => Command::SetLang(args.first().cloned()),
            "getlang" => Command::GetLang,
            "history" => Command::History,
            _ => Command::Help,
        }
    }
}

/// What a single update asks the bot to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Command(Command),
    Search(String),
    /// A suggestion button was pressed; the payload is a title token.
    Reopen(String),
    Ignore,
}

fn command_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^/(\w+)(?:@\S+)?\s*(.*)$").expect("valid regex"))
}

/// `/name arg1 arg2 ...` → `(name, args)`. Telegram may append `@botname` to the name.
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let caps = command_re().captures(text.trim_start())?;
    let name = caps.get(1)?.as_str().to_string();
    let args = caps
        .get(2)
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Some((name, args))
}

pub fn classify(kind: &UpdateKind) -> Result<Action> {
    match kind {
        UpdateKind::Text(msg) => {
            if let Some((name, args)) = parse_command(&msg.text) {
                return Ok(Action::Command(Command::from_parts(&name, &args)));
            }
            let query = msg.text.trim();
            if query.is_empty() {
                Ok(Action::Ignore)
            } else {
                Ok(Action::Search(query.to_string()))
            }
        }
        UpdateKind::Callback(cb) => Ok(Action::Reopen(cb.token.clone())),
        UpdateKind::DetachedCallback(_) => Ok(Action::Ignore),
        UpdateKind::Unsupported(what) => Err(Error::UnsupportedUpdate(what.clone())),
    }
}

/// Lead article plus the alternatives shown as buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub lead: Option<String>,
    pub suggestions: Vec<String>,
}

pub fn select(results: &SearchResults) -> Selection {
    let titles = &results.titles;
    match titles.first() {
        Some(lead) => {
            let mut suggestions: Vec<String> = match &results.suggestion {
                Some(s) => {
                    let mut v: Vec<String> = titles.iter().skip(1).take(2).cloned().collect();
                    v.push(s.clone());
                    v
                }
                None => titles.iter().skip(1).take(MAX_SUGGESTIONS).cloned().collect(),
            };
            suggestions.truncate(MAX_SUGGESTIONS);
            Selection {
                lead: Some(lead.clone()),
                suggestions,
            }
        }
        None => Selection {
            lead: results.suggestion.clone(),
            suggestions: Vec::new(),
        },
    }
}

/// Who sent an update and where the answer goes.
#[derive(Clone, Debug)]
struct Sender {
    chat_id: ChatId,
    user_id: UserId,
    language_code: Option<String>,
}

pub struct Dispatcher {
    users: Arc<UserStateStore>,
    registry: Arc<TitleRegistry>,
    lookups: Arc<LookupCache>,
    messenger: Arc<dyn MessagingPort>,
    button_label_max_length: usize,
}

impl Dispatcher {
    pub fn new(
        users: Arc<UserStateStore>,
        registry: Arc<TitleRegistry>,
        lookups: Arc<LookupCache>,
        messenger: Arc<dyn MessagingPort>,
        button_label_max_length: usize,
    ) -> Self {
        Self {
            users,
            registry,
            lookups,
            messenger,
            button_label_max_length,
        }
    }

    /// Compose the reply for one update without sending it.
    pub async fn reply_for(&self, update: &IncomingUpdate) -> Result<Option<OutgoingReply>> {
        let action = classify(&update.kind)?;
        debug!(update_id = %update.update_id, ?action, "classified update");

        let sender = match &update.kind {
            UpdateKind::Text(m) => Sender {
                chat_id: m.chat_id,
                user_id: m.user_id,
                language_code: m.language_code.clone(),
            },
            UpdateKind::Callback(cb) => Sender {
                chat_id: cb.chat_id,
                user_id: cb.user_id,
                language_code: cb.language_code.clone(),
            },
            UpdateKind::DetachedCallback(_) => return Ok(None),
            UpdateKind::Unsupported(what) => return Err(Error::UnsupportedUpdate(what.clone())),
        };

        let reply = match action {
            Action::Ignore => return Ok(None),
            Action::Command(cmd) => self.execute_command(&sender, cmd).await?,
            Action::Search(query) => self.search(&sender, &query).await?,
            Action::Reopen(token) => match self.registry.title_for(&token).await? {
                Some(title) => self.search(&sender, &title).await?,
                None => {
                    info!(token = %token, "callback token is not registered");
                    self.plain(&sender, nothing_found())
                }
            },
        };
        Ok(Some(reply))
    }

    async fn execute_command(&self, sender: &Sender, cmd: Command) -> Result<OutgoingReply> {
        let reply = match cmd {
            Command::SetLang(None) => self.plain(sender, specify_language()),
            Command::SetLang(Some(code)) => {
                if self.users.set_language(sender.user_id, &code).await? {
                    self.plain(sender, language_set(&code.to_lowercase()))
                } else {
                    let supported: Vec<&str> =
                        self.users.supported_langs().iter().map(String::as_str).collect();
                    self.plain(sender, unsupported_language(&supported))
                }
            }
            Command::GetLang => {
                let lang = self
                    .users
                    .get_language(sender.user_id, sender.language_code.as_deref())
                    .await?;
                self.plain(sender, current_language(&lang))
            }
            Command::History => {
                let titles = self.users.recent_reads(sender.user_id).await?;
                if titles.is_empty() {
                    self.plain(sender, empty_history())
                } else {
                    OutgoingReply {
                        chat_id: sender.chat_id,
                        html: history_header(),
                        keyboard: self.keyboard(&titles).await?,
                    }
                }
            }
            Command::Help => self.plain(sender, greeting(self.users.max_history_size())),
        };
        Ok(reply)
    }

    async fn search(&self, sender: &Sender, query: &str) -> Result<OutgoingReply> {
        let lang = self
            .users
            .get_language(sender.user_id, sender.language_code.as_deref())
            .await?;

        let results = match self.lookups.search(&lang, query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(lang = %lang, query = %query, error = %e, "search failed");
                Arc::new(SearchResults::default())
            }
        };
        let Selection { lead, suggestions } = select(&results);

        let mut html = nothing_found();
        if let Some(title) = lead {
            if let Some(summary) = self.article(&lang, &title).await {
                // History is secondary: the summary is still sent when the write fails.
                if let Err(e) = self.users.record_read(sender.user_id, &title).await {
                    warn!(user_id = %sender.user_id, title = %title, error = %e, "history write failed");
                }
                let url = match self.lookups.link(&lang, &title).await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(lang = %lang, title = %title, error = %e, "link lookup failed");
                        None
                    }
                };
                html = article(&summary, url.as_deref());
            }
        }

        Ok(OutgoingReply {
            chat_id: sender.chat_id,
            html,
            keyboard: self.keyboard(&suggestions).await?,
        })
    }

    async fn article(&self, lang: &str, title: &str) -> Option<String> {
        match self.lookups.article(lang, title).await {
            Ok(summary) => summary.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                warn!(lang = %lang, title = %title, error = %e, "article lookup failed");
                None
            }
        }
    }

    /// One button per title. Titles whose token exceeds the platform's payload
    /// limit get no button.
    async fn keyboard(&self, titles: &[String]) -> Result<InlineKeyboard> {
        let max_payload = self.messenger.capabilities().max_callback_data_len;
        let mut options = Vec::with_capacity(titles.len());
        for title in titles {
            let token = self.registry.token_for(title).await?;
            if token.len() > max_payload {
                warn!(title = %title, max_payload, "token exceeds callback payload limit; button dropped");
                continue;
            }
            options.push((title.clone(), token));
        }
        Ok(InlineKeyboard::one_per_row(
            &options,
            self.button_label_max_length,
        ))
    }

    fn plain(&self, sender: &Sender, html: String) -> OutgoingReply {
        OutgoingReply {
            chat_id: sender.chat_id,
            html,
            keyboard: InlineKeyboard::default(),
        }
    }

    /// Send failures are logged and dropped; there is no retry.
    async fn deliver(&self, reply: OutgoingReply) {
        let sent = if reply.keyboard.is_empty() {
            self.messenger.send_html(reply.chat_id, &reply.html).await
        } else {
            self.messenger
                .send_inline_keyboard(reply.chat_id, &reply.html, reply.keyboard)
                .await
        };
        if let Err(e) = sent {
            warn!(chat_id = reply.chat_id.0, error = %e, "sendMessage failed");
        }
    }
}

#[async_trait]
impl UpdateHandler for Dispatcher {
    async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        let callback_id = match &update.kind {
            UpdateKind::Callback(cb) => Some(cb.callback_id.as_str()),
            UpdateKind::DetachedCallback(id) => Some(id.as_str()),
            _ => None,
        };
        if let Some(id) = callback_id {
            if let Err(e) = self.messenger.answer_callback_query(id, None).await {
                debug!(error = %e, "answerCallbackQuery failed");
            }
        }

        if let Some(reply) = self.reply_for(&update).await? {
            self.deliver(reply).await;
        }
        Ok(())
    }
}

// ============== Reply texts ==============

fn greeting(max_history: usize) -> String {
    format!(
        "I search Wikipedia for you. Just send a phrase and I will try to find an article.\n\n\
         By default I search the Wikipedia edition matching your interface language. \
         To change it, send {} where {} is a two-letter language code, for example {}.\n\n\
         Other commands:\n\
         /history - the last {max_history} articles you read\n\
         /getlang - the current search language",
        code("/setlang {lang_code}"),
        code("{lang_code}"),
        code("en"),
    )
}

fn nothing_found() -> String {
    "Nothing found.".to_string()
}

fn article(summary: &str, url: Option<&str>) -> String {
    let mut html = format!("{}..", escape_html(summary));
    if let Some(url) = url {
        html.push_str("\n\n");
        html.push_str(&link(url));
    }
    html
}

fn specify_language() -> String {
    format!("Please specify a language, for example {}.", code("/setlang en"))
}

fn language_set(lang: &str) -> String {
    format!("Search language set to {}.", code(lang))
}

fn unsupported_language(supported: &[&str]) -> String {
    format!(
        "This language is not supported.\nSupported languages:\n{}",
        escape_html(&supported.join("\n"))
    )
}

fn current_language(lang: &str) -> String {
    format!("Search language: {}", code(lang))
}

fn empty_history() -> String {
    "You have not read anything yet.".to_string()
}

fn history_header() -> String {
    "Articles you read recently:".to_string()
}
