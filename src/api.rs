//! Character chat endpoints.
//!
//! Thin wrappers over the [`Client`] facade: each one supplies an endpoint
//! path and a JSON body.

use futures::future;
use futures::{Stream, StreamExt};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::{Client, ClientError};
use crate::transport::Transport;

const AUTH_PATH: &str = "/dj-rest-auth/auth0/";
const CATEGORIES_PATH: &str = "/chat/character/categories/";
const USER_CONFIG_PATH: &str = "/chat/config/";
const USER_PATH: &str = "/chat/user/";
const CHARACTER_INFO_PATH: &str = "/chat/character/info/";
const HISTORY_CREATE_PATH: &str = "/chat/history/create/";
const HISTORY_CONTINUE_PATH: &str = "/chat/history/continue/";
const HISTORY_MESSAGES_PATH: &str = "/chat/history/msgs/user/";
const STREAMING_PATH: &str = "/chat/streaming/";

impl<T: Transport> Client<T> {
    /// Exchange an identity-provider access token for a service token.
    ///
    /// On success the token is stored in the session and the user's display
    /// name is fetched and stored alongside it.
    pub async fn authenticate(&mut self, access_token: &str) -> Result<(), ClientError> {
        let url = self.url(AUTH_PATH);
        let data: Value = self
            .post_json(&url, &json!({ "access_token": access_token }), false)
            .await?;

        let key = data
            .get("key")
            .and_then(Value::as_str)
            .ok_or(ClientError::MissingField("key"))?;
        self.session_mut().set_token(key);

        let user = self.get_user().await?;
        let name = user
            .pointer("/user/name")
            .and_then(Value::as_str)
            .ok_or(ClientError::MissingField("user.name"))?
            .to_string();
        tracing::debug!(user = %name, "authenticated");
        self.session_mut().set_user_name(name);

        Ok(())
    }

    pub async fn get_categories(&self) -> Result<Value, ClientError> {
        self.get_json(&self.url(CATEGORIES_PATH), true).await
    }

    pub async fn get_user_config(&self) -> Result<Value, ClientError> {
        self.get_json(&self.url(USER_CONFIG_PATH), true).await
    }

    pub async fn get_user(&self) -> Result<Value, ClientError> {
        self.get_json(&self.url(USER_PATH), true).await
    }

    pub async fn get_character_info(&self, character_id: &str) -> Result<Value, ClientError> {
        self.post_json(
            &self.url(CHARACTER_INFO_PATH),
            &json!({ "external_id": character_id }),
            true,
        )
        .await
    }

    /// Start a fresh conversation with a character.
    pub async fn create_new_chat(&self, character_id: &str, load_character: bool) -> Result<Chat, ClientError> {
        let body = HistoryRequest {
            character_external_id: character_id,
            history_external_id: None,
        };
        let data: Value = self.post_json(&self.url(HISTORY_CREATE_PATH), &body, true).await?;
        self.open_chat(character_id, &data, load_character).await
    }

    /// Resume a known conversation.
    pub async fn continue_chat(
        &self,
        character_id: &str,
        history_id: &str,
        load_character: bool,
    ) -> Result<Chat, ClientError> {
        let body = HistoryRequest {
            character_external_id: character_id,
            history_external_id: Some(history_id),
        };
        let data: Value = self.post_json(&self.url(HISTORY_CONTINUE_PATH), &body, true).await?;
        self.open_chat(character_id, &data, load_character).await
    }

    /// Resume the most recent conversation with a character, or start one if
    /// there is none.
    pub async fn continue_last_or_create_chat(
        &self,
        character_id: &str,
        load_character: bool,
    ) -> Result<Chat, ClientError> {
        let body = HistoryRequest {
            character_external_id: character_id,
            history_external_id: None,
        };
        match self
            .post_json::<_, Value>(&self.url(HISTORY_CONTINUE_PATH), &body, true)
            .await
        {
            Ok(Value::Null) | Err(ClientError::HttpStatus(_)) => {
                tracing::debug!(character_id, "no conversation to continue, creating one");
                self.create_new_chat(character_id, load_character).await
            }
            Ok(data) => self.open_chat(character_id, &data, load_character).await,
            Err(e) => Err(e),
        }
    }

    /// Public URL of a character avatar image.
    pub fn avatar_url(&self, file_name: &str) -> String {
        avatar_url(self.transport_options().provider.avatar_base_url(), file_name)
    }

    async fn open_chat(&self, character_id: &str, data: &Value, load_character: bool) -> Result<Chat, ClientError> {
        let character = if load_character {
            self.get_character_info(character_id).await?.get("character").cloned()
        } else {
            None
        };
        Chat::from_history(character_id, data, character)
    }
}

#[derive(Debug, Serialize)]
struct HistoryRequest<'a> {
    character_external_id: &'a str,
    history_external_id: Option<&'a str>,
}

/// One open conversation with a character.
#[derive(Debug, Clone)]
pub struct Chat {
    pub character_id: String,
    /// History identifier of this conversation
    pub external_id: String,
    /// Username of the character's participant, the target of sent messages
    pub ai_id: String,
    /// Character description, when requested at open time
    pub character: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    external_id: String,
    participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    is_human: bool,
    user: ParticipantUser,
}

#[derive(Debug, Deserialize)]
struct ParticipantUser {
    username: String,
}

impl Chat {
    /// Build a chat from a create/continue response body.
    pub fn from_history(character_id: &str, data: &Value, character: Option<Value>) -> Result<Self, ClientError> {
        let history = HistoryResponse::deserialize(data)?;
        let ai = history
            .participants
            .into_iter()
            .find(|p| !p.is_human)
            .ok_or(ClientError::MissingField("participants"))?;

        Ok(Self {
            character_id: character_id.to_string(),
            external_id: history.external_id,
            ai_id: ai.user.username,
            character,
        })
    }

    /// Fetch the stored messages of this conversation.
    pub async fn history<T: Transport>(&self, client: &Client<T>) -> Result<Value, ClientError> {
        let url = format!(
            "{}?history_external_id={}",
            client.url(HISTORY_MESSAGES_PATH),
            self.external_id
        );
        client.get_json(&url, true).await
    }

    /// Send a message and stream the character's reply as it is generated.
    ///
    /// Every item carries the full reply text so far; the last one has
    /// `is_final` set.
    pub async fn send_message<T: Transport>(
        &self,
        client: &Client<T>,
        text: &str,
    ) -> Result<impl Stream<Item = Result<Reply, ClientError>> + Send + 'static, ClientError> {
        let body = self.message_body(text);
        let avatar_base = client.transport_options().provider.avatar_base_url().to_string();

        let records = client
            .post_streaming::<_, Value>(&client.url(STREAMING_PATH), &body, true)
            .await?;

        Ok(records.filter_map(move |record| {
            future::ready(match record {
                Ok(Value::Null) => None,
                Ok(value) => Some(
                    StreamingReply::deserialize(value)
                        .map(|reply| reply.into_reply(&avatar_base))
                        .map_err(ClientError::from),
                ),
                Err(e) => Some(Err(e)),
            })
        }))
    }

    fn message_body(&self, text: &str) -> Value {
        json!({
            "history_external_id": self.external_id,
            "character_external_id": self.character_id,
            "text": text,
            "tgt": self.ai_id,
            "ranking_method": "random",
            "faux_chat": false,
            "staging": false,
            "model_server_address": null,
            "override_prefix": null,
            "override_rank": null,
            "rank_candidates": null,
            "filter_candidates": null,
            "prefix_limit": null,
            "prefix_token_limit": null,
            "livetune_coeff": null,
            "stream_params": null,
            "enable_tti": true,
            "initial_timeout": null,
            "insert_beginning": null,
            "translate_candidates": null,
            "stream_every_n_steps": 16,
            "chunks_to_pad": 8,
            "is_proactive": false
        })
    }
}

/// One streamed update of a character's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text generated so far
    pub text: String,
    pub character_name: String,
    pub avatar_url: Option<String>,
    pub is_final: bool,
}

#[derive(Debug, Deserialize)]
struct StreamingReply {
    replies: NonEmpty<ReplyCandidate>,
    src_char: SourceCharacter,
    is_final_chunk: bool,
}

#[derive(Debug, Deserialize)]
struct ReplyCandidate {
    text: String,
}

#[derive(Debug, Deserialize)]
struct SourceCharacter {
    participant: SourceParticipant,
    avatar_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceParticipant {
    name: String,
}

impl StreamingReply {
    fn into_reply(self, avatar_base: &str) -> Reply {
        Reply {
            text: self.replies.head.text,
            character_name: self.src_char.participant.name,
            avatar_url: self
                .src_char
                .avatar_file_name
                .filter(|name| !name.is_empty())
                .map(|name| avatar_url(avatar_base, &name)),
            is_final: self.is_final_chunk,
        }
    }
}

fn avatar_url(base: &str, file_name: &str) -> String {
    format!("{}{}", base, file_name)
}
