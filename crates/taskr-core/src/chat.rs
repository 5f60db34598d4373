//! Chat turn orchestration.
//!
//! One turn runs `LOADING_CONTEXT -> MODEL_CALL_1 -> (TOOLS? ->
//! MODEL_CALL_2) -> PERSIST -> RESPONSE`. Any failure before PERSIST aborts
//! the turn without writing history, so an errored turn leaves no trace.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::Database;
use crate::dispatch::{ToolCallRecord, ToolDispatcher};
use crate::error::{Error, Result};
use crate::model::{ASSISTANT_PREAMBLE, LanguageModel, TranscriptMessage};
use crate::models::{Conversation, Message, MessageRole};

/// Inbound chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// Final response for one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

/// Drives chat turns: conversation continuity, the two model calls,
/// sequential tool dispatch, and transactional persistence.
pub struct ChatService<M> {
    db: Arc<Database>,
    dispatcher: ToolDispatcher,
    model: M,
    history_limit: i64,
}

impl<M: LanguageModel> ChatService<M> {
    pub fn new(db: Arc<Database>, dispatcher: ToolDispatcher, model: M, history_limit: i64) -> Self {
        Self {
            db,
            dispatcher,
            model,
            history_limit,
        }
    }

    /// Process one chat turn for the authenticated owner.
    pub async fn handle_turn(&self, owner_id: &str, request: ChatRequest) -> Result<ChatResponse> {
        let conversation = self.load_conversation(owner_id, request.conversation_id).await?;

        let history = self
            .db
            .recent_messages(conversation.id, self.history_limit)
            .await?;
        let transcript: Vec<TranscriptMessage> = history
            .iter()
            .map(|m| TranscriptMessage {
                role: m.role,
                message: m.content.clone(),
            })
            .collect();
        debug!(
            conversation = %conversation.id,
            history = transcript.len(),
            "context loaded"
        );

        let reply = self
            .model
            .chat(&request.message, &transcript, ASSISTANT_PREAMBLE)
            .await?;

        let mut records: Vec<ToolCallRecord> = Vec::new();
        let final_text = if reply.tool_calls.is_empty() {
            reply.text
        } else {
            info!(
                conversation = %conversation.id,
                tools = reply.tool_calls.len(),
                "executing tool calls"
            );
            // Sequential, in the model's emission order: later calls may
            // depend conceptually on earlier results.
            for call in &reply.tool_calls {
                let result = self
                    .dispatcher
                    .dispatch(owner_id, &call.name, &call.parameters)
                    .await;
                records.push(ToolCallRecord {
                    name: call.name.clone(),
                    parameters: call.parameters.clone(),
                    result,
                });
            }

            self.model
                .respond(&request.message, &records, ASSISTANT_PREAMBLE)
                .await?
        };

        let user_message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: MessageRole::User,
            content: request.message,
            tool_calls: None,
            created_at: Utc::now(),
        };
        let assistant_message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            role: MessageRole::Assistant,
            content: final_text.clone(),
            tool_calls: if records.is_empty() {
                None
            } else {
                Some(serde_json::to_value(&records)?)
            },
            created_at: Utc::now(),
        };

        self.db
            .append_turn(conversation.id, &user_message, &assistant_message)
            .await?;

        Ok(ChatResponse {
            message: final_text,
            tool_calls: records,
            conversation_id: conversation.id,
            message_id: assistant_message.id,
        })
    }

    /// Resolve an explicit conversation id or lazily create a fresh one.
    /// An unknown or foreign id fails the turn.
    async fn load_conversation(
        &self,
        owner_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation> {
        match conversation_id {
            Some(id) => self
                .db
                .get_conversation(owner_id, id)
                .await?
                .ok_or_else(|| Error::NotFound("Conversation not found".to_string())),
            None => self.db.create_conversation(owner_id).await,
        }
    }
}
