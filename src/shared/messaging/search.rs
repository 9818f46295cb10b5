//! Message search request/response types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageType};
use super::{ConversationId, UserId};

/// Filters accepted by `GET /api/messages/search`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_reactions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,
}

impl SearchFilters {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Overlay the fields set in `patch` onto these filters.
    ///
    /// The query is always taken from the patch.
    pub fn merge(&mut self, patch: SearchFilters) {
        self.query = patch.query;
        if patch.conversation_id.is_some() {
            self.conversation_id = patch.conversation_id;
        }
        if patch.sender_id.is_some() {
            self.sender_id = patch.sender_id;
        }
        if patch.message_type.is_some() {
            self.message_type = patch.message_type;
        }
        if patch.date_from.is_some() {
            self.date_from = patch.date_from;
        }
        if patch.date_to.is_some() {
            self.date_to = patch.date_to;
        }
        if patch.has_attachments.is_some() {
            self.has_attachments = patch.has_attachments;
        }
        if patch.has_reactions.is_some() {
            self.has_reactions = patch.has_reactions;
        }
        if patch.is_edited.is_some() {
            self.is_edited = patch.is_edited;
        }
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// Query string sent to the search endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SearchParams<'a> {
    #[serde(flatten)]
    pub filters: &'a SearchFilters,
    pub page: u32,
    pub per_page: u32,
}

/// Messages surrounding a hit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchContext {
    #[serde(default)]
    pub before: Vec<Message>,
    #[serde(default)]
    pub after: Vec<Message>,
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub message: Message,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub context: SearchContext,
}

/// Page of search hits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}
