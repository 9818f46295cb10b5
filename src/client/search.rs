//! Search / Filter Layer
//!
//! Server-side message search with accumulated pagination, a debounced
//! quick search and a small persisted query history.
//!
//! Each request takes a generation number; a response that arrives after
//! a newer search (or a clear) was started is dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use regex::RegexBuilder;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::client::api::MessagingApi;
use crate::client::error::ClientError;
use crate::shared::config::AppConfig;
use crate::shared::messaging::{ConversationId, MessageType, SearchFilters, SearchResult};

/// File name of the persisted history inside the data directory
pub const HISTORY_FILE: &str = "search_history.json";

/// Default snippet length for result previews
pub const SNIPPET_LEN: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl SearchPagination {
    fn first(per_page: u32) -> Self {
        Self {
            page: 1,
            per_page,
            total: 0,
            total_pages: 0,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn is_first_page(&self) -> bool {
        self.page == 1
    }

    pub fn is_last_page(&self) -> bool {
        self.page >= self.total_pages
    }
}

/// Result of one search call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Blank query: results cleared, nothing sent
    Cleared,
    Loaded { count: usize, has_more: bool },
    /// Superseded by a newer search; response dropped
    Stale,
    /// `load_more` with no further page (or a search in flight)
    NoMorePages,
}

// ========== History ==========

/// Most-recent-first list of unique past queries
#[derive(Debug, Clone)]
pub struct SearchHistory {
    entries: Vec<String>,
    limit: usize,
    path: Option<PathBuf>,
}

impl SearchHistory {
    /// In-memory history
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
            path: None,
        }
    }

    /// History backed by a JSON file; a missing or unreadable file starts
    /// an empty history.
    pub fn load(path: PathBuf, limit: usize) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(mut entries) => {
                    entries.truncate(limit);
                    entries
                }
                Err(e) => {
                    tracing::warn!("[SEARCH] Ignoring corrupt history {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("[SEARCH] Failed to read history {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self {
            entries,
            limit,
            path: Some(path),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Move `query` to the front; blank queries are ignored
    pub fn add(&mut self, query: &str) -> Result<(), ClientError> {
        if query.trim().is_empty() {
            return Ok(());
        }
        self.entries.retain(|q| q != query);
        self.entries.insert(0, query.to_string());
        self.entries.truncate(self.limit);
        self.save()
    }

    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.entries.clear();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ClientError::storage(e.to_string())),
            }
        }
        Ok(())
    }

    /// Past queries containing `input` (case-insensitive); all of them
    /// for blank input
    pub fn suggestions(&self, input: &str) -> Vec<String> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries.clone();
        }
        self.entries
            .iter()
            .filter(|q| q.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    fn save(&self) -> Result<(), ClientError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ClientError::storage(e.to_string()))?;
        }
        let raw = serde_json::to_string(&self.entries)?;
        std::fs::write(path, raw).map_err(|e| ClientError::storage(e.to_string()))
    }
}

// ========== Search ==========

struct SearchState {
    results: Vec<SearchResult>,
    filters: SearchFilters,
    pagination: SearchPagination,
    searching: bool,
    error: Option<String>,
    generation: u64,
}

struct SearchInner {
    api: Arc<dyn MessagingApi>,
    state: RwLock<SearchState>,
    history: RwLock<SearchHistory>,
    per_page: u32,
}

impl SearchInner {
    async fn search(&self, filters: Option<SearchFilters>, page: u32) -> Result<SearchOutcome, ClientError> {
        let (generation, filters) = {
            let mut state = self.state.write().await;
            if let Some(patch) = filters {
                state.filters.merge(patch);
            }
            state.generation += 1;
            if !state.filters.has_query() {
                state.results.clear();
                state.pagination = SearchPagination::first(self.per_page);
                state.searching = false;
                return Ok(SearchOutcome::Cleared);
            }
            state.searching = true;
            state.error = None;
            (state.generation, state.filters.clone())
        };

        let response = self.api.search(&filters, page.max(1), self.per_page).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            tracing::debug!("[SEARCH] Dropping stale results for '{}'", filters.query);
            return Ok(SearchOutcome::Stale);
        }
        state.searching = false;

        match response {
            Ok(response) => {
                let count = response.results.len();
                if page <= 1 {
                    state.results = response.results;
                } else {
                    state.results.extend(response.results);
                }
                state.pagination = SearchPagination {
                    page: response.page,
                    per_page: response.per_page,
                    total: response.total,
                    total_pages: response.total_pages,
                };
                let has_more = state.pagination.has_more_pages();
                drop(state);

                tracing::debug!(
                    "[SEARCH] '{}' page {}: {} results",
                    filters.query,
                    page,
                    count
                );
                if let Err(e) = self.history.write().await.add(&filters.query) {
                    tracing::warn!("[SEARCH] Failed to save history: {}", e);
                }
                Ok(SearchOutcome::Loaded { count, has_more })
            }
            Err(e) => {
                tracing::error!("[SEARCH] Search failed: {}", e);
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

pub struct MessageSearch {
    inner: Arc<SearchInner>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl MessageSearch {
    pub fn new(api: Arc<dyn MessagingApi>, app: &AppConfig, history: SearchHistory) -> Self {
        Self {
            inner: Arc::new(SearchInner {
                api,
                state: RwLock::new(SearchState {
                    results: Vec::new(),
                    filters: SearchFilters::default(),
                    pagination: SearchPagination::first(app.search_page_size),
                    searching: false,
                    error: None,
                    generation: 0,
                }),
                history: RwLock::new(history),
                per_page: app.search_page_size,
            }),
            debounce: Duration::from_millis(app.search_debounce_ms),
            pending: Mutex::new(None),
        }
    }

    /// Search with `filters` merged over the current ones. Page 1
    /// replaces the results, later pages append.
    pub async fn search(&self, filters: Option<SearchFilters>, page: u32) -> Result<SearchOutcome, ClientError> {
        self.inner.search(filters, page).await
    }

    /// Search for `query` after the debounce delay; a newer call cancels
    /// the pending one. A blank query clears immediately.
    pub async fn quick_search(&self, query: impl Into<String>) {
        let query = query.into();
        let mut pending = self.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        if query.trim().is_empty() {
            drop(pending);
            self.clear().await;
            return;
        }

        let inner = self.inner.clone();
        let debounce = self.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = inner.search(Some(SearchFilters::query(query)), 1).await {
                tracing::debug!("[SEARCH] Quick search failed: {}", e);
            }
        }));
    }

    /// Fetch the next page if there is one and no search is running
    pub async fn load_more(&self) -> Result<SearchOutcome, ClientError> {
        let next = {
            let state = self.inner.state.read().await;
            if state.searching || !state.pagination.has_more_pages() {
                return Ok(SearchOutcome::NoMorePages);
            }
            state.pagination.page + 1
        };
        self.search(None, next).await
    }

    pub async fn advanced_search(&self, filters: SearchFilters) -> Result<SearchOutcome, ClientError> {
        self.search(Some(filters), 1).await
    }

    pub async fn search_in_conversation(
        &self,
        conversation_id: ConversationId,
        query: impl Into<String>,
    ) -> Result<SearchOutcome, ClientError> {
        let filters = SearchFilters {
            conversation_id: Some(conversation_id),
            ..SearchFilters::query(query)
        };
        self.search(Some(filters), 1).await
    }

    pub async fn search_by_type(
        &self,
        message_type: MessageType,
        query: impl Into<String>,
    ) -> Result<SearchOutcome, ClientError> {
        let filters = SearchFilters {
            message_type: Some(message_type),
            ..SearchFilters::query(query)
        };
        self.search(Some(filters), 1).await
    }

    pub async fn search_by_date_range(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        query: impl Into<String>,
    ) -> Result<SearchOutcome, ClientError> {
        if date_from > date_to {
            return Err(ClientError::validation("date_from", "start date is after end date"));
        }
        let filters = SearchFilters {
            date_from: Some(date_from),
            date_to: Some(date_to),
            ..SearchFilters::query(query)
        };
        self.search(Some(filters), 1).await
    }

    pub async fn search_with_attachments(&self, query: impl Into<String>) -> Result<SearchOutcome, ClientError> {
        let filters = SearchFilters {
            has_attachments: Some(true),
            ..SearchFilters::query(query)
        };
        self.search(Some(filters), 1).await
    }

    pub async fn search_with_reactions(&self, query: impl Into<String>) -> Result<SearchOutcome, ClientError> {
        let filters = SearchFilters {
            has_reactions: Some(true),
            ..SearchFilters::query(query)
        };
        self.search(Some(filters), 1).await
    }

    /// Reset results, filters and pagination; in-flight responses are
    /// dropped when they arrive.
    pub async fn clear(&self) {
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
        }
        let mut state = self.inner.state.write().await;
        state.generation += 1;
        state.results.clear();
        state.filters = SearchFilters::default();
        state.pagination = SearchPagination::first(self.inner.per_page);
        state.searching = false;
        state.error = None;
    }

    // ========== Queries ==========

    pub async fn results(&self) -> Vec<SearchResult> {
        self.inner.state.read().await.results.clone()
    }

    pub async fn filters(&self) -> SearchFilters {
        self.inner.state.read().await.filters.clone()
    }

    pub async fn pagination(&self) -> SearchPagination {
        self.inner.state.read().await.pagination
    }

    pub async fn is_searching(&self) -> bool {
        self.inner.state.read().await.searching
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.read().await.error.clone()
    }

    pub async fn history(&self) -> Vec<String> {
        self.inner.history.read().await.entries().to_vec()
    }

    pub async fn suggestions(&self, input: &str) -> Vec<String> {
        self.inner.history.read().await.suggestions(input)
    }

    pub async fn clear_history(&self) -> Result<(), ClientError> {
        self.inner.history.write().await.clear()
    }
}

/// Wrap case-insensitive occurrences of `terms` in `<mark>` tags
pub fn highlight_terms(text: &str, terms: &[&str]) -> String {
    let mut escaped: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return text.to_string();
    }
    // Longest first so overlapping terms mark the longer match.
    escaped.sort_by(|a, b| b.len().cmp(&a.len()));

    match RegexBuilder::new(&escaped.join("|"))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern.replace_all(text, "<mark>$0</mark>").into_owned(),
        Err(e) => {
            tracing::warn!("[SEARCH] Bad highlight pattern: {}", e);
            text.to_string()
        }
    }
}

/// Shorten `content` to at most `max_len` characters, cutting at the last
/// word boundary when there is one
pub fn format_snippet(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_len).collect();
    match truncated.rfind(' ') {
        Some(space) if space > 0 => format!("{}...", &truncated[..space]),
        _ => format!("{}...", truncated),
    }
}
