//! Retrieval-augmented chat and assignment insights.
//!
//! [`Assistant`] merges retrieved chunks with the user's assignments and
//! documents into a bounded context block, sends it to the chat provider
//! and shapes the reply.
//!
//! # Degraded modes
//!
//! | Situation | Chat | Insights |
//! |-----------|------|----------|
//! | no chat provider | canned message echoing the question | rule-based insights, `success = true` |
//! | store or provider error | fixed apology, confidence `low` | rule-based insights without suggestions, `success = false` |
//! | reply is not the requested JSON | n/a | [`InsightReply::Unstructured`] path |
//!
//! No path returns raw error text to the user; errors are logged and
//! reduced to [`Error::summary`](crate::error::Error::summary).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::completion::{ChatProvider, CompletionRequest};
use crate::config::ChatConfig;
use crate::error::{truncate_chars, Error, Result};
use crate::models::{
    Assignment, AssignmentStatus, ChatExchange, ChatSession, ChunkMatch, Document, SourceRef,
};
use crate::retrieval::Retriever;
use crate::store::RecordStore;

const CHUNK_EXCERPT_CHARS: usize = 300;
const INSIGHT_EXCERPT_CHARS: usize = 200;
const SOURCE_PREVIEW_CHARS: usize = 150;
const DESCRIPTION_CHARS: usize = 100;
const MAX_CONTEXT_ASSIGNMENTS: usize = 5;
const MAX_CONTEXT_DOCUMENTS: usize = 5;
const MAX_INSIGHT_DOCUMENTS: usize = 10;
const MAX_INSIGHT_EXCERPTS: usize = 3;
const MAX_ANALYSIS_CHARS: usize = 500;
const MAX_SUGGESTIONS: usize = 6;

const NO_CONTEXT: &str = "No specific documents or context available.";

const APOLOGY: &str = "I apologize, but I encountered an error processing your request. \
                       Please try again in a moment.";

const CHAT_SYSTEM_PROMPT: &str = "\
You are the assistant for docdesk, a document and assignment workspace. You help users with:
1. Finding information in their documents
2. Managing assignments and tasks
3. Organizing their work
4. Answering questions based on their uploaded documents

IMPORTANT INSTRUCTIONS:
- When users ask about assignments or tasks, use the assignments listed in the context and give specific details
- When users ask about documents, list the actual files from the context with their names and details
- When users ask about due dates, check the due dates of the listed assignments
- Be helpful, concise and specific. Always use the provided context data.
- If the context says \"No specific documents or context available.\", say that you don't have access to that data.";

const INSIGHTS_SYSTEM_PROMPT: &str = "\
You are an assignment assistant that helps users complete their tasks efficiently.

Analyze the assignment and provide:
1. RELEVANT DOCUMENTS: which of the user's uploaded documents will help with this assignment
2. TASK BREAKDOWN: a timeline of specific, actionable subtasks
3. TIPS & INSIGHTS: strategic advice for completing the assignment

Be specific and practical. Answer with a single JSON object.";

const INSIGHTS_JSON_SHAPE: &str = r#"{
    "relevant_documents": [
        {"title": "Document name", "reason": "Why this document is relevant", "confidence": "high/medium/low"}
    ],
    "task_breakdown": [
        {"task": "Specific task description", "estimated_hours": 2, "deadline_suggestion": "X days before due date", "priority": "high/medium/low"}
    ],
    "tips_and_insights": ["Practical tip", "Strategic advice", "Resource suggestion"],
    "overall_strategy": "Brief paragraph summarizing the best approach to complete this assignment"
}"#;

// ============ Types ============

/// Who is asking. Without a user id, no personal records are consulted.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: Option<String>,
}

impl UserContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextUsed {
    pub documents_found: usize,
    pub assignments_count: usize,
    pub total_documents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub context_used: ContextUsed,
    pub confidence: Confidence,
}

impl ChatAnswer {
    fn apology() -> Self {
        Self {
            response: APOLOGY.to_string(),
            sources: Vec::new(),
            context_used: ContextUsed::default(),
            confidence: Confidence::Low,
        }
    }
}

/// A chat answer that has been appended to a session.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub exchange_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub answer: ChatAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineStep {
    pub step: String,
    pub estimated_hours: f64,
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSuggestion {
    pub document_id: String,
    pub title: String,
    pub relevance_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub analysis: String,
    pub timeline: Vec<TimelineStep>,
    pub document_suggestions: Vec<DocumentSuggestion>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsOutcome {
    pub success: bool,
    pub insights: Insights,
    pub assignment_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============ Reply parsing ============

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SuggestedDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlannedTask {
    #[serde(default)]
    pub task: Option<String>,
    /// Models send numbers, numeric strings and ranges; see [`PlannedTask::hours`].
    #[serde(default)]
    pub estimated_hours: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl PlannedTask {
    fn hours(&self) -> f64 {
        match &self.estimated_hours {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(2.0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(2.0),
            _ => 2.0,
        }
    }
}

/// The JSON shape requested from the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParsedInsights {
    #[serde(default)]
    pub relevant_documents: Vec<SuggestedDocument>,
    #[serde(default)]
    pub task_breakdown: Vec<PlannedTask>,
    #[serde(default)]
    pub tips_and_insights: Vec<String>,
    #[serde(default)]
    pub overall_strategy: Option<String>,
}

/// A model reply to an insights request, classified once.
#[derive(Debug, Clone, PartialEq)]
pub enum InsightReply {
    Structured(ParsedInsights),
    Unstructured(String),
}

impl InsightReply {
    /// Classify a reply. A surrounding Markdown code fence is ignored; any
    /// reply that is not a JSON object of the requested shape is
    /// `Unstructured`.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) if value.is_object() => match serde_json::from_value(value) {
                Ok(parsed) => InsightReply::Structured(parsed),
                Err(_) => InsightReply::Unstructured(raw.to_string()),
            },
            _ => InsightReply::Unstructured(raw.to_string()),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============ Rule-based pieces ============

/// Milestones still ahead for an assignment at `progress` percent.
pub fn basic_timeline(progress: u8) -> Vec<TimelineStep> {
    let step = |name: &str, hours: f64, priority: &str| TimelineStep {
        step: name.to_string(),
        estimated_hours: hours,
        priority: priority.to_string(),
    };
    let mut timeline = Vec::new();
    if progress < 25 {
        timeline.push(step("Research and gather materials", 2.0, "high"));
    }
    if progress < 50 {
        timeline.push(step("Create outline and plan approach", 1.0, "high"));
    }
    if progress < 75 {
        timeline.push(step("Execute main work/development", 4.0, "high"));
    }
    timeline.push(step("Review, test, and finalize", 2.0, "medium"));
    timeline
}

fn chunk_suggestions(chunks: &[ChunkMatch]) -> Vec<DocumentSuggestion> {
    chunks
        .iter()
        .map(|c| DocumentSuggestion {
            document_id: c.document_id.clone(),
            title: c.document_title.clone(),
            relevance_score: 0.8,
            reason: "Contains relevant content for this assignment".to_string(),
        })
        .collect()
}

fn fallback_insights(assignment: &Assignment, chunks: &[ChunkMatch]) -> Insights {
    Insights {
        analysis: format!(
            "For '{}', focus on systematic planning and execution. Use available resources \
             and maintain steady progress toward the due date.",
            assignment.title
        ),
        timeline: basic_timeline(assignment.progress),
        document_suggestions: chunk_suggestions(chunks),
        recommendations: vec![
            "Break down the assignment into smaller tasks".to_string(),
            "Review any relevant uploaded documents".to_string(),
            "Set intermediate deadlines to track progress".to_string(),
            "Start with research and planning phase".to_string(),
        ],
    }
}

fn structured_insights(parsed: ParsedInsights, documents: &[Document]) -> Insights {
    let timeline = parsed
        .task_breakdown
        .iter()
        .map(|t| TimelineStep {
            step: t.task.clone().unwrap_or_else(|| "Unknown task".to_string()),
            estimated_hours: t.hours(),
            priority: t.priority.clone().unwrap_or_else(|| "medium".to_string()),
        })
        .collect();

    let mut suggestions: Vec<DocumentSuggestion> = Vec::new();
    for doc in &parsed.relevant_documents {
        let title = doc.title.clone().unwrap_or_default();
        let needle = title.to_lowercase();
        let matched = (!needle.is_empty())
            .then(|| {
                documents
                    .iter()
                    .find(|d| d.title.to_lowercase().contains(&needle))
            })
            .flatten();
        let relevance_score = match doc.confidence.as_deref() {
            Some("high") => 0.9,
            Some("low") => 0.5,
            _ => 0.7,
        };
        suggestions.push(DocumentSuggestion {
            document_id: matched
                .map(|d| d.id.clone())
                .unwrap_or_else(|| format!("doc_{}", suggestions.len())),
            title: if title.is_empty() {
                "Unknown Document".to_string()
            } else {
                title
            },
            relevance_score,
            reason: doc
                .reason
                .clone()
                .unwrap_or_else(|| "Relevant to assignment requirements".to_string()),
        });
    }

    Insights {
        analysis: parsed
            .overall_strategy
            .unwrap_or_else(|| "No analysis available".to_string()),
        timeline,
        document_suggestions: suggestions,
        recommendations: parsed.tips_and_insights,
    }
}

fn unstructured_insights(raw: &str, assignment: &Assignment, chunks: &[ChunkMatch]) -> Insights {
    let analysis = if raw.chars().count() > MAX_ANALYSIS_CHARS {
        format!("{}...", truncate_chars(raw, MAX_ANALYSIS_CHARS))
    } else {
        raw.to_string()
    };
    Insights {
        analysis,
        timeline: basic_timeline(assignment.progress),
        document_suggestions: chunk_suggestions(chunks),
        recommendations: vec![
            "Review relevant documents before starting".to_string(),
            "Break the task into smaller, manageable parts".to_string(),
            "Set intermediate deadlines to track progress".to_string(),
        ],
    }
}

// ============ Context block ============

fn build_context_block(
    chunks: &[ChunkMatch],
    assignments: &[Assignment],
    documents: &[Document],
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !chunks.is_empty() {
        parts.push("RELEVANT DOCUMENTS:".to_string());
        for (i, c) in chunks.iter().enumerate() {
            parts.push(format!(
                "{}. From '{}': {}...",
                i + 1,
                c.document_title,
                truncate_chars(&c.content, CHUNK_EXCERPT_CHARS)
            ));
        }
        parts.push(String::new());
    }

    if !assignments.is_empty() {
        parts.push(format!("USER HAS {} ASSIGNMENTS:", assignments.len()));
        for a in assignments.iter().take(MAX_CONTEXT_ASSIGNMENTS) {
            parts.push(format!("- **{}** ({})", a.title, a.status.as_str()));
            parts.push(format!(
                "  Priority: {} | Progress: {}% | Due: {}",
                a.priority.as_str(),
                a.progress,
                a.due_date.as_deref().unwrap_or("No due date")
            ));
            if let Some(description) = a.description.as_deref().filter(|d| !d.trim().is_empty()) {
                parts.push(format!(
                    "  Description: {}...",
                    truncate_chars(description, DESCRIPTION_CHARS)
                ));
            }
        }
        parts.push(String::new());
    }

    if !documents.is_empty() {
        parts.push(format!("USER HAS {} DOCUMENTS AVAILABLE:", documents.len()));
        for d in documents.iter().take(MAX_CONTEXT_DOCUMENTS) {
            let size = if d.file_size > 0 {
                format!("{:.1}", d.file_size as f64 / 1024.0)
            } else {
                "Unknown".to_string()
            };
            parts.push(format!(
                "- **{}** ({}) - {}KB, uploaded {}",
                d.title,
                d.file_type,
                size,
                d.created_at.format("%Y-%m-%d")
            ));
        }
        parts.push(String::new());
    }

    if parts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        parts.join("\n")
    }
}

fn build_insights_prompt(
    assignment: &Assignment,
    documents: &[Document],
    chunks: &[ChunkMatch],
) -> String {
    let mut prompt = String::from("Analyze this assignment and provide insights:\n\n");
    prompt.push_str("ASSIGNMENT DETAILS:\n");
    prompt.push_str(&format!("- Title: {}\n", assignment.title));
    prompt.push_str(&format!(
        "- Description: {}\n",
        assignment
            .description
            .as_deref()
            .unwrap_or("No description provided")
    ));
    prompt.push_str(&format!("- Status: {}\n", assignment.status.as_str()));
    prompt.push_str(&format!("- Priority: {}\n", assignment.priority.as_str()));
    prompt.push_str(&format!(
        "- Due Date: {}\n",
        assignment.due_date.as_deref().unwrap_or("No due date")
    ));
    prompt.push_str(&format!("- Progress: {}%\n", assignment.progress));

    if !documents.is_empty() {
        prompt.push_str(&format!(
            "\nAVAILABLE DOCUMENTS ({} total):\n",
            documents.len()
        ));
        for d in documents.iter().take(MAX_INSIGHT_DOCUMENTS) {
            prompt.push_str(&format!("- {} ({})\n", d.title, d.file_type));
        }
    }

    if !chunks.is_empty() {
        prompt.push_str("\nRELEVANT DOCUMENT CONTENT:\n");
        for (i, c) in chunks.iter().take(MAX_INSIGHT_EXCERPTS).enumerate() {
            prompt.push_str(&format!(
                "{}. From '{}': {}...\n",
                i + 1,
                c.document_title,
                truncate_chars(&c.content, INSIGHT_EXCERPT_CHARS)
            ));
        }
    }

    prompt.push_str("\nRespond with a JSON object of this structure:\n");
    prompt.push_str(INSIGHTS_JSON_SHAPE);
    prompt.push_str("\n\nFocus on being practical and specific to this assignment.");
    prompt
}

// ============ Assistant ============

#[derive(Clone)]
pub struct Assistant {
    records: Arc<dyn RecordStore>,
    retriever: Retriever,
    chat: Option<Arc<dyn ChatProvider>>,
    config: ChatConfig,
}

impl Assistant {
    pub fn new(
        records: Arc<dyn RecordStore>,
        retriever: Retriever,
        chat: Option<Arc<dyn ChatProvider>>,
        config: ChatConfig,
    ) -> Self {
        Self {
            records,
            retriever,
            chat,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.chat.is_some()
    }

    /// Answer `message` using retrieved chunks and the user's records.
    /// Never fails; see the module docs for the degraded paths.
    pub async fn generate_chat_response(&self, message: &str, user: &UserContext) -> ChatAnswer {
        info!(
            user_id = user.user_id.as_deref().unwrap_or("-"),
            message = %truncate_chars(message, 50),
            "Generating chat response"
        );
        match self.try_chat_response(message, user).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Chat response failed");
                ChatAnswer::apology()
            }
        }
    }

    async fn try_chat_response(&self, message: &str, user: &UserContext) -> Result<ChatAnswer> {
        let limit = self.retriever.config().chat_chunk_limit;
        let chunks = self.retriever.search_similar_chunks(message, limit).await;

        let (assignments, documents) = match user.user_id.as_deref() {
            Some(id) => (
                self.records.list_assignments(id).await?,
                self.records.list_documents(id).await?,
            ),
            None => (Vec::new(), Vec::new()),
        };

        let context = build_context_block(&chunks, &assignments, &documents);

        let response = match &self.chat {
            Some(provider) => {
                let request = CompletionRequest {
                    system: CHAT_SYSTEM_PROMPT.to_string(),
                    user: format!(
                        "Context:\n{}\n\nUser Question: {}\n\nPlease provide a helpful response \
                         based on the available context and documents.",
                        context, message
                    ),
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                    json: false,
                };
                info!(model = provider.model_name(), "Requesting chat completion");
                provider.complete(&request).await?
            }
            None => {
                warn!("Chat provider not available, returning fallback response");
                format!(
                    "I understand you're asking: '{}'. However, I'm currently running in fallback \
                     mode without AI capabilities. Please check the API key configuration.",
                    message
                )
            }
        };

        let sources = chunks
            .iter()
            .map(|c| SourceRef {
                document_title: c.document_title.clone(),
                content_preview: format!("{}...", truncate_chars(&c.content, SOURCE_PREVIEW_CHARS)),
                file_type: c.file_type.clone(),
            })
            .collect();

        Ok(ChatAnswer {
            response,
            sources,
            context_used: ContextUsed {
                documents_found: chunks.len(),
                assignments_count: assignments.len(),
                total_documents: documents.len(),
            },
            confidence: if chunks.is_empty() {
                Confidence::Medium
            } else {
                Confidence::High
            },
        })
    }

    /// Produce a plan, document suggestions and tips for an assignment.
    pub async fn generate_assignment_insights(
        &self,
        assignment: &Assignment,
        user: &UserContext,
    ) -> InsightsOutcome {
        let generated_at = Utc::now();
        match self.try_insights(assignment, user).await {
            Ok(insights) => {
                info!(assignment_id = %assignment.id, "Generated assignment insights");
                InsightsOutcome {
                    success: true,
                    insights,
                    assignment_id: assignment.id.clone(),
                    generated_at,
                    error: None,
                }
            }
            Err(e) => {
                error!(assignment_id = %assignment.id, error = %e, "Insight generation failed");
                InsightsOutcome {
                    success: false,
                    insights: fallback_insights(assignment, &[]),
                    assignment_id: assignment.id.clone(),
                    generated_at,
                    error: Some(e.summary()),
                }
            }
        }
    }

    async fn try_insights(&self, assignment: &Assignment, user: &UserContext) -> Result<Insights> {
        let documents = match user.user_id.as_deref() {
            Some(id) => self.records.list_documents(id).await?,
            None => Vec::new(),
        };

        let limit = self.retriever.config().insight_chunk_limit;
        let queries = std::iter::once(assignment.title.as_str())
            .chain(assignment.description.as_deref())
            .filter(|q| q.trim().chars().count() > 3);

        let mut seen_docs: HashSet<String> = HashSet::new();
        let mut chunks: Vec<ChunkMatch> = Vec::new();
        for query in queries {
            for hit in self.retriever.search_similar_chunks(query, limit).await {
                if seen_docs.insert(hit.document_id.clone()) {
                    chunks.push(hit);
                }
            }
        }

        let Some(provider) = &self.chat else {
            warn!("Chat provider not available, returning rule-based insights");
            return Ok(fallback_insights(assignment, &chunks));
        };

        let request = CompletionRequest {
            system: INSIGHTS_SYSTEM_PROMPT.to_string(),
            user: build_insights_prompt(assignment, &documents, &chunks),
            max_tokens: self.config.insight_max_tokens,
            temperature: self.config.temperature,
            json: true,
        };
        info!(
            model = provider.model_name(),
            assignment_id = %assignment.id,
            "Requesting insights"
        );
        let raw = provider.complete(&request).await?;

        Ok(match InsightReply::parse(&raw) {
            InsightReply::Structured(parsed) => structured_insights(parsed, &documents),
            InsightReply::Unstructured(text) => {
                warn!(assignment_id = %assignment.id, "Insight reply was not valid JSON");
                unstructured_insights(&text, assignment, &chunks)
            }
        })
    }

    /// Answer a message and append it to a session, starting a new session
    /// when `session_id` is `None`. A failed save is logged, not returned.
    pub async fn converse(
        &self,
        user_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> ChatTurn {
        let answer = self
            .generate_chat_response(message, &UserContext::for_user(user_id))
            .await;
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let exchange = ChatExchange {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            response: answer.response.clone(),
            sources: answer.sources.clone(),
            session_id: session_id.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.records.save_exchange(&exchange).await {
            error!(user_id, session_id = %session_id, error = %e, "Failed to save chat exchange");
        }

        ChatTurn {
            exchange_id: exchange.id,
            session_id,
            answer,
        }
    }

    pub async fn chat_history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatExchange>> {
        self.records.chat_history(user_id, session_id, limit).await
    }

    /// A user's sessions, most recently active first.
    pub async fn chat_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        self.records.chat_sessions(user_id).await
    }

    /// Remove a session. `NotFound` if the user has no such session.
    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<u64> {
        let removed = self.records.delete_session(user_id, session_id).await?;
        if removed == 0 {
            return Err(Error::NotFound(format!("chat session {}", session_id)));
        }
        info!(user_id, session_id, removed, "Deleted chat session");
        Ok(removed)
    }

    /// Prompt suggestions tailored to the user's records, at most six.
    pub async fn chat_suggestions(&self, user: &UserContext) -> Vec<String> {
        match self.try_suggestions(user).await {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "Failed to build chat suggestions");
                vec![
                    "What can you help me with?".to_string(),
                    "Show me my assignments".to_string(),
                    "Help me find documents".to_string(),
                ]
            }
        }
    }

    async fn try_suggestions(&self, user: &UserContext) -> Result<Vec<String>> {
        let mut suggestions = vec![
            "What documents do I have?".to_string(),
            "Help me organize my work".to_string(),
            "What should I focus on today?".to_string(),
        ];

        if let Some(id) = user.user_id.as_deref() {
            let assignments = self.records.list_assignments(id).await?;
            let documents = self.records.list_documents(id).await?;

            let todo = assignments
                .iter()
                .filter(|a| a.status == AssignmentStatus::Todo)
                .count();
            if todo > 0 {
                suggestions.push(format!("Show me my {} pending assignments", todo));
            }
            let active = assignments
                .iter()
                .filter(|a| a.status == AssignmentStatus::InProgress)
                .count();
            if active > 0 {
                suggestions.push(format!("What's the status of my {} active tasks?", active));
            }

            if !documents.is_empty() {
                suggestions.extend([
                    "Search through my uploaded documents".to_string(),
                    "What are my most recent documents?".to_string(),
                    "Summarize my document collection".to_string(),
                ]);
            }
        }

        suggestions.truncate(MAX_SUGGESTIONS);
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchOrigin, Metadata, Priority};

    fn assignment(progress: u8) -> Assignment {
        Assignment {
            id: "a1".into(),
            title: "Quarterly report".into(),
            description: Some("Summarize Q3 results".into()),
            status: AssignmentStatus::InProgress,
            priority: Priority::High,
            progress,
            due_date: Some("2026-11-01".into()),
            assignee_id: "u1".into(),
            project_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn hit(doc: &str, title: &str, content: &str) -> ChunkMatch {
        ChunkMatch {
            id: format!("{}-c", doc),
            document_id: doc.into(),
            content: content.into(),
            metadata: Metadata::new(),
            document_title: title.into(),
            file_type: "text/plain".into(),
            similarity: 0.8,
            origin: MatchOrigin::Keyword,
        }
    }

    #[test]
    fn timeline_at_eighty_percent_has_one_step() {
        let timeline = basic_timeline(80);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].step, "Review, test, and finalize");
        assert_eq!(timeline[0].priority, "medium");
    }

    #[test]
    fn timeline_thresholds() {
        assert_eq!(basic_timeline(0).len(), 4);
        assert_eq!(basic_timeline(25).len(), 3);
        assert_eq!(basic_timeline(50).len(), 2);
        assert_eq!(basic_timeline(74).len(), 2);
        assert_eq!(basic_timeline(75).len(), 1);
    }

    #[test]
    fn fenced_json_is_structured() {
        let raw = "```json\n{\"overall_strategy\": \"Start early\", \"tips_and_insights\": [\"a\"]}\n```";
        match InsightReply::parse(raw) {
            InsightReply::Structured(p) => {
                assert_eq!(p.overall_strategy.as_deref(), Some("Start early"));
                assert_eq!(p.tips_and_insights, vec!["a"]);
            }
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[test]
    fn prose_and_arrays_are_unstructured() {
        assert!(matches!(
            InsightReply::parse("Sure! Here is my plan."),
            InsightReply::Unstructured(_)
        ));
        assert!(matches!(
            InsightReply::parse("[]"),
            InsightReply::Unstructured(_)
        ));
    }

    #[test]
    fn task_hours_accept_strings() {
        let parsed: ParsedInsights = serde_json::from_str(
            r#"{"task_breakdown": [{"task": "Draft", "estimated_hours": "3"}, {"estimated_hours": "2-3"}]}"#,
        )
        .unwrap();
        let insights = structured_insights(parsed, &[]);
        assert_eq!(insights.timeline[0].estimated_hours, 3.0);
        assert_eq!(insights.timeline[1].step, "Unknown task");
        assert_eq!(insights.timeline[1].estimated_hours, 2.0);
        assert_eq!(insights.analysis, "No analysis available");
    }

    #[test]
    fn unmatched_suggestions_get_positional_ids() {
        let parsed = ParsedInsights {
            relevant_documents: vec![
                SuggestedDocument {
                    title: Some("Missing".into()),
                    reason: None,
                    confidence: Some("high".into()),
                },
                SuggestedDocument {
                    title: Some("Other".into()),
                    reason: None,
                    confidence: Some("low".into()),
                },
            ],
            ..ParsedInsights::default()
        };
        let insights = structured_insights(parsed, &[]);
        assert_eq!(insights.document_suggestions[0].document_id, "doc_0");
        assert_eq!(insights.document_suggestions[0].relevance_score, 0.9);
        assert_eq!(insights.document_suggestions[1].document_id, "doc_1");
        assert_eq!(insights.document_suggestions[1].relevance_score, 0.5);
    }

    #[test]
    fn unstructured_analysis_is_truncated() {
        let raw = "x".repeat(600);
        let insights = unstructured_insights(&raw, &assignment(10), &[hit("d1", "Doc", "text")]);
        assert_eq!(insights.analysis.chars().count(), 503);
        assert!(insights.analysis.ends_with("..."));
        assert_eq!(insights.document_suggestions[0].document_id, "d1");
        assert_eq!(insights.recommendations.len(), 3);
    }

    #[test]
    fn empty_context_block_says_so() {
        assert_eq!(build_context_block(&[], &[], &[]), NO_CONTEXT);
    }

    #[test]
    fn context_block_lists_chunks_and_assignments() {
        let block = build_context_block(
            &[hit("d1", "Budget", "Travel is capped")],
            &[assignment(40)],
            &[],
        );
        assert!(block.starts_with("RELEVANT DOCUMENTS:\n1. From 'Budget': Travel is capped..."));
        assert!(block.contains("USER HAS 1 ASSIGNMENTS:"));
        assert!(block.contains("- **Quarterly report** (in-progress)"));
        assert!(block.contains("  Priority: high | Progress: 40% | Due: 2026-11-01"));
        assert!(block.contains("  Description: Summarize Q3 results..."));
    }
}
