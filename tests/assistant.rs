//! Assistant behavior with scripted chat providers: grounded chat, the
//! degraded paths, insight parsing and session bookkeeping.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docdesk::app::App;
use docdesk::assistant::{Confidence, UserContext};
use docdesk::completion::{ChatProvider, CompletionRequest};
use docdesk::config::Config;
use docdesk::embedding::EmbeddingClient;
use docdesk::error::{Error, Result};
use docdesk::models::{
    Assignment, AssignmentStatus, AssignmentUpdate, NewAssignment, Priority, User,
};
use docdesk::store::memory::InMemoryStore;
use docdesk::store::RecordStore;
use tempfile::TempDir;

/// Replies with a fixed result and records every request.
struct Scripted {
    reply: std::result::Result<String, String>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn last(&self) -> CompletionRequest {
        self.seen.lock().unwrap().last().cloned().expect("no request")
    }
}

#[async_trait]
impl ChatProvider for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        self.reply.clone().map_err(Error::Provider)
    }
}

fn app_over(store: Arc<InMemoryStore>, chat: Option<Arc<Scripted>>) -> App {
    let chat = chat.map(|c| c as Arc<dyn ChatProvider>);
    App::from_store(
        store,
        &Config::with_db_path("unused.sqlite"),
        EmbeddingClient::disabled(4),
        chat,
    )
}

async fn seed_user(store: &InMemoryStore) -> User {
    store.create_user("ada@example.com", "Ada").await.unwrap()
}

async fn seed_assignment(store: &InMemoryStore, user: &User, title: &str) -> Assignment {
    store
        .create_assignment(&NewAssignment {
            title: title.into(),
            description: Some("Summarize Q3 results".into()),
            priority: Priority::High,
            due_date: Some("2026-11-01".into()),
            assignee_id: user.id.clone(),
            project_id: None,
        })
        .await
        .unwrap()
}

fn report_text() -> String {
    "Quarterly report figures are final. ".repeat(60)
}

#[tokio::test]
async fn chat_without_provider_uses_fallback_text() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    seed_assignment(&store, &user, "Quarterly report").await;
    let app = app_over(store, None);

    let answer = app
        .assistant
        .generate_chat_response("What is due?", &UserContext::for_user(user.id))
        .await;

    assert!(answer.response.contains("What is due?"));
    assert!(answer.response.contains("fallback mode"));
    assert_eq!(answer.confidence, Confidence::Medium);
    assert_eq!(answer.context_used.assignments_count, 1);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn chat_sends_grounded_context() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let provider = Scripted::ok("Figures are final.");
    let app = app_over(store, Some(provider.clone()));
    app.ingestor
        .upload(&user.id, "q3-report.txt", "text/plain", report_text().as_bytes())
        .await
        .unwrap();

    let answer = app
        .assistant
        .generate_chat_response("quarterly report", &UserContext::for_user(user.id))
        .await;

    assert_eq!(answer.response, "Figures are final.");
    assert_eq!(answer.confidence, Confidence::High);
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources[0].content_preview.ends_with("..."));
    assert_eq!(answer.sources[0].content_preview.chars().count(), 153);
    assert_eq!(answer.context_used.total_documents, 1);

    let request = provider.last();
    assert!(!request.json);
    assert_eq!(request.max_tokens, 800);
    assert!(request.user.contains("RELEVANT DOCUMENTS:\n1. From 'q3-report.txt': "));
    assert!(request.user.contains("USER HAS 1 DOCUMENTS AVAILABLE:"));
    assert!(request.user.contains("User Question: quarterly report"));
}

#[tokio::test]
async fn anonymous_chat_has_no_context() {
    let provider = Scripted::ok("I don't have access to that data.");
    let app = app_over(Arc::new(InMemoryStore::new()), Some(provider.clone()));

    app.assistant
        .generate_chat_response("hello", &UserContext::default())
        .await;
    assert!(provider
        .last()
        .user
        .contains("No specific documents or context available."));
}

#[tokio::test]
async fn provider_failure_returns_apology() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let app = app_over(store, Some(Scripted::failing("upstream 503: secret detail")));

    let answer = app
        .assistant
        .generate_chat_response("anything", &UserContext::for_user(user.id))
        .await;

    assert_eq!(answer.confidence, Confidence::Low);
    assert!(!answer.response.contains("secret detail"));
    assert!(answer.response.starts_with("I apologize"));
    assert_eq!(answer.context_used.assignments_count, 0);
}

#[tokio::test]
async fn store_failure_returns_apology() {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("docdesk.sqlite"));
    let pool = docdesk::db::connect(&config).await.unwrap();
    docdesk::migrate::run_migrations(&pool).await.unwrap();
    let store = Arc::new(docdesk::store::sqlite::SqliteStore::new(pool.clone()));
    let app = App::from_store(
        store,
        &config,
        EmbeddingClient::disabled(4),
        Some(Scripted::ok("unused") as Arc<dyn ChatProvider>),
    );
    pool.close().await;

    let answer = app
        .assistant
        .generate_chat_response("status?", &UserContext::for_user("u1"))
        .await;
    assert_eq!(answer.confidence, Confidence::Low);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn structured_insights_match_available_documents() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let assignment = seed_assignment(&store, &user, "Quarterly report").await;
    let reply = r#"{
        "relevant_documents": [{"title": "Q3-Report", "reason": "Has the figures", "confidence": "high"}],
        "task_breakdown": [{"task": "Draft summary", "estimated_hours": 3, "priority": "high"}],
        "tips_and_insights": ["Start with the totals"],
        "overall_strategy": "Reuse last quarter's structure."
    }"#;
    let provider = Scripted::ok(reply);
    let app = app_over(store, Some(provider.clone()));
    let doc = app
        .ingestor
        .upload(&user.id, "q3-report.txt", "text/plain", report_text().as_bytes())
        .await
        .unwrap()
        .document;

    let outcome = app
        .assistant
        .generate_assignment_insights(&assignment, &UserContext::for_user(user.id))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.assignment_id, assignment.id);
    let insights = outcome.insights;
    assert_eq!(insights.analysis, "Reuse last quarter's structure.");
    assert_eq!(insights.timeline.len(), 1);
    assert_eq!(insights.timeline[0].estimated_hours, 3.0);
    assert_eq!(insights.document_suggestions[0].document_id, doc.id);
    assert_eq!(insights.document_suggestions[0].relevance_score, 0.9);
    assert_eq!(insights.recommendations, vec!["Start with the totals"]);

    let request = provider.last();
    assert!(request.json);
    assert_eq!(request.max_tokens, 1000);
    assert!(request.user.contains("ASSIGNMENT DETAILS:\n- Title: Quarterly report"));
    assert!(request.user.contains("AVAILABLE DOCUMENTS (1 total):"));
}

#[tokio::test]
async fn unstructured_insights_suggest_each_document_once() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let assignment = seed_assignment(&store, &user, "Quarterly report").await;
    let app = app_over(store, Some(Scripted::ok("Just get started on it.")));
    let doc = app
        .ingestor
        .upload(&user.id, "q3-report.txt", "text/plain", report_text().as_bytes())
        .await
        .unwrap()
        .document;
    assert!(doc.chunk_count > 1);

    let outcome = app
        .assistant
        .generate_assignment_insights(&assignment, &UserContext::for_user(user.id))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.insights.analysis, "Just get started on it.");
    assert_eq!(outcome.insights.document_suggestions.len(), 1);
    assert_eq!(outcome.insights.document_suggestions[0].document_id, doc.id);
    assert_eq!(outcome.insights.document_suggestions[0].relevance_score, 0.8);
    assert_eq!(outcome.insights.recommendations.len(), 3);
}

#[tokio::test]
async fn insights_without_provider_follow_progress() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let assignment = seed_assignment(&store, &user, "Quarterly report").await;
    let assignment = store
        .update_assignment(
            &assignment.id,
            &AssignmentUpdate {
                progress: Some(80),
                status: Some(AssignmentStatus::InProgress),
                ..AssignmentUpdate::default()
            },
        )
        .await
        .unwrap();
    let app = app_over(store, None);

    let outcome = app
        .assistant
        .generate_assignment_insights(&assignment, &UserContext::for_user(user.id))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.insights.timeline.len(), 1);
    assert_eq!(outcome.insights.recommendations.len(), 4);
    assert!(outcome.insights.analysis.starts_with("For 'Quarterly report'"));
}

#[tokio::test]
async fn insights_provider_failure_is_reported() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let assignment = seed_assignment(&store, &user, "Quarterly report").await;
    let app = app_over(store, Some(Scripted::failing("rate limited")));

    let outcome = app
        .assistant
        .generate_assignment_insights(&assignment, &UserContext::for_user(user.id))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("AI provider unavailable"));
    assert!(outcome.insights.document_suggestions.is_empty());
    assert_eq!(outcome.insights.timeline.len(), 4);
}

#[tokio::test]
async fn conversations_group_into_sessions() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    let app = app_over(store, Some(Scripted::ok("ok")));

    let first = app.assistant.converse(&user.id, "First question", None).await;
    let second = app
        .assistant
        .converse(&user.id, "Follow-up", Some(&first.session_id))
        .await;
    assert_eq!(first.session_id, second.session_id);
    let other = app.assistant.converse(&user.id, "New topic", None).await;
    assert_ne!(other.session_id, first.session_id);

    let sessions = app.assistant.chat_sessions(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 2);
    let thread = sessions
        .iter()
        .find(|s| s.session_id == first.session_id)
        .unwrap();
    assert_eq!(thread.message_count, 2);
    assert_eq!(thread.first_message, "First question");

    let history = app
        .assistant
        .chat_history(&user.id, Some(&first.session_id), 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);

    assert_eq!(
        app.assistant
            .delete_session(&user.id, &first.session_id)
            .await
            .unwrap(),
        2
    );
    let err = app
        .assistant
        .delete_session(&user.id, &first.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn suggestions_reflect_user_records() {
    let store = Arc::new(InMemoryStore::new());
    let user = seed_user(&store).await;
    seed_assignment(&store, &user, "One").await;
    seed_assignment(&store, &user, "Two").await;
    let app = app_over(store, None);

    let personal = app
        .assistant
        .chat_suggestions(&UserContext::for_user(user.id.clone()))
        .await;
    assert_eq!(personal.len(), 4);
    assert_eq!(personal[3], "Show me my 2 pending assignments");

    app.ingestor
        .upload(&user.id, "notes.txt", "text/plain", b"Some notes")
        .await
        .unwrap();
    let personal = app
        .assistant
        .chat_suggestions(&UserContext::for_user(user.id))
        .await;
    assert_eq!(personal.len(), 6);

    let anonymous = app.assistant.chat_suggestions(&UserContext::default()).await;
    assert_eq!(anonymous.len(), 3);
}
