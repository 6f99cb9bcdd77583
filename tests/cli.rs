use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docdesk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docdesk"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/docdesk.sqlite"

[chunking]
chunk_size = 400
chunk_overlap = 50

[embedding]
provider = "disabled"

[chat]
provider = "disabled"
"#,
        root.display()
    );

    let config_path = config_dir.join("docdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docdesk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docdesk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docdesk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn add_user(config_path: &Path) -> String {
    let (stdout, stderr, success) = run_docdesk(
        config_path,
        &["user", "add", "--email", "ada@example.com", "--name", "Ada"],
    );
    assert!(success, "user add failed: {}", stderr);
    stdout.trim().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docdesk(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docdesk.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_docdesk(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_docdesk(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docdesk(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_duplicate_email_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    add_user(&config_path);

    let (_, stderr, success) = run_docdesk(
        &config_path,
        &["user", "add", "--email", "ada@example.com", "--name", "Again"],
    );
    assert!(!success);
    assert!(stderr.contains("Conflict"), "stderr: {}", stderr);
}

#[test]
fn test_upload_then_search() {
    let (tmp, config_path) = setup_test_env();
    let user = add_user(&config_path);

    let alpha = tmp.path().join("files/alpha.md");
    let (stdout, stderr, success) = run_docdesk(
        &config_path,
        &["upload", alpha.to_str().unwrap(), "--user", &user],
    );
    assert!(success, "upload failed: {}", stderr);
    assert!(stdout.contains("\"status\": \"completed\""), "got: {}", stdout);

    let (stdout, _, success) = run_docdesk(&config_path, &["search", "Rust programming"]);
    assert!(success, "search failed");
    assert!(stdout.contains("alpha.md"), "Expected alpha.md in results, got: {}", stdout);

    let (stdout, _, _) = run_docdesk(&config_path, &["search", "kubernetes"]);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_document_list_and_delete() {
    let (tmp, config_path) = setup_test_env();
    let user = add_user(&config_path);

    let gamma = tmp.path().join("files/gamma.txt");
    run_docdesk(
        &config_path,
        &["upload", gamma.to_str().unwrap(), "--user", &user],
    );

    let (stdout, _, success) = run_docdesk(&config_path, &["document", "list", "--user", &user]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"));
    let id = stdout.split_whitespace().next().unwrap().to_string();

    let (_, _, success) = run_docdesk(
        &config_path,
        &["document", "delete", &id, "--user", "someone-else"],
    );
    assert!(!success, "deleting another user's document must fail");

    let (_, _, success) = run_docdesk(&config_path, &["document", "delete", &id, "--user", &user]);
    assert!(success);
    let (stdout, _, _) = run_docdesk(&config_path, &["document", "list", "--user", &user]);
    assert!(!stdout.contains("gamma.txt"));
}

#[test]
fn test_assignment_lifecycle() {
    let (_tmp, config_path) = setup_test_env();
    let user = add_user(&config_path);

    let (stdout, stderr, success) = run_docdesk(
        &config_path,
        &[
            "assignment", "add", "--user", &user, "--title", "Write launch notes", "--priority",
            "high", "--due", "2026-11-01",
        ],
    );
    assert!(success, "assignment add failed: {}", stderr);
    let id = stdout.trim().to_string();

    let (_, _, success) = run_docdesk(
        &config_path,
        &["assignment", "update", &id, "--status", "in-progress", "--progress", "40"],
    );
    assert!(success);

    let (stdout, _, _) = run_docdesk(&config_path, &["assignment", "list", "--user", &user]);
    assert!(stdout.contains("[in-progress] Write launch notes (40%, high, due 2026-11-01)"));

    let (_, _, success) = run_docdesk(
        &config_path,
        &["assignment", "update", &id, "--progress", "140"],
    );
    assert!(!success, "progress above 100 must be rejected");

    let (stdout, _, success) = run_docdesk(&config_path, &["insights", &id]);
    assert!(success);
    assert!(stdout.contains("\"success\": true"));
    assert!(stdout.contains("Review, test, and finalize"));
}

#[test]
fn test_chat_fallback_and_history() {
    let (_tmp, config_path) = setup_test_env();
    let user = add_user(&config_path);

    let (stdout, stderr, success) = run_docdesk(
        &config_path,
        &["chat", "What should I do first?", "--user", &user],
    );
    assert!(success, "chat failed: {}", stderr);
    assert!(stdout.contains("fallback mode"));
    let session = stdout
        .lines()
        .find_map(|l| l.strip_prefix("session: "))
        .unwrap()
        .to_string();

    let (stdout, _, success) = run_docdesk(
        &config_path,
        &["history", "--user", &user, "--sessions"],
    );
    assert!(success);
    assert!(stdout.contains(&session));
    assert!(stdout.contains("\"message_count\": 1"));

    let (stdout, _, success) = run_docdesk(
        &config_path,
        &["history", "--user", &user, "--session", &session, "--delete"],
    );
    assert!(success);
    assert!(stdout.contains("Deleted 1 messages"));
}

#[test]
fn test_reprocess_with_nothing_pending() {
    let (_tmp, config_path) = setup_test_env();
    run_docdesk(&config_path, &["init"]);

    let (stdout, _, success) = run_docdesk(&config_path, &["reprocess"]);
    assert!(success);
    assert!(stdout.contains("processed: 0, failed: 0, skipped: 0"));
}
