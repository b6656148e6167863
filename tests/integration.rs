use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const RETURNS: &str =
    "Items may be returned within 30 days. Exchanges are accepted within 14 days.\n";
const HOURS: &str = "The store opens at 9am and closes at 5pm on weekdays.\n";

fn setup_test_env(embedding_provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("notes")).unwrap();
    fs::write(files_dir.join("returns.md"), RETURNS).unwrap();
    fs::write(files_dir.join("notes/hours.txt"), HOURS).unwrap();
    fs::write(files_dir.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47]).unwrap();

    let embedding = match embedding_provider {
        "hashing" => "provider = \"hashing\"\ndims = 256",
        _ => "provider = \"disabled\"",
    };

    let config_content = format!(
        r#"[db]
path = "{}/data/gw.sqlite"

[chunking]
strategy = "fixed_size"
chunk_size = 200
overlap = 20

[retrieval]
similarity_threshold = 0.3
top_k = 5

[embedding]
{}

[completion]
provider = "disabled"
"#,
        root.display(),
        embedding
    );

    let config_path = config_dir.join("gw.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gw(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_gw"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run gw");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

fn add_returns(config: &Path, agent: &str) {
    let file = files_dir(config).join("returns.md");
    let (stdout, stderr, ok) = run_gw(
        config,
        &[
            "add",
            file.to_str().unwrap(),
            "--id",
            "returns",
            "--title",
            "Returns Policy",
            "--type",
            "faq",
            "--agent",
            agent,
            "--meta",
            "lang=en",
        ],
    );
    assert!(ok, "add failed: {}", stderr);
    assert!(stdout.contains("id: returns"));
}

fn add_hours(config: &Path, agent: &str) {
    let file = files_dir(config).join("notes/hours.txt");
    let (_, stderr, ok) = run_gw(
        config,
        &["add", file.to_str().unwrap(), "--id", "hours", "--agent", agent],
    );
    assert!(ok, "add failed: {}", stderr);
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env("hashing");

    let (stdout, stderr, ok) = run_gw(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/gw.sqlite").exists());

    let (_, _, ok) = run_gw(&config, &["init"]);
    assert!(ok);
}

#[test]
fn test_add_get_and_list() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");

    let (stdout, stderr, ok) = run_gw(&config, &["get", "returns", "--json"]);
    assert!(ok, "get failed: {}", stderr);
    let doc = json(&stdout);
    assert_eq!(doc["title"], "Returns Policy");
    assert_eq!(doc["doc_type"], "faq");
    assert_eq!(doc["tags"]["agent_id"], "support");
    assert_eq!(doc["metadata"]["lang"], "en");
    assert_eq!(doc["chunks"].as_array().unwrap().len(), 1);
    assert_eq!(doc["chunks"][0]["embedded"], true);

    let (stdout, _, ok) = run_gw(&config, &["get", "returns"]);
    assert!(ok);
    assert!(stdout.contains("--- Document ---"));
    assert!(stdout.contains("--- Chunks (1) ---"));

    let (stdout, _, ok) = run_gw(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("returns"));
    assert!(stdout.contains("Returns Policy"));
}

#[test]
fn test_search_ranks_and_filters_by_agent() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");
    add_hours(&config, "sales");

    let (stdout, stderr, ok) = run_gw(&config, &["search", "returned within 30 days", "--json"]);
    assert!(ok, "search failed: {}", stderr);
    let hits = json(&stdout);
    let hits = hits.as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["document_id"], "returns");
    assert!(hits[0]["score"].as_f64().unwrap() > 0.3);

    let (stdout, _, ok) = run_gw(
        &config,
        &["search", "returned within 30 days", "--agent", "sales", "--json"],
    );
    assert!(ok);
    let filtered = json(&stdout);
    assert!(filtered
        .as_array()
        .unwrap()
        .iter()
        .all(|h| h["document_id"] != "returns"));

    let (stdout, _, ok) = run_gw(&config, &["search", "When does the store open?"]);
    assert!(ok);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("id: hours"));
}

#[test]
fn test_ask_degrades_without_completion_provider() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");

    let (stdout, stderr, ok) = run_gw(
        &config,
        &["ask", "How long do I have to return an item?", "--json"],
    );
    assert!(ok, "ask failed: {}", stderr);
    let answer = json(&stdout);
    assert_eq!(answer["degraded"], true);
    assert!(!answer["answer_text"].as_str().unwrap().trim().is_empty());
    let sources = answer["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["title"], "Returns Policy");
    let confidence = answer["confidence"].as_f64().unwrap();
    assert!(confidence > 0.0 && confidence <= 1.0);
}

#[test]
fn test_ask_without_matches_has_no_sources() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");

    let (stdout, _, ok) = run_gw(&config, &["ask", "zzzz qqqq", "--json"]);
    assert!(ok);
    let answer = json(&stdout);
    assert_eq!(answer["degraded"], false);
    assert!(answer["sources"].as_array().unwrap().is_empty());
    assert_eq!(answer["confidence"].as_f64().unwrap(), 0.0);

    // Another agent's documents are never used.
    let (stdout, _, ok) = run_gw(
        &config,
        &["ask", "How long do I have to return an item?", "--agent", "sales", "--json"],
    );
    assert!(ok);
    assert!(json(&stdout)["sources"].as_array().unwrap().is_empty());
}

#[test]
fn test_delete_removes_document() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");

    let (stdout, _, ok) = run_gw(&config, &["delete", "returns"]);
    assert!(ok);
    assert!(stdout.contains("Deleted returns"));

    let (stdout, _, ok) = run_gw(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("No documents."));

    let (_, stderr, ok) = run_gw(&config, &["get", "returns"]);
    assert!(!ok);
    assert!(stderr.contains("document not found"));

    let (stdout, _, ok) = run_gw(&config, &["delete", "returns"]);
    assert!(ok);
    assert!(stdout.contains("No document with id returns"));
}

#[test]
fn test_ingest_directory_and_reingest_replaces() {
    let (_tmp, config) = setup_test_env("hashing");
    let dir = files_dir(&config);

    let (stdout, stderr, ok) = run_gw(&config, &["ingest", dir.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("files found: 2"));
    assert!(stdout.contains("documents: 2 (0 replaced)"));

    let (stdout, _, ok) = run_gw(&config, &["ingest", dir.to_str().unwrap()]);
    assert!(ok);
    assert!(stdout.contains("documents: 2 (2 replaced)"));

    let (stdout, _, ok) = run_gw(&config, &["get", "notes/hours.txt", "--json"]);
    assert!(ok);
    assert_eq!(json(&stdout)["title"], "hours");

    let (stdout, _, ok) = run_gw(&config, &["stats"]);
    assert!(ok);
    assert!(stdout.contains("Documents:   2"));
    assert!(stdout.contains("Embedded:    2 / 2 (100%)"));
}

#[test]
fn test_disabled_embeddings_leave_chunks_pending() {
    let (_tmp, config) = setup_test_env("disabled");
    add_returns(&config, "support");

    let (stdout, _, ok) = run_gw(&config, &["stats"]);
    assert!(ok);
    assert!(stdout.contains("Embedded:    0 / 1 (0%)"));

    let (_, stderr, ok) = run_gw(&config, &["embed", "pending"]);
    assert!(!ok);
    assert!(stderr.contains("Embedding provider is disabled"));

    let (stdout, _, ok) = run_gw(
        &config,
        &["ask", "How long do I have to return an item?", "--json"],
    );
    assert!(ok);
    let answer = json(&stdout);
    assert_eq!(answer["degraded"], true);
    assert!(answer["sources"].as_array().unwrap().is_empty());
}

#[test]
fn test_embed_rebuild_reembeds_everything() {
    let (_tmp, config) = setup_test_env("hashing");
    add_returns(&config, "support");
    add_hours(&config, "sales");

    let (stdout, stderr, ok) = run_gw(&config, &["embed", "rebuild"]);
    assert!(ok, "rebuild failed: {}", stderr);
    assert!(stdout.contains("embedded: 2"));

    let (stdout, _, ok) = run_gw(&config, &["embed", "pending"]);
    assert!(ok);
    assert!(stdout.contains("all chunks up to date"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup_test_env("hashing");
    let body = fs::read_to_string(&config).unwrap().replace("top_k = 5", "top_k = 0");
    fs::write(&config, body).unwrap();

    let (_, stderr, ok) = run_gw(&config, &["stats"]);
    assert!(!ok);
    assert!(stderr.contains("retrieval.top_k must be >= 1"));
}

#[test]
fn test_overlap_warning_reaches_stderr() {
    let (_tmp, config) = setup_test_env("hashing");
    let body = fs::read_to_string(&config)
        .unwrap()
        .replace("chunk_size = 200", "chunk_size = 10")
        .replace("overlap = 20", "overlap = 50");
    fs::write(&config, body).unwrap();

    let (_, stderr, ok) = run_gw(&config, &["stats"]);
    assert!(ok, "stats failed: {}", stderr);
    assert!(stderr.contains("chunking.overlap (50) >= chunking.chunk_size (10)"));
}

#[test]
fn test_completions_need_no_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_gw"))
        .args(["--config", "/nonexistent/gw.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("gw"));
}
