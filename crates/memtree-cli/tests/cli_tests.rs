//! Integration tests for the CLI commands against a temporary local store

use std::sync::Arc;

use clap::Parser;
use memtree::config::{BackendKind, Config};
use memtree::engine::{MemoryEngine, View};
use memtree_cli::commands::{MemoryCommand, ReorganizeCommand, StatsCommand};
use memtree_cli::output::OutputFormat;
use tempfile::tempdir;

#[derive(Parser)]
struct TestCli {
    #[clap(subcommand)]
    command: TestCommand,
}

#[derive(clap::Subcommand)]
enum TestCommand {
    Memory(MemoryCommand),
    Stats(StatsCommand),
    Reorganize(ReorganizeCommand),
}

fn parse(args: &[&str]) -> TestCommand {
    let mut argv = vec!["memtree-cli"];
    argv.extend_from_slice(args);
    TestCli::parse_from(argv).command
}

/// Test fixture: engine over a local store in a temporary directory
async fn create_test_engine() -> (Arc<MemoryEngine>, Config, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.storage.backend = BackendKind::Local;
    config.storage.data_dir = dir.path().to_path_buf();
    let engine = Arc::new(MemoryEngine::open(&config).await.unwrap());
    (engine, config, dir)
}

#[tokio::test]
async fn test_memory_commands_edit_the_store() {
    let (engine, _config, _dir) = create_test_engine().await;

    for args in [
        vec!["memory", "create", "/memories/todo.md", "milk\neggs"],
        vec!["memory", "str-replace", "/memories/todo.md", "eggs", "bread"],
        vec!["memory", "insert", "/memories/todo.md", "0", "# Shopping"],
    ] {
        let TestCommand::Memory(cmd) = parse(&args) else {
            panic!("expected a memory command");
        };
        cmd.execute(&engine, OutputFormat::Json).await.unwrap();
    }

    let view = engine.view("/memories/todo.md", None).await.unwrap();
    assert_eq!(
        view,
        View::File {
            content: "# Shopping\nmilk\nbread".to_string(),
            first_line: None
        }
    );
}

#[tokio::test]
async fn test_memory_errors_are_reported() {
    let (engine, _config, _dir) = create_test_engine().await;
    let TestCommand::Memory(cmd) = parse(&["memory", "view", "/memories/../etc/passwd"]) else {
        panic!("expected a memory command");
    };
    let err = cmd.execute(&engine, OutputFormat::Table).await.unwrap_err();
    assert!(err.to_string().contains("Sandbox violation"));
}

#[tokio::test]
async fn test_exec_runs_json_tool_call() {
    let (engine, _config, _dir) = create_test_engine().await;
    let TestCommand::Memory(cmd) = parse(&[
        "memory",
        "exec",
        r#"{"command":"create","path":"/memories/a.md","file_text":"a"}"#,
    ]) else {
        panic!("expected a memory command");
    };
    cmd.execute(&engine, OutputFormat::Table).await.unwrap();
    assert!(engine.view("/memories/a.md", None).await.is_ok());
}

#[tokio::test]
async fn test_stats_and_reorganize_run() {
    let (engine, config, _dir) = create_test_engine().await;
    engine.create("/memories/notes/a.md", "x\ny\nz").await.unwrap();
    engine.create("/memories/notes/b.md", "x\ny\nz").await.unwrap();

    let TestCommand::Stats(stats) = parse(&["stats", "--entries", "--provenance"]) else {
        panic!("expected a stats command");
    };
    stats.execute(&engine, OutputFormat::Table).await.unwrap();

    let TestCommand::Reorganize(reorganize) = parse(&["reorganize"]) else {
        panic!("expected a reorganize command");
    };
    reorganize
        .execute(Arc::clone(&engine), config.reorganizer.clone(), OutputFormat::Json)
        .await
        .unwrap();
    assert_eq!(engine.router().provenance().len(), 1);
}

#[tokio::test]
async fn test_reorganize_rejects_bad_similarity() {
    let (engine, config, _dir) = create_test_engine().await;
    let TestCommand::Reorganize(reorganize) = parse(&["reorganize", "--similarity", "1.5"]) else {
        panic!("expected a reorganize command");
    };
    let err = reorganize
        .execute(engine, config.reorganizer.clone(), OutputFormat::Json)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("between 0.0 and 1.0"));
}

#[tokio::test]
async fn test_info_does_not_promote() {
    let (engine, _config, _dir) = create_test_engine().await;
    engine.create("/memories/notes/a.md", "alpha\nbeta").await.unwrap();
    let path = engine.resolve("/memories/notes/a.md").unwrap();
    let before = engine.router().entry(&path).unwrap().access_count;

    for format in [OutputFormat::Table, OutputFormat::Json, OutputFormat::Table] {
        let TestCommand::Memory(cmd) = parse(&["memory", "info", "/memories/notes/a.md"]) else {
            panic!("expected a memory command");
        };
        cmd.execute(&engine, format).await.unwrap();
    }

    assert_eq!(engine.router().tier_of(&path), Some(memtree::memory::Tier::Archival));
    assert_eq!(engine.router().entry(&path).unwrap().access_count, before);
}

#[tokio::test]
async fn test_info_on_directory_fails() {
    let (engine, _config, _dir) = create_test_engine().await;
    engine.create("/memories/notes/a.md", "alpha").await.unwrap();
    let TestCommand::Memory(cmd) = parse(&["memory", "info", "/memories/notes"]) else {
        panic!("expected a memory command");
    };
    assert!(cmd.execute(&engine, OutputFormat::Table).await.is_err());
}

#[tokio::test]
async fn test_reorganize_rejects_unreachable_global_budget() {
    let (engine, config, _dir) = create_test_engine().await;
    let TestCommand::Reorganize(reorganize) = parse(&["reorganize", "--global-budget", "1000000"]) else {
        panic!("expected a reorganize command");
    };
    let err = reorganize
        .execute(engine, config.reorganizer.clone(), OutputFormat::Json)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sum of the tier budgets"));
}

#[tokio::test]
async fn test_second_process_cannot_open_busy_store() {
    let (_engine, config, _dir) = create_test_engine().await;
    let err = MemoryEngine::open(&config).await.err().unwrap();
    assert_eq!(err.kind(), memtree::error::ErrorKind::StoreLocked);
}
