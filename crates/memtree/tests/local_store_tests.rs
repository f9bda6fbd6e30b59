//! Integration tests for the local filesystem backend
//!
//! Exercises the engine over a real directory tree in a temp dir.

use memtree::engine::View;
use memtree::error::ErrorKind;
use memtree::memory::Tier;
use memtree::testing::local_engine;
use tempfile::tempdir;

async fn read(engine: &memtree::MemoryEngine, path: &str) -> String {
    match engine.view(path, None).await.unwrap() {
        View::File { content, .. } => content,
        View::Directory(_) => panic!("{path} is a directory"),
    }
}

mod layout_tests {
    use super::*;

    #[tokio::test]
    async fn test_tree_is_mirrored_on_disk() {
        let dir = tempdir().unwrap();
        let engine = local_engine(dir.path()).await.unwrap();
        engine.create("/memories/notes/todo.md", "- milk\n").await.unwrap();

        let on_disk = dir.path().join("memories").join("notes").join("todo.md");
        assert_eq!(std::fs::read_to_string(on_disk).unwrap(), "- milk\n");
    }

    #[tokio::test]
    async fn test_delete_and_rename_on_disk() {
        let dir = tempdir().unwrap();
        let engine = local_engine(dir.path()).await.unwrap();
        engine.create("/memories/a/one.md", "1").await.unwrap();
        engine.create("/memories/a/two.md", "2").await.unwrap();

        engine.rename("/memories/a", "/memories/b").await.unwrap();
        assert!(!dir.path().join("memories/a").exists());
        assert_eq!(read(&engine, "/memories/b/two.md").await, "2");

        engine.delete("/memories/b").await.unwrap();
        assert!(!dir.path().join("memories/b").exists());
        let err = engine.view("/memories/b/one.md", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_file_under_file_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = local_engine(dir.path()).await.unwrap();
        engine.create("/memories/a.md", "a").await.unwrap();

        let err = engine.create("/memories/a.md/b.md", "b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
    }
}

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_content_and_tiers_survive_reopen() {
        let dir = tempdir().unwrap();

        {
            let engine = local_engine(dir.path()).await.unwrap();
            engine.create("/memories/persona.md", "name: Ada").await.unwrap();
            engine.create("/memories/notes/a.md", "alpha").await.unwrap();
            engine.save_metadata().await.unwrap();
        }

        let engine = local_engine(dir.path()).await.unwrap();
        let persona = engine.resolve("/memories/persona.md").unwrap();
        let note = engine.resolve("/memories/notes/a.md").unwrap();
        assert_eq!(engine.router().tier_of(&persona), Some(Tier::Persona));
        assert_eq!(engine.router().tier_of(&note), Some(Tier::Archival));

        assert_eq!(read(&engine, "/memories/persona.md").await, "name: Ada");
        assert_eq!(read(&engine, "/memories/notes/a.md").await, "alpha");
    }

    #[tokio::test]
    async fn test_lost_metadata_degrades_to_cold() {
        let dir = tempdir().unwrap();

        {
            let engine = local_engine(dir.path()).await.unwrap();
            engine.create("/memories/persona.md", "name: Ada").await.unwrap();
            engine.save_metadata().await.unwrap();
        }
        std::fs::write(dir.path().join("tiers.json"), "garbage").unwrap();

        let engine = local_engine(dir.path()).await.unwrap();
        assert_eq!(engine.router().tracked_count(), 0);
        assert_eq!(read(&engine, "/memories/persona.md").await, "name: Ada");
    }

    #[tokio::test]
    async fn test_data_dir_has_a_single_owner() {
        let dir = tempdir().unwrap();
        let engine = local_engine(dir.path()).await.unwrap();

        let err = local_engine(dir.path()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::StoreLocked);

        drop(engine);
        let engine = local_engine(dir.path()).await.unwrap();
        engine.create("/memories/a.md", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_is_not_listed() {
        let dir = tempdir().unwrap();
        let engine = local_engine(dir.path()).await.unwrap();
        engine.create("/memories/a.md", "a").await.unwrap();
        engine.save_metadata().await.unwrap();

        let View::Directory(entries) = engine.view("/memories", None).await.unwrap() else {
            panic!("expected the root listing");
        };
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.md"]);
    }
}
