//! Integration tests for the text editing engine
//!
//! Drives the six commands end to end over the in-memory store.

use memtree::engine::{Command, CommandOutput, MemoryEngine, View};
use memtree::error::ErrorKind;
use memtree::memory::NodeKind;
use memtree::testing::memory_engine;

/// Test fixture: engine with a single file
async fn engine_with(path: &str, text: &str) -> MemoryEngine {
    let engine = memory_engine().await.unwrap();
    engine.create(path, text).await.unwrap();
    engine
}

async fn read(engine: &MemoryEngine, path: &str) -> String {
    match engine.view(path, None).await.unwrap() {
        View::File { content, .. } => content,
        View::Directory(_) => panic!("{path} is a directory"),
    }
}

mod view_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_view_round_trips() {
        let texts = [
            "",
            "single line",
            "trailing newline\n",
            "\n\nleading blanks",
            "unicode: héllo wörld ✓\nsecond",
            "crlf\r\nline",
        ];
        let engine = memory_engine().await.unwrap();
        for (i, text) in texts.iter().enumerate() {
            let path = format!("/memories/rt/{i}.txt");
            engine.create(&path, text).await.unwrap();
            assert_eq!(read(&engine, &path).await, *text);
        }
    }

    #[tokio::test]
    async fn test_view_range_is_inclusive() {
        let engine = engine_with("/memories/a.md", "one\ntwo\nthree\nfour").await;
        let view = engine.view("/memories/a.md", Some((2, 3))).await.unwrap();
        assert_eq!(
            view,
            View::File {
                content: "two\nthree".to_string(),
                first_line: Some(2)
            }
        );
    }

    #[tokio::test]
    async fn test_view_range_past_end_is_clamped() {
        let engine = engine_with("/memories/a.md", "one\ntwo").await;
        match engine.view("/memories/a.md", Some((2, 50))).await.unwrap() {
            View::File { content, .. } => assert_eq!(content, "two"),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_view_inverted_range_fails() {
        let engine = engine_with("/memories/a.md", "one\ntwo").await;
        let err = engine.view("/memories/a.md", Some((3, 1))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[tokio::test]
    async fn test_view_directory_lists_children() {
        let engine = memory_engine().await.unwrap();
        engine.create("/memories/notes/b.md", "bb").await.unwrap();
        engine.create("/memories/notes/a.md", "a").await.unwrap();
        engine.create("/memories/notes/sub/c.md", "c").await.unwrap();

        let View::Directory(entries) = engine.view("/memories/notes", None).await.unwrap() else {
            panic!("expected a directory listing");
        };
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md", "sub"]);
        assert_eq!(entries[1].size_bytes, 2);
        assert_eq!(entries[2].kind, NodeKind::Directory);
    }

    #[tokio::test]
    async fn test_view_missing_is_not_found() {
        let engine = memory_engine().await.unwrap();
        let err = engine.view("/memories/nope.md", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_view_forgets_file_removed_behind_its_back() {
        let engine = engine_with("/memories/gone.md", "soon gone").await;
        let path = engine.resolve("/memories/gone.md").unwrap();
        assert!(engine.router().tier_of(&path).is_some());

        engine.store().remove(&path).await.unwrap();

        let err = engine.view("/memories/gone.md", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(engine.router().tier_of(&path), None);
        assert_eq!(engine.router().tracked_count(), 0);
    }
}

mod edit_tests {
    use super::*;

    #[tokio::test]
    async fn test_str_replace_scenario() {
        let engine = engine_with("/memories/a.xml", "line1\nline2").await;
        engine.str_replace("/memories/a.xml", "line1", "first").await.unwrap();
        assert_eq!(read(&engine, "/memories/a.xml").await, "first\nline2");
    }

    #[tokio::test]
    async fn test_str_replace_ambiguous_leaves_file_unchanged() {
        let engine = engine_with("/memories/a.md", "x y x").await;

        let err = engine.str_replace("/memories/a.md", "x", "z").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);

        let err = engine.str_replace("/memories/a.md", "missing", "z").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);

        assert_eq!(read(&engine, "/memories/a.md").await, "x y x");
    }

    #[tokio::test]
    async fn test_str_replace_on_missing_file() {
        let engine = memory_engine().await.unwrap();
        let err = engine.str_replace("/memories/a.md", "a", "b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_insert_at_top_and_bottom() {
        let engine = engine_with("/memories/list.md", "a\nb\nc").await;

        engine.insert("/memories/list.md", 0, "X").await.unwrap();
        assert_eq!(read(&engine, "/memories/list.md").await, "X\na\nb\nc");

        engine.insert("/memories/list.md", 4, "Y").await.unwrap();
        assert_eq!(read(&engine, "/memories/list.md").await, "X\na\nb\nc\nY");
    }

    #[tokio::test]
    async fn test_insert_leaves_crlf_lines_untouched() {
        let engine = engine_with("/memories/dos.txt", "a\r\nb\r\n").await;

        engine.insert("/memories/dos.txt", 1, "X").await.unwrap();
        let stored = engine.store().read(&engine.resolve("/memories/dos.txt").unwrap()).await.unwrap();
        assert_eq!(stored, "a\r\nX\r\nb\r\n");
    }

    #[tokio::test]
    async fn test_insert_past_end_fails() {
        let engine = engine_with("/memories/list.md", "a\nb").await;
        let err = engine.insert("/memories/list.md", 3, "Z").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
        assert_eq!(read(&engine, "/memories/list.md").await, "a\nb");
    }

    #[tokio::test]
    async fn test_create_overwrites() {
        let engine = engine_with("/memories/a.md", "old").await;
        engine.create("/memories/a.md", "new").await.unwrap();
        assert_eq!(read(&engine, "/memories/a.md").await, "new");
    }

    #[tokio::test]
    async fn test_create_over_directory_fails() {
        let engine = engine_with("/memories/dir/a.md", "a").await;
        let err = engine.create("/memories/dir", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IsADirectory);
    }

    #[tokio::test]
    async fn test_entry_too_large_without_overflow() {
        let mut config = memtree::testing::small_config();
        config.tiers.archival_overflow = false;
        let engine = MemoryEngine::open(&config).await.unwrap();

        let err = engine
            .create("/memories/huge.md", &"x".repeat(2048))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntryTooLarge);
        let err = engine.view("/memories/huge.md", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

mod delete_rename_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_directory_cascades() {
        let engine = memory_engine().await.unwrap();
        for i in 0..5 {
            engine
                .create(&format!("/memories/notes/{i}.md"), &format!("note {i}"))
                .await
                .unwrap();
        }

        let (path, kind) = engine.delete("/memories/notes").await.unwrap();
        assert_eq!(path.to_string(), "/memories/notes");
        assert_eq!(kind, NodeKind::Directory);

        let err = engine.view("/memories/notes", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        for i in 0..5 {
            let err = engine
                .view(&format!("/memories/notes/{i}.md"), None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        assert_eq!(engine.router().tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_without_cascade_refuses_non_empty() {
        let mut config = memtree::testing::small_config();
        config.editor.cascade_delete = false;
        let engine = MemoryEngine::open(&config).await.unwrap();
        engine.create("/memories/notes/a.md", "a").await.unwrap();

        let err = engine.delete("/memories/notes").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);

        engine.delete("/memories/notes/a.md").await.unwrap();
        engine.delete("/memories/notes").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_root_is_rejected() {
        let engine = memory_engine().await.unwrap();
        let err = engine.delete("/memories").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }

    #[tokio::test]
    async fn test_rename_moves_file() {
        let engine = engine_with("/memories/a.md", "content").await;
        engine.rename("/memories/a.md", "/memories/archive/b.md").await.unwrap();

        let err = engine.view("/memories/a.md", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(read(&engine, "/memories/archive/b.md").await, "content");
    }

    #[tokio::test]
    async fn test_rename_never_overwrites() {
        let engine = engine_with("/memories/a.md", "a").await;
        engine.create("/memories/b.md", "b").await.unwrap();

        let err = engine.rename("/memories/a.md", "/memories/b.md").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(read(&engine, "/memories/a.md").await, "a");
        assert_eq!(read(&engine, "/memories/b.md").await, "b");
    }

    #[tokio::test]
    async fn test_rename_directory_keeps_tiers() {
        let engine = memory_engine().await.unwrap();
        engine.create("/memories/src/persona.md", "me").await.unwrap();
        engine.create("/memories/src/deep/n.md", "n").await.unwrap();

        engine.rename("/memories/src", "/memories/dst").await.unwrap();

        let moved = engine.resolve("/memories/dst/persona.md").unwrap();
        assert_eq!(
            engine.router().tier_of(&moved),
            Some(memtree::memory::Tier::Persona)
        );
        assert_eq!(read(&engine, "/memories/dst/deep/n.md").await, "n");
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree_fails() {
        let engine = engine_with("/memories/dir/a.md", "a").await;
        let err = engine.rename("/memories/dir", "/memories/dir/inner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
    }
}

mod sandbox_tests {
    use super::*;

    const ESCAPES: [&str; 4] = [
        "/memories/../etc/passwd",
        "../secrets",
        "/memories/notes/../../x",
        "/etc/passwd",
    ];

    #[tokio::test]
    async fn test_every_command_rejects_escapes() {
        let engine = engine_with("/memories/ok.md", "ok").await;

        for raw in ESCAPES {
            let results = [
                engine.view(raw, None).await.map(|_| ()),
                engine.create(raw, "x").await.map(|_| ()),
                engine.str_replace(raw, "a", "b").await.map(|_| ()),
                engine.insert(raw, 0, "x").await.map(|_| ()),
                engine.delete(raw).await.map(|_| ()),
                engine.rename(raw, "/memories/moved.md").await.map(|_| ()),
                engine.rename("/memories/ok.md", raw).await.map(|_| ()),
            ];
            for result in results {
                let err = result.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::SandboxViolation, "{raw}");
                assert!(err.is_security_violation());
            }
        }
        assert_eq!(read(&engine, "/memories/ok.md").await, "ok");
    }

    #[tokio::test]
    async fn test_inner_dot_dot_stays_inside() {
        let engine = engine_with("/memories/notes/a.md", "a").await;
        assert_eq!(read(&engine, "/memories/notes/../notes/./a.md").await, "a");
    }
}

mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_json_tool_calls() {
        let engine = memory_engine().await.unwrap();

        let out = engine
            .dispatch_json(r#"{"command":"create","path":"/memories/a.md","file_text":"hi\nthere"}"#)
            .await
            .unwrap();
        assert_eq!(
            out,
            CommandOutput::Created {
                path: "/memories/a.md".to_string()
            }
        );

        let out = engine
            .dispatch_json(r#"{"command":"view","path":"/memories/a.md","view_range":[2,2]}"#)
            .await
            .unwrap();
        assert_eq!(out.to_string(), "   2 | there");

        let err = engine.dispatch_json(r#"{"command":"chmod","path":"/memories/a.md"}"#).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    }

    #[tokio::test]
    async fn test_stats_track_commands() {
        let engine = memory_engine().await.unwrap();
        engine
            .dispatch(Command::Create {
                path: "/memories/a.md".to_string(),
                file_text: "a".to_string(),
            })
            .await
            .unwrap();
        engine
            .dispatch(Command::View {
                path: "/memories/a.md".to_string(),
                view_range: None,
            })
            .await
            .unwrap();

        let stats = engine.stats();
        assert_eq!(stats.creates, 1);
        assert_eq!(stats.views, 1);
        assert_eq!(stats.total_operations(), 2);
        assert_eq!(stats.cache_misses, 1);
    }
}
