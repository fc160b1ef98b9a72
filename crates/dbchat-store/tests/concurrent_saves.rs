use std::sync::Arc;

use dbchat_core::Message;
use dbchat_store::{ConversationStore, SqliteConversationStore};
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_to_one_key_leave_a_single_whole_record() {
    let dir = tempdir().expect("temp dir");
    let storage = Arc::new(SqliteConversationStore::new(dir.path().join("history.db")));
    storage.init().await.expect("init storage");

    let transcripts: Vec<Vec<Message>> = (0..8)
        .map(|writer| {
            (0..=writer)
                .map(|i| Message::user(format!("writer {} message {}", writer, i)))
                .collect()
        })
        .collect();

    let mut handles = Vec::new();
    for transcript in transcripts.clone() {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .save("alice", "conv-1", &transcript[1..], &transcript)
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("save");
    }

    let listed = storage.list("alice").await.expect("list");
    assert_eq!(listed.len(), 1);

    let stored = storage
        .load("alice", "conv-1")
        .await
        .expect("load")
        .expect("record present");
    assert!(transcripts.contains(&stored.history));
    assert_eq!(stored.window, stored.history[1..]);
    assert_eq!(listed[0].message_count, stored.history.len());
}
