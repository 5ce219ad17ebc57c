// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable, append-only JSONL session log.
//!
//! One file per `(agent_id, channel, sender_bucket)` scope. Writers take an
//! exclusive advisory lock for the duration of a mutation; readers never
//! lock and must tolerate a torn trailing line from a writer that is
//! mid-append.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bashclaw_model::{Block, Message};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// How a session's file path is bucketed by sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    PerSender,
    PerChannel,
    Global,
}

/// One line of the session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    User { content: String, ts_ms: i64 },
    Assistant { content: String, ts_ms: i64 },
    ToolCall {
        tool_name: String,
        tool_input: Value,
        tool_id: String,
        ts_ms: i64,
    },
    ToolResult {
        tool_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
        ts_ms: i64,
    },
    Meta { payload: Value, ts_ms: i64 },
}

impl Entry {
    pub fn ts_ms(&self) -> i64 {
        match self {
            Entry::User { ts_ms, .. }
            | Entry::Assistant { ts_ms, .. }
            | Entry::ToolCall { ts_ms, .. }
            | Entry::ToolResult { ts_ms, .. }
            | Entry::Meta { ts_ms, .. } => *ts_ms,
        }
    }
}

/// Resolves `(agent_id, channel, sender, scope)` to a session file path
/// rooted at `root`, per spec.md §4.4's scope formulas.
pub fn session_path(
    root: &Path,
    agent_id: &str,
    channel: &str,
    sender: &str,
    scope: SessionScope,
) -> PathBuf {
    match scope {
        SessionScope::PerSender if sender.is_empty() => {
            root.join(agent_id).join(format!("{channel}.jsonl"))
        }
        SessionScope::PerSender => root
            .join(agent_id)
            .join(channel)
            .join(format!("{sender}.jsonl")),
        SessionScope::PerChannel => root.join(agent_id).join(format!("{channel}.jsonl")),
        SessionScope::Global => root.join(format!("{agent_id}.jsonl")),
    }
}

/// A single session's durable log, bound to one resolved file path.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry` as one JSON line under an exclusive advisory lock.
    pub async fn append(&self, entry: Entry) -> anyhow::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_blocking(&path, &entry)).await?
    }

    /// Reads the last `n` entries (or all, if `n` is `None`). Lock-free;
    /// unparseable trailing lines are skipped rather than failing the load.
    pub async fn load(&self, n: Option<usize>) -> anyhow::Result<Vec<Entry>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_blocking(&path, n)).await?
    }

    /// Projects the last `n` entries into normalized [`Message`]s. Meta
    /// entries are excluded (never sent to the model). Consecutive
    /// `tool_call`/`tool_result` entries are merged into one assistant
    /// message's `ToolUse` blocks and one user message's `ToolResult` blocks.
    pub async fn load_as_messages(&self, n: Option<usize>) -> anyhow::Result<Vec<Message>> {
        let entries = self.load(n).await?;
        Ok(project_messages(&entries))
    }

    /// Atomically truncates the log to its last `keep` entries.
    pub async fn prune(&self, keep: usize) -> anyhow::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || prune_blocking(&path, keep)).await?
    }

    /// Truncates the log to zero entries (file still exists, empty).
    pub async fn clear(&self) -> anyhow::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || clear_blocking(&path)).await?
    }

    /// Removes the log file entirely. Not an error if it doesn't exist.
    pub async fn delete(&self) -> anyhow::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await?
    }

    /// If the last entry's `ts_ms` is older than `minutes`, clears the
    /// session and returns `true`. Disabled (always `false`) when
    /// `minutes <= 0`.
    pub async fn check_idle_reset(&self, minutes: i64, now_ms: i64) -> anyhow::Result<bool> {
        if minutes <= 0 {
            return Ok(false);
        }
        let entries = self.load(Some(1)).await?;
        let Some(last) = entries.last() else {
            return Ok(false);
        };
        let idle_ms = minutes.saturating_mul(60_000);
        if now_ms.saturating_sub(last.ts_ms()) >= idle_ms {
            self.clear().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn open_locked_append(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    FileExt::lock_exclusive(&file)?;
    Ok(file)
}

fn append_blocking(path: &Path, entry: &Entry) -> anyhow::Result<()> {
    let mut file = open_locked_append(path)?;
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    file.flush()?;
    FileExt::unlock(&file)?;
    Ok(())
}

fn load_blocking(path: &Path, n: Option<usize>) -> anyhow::Result<Vec<Entry>> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Entry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                // A torn trailing line from a concurrent writer is expected;
                // a malformed line anywhere else indicates real corruption,
                // but the store still skips it rather than failing the load.
                let is_last = i + 1 == lines.len();
                warn!(line = i, last = is_last, error = %e, "skipping unparseable session line");
            }
        }
    }

    match n {
        Some(n) if entries.len() > n => {
            let start = entries.len() - n;
            Ok(entries.split_off(start))
        }
        _ => Ok(entries),
    }
}

fn prune_blocking(path: &Path, keep: usize) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    FileExt::lock_exclusive(&file)?;

    let result = (|| -> anyhow::Result<()> {
        let entries = load_blocking(path, Some(keep))?;
        let tmp = tmp_path(path);
        {
            let mut tmp_file = std::fs::File::create(&tmp)?;
            for entry in &entries {
                let mut line = serde_json::to_string(entry)?;
                line.push('\n');
                tmp_file.write_all(line.as_bytes())?;
            }
            tmp_file.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();

    FileExt::unlock(&file)?;
    result
}

fn clear_blocking(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)?;
    FileExt::lock_exclusive(&file)?;
    file.set_len(0)?;
    // set_len alone doesn't move the cursor on every platform; seek to be sure
    // a subsequent write_all in the same handle would start at offset 0.
    let mut f = &file;
    f.seek(SeekFrom::Start(0))?;
    FileExt::unlock(&file)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "session".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

/// Projects raw entries into normalized messages, merging consecutive
/// `tool_call`s into one assistant message and consecutive `tool_result`s
/// into one user message, matching the shape the model actually produced.
///
/// Every `tool_use` id collected for an assistant message is resolved
/// against the `tool_result` run immediately following it; any id with no
/// match there is an orphan (e.g. the matching `tool_result` fell off the
/// end of a `prune`d log) and is treated as a failure per spec.md's
/// orphan-on-reload invariant: a synthesized `is_error=true` placeholder is
/// spliced in so no dangling `tool_use` block ever reaches a provider.
fn project_messages(entries: &[Entry]) -> Vec<Message> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        match &entries[i] {
            Entry::User { content, .. } => {
                out.push(Message::user(content.clone()));
                i += 1;
            }
            Entry::Assistant { content, .. } => {
                let mut blocks = vec![Block::text(content.clone())];
                let mut tool_ids = Vec::new();
                let mut j = i + 1;
                while let Some(Entry::ToolCall {
                    tool_name,
                    tool_input,
                    tool_id,
                    ..
                }) = entries.get(j)
                {
                    blocks.push(Block::tool_use(tool_id.clone(), tool_name.clone(), tool_input.clone()));
                    tool_ids.push(tool_id.clone());
                    j += 1;
                }
                out.push(Message::assistant(blocks));
                i = if tool_ids.is_empty() {
                    j
                } else {
                    push_tool_result_message(entries, j, &tool_ids, &mut out)
                };
            }
            Entry::ToolCall { tool_name, tool_input, tool_id, .. } => {
                // An assistant entry with no leading text, e.g. a pure tool call.
                let mut blocks = vec![Block::tool_use(tool_id.clone(), tool_name.clone(), tool_input.clone())];
                let mut tool_ids = vec![tool_id.clone()];
                let mut j = i + 1;
                while let Some(Entry::ToolCall {
                    tool_name,
                    tool_input,
                    tool_id,
                    ..
                }) = entries.get(j)
                {
                    blocks.push(Block::tool_use(tool_id.clone(), tool_name.clone(), tool_input.clone()));
                    tool_ids.push(tool_id.clone());
                    j += 1;
                }
                out.push(Message::assistant(blocks));
                i = push_tool_result_message(entries, j, &tool_ids, &mut out);
            }
            Entry::ToolResult { .. } => {
                // A tool_result run with no tool_call recorded in this window
                // at all (the call itself fell off the front of a pruned
                // log): nothing to pair it with, so it's merged as-is rather
                // than invented a counterpart for.
                let mut blocks = Vec::new();
                let mut j = i;
                while let Some(Entry::ToolResult { tool_id, content, is_error, .. }) = entries.get(j) {
                    blocks.push(Block::tool_result(tool_id.clone(), content.clone(), *is_error));
                    j += 1;
                }
                out.push(Message::tool_results(blocks));
                i = j;
            }
            Entry::Meta { .. } => {
                i += 1;
            }
        }
    }
    out
}

/// Consumes the contiguous `tool_result` run starting at `i` (if any),
/// merging it into one user message's `ToolResult` blocks alongside a
/// synthesized `is_error=true` placeholder for every id in `tool_ids` that
/// run doesn't cover. Always pushes exactly one message to `out`, even when
/// the run is empty and every id is orphaned. Returns the index past the
/// consumed run.
fn push_tool_result_message(
    entries: &[Entry],
    i: usize,
    tool_ids: &[String],
    out: &mut Vec<Message>,
) -> usize {
    let mut blocks = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut j = i;
    while let Some(Entry::ToolResult { tool_id, content, is_error, .. }) = entries.get(j) {
        blocks.push(Block::tool_result(tool_id.clone(), content.clone(), *is_error));
        seen.insert(tool_id.clone());
        j += 1;
    }
    for id in tool_ids {
        if !seen.contains(id) {
            blocks.push(Block::tool_result(
                id.clone(),
                "orphaned tool_call: no tool_result was recorded before the session was truncated".to_string(),
                true,
            ));
        }
    }
    out.push(Message::tool_results(blocks));
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(ts: i64) -> Entry {
        Entry::User { content: "hi".into(), ts_ms: ts }
    }

    #[test]
    fn per_sender_path_falls_back_to_channel_when_sender_empty() {
        let root = Path::new("/state");
        let p = session_path(root, "main", "slack", "", SessionScope::PerSender);
        assert_eq!(p, root.join("main").join("slack.jsonl"));
    }

    #[test]
    fn per_sender_path_nests_under_channel() {
        let root = Path::new("/state");
        let p = session_path(root, "main", "slack", "u1", SessionScope::PerSender);
        assert_eq!(p, root.join("main").join("slack").join("u1.jsonl"));
    }

    #[test]
    fn per_channel_path_ignores_sender() {
        let root = Path::new("/state");
        let p = session_path(root, "main", "slack", "u1", SessionScope::PerChannel);
        assert_eq!(p, root.join("main").join("slack.jsonl"));
    }

    #[test]
    fn global_path_is_agent_only() {
        let root = Path::new("/state");
        let p = session_path(root, "main", "slack", "u1", SessionScope::Global);
        assert_eq!(p, root.join("main.jsonl"));
    }

    #[tokio::test]
    async fn append_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(1)).await.unwrap();
        let entries = store.load(None).await.unwrap();
        assert_eq!(entries, vec![user(1)]);
    }

    #[tokio::test]
    async fn load_on_missing_file_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("missing.jsonl"));
        assert!(store.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_skips_unparseable_trailing_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut good = serde_json::to_string(&user(1)).unwrap();
        good.push('\n');
        std::fs::write(&path, format!("{good}{{not json")).unwrap();

        let store = SessionStore::new(path);
        let entries = store.load(None).await.unwrap();
        assert_eq!(entries, vec![user(1)]);
    }

    #[tokio::test]
    async fn load_with_limit_returns_last_n() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        for ts in 1..=5 {
            store.append(user(ts)).await.unwrap();
        }
        let entries = store.load(Some(2)).await.unwrap();
        assert_eq!(entries, vec![user(4), user(5)]);
    }

    #[tokio::test]
    async fn prune_keeps_last_k_entries_in_order() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        for ts in 1..=5 {
            store.append(user(ts)).await.unwrap();
        }
        store.prune(2).await.unwrap();
        let entries = store.load(None).await.unwrap();
        assert_eq!(entries, vec![user(4), user(5)]);
    }

    #[tokio::test]
    async fn clear_empties_file_but_keeps_it() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(1)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load(None).await.unwrap().is_empty());
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(1)).await.unwrap();
        store.delete().await.unwrap();
        assert!(!store.path().exists());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn check_idle_reset_disabled_when_minutes_not_positive() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(0)).await.unwrap();
        assert!(!store.check_idle_reset(0, 10_000_000).await.unwrap());
        assert_eq!(store.load(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_idle_reset_clears_when_last_entry_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(0)).await.unwrap();
        let fired = store.check_idle_reset(5, 6 * 60_000).await.unwrap();
        assert!(fired);
        assert!(store.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_idle_reset_false_when_recent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("s.jsonl"));
        store.append(user(0)).await.unwrap();
        let fired = store.check_idle_reset(5, 60_000).await.unwrap();
        assert!(!fired);
        assert_eq!(store.load(None).await.unwrap().len(), 1);
    }

    #[test]
    fn project_messages_merges_assistant_text_with_following_tool_calls() {
        let entries = vec![
            Entry::User { content: "do it".into(), ts_ms: 1 },
            Entry::Assistant { content: "on it".into(), ts_ms: 2 },
            Entry::ToolCall {
                tool_name: "shell".into(),
                tool_input: serde_json::json!({"command": "ls"}),
                tool_id: "t1".into(),
                ts_ms: 2,
            },
            Entry::ToolResult {
                tool_id: "t1".into(),
                content: "a.txt".into(),
                is_error: false,
                ts_ms: 3,
            },
            Entry::Assistant { content: "done".into(), ts_ms: 4 },
        ];
        let messages = project_messages(&entries);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, bashclaw_model::Role::User);
        assert_eq!(messages[1].tool_uses().len(), 1);
        assert_eq!(messages[2].role, bashclaw_model::Role::User);
        assert_eq!(messages[3].text_summary(), "done");
    }

    fn tool_result_blocks(m: &Message) -> Vec<(&str, &str, bool)> {
        m.content
            .iter()
            .filter_map(|b| match b {
                Block::ToolResult { tool_use_id, content, is_error } => {
                    Some((tool_use_id.as_str(), content.as_str(), *is_error))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn project_messages_synthesizes_placeholder_for_orphaned_tool_call() {
        // The matching tool_result never made it into the log (e.g. cut off
        // by a prune mid-pair): the tool_call must not reach a provider
        // without a paired result.
        let entries = vec![
            Entry::User { content: "do it".into(), ts_ms: 1 },
            Entry::Assistant { content: "on it".into(), ts_ms: 2 },
            Entry::ToolCall {
                tool_name: "shell".into(),
                tool_input: serde_json::json!({"command": "ls"}),
                tool_id: "t1".into(),
                ts_ms: 2,
            },
        ];
        let messages = project_messages(&entries);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].tool_uses().len(), 1);
        assert_eq!(messages[2].role, bashclaw_model::Role::User);
        let results = tool_result_blocks(&messages[2]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "t1");
        assert!(results[0].2);
        assert!(results[0].1.contains("orphaned tool_call"));
    }

    #[test]
    fn project_messages_only_synthesizes_for_the_unmatched_id() {
        let entries = vec![
            Entry::Assistant { content: "on it".into(), ts_ms: 1 },
            Entry::ToolCall {
                tool_name: "shell".into(),
                tool_input: serde_json::json!({"command": "ls"}),
                tool_id: "t1".into(),
                ts_ms: 1,
            },
            Entry::ToolCall {
                tool_name: "memory".into(),
                tool_input: serde_json::json!({"action": "list"}),
                tool_id: "t2".into(),
                ts_ms: 1,
            },
            Entry::ToolResult {
                tool_id: "t1".into(),
                content: "a.txt".into(),
                is_error: false,
                ts_ms: 2,
            },
        ];
        let messages = project_messages(&entries);
        assert_eq!(messages.len(), 2);
        let results = tool_result_blocks(&messages[1]);
        assert_eq!(results.len(), 2);
        let t1 = results.iter().find(|r| r.0 == "t1").unwrap();
        let t2 = results.iter().find(|r| r.0 == "t2").unwrap();
        assert!(!t1.2);
        assert!(t2.2);
        assert!(t2.1.contains("orphaned tool_call"));
    }

    #[test]
    fn project_messages_excludes_meta_entries() {
        let entries = vec![
            Entry::Meta { payload: serde_json::json!({"cc_session_id": "abc"}), ts_ms: 1 },
            Entry::User { content: "hi".into(), ts_ms: 2 },
        ];
        let messages = project_messages(&entries);
        assert_eq!(messages.len(), 1);
    }
}
