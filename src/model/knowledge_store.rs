use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::error::InsertionFailure;
use crate::model::fact::FactRecord;

/// The store is shared by the engine and both agents of one run.
pub type SharedKnowledgeStore = Rc<RefCell<KnowledgeStore>>;

/// What `insert` does when a path already holds facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    /// Keep every fact, in insertion order.
    #[default]
    Accumulate,
    /// Replace the fact already stored under the path.
    Overwrite,
}

/// Persistence collaborator notified of every insert.
pub trait FactJournal {
    fn record(&self, path: &str, fact: &FactRecord) -> Result<(), InsertionFailure>;
}

/// Appends one JSON object per fact to a file.
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Serialize)]
struct JournalLine<'a> {
    path: &'a str,
    fact: &'a FactRecord,
}

impl FactJournal for JsonlJournal {
    fn record(&self, path: &str, fact: &FactRecord) -> Result<(), InsertionFailure> {
        let failure = |reason: String| InsertionFailure {
            path: path.to_string(),
            reason,
        };

        let line = serde_json::to_string(&JournalLine { path, fact })
            .map_err(|e| failure(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| failure(format!("{}: {}", self.path.display(), e)))?;

        writeln!(file, "{}", line).map_err(|e| failure(e.to_string()))
    }
}

/// Path-keyed accumulation of facts for one topic.
pub struct KnowledgeStore {
    topic: String,
    depth: usize,
    parent: Option<Weak<RefCell<KnowledgeStore>>>,
    policy: InsertPolicy,
    entries: Vec<(String, FactRecord)>,
    journal: Option<Box<dyn FactJournal>>,
}

impl KnowledgeStore {
    pub fn new(topic: impl Into<String>, policy: InsertPolicy) -> Self {
        Self {
            topic: topic.into(),
            depth: 0,
            parent: None,
            policy,
            entries: Vec::new(),
            journal: None,
        }
    }

    pub fn shared(topic: impl Into<String>, policy: InsertPolicy) -> SharedKnowledgeStore {
        Rc::new(RefCell::new(Self::new(topic, policy)))
    }

    /// A store for a sub-topic, one level below `parent`. The child only
    /// holds a weak back-reference.
    pub fn child(parent: &SharedKnowledgeStore, subtopic: impl Into<String>) -> SharedKnowledgeStore {
        let (depth, policy) = {
            let p = parent.borrow();
            (p.depth + 1, p.policy)
        };

        Rc::new(RefCell::new(Self {
            topic: subtopic.into(),
            depth,
            parent: Some(Rc::downgrade(parent)),
            policy,
            entries: Vec::new(),
            journal: None,
        }))
    }

    pub fn with_journal(mut self, journal: Box<dyn FactJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn set_journal(&mut self, journal: Box<dyn FactJournal>) {
        self.journal = Some(journal);
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    /// `/`-joined topics from the outermost live ancestor down to this store.
    pub fn topic_path(&self) -> String {
        match self.parent.as_ref().and_then(Weak::upgrade) {
            Some(parent) => format!("{}/{}", parent.borrow().topic_path(), self.topic),
            None => self.topic.clone(),
        }
    }

    /// Starts a fresh run for `topic`. Policy, journal and parent link survive.
    pub fn reset(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
        self.entries.clear();
    }

    /// Stores `fact` under `path`. The in-memory insert always happens; an
    /// error only reports that the journal could not persist it.
    pub fn insert(&mut self, path: &str, fact: FactRecord) -> Result<(), InsertionFailure> {
        let journaled = match &self.journal {
            Some(journal) => journal.record(path, &fact),
            None => Ok(()),
        };

        let slot = match self.policy {
            InsertPolicy::Overwrite => self.entries.iter_mut().find(|(p, _)| p == path),
            InsertPolicy::Accumulate => None,
        };
        match slot {
            Some(entry) => entry.1 = fact,
            None => self.entries.push((path.to_string(), fact)),
        }

        tracing::debug!(path, facts = self.entries.len(), "fact inserted");
        journaled
    }

    /// Every stored fact in insertion order. Call again to restart.
    pub fn lookup_all(&self) -> impl Iterator<Item = &FactRecord> + Clone + '_ {
        self.entries.iter().map(|(_, fact)| fact)
    }

    pub fn lookup(&self, path: &str) -> impl Iterator<Item = &FactRecord> + '_ {
        let path = path.to_string();
        self.entries
            .iter()
            .filter(move |(p, _)| *p == path)
            .map(|(_, fact)| fact)
    }

    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for (p, _) in &self.entries {
            if !paths.contains(&p.as_str()) {
                paths.push(p);
            }
        }
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fact::UNATTRIBUTED;

    struct FailingJournal;

    impl FactJournal for FailingJournal {
        fn record(&self, path: &str, _fact: &FactRecord) -> Result<(), InsertionFailure> {
            Err(InsertionFailure {
                path: path.to_string(),
                reason: "disk full".into(),
            })
        }
    }

    fn fact(content: &str) -> FactRecord {
        FactRecord::new(content, UNATTRIBUTED)
    }

    #[test]
    fn accumulate_keeps_every_fact_in_order() {
        let mut store = KnowledgeStore::new("Rust", InsertPolicy::Accumulate);
        store.insert("Rust", fact("a")).unwrap();
        store.insert("Rust/history", fact("b")).unwrap();
        store.insert("Rust", fact("c")).unwrap();

        let all: Vec<&str> = store.lookup_all().map(|f| f.content()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);
        assert_eq!(store.lookup("Rust").count(), 2);
        assert_eq!(store.paths(), vec!["Rust", "Rust/history"]);
    }

    #[test]
    fn overwrite_replaces_in_place() {
        let mut store = KnowledgeStore::new("Rust", InsertPolicy::Overwrite);
        store.insert("Rust", fact("a")).unwrap();
        store.insert("Rust/history", fact("b")).unwrap();
        store.insert("Rust", fact("c")).unwrap();

        let all: Vec<&str> = store.lookup_all().map(|f| f.content()).collect();
        assert_eq!(all, vec!["c", "b"]);
    }

    #[test]
    fn lookup_all_is_restartable() {
        let mut store = KnowledgeStore::new("Rust", InsertPolicy::Accumulate);
        store.insert("Rust", fact("a")).unwrap();
        store.insert("Rust", fact("b")).unwrap();

        let iter = store.lookup_all();
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(store.lookup_all().count(), 2);
    }

    #[test]
    fn child_store_tracks_parent_without_owning_it() {
        let root = KnowledgeStore::shared("Computing", InsertPolicy::Accumulate);
        let child = KnowledgeStore::child(&root, "Rust");

        assert_eq!(child.borrow().depth(), 1);
        assert_eq!(child.borrow().topic_path(), "Computing/Rust");
        assert_eq!(Rc::strong_count(&root), 1);

        drop(root);
        assert_eq!(child.borrow().topic_path(), "Rust");
    }

    #[test]
    fn child_inherits_parent_policy() {
        let root = KnowledgeStore::shared("Computing", InsertPolicy::Overwrite);
        let child = KnowledgeStore::child(&root, "Rust");
        assert_eq!(child.borrow().policy(), InsertPolicy::Overwrite);

        child.borrow_mut().reset("Go");
        assert_eq!(child.borrow().policy(), InsertPolicy::Overwrite);
    }

    #[test]
    fn journal_failure_still_keeps_fact_in_memory() {
        let mut store =
            KnowledgeStore::new("Rust", InsertPolicy::Accumulate).with_journal(Box::new(FailingJournal));

        let err = store.insert("Rust", fact("a")).unwrap_err();
        assert_eq!(err.path, "Rust");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn jsonl_journal_appends_one_line_per_fact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        let mut store = KnowledgeStore::new("Rust", InsertPolicy::Accumulate)
            .with_journal(Box::new(JsonlJournal::new(&path)));

        store
            .insert("Rust", fact("a").with_metadata("question", "Q1"))
            .unwrap();
        store.insert("Rust", fact("b")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["path"], "Rust");
        assert_eq!(lines[0]["fact"]["content"], "a");
    }

    #[test]
    fn reset_clears_facts_and_renames_topic() {
        let mut store = KnowledgeStore::new("Rust", InsertPolicy::Accumulate);
        store.insert("Rust", fact("a")).unwrap();
        store.reset("Go");
        assert!(store.is_empty());
        assert_eq!(store.topic(), "Go");
    }
}
