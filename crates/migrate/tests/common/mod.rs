#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use migrate_core::{MigrationObserver, MigrationSummary, Progress};
use migrate_legacy::{
    CommitInfo, ExportItem, ExportedNode, LegacyError, LegacySource, LegacyStoreReader,
    NodeExporter, TreeHandle, TreeRoot,
};
use migrate_snapshot::{ImportError, SnapshotImporter, SnapshotNode};

pub fn leaf(key: &str, version: i64) -> ExportedNode {
    ExportedNode {
        key: key.as_bytes().to_vec(),
        value: format!("{key}-value").into_bytes(),
        version,
        height: 0,
    }
}

pub fn branch(key: &str, version: i64, height: i8) -> ExportedNode {
    ExportedNode {
        key: key.as_bytes().to_vec(),
        value: Vec::new(),
        version,
        height,
    }
}

/// Post-order export of a balanced three-leaf tree.
pub fn three_leaf_tree(version: i64) -> Vec<ExportedNode> {
    vec![
        leaf("a", version),
        leaf("b", version),
        leaf("c", version),
        branch("c", version, 1),
        branch("b", version, 2),
    ]
}

#[derive(Clone)]
pub enum FakeTree {
    Nodes(Vec<ExportedNode>),
    /// Yields the nodes, then fails instead of finishing.
    FailsAfter(Vec<ExportedNode>),
    /// `export()` itself fails.
    ExportError,
}

#[derive(Clone)]
struct FakeStore {
    version: i64,
    tree: Option<FakeTree>,
}

/// In-memory legacy database. Counts how many readers were opened.
#[derive(Clone, Default)]
pub struct FakeSource {
    stores: BTreeMap<String, FakeStore>,
    opens: Rc<Cell<usize>>,
    /// Zero-based index of the first `open()` call that fails.
    fail_open_from: Option<usize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(mut self, store: &str, version: i64, tree: FakeTree) -> Self {
        self.stores.insert(
            store.to_owned(),
            FakeStore {
                version,
                tree: Some(tree),
            },
        );
        self
    }

    pub fn without_tree(mut self, store: &str, version: i64) -> Self {
        self.stores
            .insert(store.to_owned(), FakeStore { version, tree: None });
        self
    }

    pub fn failing_open(self) -> Self {
        self.failing_open_from(0)
    }

    /// Lets the first `index` opens succeed and fails every later one.
    pub fn failing_open_from(mut self, index: usize) -> Self {
        self.fail_open_from = Some(index);
        self
    }

    pub fn opens(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.opens)
    }
}

impl LegacySource for FakeSource {
    type Reader = FakeReader;

    fn open(&self) -> Result<FakeReader, LegacyError> {
        let attempt = self.opens.get();
        self.opens.set(attempt + 1);
        if self.fail_open_from.is_some_and(|from| attempt >= from) {
            return Err(LegacyError::MissingLatestVersion);
        }
        let commit_infos = self
            .stores
            .iter()
            .map(|(name, store)| {
                (
                    name.clone(),
                    CommitInfo {
                        name: name.clone(),
                        version: store.version,
                        hash: Vec::new(),
                    },
                )
            })
            .collect();
        Ok(FakeReader {
            stores: self.stores.clone(),
            commit_infos,
        })
    }
}

pub struct FakeReader {
    stores: BTreeMap<String, FakeStore>,
    commit_infos: BTreeMap<String, CommitInfo>,
}

impl LegacyStoreReader for FakeReader {
    type Tree = FakeTreeHandle;

    fn commit_info_by_name(&self) -> &BTreeMap<String, CommitInfo> {
        &self.commit_infos
    }

    fn latest_tree(&self, store: &str) -> Result<(TreeRoot, FakeTreeHandle), LegacyError> {
        let entry = self.stores.get(store);
        match entry.and_then(|entry| entry.tree.clone().map(|tree| (entry.version, tree))) {
            Some((version, tree)) => Ok((
                TreeRoot {
                    version,
                    hash: None,
                },
                FakeTreeHandle {
                    store: store.to_owned(),
                    tree,
                },
            )),
            None => Err(LegacyError::TreeUnavailable {
                store: store.to_owned(),
            }),
        }
    }
}

pub struct FakeTreeHandle {
    store: String,
    tree: FakeTree,
}

impl TreeHandle for FakeTreeHandle {
    type Exporter = FakeExporter;

    fn export(&self) -> Result<FakeExporter, LegacyError> {
        let (nodes, fail) = match &self.tree {
            FakeTree::Nodes(nodes) => (nodes.clone(), false),
            FakeTree::FailsAfter(nodes) => (nodes.clone(), true),
            FakeTree::ExportError => {
                return Err(LegacyError::MissingNode {
                    store: self.store.clone(),
                    hash: "00".into(),
                });
            }
        };
        Ok(FakeExporter {
            store: self.store.clone(),
            nodes: nodes.into_iter(),
            fail,
            finished: false,
        })
    }
}

pub struct FakeExporter {
    store: String,
    nodes: std::vec::IntoIter<ExportedNode>,
    fail: bool,
    finished: bool,
}

impl NodeExporter for FakeExporter {
    fn next(&mut self) -> ExportItem {
        if self.finished {
            return ExportItem::Done;
        }
        if let Some(node) = self.nodes.next() {
            return ExportItem::Node(node);
        }
        self.finished = true;
        if self.fail {
            ExportItem::Failed(LegacyError::MissingNode {
                store: self.store.clone(),
                hash: "ff".into(),
            })
        } else {
            ExportItem::Done
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(i64),
    AddTree(String),
    AddNode(SnapshotNode),
    Finalize,
    Close,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Records every call it receives into a shared log.
pub struct FakeImporter {
    log: CallLog,
    fail_add_node_at: Option<usize>,
    fail_finalize: bool,
    fail_close: bool,
    nodes_seen: usize,
}

impl FakeImporter {
    pub fn new(log: &CallLog, version: i64) -> Self {
        log.borrow_mut().push(Call::Create(version));
        Self {
            log: Rc::clone(log),
            fail_add_node_at: None,
            fail_finalize: false,
            fail_close: false,
            nodes_seen: 0,
        }
    }

    /// Fails the `index`-th (zero based) `add_node` call of the run.
    pub fn failing_add_node_at(mut self, index: usize) -> Self {
        self.fail_add_node_at = Some(index);
        self
    }

    pub fn failing_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

impl SnapshotImporter for FakeImporter {
    fn add_tree(&mut self, name: &str) -> Result<(), ImportError> {
        self.log.borrow_mut().push(Call::AddTree(name.to_owned()));
        Ok(())
    }

    fn add_node(&mut self, node: SnapshotNode) -> Result<(), ImportError> {
        let index = self.nodes_seen;
        self.nodes_seen += 1;
        self.log.borrow_mut().push(Call::AddNode(node));
        if self.fail_add_node_at == Some(index) {
            return Err(ImportError::NoTreeDeclared);
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), ImportError> {
        self.log.borrow_mut().push(Call::Finalize);
        if self.fail_finalize {
            return Err(ImportError::AlreadyFinalized);
        }
        Ok(())
    }

    fn close(self) -> Result<(), ImportError> {
        self.log.borrow_mut().push(Call::Close);
        if self.fail_close {
            return Err(ImportError::Io(std::io::Error::other("close failed")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Discovered(Vec<String>, i64),
    Started(String),
    Skipped(String),
    Progress(String, u64),
    Migrated(String, u64),
    Finalized,
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Vec<Event>,
}

impl MigrationObserver for RecordingObserver {
    fn stores_discovered(&mut self, stores: &[String], version: i64) {
        self.events.push(Event::Discovered(stores.to_vec(), version));
    }

    fn store_started(&mut self, store: &str) {
        self.events.push(Event::Started(store.to_owned()));
    }

    fn store_skipped(&mut self, store: &str, _reason: &LegacyError) {
        self.events.push(Event::Skipped(store.to_owned()));
    }

    fn progress(&mut self, store: &str, progress: Progress) {
        self.events
            .push(Event::Progress(store.to_owned(), progress.count));
    }

    fn store_migrated(&mut self, store: &str, nodes: u64) {
        self.events.push(Event::Migrated(store.to_owned(), nodes));
    }

    fn snapshot_finalized(&mut self, _summary: &MigrationSummary) {
        self.events.push(Event::Finalized);
    }
}
