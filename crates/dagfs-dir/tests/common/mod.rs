//! Shared fixtures for directory engine tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use dagfs_cas::{Cid, DagLink, DagNode, MemoryStore, NodeStore, PutOptions};
use dagfs_dir::hamt::{slot, HamtParams};
use dagfs_dir::{AddLink, LinkEngine, LinkOptions, LinkResult, UnixFs};

/// Store a single-block file and return a link to it.
pub fn put_file<S: NodeStore>(store: &S, name: &str) -> anyhow::Result<DagLink> {
    let node = UnixFs::file(format!("contents of {}", name).into_bytes()).to_node()?;
    let cid = store.put(&node, &PutOptions::default())?;
    Ok(DagLink::new(name, node.cumulative_size()?, cid))
}

/// `count` stored files named `file-<i>.txt`.
pub fn files<S: NodeStore>(store: &S, count: usize) -> anyhow::Result<Vec<DagLink>> {
    (0..count).map(|i| put_file(store, &format!("file-{}.txt", i))).collect()
}

/// Add `links` one at a time, starting from `dir`.
pub fn add_all<S: NodeStore>(
    engine: &LinkEngine<S>,
    dir: &Cid,
    links: impl IntoIterator<Item = DagLink>,
    options: &LinkOptions,
) -> anyhow::Result<LinkResult> {
    let mut current = engine.resolve(dir)?;
    let mut result = None;
    for link in links {
        let next = engine.add_link(AddLink::new().parent(current).link(link), options)?;
        current = next.node.clone();
        result = Some(next);
    }
    result.ok_or_else(|| anyhow::anyhow!("no links added"))
}

pub fn names(links: &[DagLink]) -> BTreeSet<String> {
    links.iter().map(|l| l.name.clone()).collect()
}

/// Two distinct names that land in the same slot at depth 0.
pub fn colliding_names(params: HamtParams) -> (String, String) {
    let mut seen: HashMap<usize, String> = HashMap::new();
    let mut i = 0usize;
    loop {
        let name = format!("collide-{}", i);
        let pos = slot(&name, 0, params).expect("depth 0 is always in range");
        if let Some(other) = seen.insert(pos, name.clone()) {
            return (other, name);
        }
        i += 1;
    }
}

/// Memory store that counts every call made to it
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.puts.load(Ordering::SeqCst)
    }
}

impl NodeStore for CountingStore {
    fn get(&self, cid: &Cid) -> dagfs_cas::Result<DagNode> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(cid)
    }

    fn put(&self, node: &DagNode, options: &PutOptions) -> dagfs_cas::Result<Cid> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(node, options)
    }

    fn has(&self, cid: &Cid) -> dagfs_cas::Result<bool> {
        self.inner.has(cid)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
