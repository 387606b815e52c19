use std::sync::Arc;

use crate::node::{LegacyNode, NodeKind, node_key};
use crate::store::Db;
use crate::{ExportItem, ExportedNode, LegacyError, NodeExporter};

struct Frame {
    node: LegacyNode,
    /// Number of children already pushed onto the stack.
    visited: u8,
}

/// Post-order exporter over an IAVL tree stored in RocksDB.
///
/// Nodes are loaded lazily; memory use is bounded by the tree height.
pub struct IavlExporter {
    db: Arc<Db>,
    store: String,
    prefix: Vec<u8>,
    stack: Vec<Frame>,
}

impl IavlExporter {
    pub(crate) fn new(
        db: Arc<Db>,
        store: String,
        prefix: Vec<u8>,
        root: Option<[u8; 32]>,
    ) -> Result<Self, LegacyError> {
        let mut exporter = Self {
            db,
            store,
            prefix,
            stack: Vec::new(),
        };
        if let Some(hash) = root {
            let node = exporter.load(&hash)?;
            exporter.stack.push(Frame { node, visited: 0 });
        }
        Ok(exporter)
    }

    fn load(&self, hash: &[u8]) -> Result<LegacyNode, LegacyError> {
        let raw = self
            .db
            .get(node_key(&self.prefix, hash))?
            .ok_or_else(|| LegacyError::MissingNode {
                store: self.store.clone(),
                hash: hex::encode(hash),
            })?;
        LegacyNode::decode(&raw).map_err(LegacyError::decode("node"))
    }

    fn advance(&mut self) -> Result<Option<ExportedNode>, LegacyError> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            let child = match &frame.node.kind {
                NodeKind::Branch { left, .. } if frame.visited == 0 => Some(left.clone()),
                NodeKind::Branch { right, .. } if frame.visited == 1 => Some(right.clone()),
                _ => None,
            };

            let Some(hash) = child else {
                return Ok(self.stack.pop().map(|frame| frame.node.into_exported()));
            };
            frame.visited += 1;

            let node = self.load(&hash)?;
            self.stack.push(Frame { node, visited: 0 });
        }
    }
}

impl NodeExporter for IavlExporter {
    fn next(&mut self) -> ExportItem {
        match self.advance() {
            Ok(Some(node)) => ExportItem::Node(node),
            Ok(None) => ExportItem::Done,
            Err(error) => {
                self.stack.clear();
                ExportItem::Failed(error)
            }
        }
    }
}
