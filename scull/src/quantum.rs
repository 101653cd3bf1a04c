//! Sparse growable byte store
//!
//! The store is a singly linked chain of indirection nodes. Each node owns
//! an optional array of `qset` block slots; each slot optionally owns one
//! block of `quantum` zeroed bytes. Nodes, slot arrays and blocks are all
//! allocated on first write and only released by [`QuantumStore::trim`].
//!
//! Nodes and blocks live in two arenas and refer to each other by index,
//! so the chain is plain data: no raw pointers, no reference cycles.
//!
//! The store does no locking of its own. The owning device serialises every
//! call behind its gate.

use crate::error::Result;
use crate::geometry::{Geometry, Position};
use crate::io::{UserSink, UserSource};

/// Index of a node in the store's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Index of a block in the store's block arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

/// Fixed-capacity raw storage unit, zeroed on allocation
struct ByteBlock {
    data: Box<[u8]>,
}

impl ByteBlock {
    fn zeroed(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }
}

/// One link of the chain: `qset` optional blocks plus the next link
struct IndirectionNode {
    slots: Option<Box<[Option<BlockId>]>>,
    next: Option<NodeId>,
}

impl IndirectionNode {
    fn empty() -> Self {
        Self {
            slots: None,
            next: None,
        }
    }
}

/// Offset-addressed storage of one device
pub struct QuantumStore {
    /// Tunables applied at the next trim (and immediately when empty)
    configured: Geometry,
    /// Tunables the current chain was built with
    active: Geometry,
    nodes: Vec<IndirectionNode>,
    blocks: Vec<ByteBlock>,
    head: Option<NodeId>,
    /// High-water mark of bytes written
    size: u64,
}

impl QuantumStore {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            configured: geometry,
            active: geometry,
            nodes: Vec::new(),
            blocks: Vec::new(),
            head: None,
            size: 0,
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Geometry used for address translation right now
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.active
    }

    /// Geometry that configuration commands read and write
    #[must_use]
    pub fn configured(&self) -> Geometry {
        self.configured
    }

    /// No chain exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Length of the node chain
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of allocated blocks
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Change the configured geometry.
    ///
    /// An empty store adopts it at once. A store holding a chain keeps
    /// translating with the geometry the chain was built with until the next
    /// trim. Returns whether the change is already active.
    pub fn configure(&mut self, geometry: Geometry) -> bool {
        self.configured = geometry;
        if self.is_empty() {
            self.active = geometry;
            true
        } else {
            false
        }
    }

    /// Read from `*pos`, at most up to the end of the addressed block.
    ///
    /// Returns 0 at or past `size` and when the addressed block is a hole.
    /// Advances `*pos` by the bytes copied.
    ///
    /// # Errors
    ///
    /// `Fault` if the copy to `buf` fails; `*pos` is left unchanged.
    pub fn read<S>(&self, pos: &mut u64, buf: &mut S) -> Result<usize>
    where
        S: UserSink + ?Sized,
    {
        if *pos >= self.size {
            return Ok(0);
        }
        let remaining = usize::try_from(self.size - *pos).unwrap_or(usize::MAX);
        let count = buf.len().min(remaining);

        let at = self.active.locate(*pos)?;
        let Some(block) = self.walk(at.node).and_then(|node| self.slot(node, at.slot)) else {
            return Ok(0);
        };

        let count = count.min(self.active.quantum() - at.byte);
        let data = &self.blocks[block.0].data[at.byte..at.byte + count];
        buf.copy_from(data)?;

        *pos += count as u64;
        Ok(count)
    }

    /// Write at `*pos`, at most up to the end of the addressed block.
    ///
    /// Extends the chain, the slot array and the block as needed. Advances
    /// `*pos` and raises `size` to cover the bytes written.
    ///
    /// # Errors
    ///
    /// - `OutOfMemory` if a node, slot array or block cannot be allocated.
    ///   Nodes already linked in stay linked.
    /// - `Fault` if the copy from `src` fails; the block stays allocated but
    ///   `size` and `*pos` are unchanged.
    pub fn write<S>(&mut self, pos: &mut u64, src: &S) -> Result<usize>
    where
        S: UserSource + ?Sized,
    {
        let at = self.active.locate(*pos)?;
        let node = self.follow(at.node)?;
        let block = self.ensure_block(node, at)?;

        let count = src.len().min(self.active.quantum() - at.byte);
        let data = &mut self.blocks[block.0].data[at.byte..at.byte + count];
        src.copy_into(data)?;

        *pos += count as u64;
        self.size = self.size.max(*pos);
        Ok(count)
    }

    /// Free the whole chain and restore the configured geometry.
    ///
    /// Safe to call on an empty store.
    pub fn trim(&mut self) {
        let mut freed_nodes = 0usize;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.0];
            node.slots = None;
            cursor = node.next.take();
            freed_nodes += 1;
        }
        log::debug!(
            "trim: freed {freed_nodes} nodes, {} blocks, {} bytes",
            self.blocks.len(),
            self.size
        );

        self.nodes = Vec::new();
        self.blocks = Vec::new();
        self.head = None;
        self.size = 0;
        self.active = self.configured;
    }

    /// Walk to node `n`, creating the head and any missing links
    fn follow(&mut self, n: usize) -> Result<NodeId> {
        let mut current = match self.head {
            Some(id) => id,
            None => {
                let id = self.push_node()?;
                self.head = Some(id);
                id
            }
        };
        for _ in 0..n {
            current = match self.nodes[current.0].next {
                Some(next) => next,
                None => {
                    let id = self.push_node()?;
                    self.nodes[current.0].next = Some(id);
                    id
                }
            };
        }
        Ok(current)
    }

    /// Walk to node `n` without creating anything
    fn walk(&self, n: usize) -> Option<NodeId> {
        let mut current = self.head?;
        for _ in 0..n {
            current = self.nodes[current.0].next?;
        }
        Some(current)
    }

    fn slot(&self, node: NodeId, slot: usize) -> Option<BlockId> {
        self.nodes[node.0].slots.as_ref()?.get(slot).copied().flatten()
    }

    fn push_node(&mut self) -> Result<NodeId> {
        self.nodes.try_reserve(1)?;
        self.nodes.push(IndirectionNode::empty());
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn ensure_block(&mut self, node: NodeId, at: Position) -> Result<BlockId> {
        if self.nodes[node.0].slots.is_none() {
            let qset = self.active.qset();
            let mut slots = Vec::new();
            slots.try_reserve_exact(qset)?;
            slots.resize(qset, None);
            self.nodes[node.0].slots = Some(slots.into_boxed_slice());
        }
        if let Some(block) = self.slot(node, at.slot) {
            return Ok(block);
        }

        let block = ByteBlock::zeroed(self.active.quantum())?;
        self.blocks.try_reserve(1)?;
        self.blocks.push(block);
        let id = BlockId(self.blocks.len() - 1);
        if let Some(slots) = self.nodes[node.0].slots.as_mut() {
            slots[at.slot] = Some(id);
        }
        Ok(id)
    }
}

impl std::fmt::Debug for QuantumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantumStore")
            .field("geometry", &self.active)
            .field("configured", &self.configured)
            .field("size", &self.size)
            .field("nodes", &self.nodes.len())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
