//! The slice of the VFS the storage driver talks to: block-device nodes
//! with a four-operation capability, and the registry they are mounted
//! into.

#![allow(dead_code)] // Parts of the node surface are for the wider VFS.

pub mod block_node;
pub mod range;

use crate::sync::SpinLock;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use lazy_static::lazy_static;
use silt_shared::println;

/// Node flag: the node fronts a block device.
pub const NODE_BLOCK_DEVICE: u32 = 0x04;

/// What a block-device node can do. Offsets and sizes are bytes; the
/// return value is how many bytes actually moved. Errors surface only as
/// short counts.
pub trait BlockCapability: Send + Sync {
    fn read(&self, offset: u64, buf: &mut [u8]) -> usize;
    fn write(&self, offset: u64, buf: &[u8]) -> usize;
    fn open(&self) {}
    fn close(&self) {}
}

/// A device node as the VFS sees it: attribute block plus capability.
pub struct DeviceNode {
    /// Attribute name (`atadev0`, `cdrom0`, ...), distinct from the
    /// `/dev` path the node is mounted at.
    pub name: String,
    pub flags: u32,
    /// Device capacity in bytes.
    pub length: u64,
    pub mask: u16,
    pub uid: u32,
    pub gid: u32,
    ops: Arc<dyn BlockCapability>,
}

impl DeviceNode {
    pub fn new(name: String, length: u64, ops: Arc<dyn BlockCapability>) -> DeviceNode {
        DeviceNode {
            name,
            flags: NODE_BLOCK_DEVICE,
            length,
            mask: 0o660,
            uid: 0,
            gid: 0,
            ops,
        }
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.ops.read(offset, buf)
    }

    pub fn write(&self, offset: u64, buf: &[u8]) -> usize {
        self.ops.write(offset, buf)
    }

    pub fn open(&self) {
        self.ops.open();
    }

    pub fn close(&self) {
        self.ops.close();
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flags {:#x} mode {:o} {}:{} {} bytes",
            self.name, self.flags, self.mask, self.uid, self.gid, self.length
        )
    }
}

/// Maintains the mounted device nodes.
pub struct NodeRegistry {
    nodes: Vec<(String, Arc<DeviceNode>)>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        NodeRegistry { nodes: Vec::new() }
    }

    /// Mount `node` at `path` and log the fact.
    pub fn mount(&mut self, path: String, node: Arc<DeviceNode>) {
        println!("vfs: mounted {path} ({})", *node);
        self.nodes.push((path, node));
    }

    pub fn by_path(&self, path: &str) -> Option<&Arc<DeviceNode>> {
        self.nodes
            .iter()
            .find(|(mounted, _)| mounted == path)
            .map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<DeviceNode>)> {
        self.nodes.iter().map(|(path, node)| (path.as_str(), node))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Block devices:")?;
        for (path, node) in &self.nodes {
            writeln!(f, "    {path} | {node}")?;
        }
        Ok(())
    }
}

lazy_static! {
    /// The system-wide registry the boot path mounts into. Tests build
    /// their own registries instead.
    pub static ref DEV_REGISTRY: SpinLock<NodeRegistry> = SpinLock::new(NodeRegistry::new());
}
