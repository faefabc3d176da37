//! Incremental directory tree rebuilt from journaled directory entries.
//! The journal is untrusted input: parent links may be missing, stale or
//! cyclic, so path resolution is hop-bounded and carries a visited set.
use std::collections::{HashMap, HashSet};

use log::trace;

use crate::direntry::DirEntry;
use crate::inode::Inode;

pub const ROOT_INODE: u32 = 2;
pub const LOST_FOUND_INODE: u32 = 11;

/// Upper bound on parent hops during path resolution.
const MAX_DEPTH: usize = 256;

#[derive(Debug)]
pub struct DirectoryNode {
    pub inode_number: u32,
    pub parent_inode: u32,
    pub name: String,
    pub children: Vec<u32>,
    pub is_directory: bool,
}

pub struct DirectoryTree {
    nodes: HashMap<u32, DirectoryNode>,
    path_cache: HashMap<u32, String>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            DirectoryNode {
                inode_number: ROOT_INODE,
                parent_inode: ROOT_INODE,
                name: String::new(),
                children: Vec::new(),
                is_directory: true,
            },
        );
        DirectoryTree {
            nodes,
            path_cache: HashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, inode: u32) -> Option<&DirectoryNode> {
        self.nodes.get(&inode)
    }

    /// Record one observed parent→child edge. `.`/`..`, deleted entries and
    /// empty names carry no tree information and are ignored. A conflicting
    /// edge for an already-known child replaces the old one: the journal is
    /// scanned in log order, so the later observation wins.
    pub fn add_entry(&mut self, parent_inode: u32, entry: &DirEntry) {
        if entry.is_dot_entry() || entry.inode == 0 || entry.name.is_empty() {
            return;
        }
        if entry.inode == ROOT_INODE {
            return;
        }
        trace!(
            "dirtree: edge {} -> {} ({})",
            parent_inode,
            entry.inode,
            entry.name
        );

        let is_directory = entry.is_directory();
        match self.nodes.get_mut(&entry.inode) {
            Some(node) => {
                node.parent_inode = parent_inode;
                node.name = entry.name.clone();
                node.is_directory = is_directory;
            }
            None => {
                self.nodes.insert(
                    entry.inode,
                    DirectoryNode {
                        inode_number: entry.inode,
                        parent_inode,
                        name: entry.name.clone(),
                        children: Vec::new(),
                        is_directory,
                    },
                );
            }
        }

        let parent = self
            .nodes
            .entry(parent_inode)
            .or_insert_with(|| DirectoryNode {
                // Placeholder until (if ever) the parent's own entry shows up.
                inode_number: parent_inode,
                parent_inode: 0,
                name: String::new(),
                children: Vec::new(),
                is_directory: true,
            });
        if !parent.children.contains(&entry.inode) {
            parent.children.push(entry.inode);
        }

        self.path_cache.clear();
    }

    /// Refine a node's directory flag from a decoded inode.
    pub fn add_inode_info(&mut self, inode: u32, info: &Inode) {
        if let Some(node) = self.nodes.get_mut(&inode) {
            node.is_directory = info.is_dir();
        }
    }

    /// Resolve an inode to an absolute path from whatever part of the tree
    /// the journal revealed. Unresolvable parents make the result
    /// root-relative; cycles and over-deep chains return a sentinel.
    pub fn build_full_path(&mut self, inode: u32) -> String {
        if inode == ROOT_INODE {
            return "/".to_string();
        }
        if inode == LOST_FOUND_INODE {
            return "/lost+found".to_string();
        }
        if let Some(path) = self.path_cache.get(&inode) {
            return path.clone();
        }
        if !self.nodes.contains_key(&inode) {
            return format!("/unknown_inode_{}", inode);
        }

        let mut parts: Vec<String> = Vec::new();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut current = inode;
        loop {
            if current == ROOT_INODE {
                break;
            }
            if !visited.insert(current) || visited.len() > MAX_DEPTH {
                return format!("/cycle_detected_{}", inode);
            }
            match self.nodes.get(&current) {
                Some(node) if !node.name.is_empty() => {
                    parts.push(node.name.clone());
                    current = node.parent_inode;
                }
                // Placeholder or missing node: the chain is unresolved and
                // the accumulated components are taken as root-relative.
                _ => break,
            }
        }

        parts.reverse();
        let mut path = format!("/{}", parts.join("/"));
        while path.contains("//") {
            path = path.replace("//", "/");
        }
        self.path_cache.insert(inode, path.clone());
        path
    }
}
