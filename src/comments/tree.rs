//! Arena holding a resolved comment thread
//!
//! Nodes are addressed by [`NodeId`]. Parent and reply links are ids into the
//! same arena, so relocating a comment into an ancestral thread is a slot
//! overwrite rather than a pointer swap.

use crate::comments::page::{CommentDetails, CommentPage, ThreadEntry};
use std::sync::Arc;
use tracing::trace;

/// Index of a node inside a [`CommentTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CommentNode {
    pub(crate) id: u64,
    pub(crate) parent_comment: Option<NodeId>,
    /// `None` until resolved; `Some(vec![])` is a resolved leaf
    pub(crate) thread: Option<Vec<NodeId>>,
    pub(crate) details: Option<CommentDetails>,
    /// The page fetched for this comment, if any
    pub(crate) page: Option<Arc<CommentPage>>,
}

impl CommentNode {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            parent_comment: None,
            thread: None,
            details: None,
            page: None,
        }
    }
}

/// All comments of one thread
#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    nodes: Vec<CommentNode>,
}

impl CommentTree {
    /// A tree holding a single, unresolved comment
    pub(crate) fn single(node: CommentNode) -> (Self, NodeId) {
        let mut tree = Self::default();
        let root = tree.push(node);
        (tree, root)
    }

    pub(crate) fn push(&mut self, node: CommentNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn node(&self, id: NodeId) -> &CommentNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut CommentNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrowed view of a node
    pub fn get(&self, id: NodeId) -> Option<CommentRef<'_>> {
        (id.0 < self.nodes.len()).then_some(CommentRef { tree: self, id })
    }

    /// Resolved replies of a node; empty when unresolved
    pub(crate) fn replies(&self, id: NodeId) -> &[NodeId] {
        self.node(id).thread.as_deref().unwrap_or(&[])
    }

    /// The page used for lookups on `id`: its own, or the nearest ancestor's
    pub(crate) fn effective_page(&self, id: NodeId) -> Option<&Arc<CommentPage>> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if let Some(page) = &node.page {
                return Some(page);
            }
            current = node.parent_comment;
        }
        None
    }

    /// Topmost ancestor of `id` (itself if it has no parent comment)
    pub(crate) fn first_parent(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent_comment {
            current = parent;
        }
        current
    }

    /// Depth-first iterator over the thread below `root`
    pub fn iter(&self, root: NodeId) -> ThreadIter<'_> {
        ThreadIter::new(self, root)
    }

    /// Finds the node for `comment_id` in the thread below `root`
    pub(crate) fn find_in_thread(&self, root: NodeId, comment_id: u64) -> Option<NodeId> {
        self.iter(root)
            .map(|comment| comment.node_id())
            .find(|&node| self.node(node).id == comment_id)
    }

    /// Builds the replies of `root` from a page's thread walk
    ///
    /// The entry whose id matches the root's comment stands for the root
    /// itself and only backfills its details. Every entry below it becomes a
    /// new node with its details stamped and an already-resolved empty thread.
    pub(crate) fn attach_entries(&mut self, root: NodeId, entries: &[ThreadEntry]) {
        let root_id = self.node(root).id;
        self.node_mut(root).thread = Some(Vec::new());

        let Some(start) = entries.iter().position(|entry| entry.id == root_id) else {
            trace!(root_id, "Comment not in its own thread walk");
            return;
        };

        if self.node(root).details.is_none() {
            self.node_mut(root).details = Some(entries[start].details.clone());
        }

        let mut placed: Vec<Option<NodeId>> = vec![None; entries.len()];
        placed[start] = Some(root);

        for (index, entry) in entries.iter().enumerate().skip(start + 1) {
            let Some(parent) = entry.parent.and_then(|p| placed[p]) else {
                continue;
            };

            let child = self.push(CommentNode {
                id: entry.id,
                parent_comment: Some(parent),
                thread: Some(Vec::new()),
                details: Some(entry.details.clone()),
                page: None,
            });
            if let Some(thread) = self.node_mut(parent).thread.as_mut() {
                thread.push(child);
            }
            placed[index] = Some(child);
        }

        trace!(
            root_id,
            replies = self.replies(root).len(),
            nodes = self.nodes.len(),
            "Attached thread entries"
        );
    }
}

/// Depth-first walk of a resolved thread
///
/// Yields the starting comment alone when it has no replies. Otherwise yields
/// each reply followed by its own replies (pre-order), never the start itself.
#[derive(Debug, Clone)]
pub struct ThreadIter<'a> {
    tree: &'a CommentTree,
    root: NodeId,
    stack: Vec<NodeId>,
    yield_root: bool,
}

impl<'a> ThreadIter<'a> {
    fn new(tree: &'a CommentTree, root: NodeId) -> Self {
        let replies = tree.replies(root);
        Self {
            tree,
            root,
            stack: replies.iter().rev().copied().collect(),
            yield_root: replies.is_empty(),
        }
    }
}

impl<'a> Iterator for ThreadIter<'a> {
    type Item = CommentRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yield_root {
            self.yield_root = false;
            return Some(CommentRef {
                tree: self.tree,
                id: self.root,
            });
        }

        while let Some(next) = self.stack.pop() {
            if next == self.root {
                continue;
            }
            self.stack
                .extend(self.tree.replies(next).iter().rev().copied());
            return Some(CommentRef {
                tree: self.tree,
                id: next,
            });
        }
        None
    }
}

/// Borrowed view of one comment in a tree
#[derive(Debug, Clone, Copy)]
pub struct CommentRef<'a> {
    tree: &'a CommentTree,
    id: NodeId,
}

impl<'a> CommentRef<'a> {
    pub(crate) fn new(tree: &'a CommentTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn id(&self) -> u64 {
        self.node().id
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Byline username, if known and not a guest
    pub fn author(&self) -> Option<&'a str> {
        self.details().and_then(|d| d.author.as_deref())
    }

    /// Comment text; empty when unknown
    pub fn text(&self) -> &'a str {
        self.details().map(|d| d.text.as_str()).unwrap_or("")
    }

    pub fn parent_comment(&self) -> Option<CommentRef<'a>> {
        self.node().parent_comment.map(|id| CommentRef {
            tree: self.tree,
            id,
        })
    }

    /// Direct replies, or `None` if the thread was never resolved
    pub fn replies(&self) -> Option<Vec<CommentRef<'a>>> {
        let tree = self.tree;
        self.node().thread.as_ref().map(|thread| {
            thread
                .iter()
                .map(|&id| CommentRef { tree, id })
                .collect()
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.node().thread.is_some()
    }

    /// Depth-first walk below this comment
    pub fn thread_iter(&self) -> ThreadIter<'a> {
        self.tree.iter(self.id)
    }

    fn node(&self) -> &'a CommentNode {
        self.tree.node(self.id)
    }

    fn details(&self) -> Option<&'a CommentDetails> {
        let node = self.node();
        node.details.as_ref().or_else(|| {
            self.tree
                .effective_page(self.id)
                .and_then(|page| page.details_of(node.id))
        })
    }
}

impl PartialEq for CommentRef<'_> {
    /// Comments are equal when they have the same id
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
