//! Comments and comment threads
//!
//! # Components
//!
//! - `page`: Pure parsing of a comment page into thread entries
//! - `tree`: The arena a resolved thread lives in, and its depth-first iterator
//! - `comment`: The `Comment` handle, thread resolution and splicing

mod comment;
mod page;
mod tree;

pub use comment::{Comment, Commentable};
pub use page::{CommentDetails, CommentPage, ThreadEntry};
pub use tree::{CommentRef, CommentTree, NodeId, ThreadIter};

pub(crate) use comment::list_comments;
