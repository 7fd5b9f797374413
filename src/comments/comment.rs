use crate::comments::page::{comment_pages, listed_comments, CommentDetails, CommentPage};
use crate::requester::document::{csrf_token, is_error_page};
use crate::comments::tree::{CommentNode, CommentRef, CommentTree, NodeId, ThreadIter};
use crate::requester::{Connection, RawResponse};
use crate::session::actions;
use crate::users::User;
use crate::{Ao3Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use scraper::Html;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a comment was posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Commentable {
    /// Posted on the full work view
    Work(u64),
    Chapter(u64),
}

impl Commentable {
    pub fn id(&self) -> u64 {
        match self {
            Self::Work(id) | Self::Chapter(id) => *id,
        }
    }

    pub fn is_work(&self) -> bool {
        matches!(self, Self::Work(_))
    }
}

impl fmt::Display for Commentable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Work(id) => write!(f, "work {}", id),
            Self::Chapter(id) => write!(f, "chapter {}", id),
        }
    }
}

/// A comment on the archive and the thread it belongs to
///
/// The handle owns the arena of its thread; other comments in the thread are
/// reached through borrowed [`CommentRef`] views. Resolving a reply that was
/// fetched on its own climbs to the top of the thread and relocates this
/// comment into its real position, so every comment id appears once.
#[derive(Debug, Clone)]
pub struct Comment {
    id: u64,
    conn: Connection,
    parent: Option<Commentable>,
    authenticity_token: Option<String>,
    tree: CommentTree,
    node: NodeId,
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Comment {}

impl Comment {
    /// Creates a comment handle
    ///
    /// # Arguments
    ///
    /// * `id` - The comment id
    /// * `conn` - Gateway and optional session
    /// * `parent` - Where the comment was posted, if known
    /// * `load` - Fetch the comment page right away
    pub async fn new(
        id: u64,
        conn: Connection,
        parent: Option<Commentable>,
        load: bool,
    ) -> Result<Self> {
        let mut comment = Self::unloaded(id, conn, parent);
        if load {
            comment.reload().await?;
        }
        Ok(comment)
    }

    /// A handle that has fetched nothing yet
    pub fn unloaded(id: u64, conn: Connection, parent: Option<Commentable>) -> Self {
        let (tree, node) = CommentTree::single(CommentNode::new(id));
        Self {
            id,
            conn,
            parent,
            authenticity_token: None,
            tree,
            node,
        }
    }

    /// A handle seeded with what a listing page showed about the comment
    pub(crate) fn listed(
        id: u64,
        conn: Connection,
        parent: Commentable,
        authenticity_token: Option<String>,
        details: CommentDetails,
    ) -> Self {
        let mut comment = Self::unloaded(id, conn, Some(parent));
        comment.authenticity_token = authenticity_token;
        comment.tree.node_mut(comment.node).details = Some(details);
        comment
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<Commentable> {
        self.parent
    }

    pub fn authenticity_token(&self) -> Option<&str> {
        self.authenticity_token.as_deref()
    }

    /// True once a page is available in the lookup chain
    pub fn is_loaded(&self) -> bool {
        self.tree.effective_page(self.node).is_some()
    }

    /// Whether the comment was posted on the full work; `None` if unknown
    pub fn fullwork(&self) -> Option<bool> {
        self.parent.map(|parent| parent.is_work())
    }

    /// The arena of the thread this comment sits in
    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    /// This comment as a view into its own tree
    pub fn view(&self) -> CommentRef<'_> {
        CommentRef::new(&self.tree, self.node)
    }

    pub fn parent_comment(&self) -> Option<CommentRef<'_>> {
        self.view().parent_comment()
    }

    /// Topmost comment of the thread, or this comment if it is the top
    pub fn first_parent_comment(&self) -> CommentRef<'_> {
        CommentRef::new(&self.tree, self.tree.first_parent(self.node))
    }

    /// Comment text
    ///
    /// Served from what a listing or thread walk already showed, else from
    /// the nearest page in the lookup chain.
    pub fn text(&self) -> Result<String> {
        self.details().map(|details| details.text)
    }

    /// Byline username; `None` for guest comments
    pub fn author(&self) -> Result<Option<String>> {
        self.details().map(|details| details.author)
    }

    /// The author as an unloaded [`User`]
    pub fn author_user(&self) -> Result<Option<User>> {
        Ok(self
            .author()?
            .map(|name| User::unloaded(&name, self.conn.clone())))
    }

    fn details(&self) -> Result<CommentDetails> {
        let node = self.tree.node(self.node);
        if let Some(details) = &node.details {
            return Ok(details.clone());
        }
        let page = self
            .tree
            .effective_page(self.node)
            .ok_or_else(|| Ao3Error::unloaded("Comment"))?;
        Ok(page.details_of(self.id).cloned().unwrap_or_default())
    }

    /// Fetches `/comments/{id}` and starts over with a fresh, unresolved thread
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Page fetched and parsed
    /// * `Err(Ao3Error::InvalidId)` - The archive answered 404 or served its error page
    /// * `Err(Ao3Error::RateLimited)` - The archive answered 429
    pub async fn reload(&mut self) -> Result<()> {
        let url = self.conn.url(&format!("/comments/{}", self.id))?;
        let response = self.conn.get(url).await?;
        let document = Html::parse_document(&response.body);
        if response.status == StatusCode::NOT_FOUND || is_error_page(&document) {
            return Err(Ao3Error::InvalidId(format!(
                "Invalid comment id {}",
                self.id
            )));
        }

        let page = CommentPage::parse(&document, self.id)?;
        debug!(id = self.id, "Comment reloaded");

        self.authenticity_token = Some(page.authenticity_token.clone());
        if self.parent.is_none() {
            self.parent = page.commentable;
        }

        let mut node = CommentNode::new(self.id);
        node.page = Some(Arc::new(page));
        let (tree, root) = CommentTree::single(node);
        self.tree = tree;
        self.node = root;
        Ok(())
    }

    /// Direct replies to this comment, resolving the thread on first call
    ///
    /// Later calls return the same list without fetching anything.
    pub async fn get_thread(&mut self) -> Result<Vec<CommentRef<'_>>> {
        self.resolve_thread().await?;
        Ok(self.view().replies().unwrap_or_default())
    }

    /// Depth-first walk over the resolved thread
    ///
    /// Yields this comment alone when it has no replies; otherwise every
    /// reply followed by its own replies.
    pub async fn get_thread_iterator(&mut self) -> Result<ThreadIter<'_>> {
        self.resolve_thread().await?;
        Ok(self.tree.iter(self.node))
    }

    async fn resolve_thread(&mut self) -> Result<()> {
        let mut visited = HashSet::new();
        self.resolve_thread_from(&mut visited).await
    }

    /// Resolves the thread, climbing through comments not yet in `visited`
    ///
    /// A "Parent Thread" link back to a comment already on the climb is
    /// ignored and the thread is read from this comment's own page.
    fn resolve_thread_from<'a>(
        &'a mut self,
        visited: &'a mut HashSet<u64>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.tree.node(self.node).thread.is_some() {
                return Ok(());
            }
            visited.insert(self.id);

            if !self.is_loaded() {
                self.reload().await?;
            }
            let page = self
                .tree
                .effective_page(self.node)
                .cloned()
                .ok_or_else(|| Ao3Error::unloaded("Comment"))?;

            let parent_thread = page.parent_thread(self.id).filter(|&parent_id| {
                let revisited = visited.contains(&parent_id);
                if revisited {
                    warn!(
                        id = self.id,
                        parent_id, "Parent thread link loops back, resolving locally"
                    );
                }
                !revisited
            });
            if let Some(parent_id) = parent_thread {
                debug!(id = self.id, parent_id, "Climbing to parent thread");
                let mut ancestor =
                    Comment::new(parent_id, self.conn.clone(), self.parent, true).await?;
                ancestor.resolve_thread_from(visited).await?;

                if let Some(slot) = ancestor.tree.find_in_thread(ancestor.node, self.id) {
                    self.adopt(ancestor.tree, slot);
                    info!(
                        id = self.id,
                        nodes = self.tree.len(),
                        "Comment spliced into its parent thread"
                    );
                    return Ok(());
                }
                warn!(
                    id = self.id,
                    parent_id, "Comment missing from its parent thread, resolving locally"
                );
            }

            self.tree.attach_entries(self.node, &page.entries);
            Ok(())
        }
        .boxed()
    }

    /// Takes over an ancestor's tree, overwriting the slot that stands for
    /// this comment with this comment's own page and details
    fn adopt(&mut self, mut tree: CommentTree, slot: NodeId) {
        let own = self.tree.node(self.node).clone();
        let target = tree.node_mut(slot);
        if own.page.is_some() {
            target.page = own.page;
        }
        if own.details.is_some() {
            target.details = own.details;
        }
        self.tree = tree;
        self.node = slot;
    }

    /// Replies to this comment
    ///
    /// Guests must give both an email and a name; logged-in sessions post as
    /// their default pseud.
    ///
    /// # Returns
    ///
    /// * `Ok(RawResponse)` - The archive accepted the reply
    /// * `Err(Ao3Error::InvalidArgument)` - Where the comment was posted is unknown
    pub async fn reply(&self, text: &str, email: &str, name: &str) -> Result<RawResponse> {
        let parent = self.parent.ok_or_else(|| {
            Ao3Error::InvalidArgument("Comment has no known work or chapter".to_string())
        })?;
        actions::comment(
            &self.conn,
            parent,
            self.authenticity_token.as_deref(),
            text,
            Some(self.id),
            actions::Commenter::new(email, name),
        )
        .await
    }

    /// Deletes this comment
    pub async fn delete(&self) -> Result<()> {
        actions::delete_comment(&self.conn, self.id, self.authenticity_token.as_deref()).await
    }
}

/// Fetches the top-level comments of a work or chapter, page by page
///
/// Stops once `maximum` comments have been collected. Each comment is seeded
/// with the author and text shown in the listing, so reading them costs no
/// further request.
pub(crate) async fn list_comments(
    conn: &Connection,
    parent: Commentable,
    maximum: Option<usize>,
) -> Result<Vec<Comment>> {
    let mut comments = Vec::new();
    let mut pages = 1;
    let mut page = 1;

    while page <= pages {
        let path = match parent {
            Commentable::Work(id) => format!(
                "/works/{}?page={}&show_comments=true&view_adult=true&view_full_work=true",
                id, page
            ),
            Commentable::Chapter(id) => format!(
                "/chapters/{}?page={}&show_comments=true&view_adult=true",
                id, page
            ),
        };
        let response = conn.get(conn.url(&path)?).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(Ao3Error::InvalidId(format!("Cannot list comments of {}", parent)));
        }

        let (token, listed, count) = {
            let document = Html::parse_document(&response.body);
            (
                csrf_token(&document),
                listed_comments(&document),
                comment_pages(&document),
            )
        };
        if page == 1 {
            pages = count;
            debug!(%parent, pages, "Listing comments");
        }

        for (id, details) in listed {
            if maximum.is_some_and(|maximum| comments.len() >= maximum) {
                return Ok(comments);
            }
            comments.push(Comment::listed(
                id,
                conn.clone(),
                parent,
                token.clone(),
                details,
            ));
        }
        page += 1;
    }

    Ok(comments)
}
