use scraper::Html;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Version 0 is reserved for values seeded without any page
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Parsed documents kept per thread, most recent last
const PARSED_PER_THREAD: usize = 4;

thread_local! {
    static PARSED: RefCell<VecDeque<(u64, Rc<Html>)>> = const { RefCell::new(VecDeque::new()) };
}

/// An immutable copy of a fetched page
///
/// Each snapshot receives a process-unique version when it is created. Memo
/// slots remember the version they were computed against, so replacing an
/// entity's snapshot invalidates every derived value at once.
///
/// The body is kept as text and parsed on demand, which keeps entities `Send`
/// so they can be moved into background tasks. Each thread keeps the last few
/// parsed documents, so consecutive reads of one snapshot parse it once.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    body: Arc<str>,
    fragment: bool,
}

impl Snapshot {
    /// Creates a snapshot of a full HTML document
    pub fn new(body: impl Into<Arc<str>>) -> Self {
        Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            body: body.into(),
            fragment: false,
        }
    }

    /// Creates a snapshot of an HTML fragment cut out of a larger page
    pub fn fragment(body: impl Into<Arc<str>>) -> Self {
        Self {
            fragment: true,
            ..Self::new(body)
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment
    }

    /// The snapshot as a queryable document, parsed at most once per thread
    /// while it stays among the recently used ones
    pub fn document(&self) -> Rc<Html> {
        PARSED.with(|parsed| {
            let mut parsed = parsed.borrow_mut();
            if let Some(at) = parsed.iter().position(|(version, _)| *version == self.version) {
                if let Some(entry) = parsed.remove(at) {
                    let document = entry.1.clone();
                    parsed.push_back(entry);
                    return document;
                }
            }

            let document = Rc::new(self.parse());
            if parsed.len() >= PARSED_PER_THREAD {
                parsed.pop_front();
            }
            parsed.push_back((self.version, document.clone()));
            document
        })
    }

    fn parse(&self) -> Html {
        if self.fragment {
            Html::parse_fragment(&self.body)
        } else {
            Html::parse_document(&self.body)
        }
    }
}
