//! Works and chapters
//!
//! # Components
//!
//! - `Work`: A work and everything derived from its full-work page
//! - `Chapter`: One chapter block of a work, or the whole text of a oneshot
//! - `banner`: Seeds unloaded works from listing entries

mod banner;
mod chapter;
mod work;

pub use banner::work_from_banner;
pub use chapter::Chapter;
pub use work::Work;
