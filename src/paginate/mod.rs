//! Cursor and offset pagination over the cached CMS client.

mod cursor;
mod offset;

pub use cursor::{CursorPaginator, FeedView, LoadOutcome, PaginatorStatus, DEFAULT_PAGE_SIZE};
pub use offset::{
  total_pages, OffsetPage, OffsetPaginator, PageOutcome, PageRedirect, DEFAULT_PER_PAGE,
};
