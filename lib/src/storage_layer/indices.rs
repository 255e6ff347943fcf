use super::page::PageId;

/// The header always lives at logical page 0.
pub const HEADER_PAGE_ID: PageId = 0;
