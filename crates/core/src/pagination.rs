//! Offset pagination for the todo list.

use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default number of todos per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum number of todos per page. Larger requests are clamped.
pub const MAX_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// PageRequest
// ---------------------------------------------------------------------------

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Validate a page request.
    ///
    /// `page` and `page_size` must both be at least 1. `page_size` above
    /// [`MAX_PAGE_SIZE`] is clamped rather than rejected.
    pub fn new(page: u32, page_size: u32) -> Result<Self, CoreError> {
        if page < 1 {
            return Err(CoreError::Validation("page must be at least 1".into()));
        }
        if page_size < 1 {
            return Err(CoreError::Validation("page size must be at least 1".into()));
        }
        Ok(Self {
            page,
            page_size: page_size.min(MAX_PAGE_SIZE),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of rows to skip: `(page - 1) * page_size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// Number of rows to fetch.
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One page of results plus the exact total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
        }
    }

    /// An empty page for `request`.
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    /// `ceil(total / page_size)`; zero when there are no results.
    pub fn total_pages(&self) -> u64 {
        total_pages(self.total, self.page_size)
    }

    /// Whether a page after this one exists.
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// `ceil(total / page_size)`, treating a zero page size as one.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size.max(1)))
}
