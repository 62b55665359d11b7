//! Offset pagination for list endpoints.

use serde::{Deserialize, Serialize};

/// Requested page, 1-based, with a clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Page size used when the caller does not ask for one.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest page size a caller can ask for.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a request from optional query parameters.
    ///
    /// Missing or zero `page` becomes 1; `limit` is clamped to
    /// `1..=MAX_LIMIT` with [`Self::DEFAULT_LIMIT`] when absent.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Row offset of the first item on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Pagination metadata for a result with `total` matching rows.
    #[must_use]
    pub const fn paginate(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: total_pages(total, self.limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination block returned alongside list data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// `ceil(total / limit)`; a zero limit is treated as one.
#[must_use]
pub const fn total_pages(total: u64, limit: u32) -> u64 {
    let limit = if limit == 0 { 1 } else { limit as u64 };
    total.div_ceil(limit)
}
