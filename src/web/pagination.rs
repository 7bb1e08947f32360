use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

/// Page selection from a query string. Pages are zero-based.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageRequest {
    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn offset(&self) -> i64 {
        self.page() * self.per_page()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(current_page: i64, per_page: i64, total_items: i64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = if total_items == 0 {
            1
        } else {
            (total_items + per_page - 1) / per_page
        };
        let current_page = current_page.clamp(0, total_pages - 1);
        Self {
            current_page,
            per_page,
            total_pages,
            total_items,
            has_previous: current_page > 0,
            has_next: current_page < total_pages - 1,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, req: &PageRequest, total_items: i64) -> Self {
        Self {
            items,
            pagination: Pagination::new(req.page(), req.per_page(), total_items),
        }
    }
}
