use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    pub page: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, pagination: &Pagination) -> Self {
        let limit = pagination.limit.unwrap_or(total.max(1)).max(1);
        let offset = pagination.offset.unwrap_or(0);
        let page = offset / limit + 1;
        let total_pages = if total == 0 { 1 } else { (total + limit - 1) / limit };
        let has_more = offset + items.len() < total;
        Self {
            items,
            total,
            has_more,
            page,
            total_pages,
        }
    }
}
