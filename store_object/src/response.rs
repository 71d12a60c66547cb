//! Listing results

use serde::Serialize;

/// One page of entities and the cursor of the next page
///
/// `next_cursor` is `None` once the listing is exhausted. The page is never
/// modified after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse<T> {
    data: Vec<T>,
    next_cursor: Option<String>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { data, next_cursor }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn is_last_page(&self) -> bool {
        self.next_cursor.is_none()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        (self.data, self.next_cursor)
    }
}
