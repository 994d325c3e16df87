use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
/// SQLite binds OFFSET as a signed 64-bit integer.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Offset-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u64,
}

impl PageWindow {
    pub fn new(limit: Option<u32>, offset: Option<u64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).min(MAX_OFFSET),
        }
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// `?limit=&offset=` for endpoints that take nothing else.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

impl PageQuery {
    pub fn window(&self) -> PageWindow {
        PageWindow::new(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub limit: u32,
    pub offset: u64,
    pub next_offset: Option<u64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: u64, window: PageWindow) -> Self {
        let end = window.offset.saturating_add(results.len() as u64);
        Self {
            count,
            limit: window.limit,
            offset: window.offset,
            next_offset: (end < count).then_some(end),
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            limit: self.limit,
            offset: self.offset,
            next_offset: self.next_offset,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
