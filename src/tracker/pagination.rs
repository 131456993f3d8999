//! Offset/limit pagination.
//!
//! A [`Paginator`] walks a collection page by page, starting at offset 0, and
//! hands out items one at a time. It stops once the offset reaches the total
//! reported by the latest page, or as soon as a page reports a total of 0.
//! The latest total always wins, so a collection that grows or shrinks while
//! it is being walked can lose or repeat items near the end.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole collection; 0 when unknown.
    pub total: u64,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<Self::Item>>;
}

pub struct Paginator<S: PageSource> {
    source: S,
    page_size: u64,
    offset: u64,
    total: Option<u64>,
    buffered: VecDeque<S::Item>,
    exhausted: bool,
    requests: u64,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, page_size: u64) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            offset: 0,
            total: None,
            buffered: VecDeque::new(),
            exhausted: false,
            requests: 0,
        }
    }

    /// Returns the next item, fetching another page when the current one is
    /// used up.
    pub async fn next(&mut self) -> Result<Option<S::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page().await?;
        }
    }

    /// Total reported by the most recent page, if any page was fetched.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let page = self.source.fetch_page(self.offset, self.page_size).await?;
        self.requests += 1;
        self.total = Some(page.total);

        if page.total == 0 {
            debug!(
                offset = self.offset,
                "Page reported no total, treating collection as exhausted"
            );
            self.exhausted = true;
            return Ok(());
        }

        debug!(
            offset = self.offset,
            items = page.items.len(),
            total = page.total,
            "Fetched page"
        );
        self.buffered.extend(page.items);
        self.offset += self.page_size;
        if self.offset >= page.total {
            self.exhausted = true;
        }

        Ok(())
    }
}
