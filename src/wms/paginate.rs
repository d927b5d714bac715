//! Pull-based pagination over WMS list endpoints.
//!
//! The paginator issues `offset`/`limit` pages on demand and hands the
//! caller one record at a time; a short page or the optional item cap ends
//! the iteration. Page-advance bookkeeping is kept in `PageCursor` so the
//! termination rules are testable without a client.

use std::collections::VecDeque;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::wms::client::WmsClient;
use crate::wms::errors::WmsError;

pub const DEFAULT_PAGE_SIZE: usize = 600;

#[derive(Debug, Clone)]
pub struct PageCursor {
    pub offset: usize,
    pub page_size: usize,
    pub stop_after: Option<usize>,
    pub done: bool,
}

impl PageCursor {
    pub fn new(page_size: usize, stop_after: Option<usize>) -> Self {
        Self {
            offset: 0,
            page_size,
            stop_after,
            done: false,
        }
    }

    /// Advances past a fetched page of `items` records and decides whether
    /// another page should be requested.
    pub fn advance(&mut self, items: usize) {
        self.offset += items;
        if items < self.page_size {
            self.done = true;
        }
        if let Some(cap) = self.stop_after {
            if cap < self.offset {
                self.done = true;
            }
        }
    }
}

pub struct Paginator<'c> {
    client: &'c WmsClient,
    endpoint: String,
    params: Vec<(String, String)>,
    cursor: PageCursor,
    buf: VecDeque<Value>,
}

impl<'c> Paginator<'c> {
    pub(crate) fn new(
        client: &'c WmsClient,
        endpoint: String,
        params: Vec<(String, String)>,
        page_size: usize,
        stop_after: Option<usize>,
    ) -> Self {
        Self {
            client,
            endpoint,
            params,
            cursor: PageCursor::new(page_size, stop_after),
            buf: VecDeque::new(),
        }
    }

    /// Next record, fetching a page when the buffer runs out. `Ok(None)`
    /// marks the end of the collection.
    pub async fn next(&mut self) -> Result<Option<Value>, WmsError> {
        loop {
            if let Some(record) = self.buf.pop_front() {
                return Ok(Some(record));
            }
            if self.cursor.done {
                return Ok(None);
            }

            let mut query = vec![
                ("limit".to_string(), self.cursor.page_size.to_string()),
                ("offset".to_string(), self.cursor.offset.to_string()),
            ];
            query.extend(self.params.iter().cloned());

            let page = self
                .client
                .request(Method::GET, &self.endpoint, &query, None)
                .await?;

            let Value::Array(records) = page else {
                return Err(WmsError::NotAList {
                    endpoint: self.endpoint.clone(),
                });
            };

            debug!(
                endpoint = %self.endpoint,
                offset = self.cursor.offset,
                items = records.len(),
                "page fetched"
            );

            self.cursor.advance(records.len());
            self.buf.extend(records);
        }
    }

    /// Drains the remaining records into memory.
    pub async fn collect_all(mut self) -> Result<Vec<Value>, WmsError> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }
}
