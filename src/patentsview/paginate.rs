//! Cursor pagination over `o.after`
//!
//! The cursor is the sort-key values of the last record of the previous
//! page, so the sort list must be a total order over the result set
//! (grant date, then patent id for `/patent`). A paginator is single-use:
//! once exhausted or failed it yields nothing more.

use serde_json::Value;

use super::client::SearchApi;
use super::error::ApiError;
use super::types::{value_at_path, PageOptions, SearchPage, SearchRequest, SortKey};
use crate::config::MAX_PAGE_SIZE;

pub struct Paginator<'a> {
    api: &'a dyn SearchApi,
    request: SearchRequest,
    page_size: usize,
    after: Option<Value>,
    pages_fetched: usize,
    finished: bool,
}

/// Start a fresh cursor over `endpoint`
pub fn paginate<'a>(
    api: &'a dyn SearchApi,
    endpoint: &str,
    query: Value,
    fields: &[&str],
    sort: Vec<SortKey>,
    page_size: usize,
) -> Result<Paginator<'a>, ApiError> {
    let request = SearchRequest::new(endpoint, query)
        .with_fields(fields)
        .with_sort(sort);
    Paginator::new(api, request, page_size)
}

impl<'a> Paginator<'a> {
    pub fn new(
        api: &'a dyn SearchApi,
        request: SearchRequest,
        page_size: usize,
    ) -> Result<Self, ApiError> {
        if request.sort.is_empty() {
            return Err(ApiError::InvalidRequest(
                "cursor pagination requires at least one sort key".to_string(),
            ));
        }
        request.validate()?;

        Ok(Self {
            api,
            request,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            after: None,
            pages_fetched: 0,
            finished: false,
        })
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fetch the next non-empty page, or `None` once the stream is exhausted
    pub async fn next_page(&mut self) -> Result<Option<SearchPage>, ApiError> {
        if self.finished {
            return Ok(None);
        }

        let request = self.request.clone().with_options(PageOptions {
            size: self.page_size,
            after: self.after.clone(),
        });

        let page = match self.api.request(&request).await {
            Ok(page) => page,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        self.pages_fetched += 1;

        let Some(last) = page.records.last() else {
            self.finished = true;
            return Ok(None);
        };
        if page.count == 0 {
            self.finished = true;
            return Ok(None);
        }

        self.after = Some(self.cursor_from(last)?);

        if page.count < self.page_size as u64 {
            self.finished = true;
        }

        tracing::debug!(
            endpoint = self.request.endpoint_name(),
            page = self.pages_fetched,
            count = page.count,
            total_hits = page.total_hits,
            "fetched page"
        );

        Ok(Some(page))
    }

    fn cursor_from(&mut self, last: &Value) -> Result<Value, ApiError> {
        let mut values = Vec::with_capacity(self.request.sort.len());
        for key in &self.request.sort {
            match value_at_path(last, &key.field) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ => {
                    self.finished = true;
                    return Err(ApiError::Malformed(format!(
                        "last record has no value for sort key '{}'",
                        key.field
                    )));
                }
            }
        }

        Ok(if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        })
    }
}
