//! Offset pagination over the query executor.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{HarvestError, QueryExecutor, ShapeMismatch};
use crate::models::{Query, UntypedResponse};

/// Placeholder replaced by the page offset in an [`OffsetTemplate`]
pub const OFFSET_PLACEHOLDER: &str = "{offset}";

/// Describes how to ask for one page and how to read its items back.
pub trait PageTemplate {
    /// Validated response shape of one page
    type Page: DeserializeOwned + Serialize;

    /// One element of the concatenated result
    type Item;

    /// GraphQL text for the page starting at `offset`
    fn query(&self, offset: usize) -> String;

    /// Items carried by `page`; an empty vector ends pagination
    fn items(&self, page: Self::Page) -> Result<Vec<Self::Item>, HarvestError>;

    /// Shape requirements on a decoded page beyond its serde type.
    ///
    /// Runs before the page is cached, so a rejected page is dumped and
    /// fetched again on the next run.
    fn check(&self, _page: &Self::Page) -> Result<(), ShapeMismatch> {
        Ok(())
    }

    /// Whether every page should bypass the cache read
    fn is_refresh(&self) -> bool {
        false
    }
}

/// Progress through one paginated query
struct PageCursor<I> {
    offset: usize,
    items: Vec<I>,
    pages: usize,
}

impl<I> PageCursor<I> {
    fn new() -> Self {
        Self {
            offset: 0,
            items: Vec::new(),
            pages: 0,
        }
    }

    /// Absorb a page; returns `false` once the page was empty
    fn advance(&mut self, page: Vec<I>) -> bool {
        self.pages += 1;
        if page.is_empty() {
            return false;
        }
        self.items.extend(page);
        self.offset = self.items.len();
        true
    }
}

/// Fetch every page of `template` and concatenate the items.
///
/// Offsets start at 0 and advance by the number of items received so far;
/// the first empty page stops the loop. Each page is an ordinary cached
/// query, so a rerun after a failure only dispatches the pages that were
/// never stored.
pub async fn fetch_all<P>(
    executor: &QueryExecutor,
    template: &P,
) -> Result<Vec<P::Item>, HarvestError>
where
    P: PageTemplate,
{
    let mut cursor = PageCursor::new();

    loop {
        let query: Query<P::Page> =
            Query::new(template.query(cursor.offset)).refresh(template.is_refresh());
        let page = executor
            .execute_checked(&query, |page| template.check(page))
            .await?;
        let items = template.items(page)?;

        tracing::debug!(
            "Page {} at offset {}: {} items",
            cursor.pages + 1,
            cursor.offset,
            items.len()
        );

        if !cursor.advance(items) {
            break;
        }
    }

    tracing::info!(
        "Pagination finished: {} items in {} pages",
        cursor.items.len(),
        cursor.pages
    );
    Ok(cursor.items)
}

/// Schema-agnostic page template.
///
/// The query text carries an `{offset}` placeholder and the page array is
/// read from `data.<field>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTemplate {
    text: String,
    field: String,
    refresh: bool,
}

impl OffsetTemplate {
    pub fn new(text: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            field: field.into(),
            refresh: false,
        }
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl OffsetTemplate {
    fn mismatch(&self, found: Option<&Value>) -> ShapeMismatch {
        let message = match found {
            Some(value) => format!("expected a list, found {}", json_kind(value)),
            None => "missing field".to_string(),
        };
        ShapeMismatch::new(format!("data.{}", self.field), message)
    }
}

impl PageTemplate for OffsetTemplate {
    type Page = UntypedResponse;
    type Item = Value;

    fn query(&self, offset: usize) -> String {
        self.text.replace(OFFSET_PLACEHOLDER, &offset.to_string())
    }

    fn items(&self, mut page: Self::Page) -> Result<Vec<Value>, HarvestError> {
        match page.data.remove(&self.field) {
            Some(Value::Array(items)) => Ok(items),
            other => Err(HarvestError::Schema {
                message: self.mismatch(other.as_ref()).to_string(),
                artifact: None,
            }),
        }
    }

    fn check(&self, page: &Self::Page) -> Result<(), ShapeMismatch> {
        match page.data.get(&self.field) {
            Some(Value::Array(_)) => Ok(()),
            other => Err(self.mismatch(other)),
        }
    }

    fn is_refresh(&self) -> bool {
        self.refresh
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
