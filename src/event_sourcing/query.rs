use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

// ============================================================================
// Query / Pagination Layer
// ============================================================================
//
// Offset pagination shared by snapshot and audit queries.
//
// ============================================================================

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("Page must be at least 1, got {0}")]
    InvalidPage(u32),

    #[error("Page size must be between 1 and {max}, got {requested}")]
    InvalidPageSize { requested: u32, max: u32 },
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Validate caller input. Missing values take the defaults; a page size
    /// above `max_page_size` is rejected rather than clamped.
    pub fn validated(
        page: Option<u32>,
        page_size: Option<u32>,
        max_page_size: u32,
    ) -> Result<Self, PaginationError> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(PaginationError::InvalidPage(page));
        }
        if page_size < 1 || page_size > max_page_size {
            return Err(PaginationError::InvalidPageSize {
                requested: page_size,
                max: max_page_size,
            });
        }

        Ok(Self { page, page_size })
    }

    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// Slice one page out of an already ordered collection
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .iter()
            .skip(start)
            .take(self.page_size as usize)
            .cloned()
            .collect()
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        let page_size = u64::from(request.page_size.max(1));
        Self {
            data,
            page: request.page,
            page_size: request.page_size,
            total_count,
            total_pages: total_count.div_ceil(page_size),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            data: self.data.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Case-insensitive; anything unrecognised is ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("desc") | Some("descending") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Build from raw query-string values
    pub fn parse(field: &str, direction: Option<&str>) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::parse(direction),
        }
    }
}

// ============================================================================
// Snapshot Filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    Eq,
    NotEq,
    /// Case-insensitive substring match on string fields
    Contains,
}

/// Condition on a top-level field of a snapshot's state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFilter {
    pub conditions: Vec<FieldCondition>,
}

impl SnapshotFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            op: ConditionOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn not_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            op: ConditionOp::NotEq,
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            op: ConditionOp::Contains,
            value: Value::String(needle.into()),
        });
        self
    }

    pub fn matches(&self, state: &Value) -> bool {
        self.conditions.iter().all(|condition| {
            let field = state.get(&condition.field).unwrap_or(&Value::Null);
            match condition.op {
                ConditionOp::Eq => field == &condition.value,
                ConditionOp::NotEq => field != &condition.value,
                ConditionOp::Contains => match (field, &condition.value) {
                    (Value::String(haystack), Value::String(needle)) => {
                        contains_ignore_case(haystack, needle)
                    }
                    _ => false,
                },
            }
        })
    }
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Total order over JSON values, matching PostgreSQL's jsonb ordering:
/// null < string < number < boolean < array < object.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::String(_) => 1,
            Value::Number(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_json(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
