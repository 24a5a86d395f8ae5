//! Entity kinds and list/filter parameters understood by the BookStack API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level BookStack content types exposed by the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Book,
    Chapter,
    Page,
    Shelf,
    User,
}

impl EntityKind {
    pub const ALL: [Self; 5] = [
        Self::Book,
        Self::Chapter,
        Self::Page,
        Self::Shelf,
        Self::User,
    ];

    /// REST collection segment (`/api/<segment>`).
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Book => "books",
            Self::Chapter => "chapters",
            Self::Page => "pages",
            Self::Shelf => "shelves",
            Self::User => "users",
        }
    }

    #[must_use]
    pub fn singular(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Chapter => "chapter",
            Self::Page => "page",
            Self::Shelf => "shelf",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind(pub String);

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity type '{}'", self.0)
    }
}

impl std::error::Error for UnknownEntityKind {}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    /// Accepts singular or plural names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| needle == k.singular() || needle == k.collection())
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}

/// Filter operators supported by BookStack list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    #[default]
    Like,
}

impl FilterOperator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Like => "like",
        }
    }

    /// Parse an operator name; anything unrecognised falls back to [`FilterOperator::Like`].
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "lt" => Self::Lt,
            "gte" => Self::Gte,
            "lte" => Self::Lte,
            _ => Self::Like,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `name LIKE %query%`, unless the caller already supplied a wildcard.
    #[must_use]
    pub fn name_like(query: &str) -> Self {
        let value = if query.contains('%') {
            query.to_string()
        } else {
            format!("%{query}%")
        };
        Self::new("name", FilterOperator::Like, value)
    }
}

/// Paging + filtering for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub offset: i64,
    pub count: i64,
    pub filters: Vec<Filter>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            offset: 0,
            count: 50,
            filters: Vec::new(),
        }
    }
}

impl ListParams {
    #[must_use]
    pub fn page(offset: i64, count: i64) -> Self {
        Self {
            offset,
            count,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Query pairs in BookStack's `filter[field:op]=value` convention.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("offset".to_string(), self.offset.to_string()),
            ("count".to_string(), self.count.to_string()),
        ];
        for f in &self.filters {
            pairs.push((
                format!("filter[{}:{}]", f.field, f.operator.as_str()),
                f.value.clone(),
            ));
        }
        pairs
    }
}
