//! List-query parameter types
//!
//! Filters carry a field name, an operator and a JSON value. The operator set
//! mirrors the backend's query-string operators; [`Filter::parse`] accepts the
//! `field@op` suffix syntax used by callers that build filters from loosely
//! structured input (saved views, config files).

use serde_json::Value;

/// Comparison operator applied to a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Array containment (`cs` in PostgREST terms)
    Contains,
    /// Full-text search over a text column
    FullText,
    /// `IS` check, used for null / not-null tests
    Is,
    /// Membership in a list of values
    In,
    /// Case-insensitive substring match
    Ilike,
}

impl FilterOp {
    /// Parse an operator from the `@op` suffix of a filter key
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "cs" => Some(Self::Contains),
            "fts" => Some(Self::FullText),
            "is" => Some(Self::Is),
            "in" => Some(Self::In),
            "ilike" => Some(Self::Ilike),
            _ => None,
        }
    }

    /// The backend operator token
    pub fn token(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "cs",
            Self::FullText => "fts",
            Self::Is => "is",
            Self::In => "in",
            Self::Ilike => "ilike",
        }
    }
}

/// A single filter condition on a list query
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Parse a `field@op` key (plain `field` means equality)
    pub fn parse(key: &str, value: Value) -> Self {
        if let Some((field, suffix)) = key.rsplit_once('@')
            && let Some(op) = FilterOp::from_suffix(suffix)
        {
            return Self::new(field, op, value);
        }
        Self::new(key, FilterOp::Eq, value)
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn neq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Neq, value)
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn contains(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Contains, value)
    }

    pub fn full_text(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::FullText, value)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::Is, Value::Null)
    }

    /// Render as a PostgREST query pair, e.g. `("stage", "eq.won")`
    pub fn to_query_pair(&self) -> (String, String) {
        (
            self.field.clone(),
            format!("{}.{}", self.op.token(), render_value(self.op, &self.value)),
        )
    }
}

/// Render a filter value the way the backend expects it on the query string
fn render_value(op: FilterOp, value: &Value) -> String {
    match op {
        FilterOp::Contains => match value {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(scalar_token).collect();
                format!("{{{}}}", parts.join(","))
            }
            other => format!("{{{}}}", scalar_token(other)),
        },
        FilterOp::In => match value {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(scalar_token).collect();
                format!("({})", parts.join(","))
            }
            other => format!("({})", scalar_token(other)),
        },
        FilterOp::Ilike => format!("*{}*", scalar_token(value)),
        FilterOp::Is => match value {
            Value::Null => "null".to_string(),
            other => scalar_token(other),
        },
        _ => scalar_token(value),
    }
}

fn scalar_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Sort specification for a list query
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// One-based page selection
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_key_is_equality() {
        let f = Filter::parse("stage", json!("won"));
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.field, "stage");
    }

    #[test]
    fn test_parse_suffix_operator() {
        let f = Filter::parse("amount@gte", json!(1000));
        assert_eq!(f.op, FilterOp::Gte);
        assert_eq!(f.field, "amount");

        let f = Filter::parse("stage@neq", json!("lost"));
        assert_eq!(f.op, FilterOp::Neq);
    }

    #[test]
    fn test_parse_unknown_suffix_falls_back_to_eq() {
        let f = Filter::parse("email@domain", json!("x"));
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.field, "email@domain");
    }

    #[test]
    fn test_query_pair_rendering() {
        assert_eq!(
            Filter::eq("stage", json!("won")).to_query_pair(),
            ("stage".to_string(), "eq.won".to_string())
        );
        assert_eq!(
            Filter::contains("contact_ids", json!([42])).to_query_pair(),
            ("contact_ids".to_string(), "cs.{42}".to_string())
        );
        assert_eq!(
            Filter::is_null("archived_at").to_query_pair(),
            ("archived_at".to_string(), "is.null".to_string())
        );
        assert_eq!(
            Filter::new("id", FilterOp::In, json!([1, 2, 3])).to_query_pair(),
            ("id".to_string(), "in.(1,2,3)".to_string())
        );
        assert_eq!(
            Filter::new("name", FilterOp::Ilike, json!("acme")).to_query_pair(),
            ("name".to_string(), "ilike.*acme*".to_string())
        );
        assert_eq!(
            Filter::full_text("text", json!("quarterly report")).to_query_pair(),
            ("text".to_string(), "fts.quarterly report".to_string())
        );
    }

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(1, 25).offset(), 0);
        assert_eq!(Pagination::new(3, 25).offset(), 50);
    }
}
