//! Collection query parameters.
//!
//! Supported parameters on `GET /{collection}`:
//! - `field=value` equality, repeated keys match any of the values
//! - `field_ne`, `field_like`, `field_gte`, `field_lte`
//! - `q` full-text search over string and number leaves
//! - `_sort=a,b&_order=asc,desc`
//! - `_end` or `_limit` slicing (offset by `_start`) or `_page` + `_limit` pagination
//!
//! Dotted field names (`author.name`) reach into nested objects.

use std::cmp::Ordering;

use serde_json::Value;

use crate::store::StoreError;

/// Page size used by `_page` when `_limit` is absent.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Result of running a query over a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    /// Count before slicing, present only when slicing or paging was requested.
    pub total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Eq(Vec<String>),
    Ne(String),
    Like(String),
    Gte(f64),
    Lte(f64),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    path: String,
    op: Op,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slice {
    All,
    Range {
        start: usize,
        end: Option<usize>,
        limit: Option<usize>,
    },
    Page {
        page: usize,
        limit: usize,
    },
}

/// Parsed query for a collection read.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    filters: Vec<Filter>,
    search: Option<String>,
    sort: Vec<(String, Direction)>,
    slice: Slice,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            search: None,
            sort: Vec::new(),
            slice: Slice::All,
        }
    }
}

impl ListQuery {
    /// Parse decoded query-string pairs.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, StoreError> {
        let mut query = ListQuery::default();
        let mut sort_fields: Vec<String> = Vec::new();
        let mut orders: Vec<Direction> = Vec::new();
        let mut page: Option<usize> = None;
        let mut start: Option<usize> = None;
        let mut end: Option<usize> = None;
        let mut limit: Option<usize> = None;

        for (name, value) in pairs {
            match name.as_str() {
                "q" => query.search = Some(value.to_lowercase()),
                "_sort" => sort_fields.extend(split_list(value)),
                "_order" => {
                    for part in split_list(value) {
                        orders.push(match part.to_ascii_lowercase().as_str() {
                            "asc" => Direction::Asc,
                            "desc" => Direction::Desc,
                            _ => return Err(invalid(name, value)),
                        });
                    }
                }
                "_page" => page = Some(parse_index(name, value)?),
                "_start" => start = Some(parse_index(name, value)?),
                "_end" => end = Some(parse_index(name, value)?),
                "_limit" => limit = Some(parse_index(name, value)?),
                _ if name.starts_with('_') => {}
                _ => query.push_filter(name, value)?,
            }
        }

        query.sort = sort_fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                let direction = orders.get(i).copied().unwrap_or(Direction::Asc);
                (field, direction)
            })
            .collect();

        query.slice = match (page, start, end, limit) {
            (Some(page), _, _, limit) => Slice::Page {
                page: page.max(1),
                limit: limit.unwrap_or(DEFAULT_PAGE_SIZE),
            },
            // `_start` only takes effect alongside `_end` or `_limit`.
            (None, _, None, None) => Slice::All,
            (None, start, end, limit) => Slice::Range {
                start: start.unwrap_or(0),
                end,
                limit,
            },
        };

        Ok(query)
    }

    fn push_filter(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        let filter = if let Some(path) = name.strip_suffix("_ne") {
            Filter {
                path: path.to_string(),
                op: Op::Ne(value.to_string()),
            }
        } else if let Some(path) = name.strip_suffix("_like") {
            Filter {
                path: path.to_string(),
                op: Op::Like(value.to_lowercase()),
            }
        } else if let Some(path) = name.strip_suffix("_gte") {
            Filter {
                path: path.to_string(),
                op: Op::Gte(parse_number(name, value)?),
            }
        } else if let Some(path) = name.strip_suffix("_lte") {
            Filter {
                path: path.to_string(),
                op: Op::Lte(parse_number(name, value)?),
            }
        } else {
            // Repeated equality keys widen the match instead of narrowing it.
            if let Some(Filter {
                op: Op::Eq(values),
                ..
            }) = self
                .filters
                .iter_mut()
                .find(|f| f.path == name && matches!(f.op, Op::Eq(_)))
            {
                values.push(value.to_string());
                return Ok(());
            }
            Filter {
                path: name.to_string(),
                op: Op::Eq(vec![value.to_string()]),
            }
        };

        self.filters.push(filter);
        Ok(())
    }

    /// Run the query over a collection.
    pub fn apply(&self, items: &[Value]) -> ListPage {
        let mut matched: Vec<Value> = items
            .iter()
            .filter(|item| self.filters.iter().all(|f| f.matches(item)))
            .filter(|item| match &self.search {
                Some(needle) => contains_text(item, needle),
                None => true,
            })
            .cloned()
            .collect();

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| {
                for (field, direction) in &self.sort {
                    let ordering = compare_fields(lookup(a, field), lookup(b, field));
                    let ordering = match direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let total = matched.len();
        let (from, to) = match self.slice {
            Slice::All => return ListPage { items: matched, total: None },
            Slice::Range { start, end, limit } => {
                let to = match (end, limit) {
                    (Some(end), _) => end,
                    (None, Some(limit)) => start.saturating_add(limit),
                    (None, None) => total,
                };
                (start, to)
            }
            Slice::Page { page, limit } => {
                let from = (page - 1).saturating_mul(limit);
                (from, from.saturating_add(limit))
            }
        };

        let from = from.min(total);
        let to = to.clamp(from, total);
        ListPage {
            items: matched.drain(from..to).collect(),
            total: Some(total),
        }
    }
}

impl Filter {
    fn matches(&self, item: &Value) -> bool {
        let field = lookup(item, &self.path);
        match &self.op {
            Op::Eq(values) => field
                .and_then(leaf_text)
                .is_some_and(|text| values.iter().any(|v| *v == text)),
            Op::Ne(value) => field.and_then(leaf_text).map_or(true, |text| text != *value),
            Op::Like(value) => field
                .and_then(leaf_text)
                .is_some_and(|text| text.to_lowercase().contains(value.as_str())),
            Op::Gte(bound) => field.and_then(as_number).is_some_and(|n| n >= *bound),
            Op::Lte(bound) => field.and_then(as_number).is_some_and(|n| n <= *bound),
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn invalid(name: &str, value: &str) -> StoreError {
    StoreError::InvalidQuery {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_index(name: &str, value: &str) -> Result<usize, StoreError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_number(name: &str, value: &str) -> Result<f64, StoreError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

/// Follow a dotted path through objects and arrays.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text form used for equality; composite values never match.
fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

/// Numbers before strings before everything else; missing fields sort last.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        Value::Null => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn run(raw: &[(&str, &str)], items: &[Value]) -> ListPage {
        ListQuery::from_pairs(&pairs(raw)).unwrap().apply(items)
    }

    fn ids(page: &ListPage) -> Vec<i64> {
        page.items.iter().map(|v| v["id"].as_i64().unwrap()).collect()
    }

    fn products() -> Vec<Value> {
        vec![
            json!({ "id": 1, "name": "Oak Chair", "price": 120, "brand": { "name": "Nord" } }),
            json!({ "id": 2, "name": "Desk", "price": 300, "brand": { "name": "Sul" } }),
            json!({ "id": 3, "name": "Lamp", "price": 45, "brand": { "name": "Nord" } }),
            json!({ "id": 4, "name": "Armchair", "price": 210 }),
        ]
    }

    #[test]
    fn test_empty_query_returns_everything_without_total() {
        let page = run(&[], &products());
        assert_eq!(ids(&page), vec![1, 2, 3, 4]);
        assert_eq!(page.total, None);
    }

    #[test]
    fn test_equality_uses_string_form_and_ors_repeats() {
        assert_eq!(ids(&run(&[("id", "2")], &products())), vec![2]);
        assert_eq!(ids(&run(&[("id", "1"), ("id", "3")], &products())), vec![1, 3]);
        assert_eq!(ids(&run(&[("brand.name", "Nord")], &products())), vec![1, 3]);
    }

    #[test]
    fn test_operators() {
        let items = products();
        assert_eq!(ids(&run(&[("brand.name_ne", "Nord")], &items)), vec![2, 4]);
        assert_eq!(ids(&run(&[("name_like", "chair")], &items)), vec![1, 4]);
        assert_eq!(ids(&run(&[("price_gte", "200")], &items)), vec![2, 4]);
        assert_eq!(ids(&run(&[("price_lte", "120")], &items)), vec![1, 3]);
        assert_eq!(
            ids(&run(&[("price_gte", "100"), ("price_lte", "250")], &items)),
            vec![1, 4]
        );
    }

    #[test]
    fn test_full_text_search() {
        assert_eq!(ids(&run(&[("q", "sul")], &products())), vec![2]);
        assert_eq!(ids(&run(&[("q", "LAMP")], &products())), vec![3]);
    }

    #[test]
    fn test_sort_and_order() {
        let items = products();
        assert_eq!(ids(&run(&[("_sort", "price")], &items)), vec![3, 1, 4, 2]);
        assert_eq!(
            ids(&run(&[("_sort", "price"), ("_order", "desc")], &items)),
            vec![2, 4, 1, 3]
        );
        // Missing brand sorts last, ties broken by the second key.
        assert_eq!(
            ids(&run(&[("_sort", "brand.name,price"), ("_order", "asc,desc")], &items)),
            vec![1, 3, 2, 4]
        );
    }

    #[test]
    fn test_slicing_reports_total() {
        let items = products();

        let page = run(&[("_start", "1"), ("_end", "3")], &items);
        assert_eq!(ids(&page), vec![2, 3]);
        assert_eq!(page.total, Some(4));

        let page = run(&[("_start", "2"), ("_limit", "5")], &items);
        assert_eq!(ids(&page), vec![3, 4]);

        let page = run(&[("_limit", "1")], &items);
        assert_eq!(ids(&page), vec![1]);
    }

    #[test]
    fn test_start_alone_is_ignored() {
        let items = products();

        let page = run(&[("_start", "2")], &items);
        assert_eq!(ids(&page), vec![1, 2, 3, 4]);
        assert_eq!(page.total, None);
    }

    #[test]
    fn test_pagination() {
        let items = products();

        let page = run(&[("_page", "2"), ("_limit", "3")], &items);
        assert_eq!(ids(&page), vec![4]);
        assert_eq!(page.total, Some(4));

        let page = run(&[("_page", "5"), ("_limit", "3")], &items);
        assert!(page.items.is_empty());

        let page = run(&[("_page", "1")], &items);
        assert_eq!(page.items.len(), 4);
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        assert!(matches!(
            ListQuery::from_pairs(&pairs(&[("_limit", "ten")])),
            Err(StoreError::InvalidQuery { .. })
        ));
        assert!(ListQuery::from_pairs(&pairs(&[("price_gte", "x")])).is_err());
        assert!(ListQuery::from_pairs(&pairs(&[("_order", "sideways")])).is_err());
    }
}
