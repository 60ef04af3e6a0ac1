//! CheckOut: candidate enumeration, filtering, sorting and pagination.

use super::plan::Planner;
use crate::error::{CoreError, CoreResult};
use crate::namespace::{load_record, NodeType, Resolver};
use crate::path::Path;
use crate::query::{CheckOut, CheckOutItem, ShelfEntry, SortItem, SortOrder, CHECKOUT_ALL};
use hylla_codec::{Record, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Rejects checkout arguments that are wrong regardless of the namespace.
pub(crate) fn check_shape(query: &CheckOut) -> CoreResult<()> {
    if query.limit == Some(0) {
        return Err(CoreError::invalid_query("limit must be at least 1"));
    }
    for item in &query.checkout {
        if item.checkout.is_empty() {
            return Err(CoreError::invalid_query(
                "a checkout item needs shelf names or \"*all\"",
            ));
        }
        if item.checkout.len() > 1 && item.checkout.iter().any(|name| name == CHECKOUT_ALL) {
            return Err(CoreError::invalid_query(
                "\"*all\" cannot be combined with other checkout entries",
            ));
        }
    }
    Ok(())
}

/// Every shelf the items select, in item order, without duplicates.
///
/// No items selects every shelf in the namespace.
pub(crate) fn candidates(resolver: &Resolver<'_>, items: &[CheckOutItem]) -> CoreResult<Vec<Path>> {
    if items.is_empty() {
        return resolver.descendant_shelves(&Path::root());
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        for shelf in item_shelves(resolver, item)? {
            if seen.insert(shelf.clone()) {
                out.push(shelf);
            }
        }
    }
    Ok(out)
}

fn item_shelves(resolver: &Resolver<'_>, item: &CheckOutItem) -> CoreResult<Vec<Path>> {
    let base = match &item.path {
        Some(path) => resolver.resolve(path)?,
        None => resolver.resolve_container(None)?,
    };
    let base_path = item.path.clone().unwrap_or_default();
    if !base.is_node() {
        return Err(CoreError::type_mismatch(
            &base_path,
            "checkout items address nodes, found a record key",
        ));
    }
    if base.node_type == NodeType::Shelf {
        if item.is_all() {
            return Ok(vec![base.node]);
        }
        return Err(CoreError::type_mismatch(
            &base_path,
            "a shelf has no child shelves to check out",
        ));
    }
    if item.is_all() {
        return resolver.child_shelves(&base.node);
    }
    item.checkout
        .iter()
        .map(|name| {
            let relative = Path::parse(name)?;
            let location = resolver.resolve_from(&base.node, &relative)?;
            if location.node_type == NodeType::Shelf && location.is_node() {
                Ok(location.node)
            } else {
                Err(CoreError::type_mismatch(
                    base.node.join(&relative),
                    "checkout entries must name shelves",
                ))
            }
        })
        .collect()
}

impl Planner<'_> {
    pub(super) fn check_out(&self, query: CheckOut) -> CoreResult<Vec<ShelfEntry>> {
        check_shape(&query)?;
        let mut matches = Vec::new();
        for shelf in candidates(&self.resolver(), &query.checkout)? {
            let record = load_record(self.storage(), &shelf)?;
            if self.passes(&query.filters, &record, &shelf)? {
                matches.push(ShelfEntry {
                    path: shelf,
                    record,
                });
            }
        }
        if !query.sort.is_empty() {
            matches.sort_by(|a, b| compare(&a.record, &b.record, &query.sort));
        }
        let page = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX));
        Ok(page.collect())
    }
}

fn sort_key<'r>(record: &'r Record, path: &Path) -> Option<&'r Value> {
    let (head, tail) = path.segments().split_first()?;
    record.get(head)?.get_path(tail)
}

/// Multi-key comparison. A record missing a key sorts before one that has
/// it.
fn compare(a: &Record, b: &Record, sort: &[SortItem]) -> Ordering {
    for item in sort {
        let ordering = match (sort_key(a, &item.path), sort_key(b, &item.path)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp_total(y),
        };
        let ordering = match item.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(year: Option<i64>, title: &str) -> Record {
        let mut r = Record::new();
        r.insert("title".into(), Value::from(title));
        if let Some(year) = year {
            r.insert("year".into(), Value::Integer(year));
        }
        r
    }

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn shape_checks() {
        assert!(check_shape(&CheckOut::new().limit(0)).is_err());
        assert!(check_shape(&CheckOut::new().item(CheckOutItem::named(None, Vec::<String>::new()))).is_err());
        assert!(check_shape(&CheckOut::new().item(CheckOutItem::named(None, ["*all", "a"]))).is_err());
        assert!(check_shape(&CheckOut::new().item(CheckOutItem::all(None)).limit(1)).is_ok());
    }

    #[test]
    fn missing_keys_sort_first() {
        let sort = [SortItem::asc(p("year"))];
        assert_eq!(compare(&rec(None, "a"), &rec(Some(1), "b"), &sort), Ordering::Less);
        assert_eq!(compare(&rec(Some(2), "a"), &rec(Some(1), "b"), &sort), Ordering::Greater);
    }

    #[test]
    fn later_keys_break_ties() {
        let sort = [SortItem::desc(p("year")), SortItem::asc(p("title"))];
        assert_eq!(compare(&rec(Some(1), "a"), &rec(Some(1), "b"), &sort), Ordering::Less);
        assert_eq!(compare(&rec(Some(2), "z"), &rec(Some(1), "a"), &sort), Ordering::Less);
        assert_eq!(compare(&rec(Some(1), "a"), &rec(Some(1), "a"), &sort), Ordering::Equal);
    }
}
