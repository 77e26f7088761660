use crate::filter::{matches_all, FilterSchema, Predicate};
use crate::model::{Collection, ItemId};
use crate::search::{name_contains, FuzzyMatcher, SearchError};
use serde_json::{Map, Value};

/// One displayable row: the record plus its id.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    pub id: ItemId,
    pub record: Map<String, Value>,
    pub score: Option<f64>,
}

impl ProjectedRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }

    pub fn name(&self) -> &str {
        self.record.get("name").and_then(Value::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// The collection itself holds nothing.
    NoItems,
    /// Items exist but the query or filters removed all of them.
    NoMatches,
}

impl EmptyReason {
    pub fn message(&self) -> &'static str {
        match self {
            EmptyReason::NoItems => "No items",
            EmptyReason::NoMatches => "Nothing matches your search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub items: Vec<ProjectedRecord>,
    pub empty: Option<EmptyReason>,
}

impl Projection {
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Derives the displayed sequence from a collection.
///
/// Malformed (non-object) records are skipped, active predicates are combined
/// with AND, and a non-blank query ranks by fuzzy relevance. When `matcher`
/// could not be built the query falls back to substring containment over
/// `name` in insertion order.
pub fn project(
    collection: &Collection,
    query: &str,
    filters: &[Predicate],
    schema: &FilterSchema,
    matcher: Result<&FuzzyMatcher, &SearchError>,
) -> Projection {
    let well_formed: Vec<ProjectedRecord> = collection
        .iter()
        .filter_map(|(id, v)| {
            v.as_object().map(|obj| ProjectedRecord {
                id,
                record: obj.clone(),
                score: None,
            })
        })
        .collect();
    if well_formed.is_empty() {
        return Projection {
            items: Vec::new(),
            empty: Some(EmptyReason::NoItems),
        };
    }

    let mut items: Vec<ProjectedRecord> = well_formed
        .into_iter()
        .filter(|r| matches_all(&r.record, filters, schema))
        .collect();

    let query = query.trim();
    if !query.is_empty() {
        match matcher {
            Ok(m) => {
                items = items
                    .into_iter()
                    .filter_map(|mut r| {
                        m.score(&r.record, query).map(|s| {
                            r.score = Some(s);
                            r
                        })
                    })
                    .collect();
                items.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            Err(err) => {
                tracing::debug!(target: "projector", %err, "fuzzy matcher unavailable, using substring search");
                items.retain(|r| name_contains(&r.record, query));
            }
        }
    }

    let empty = items.is_empty().then_some(EmptyReason::NoMatches);
    Projection { items, empty }
}

#[derive(Debug, Clone, PartialEq)]
struct MemoKey {
    version: u64,
    query: String,
    filters: Vec<Predicate>,
}

/// Caches the last projection keyed on its inputs. `version` must change
/// whenever the underlying collection does.
#[derive(Debug, Default)]
pub struct ProjectionMemo {
    last: Option<(MemoKey, Projection)>,
}

impl ProjectionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_project(
        &mut self,
        version: u64,
        collection: &Collection,
        query: &str,
        filters: &[Predicate],
        schema: &FilterSchema,
        matcher: Result<&FuzzyMatcher, &SearchError>,
    ) -> &Projection {
        let key = MemoKey {
            version,
            query: query.to_string(),
            filters: filters.to_vec(),
        };
        let entry = match self.last.take() {
            Some((k, p)) if k == key => (k, p),
            _ => {
                let p = project(collection, query, filters, schema, matcher);
                (key, p)
            }
        };
        &self.last.insert(entry).1
    }

    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Operator;
    use crate::search::DEFAULT_THRESHOLD;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn sample() -> Collection {
        let mut c = Collection::new();
        c.insert(
            ItemId::Num(1),
            json!({"name": "Sword", "type": "weapon", "value": 100, "count": 1}),
        );
        c
    }

    fn bag() -> Collection {
        let mut c = Collection::new();
        c.insert(ItemId::Num(1), json!({"name": "Sword", "type": "weapon", "value": 100, "weight": 5}));
        c.insert(ItemId::Num(2), json!({"name": "Shield", "type": "armor", "value": 80, "weight": 9}));
        c.insert(ItemId::Num(3), json!({"name": "Dagger", "type": "weapon", "value": 30, "weight": 1}));
        c.insert(ItemId::Num(4), json!("legacy-entry"));
        c.insert(ItemId::Num(5), json!({"name": "Broadsword", "type": "weapon", "value": 160, "weight": 12}));
        c
    }

    fn run(c: &Collection, q: &str, f: &[Predicate]) -> Projection {
        let m = FuzzyMatcher::default_keys(DEFAULT_THRESHOLD).unwrap();
        project(c, q, f, &FilterSchema::inventory(), Ok(&m))
    }

    #[test]
    fn unfiltered_projection_returns_record_with_id() {
        let p = run(&sample(), "", &[]);
        assert_eq!(p.len(), 1);
        assert_eq!(p.items[0].id, ItemId::Num(1));
        assert_eq!(p.items[0].name(), "Sword");
        assert_eq!(p.items[0].field("count"), Some(&json!(1)));
        assert_eq!(p.empty, None);
    }

    #[test]
    fn greater_filter_includes_and_excludes() {
        let c = sample();
        let p = run(&c, "", &[Predicate::new("value", Operator::Greater, "50")]);
        assert_eq!(p.ids(), vec![ItemId::Num(1)]);
        let p = run(&c, "", &[Predicate::new("value", Operator::Greater, "150")]);
        assert!(p.is_empty());
        assert_eq!(p.empty, Some(EmptyReason::NoMatches));
    }

    #[test]
    fn partial_query_still_matches() {
        let p = run(&sample(), "Sw", &[]);
        assert_eq!(p.ids(), vec![ItemId::Num(1)]);
    }

    #[test]
    fn malformed_records_are_dropped() {
        let p = run(&bag(), "", &[]);
        assert_eq!(
            p.ids(),
            vec![ItemId::Num(1), ItemId::Num(2), ItemId::Num(3), ItemId::Num(5)]
        );
    }

    #[test]
    fn projection_is_idempotent() {
        let c = bag();
        let f = [Predicate::new("type", Operator::Equal, "weapon")];
        assert_eq!(run(&c, "sword", &f), run(&c, "sword", &f));
    }

    #[test]
    fn filters_combine_as_intersection() {
        let c = bag();
        let p1 = Predicate::new("type", Operator::Equal, "weapon");
        let p2 = Predicate::new("weight", Operator::LessOrEqual, "5");
        let a: BTreeSet<ItemId> = run(&c, "", &[p1.clone()]).ids().into_iter().collect();
        let b: BTreeSet<ItemId> = run(&c, "", &[p2.clone()]).ids().into_iter().collect();
        let both: BTreeSet<ItemId> = run(&c, "", &[p1, p2]).ids().into_iter().collect();
        let expected: BTreeSet<ItemId> = a.intersection(&b).cloned().collect();
        assert_eq!(both, expected);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn query_results_are_ranked_by_relevance() {
        let p = run(&bag(), "sword", &[]);
        assert_eq!(p.ids()[0], ItemId::Num(1));
        assert!(p.ids().contains(&ItemId::Num(5)));
        assert!(!p.ids().contains(&ItemId::Num(2)));
    }

    #[test]
    fn empty_collection_and_empty_result_are_distinguished() {
        let p = run(&Collection::new(), "", &[]);
        assert_eq!(p.empty, Some(EmptyReason::NoItems));
        let p = run(&bag(), "qqqqqq", &[]);
        assert_eq!(p.empty, Some(EmptyReason::NoMatches));
        assert_ne!(EmptyReason::NoItems.message(), EmptyReason::NoMatches.message());
    }

    #[test]
    fn only_malformed_records_count_as_no_items() {
        let mut c = Collection::new();
        c.insert(ItemId::Num(1), json!("legacy"));
        c.insert(ItemId::Num(2), Value::Null);
        let inert = [Predicate::empty(), Predicate::empty()];
        let p = run(&c, "", &inert);
        assert!(p.is_empty());
        assert_eq!(p.empty, Some(EmptyReason::NoItems));
        let p = run(&c, "sword", &[Predicate::new("value", Operator::Greater, "5")]);
        assert_eq!(p.empty, Some(EmptyReason::NoItems));
    }

    #[test]
    fn matcher_failure_falls_back_to_substring_in_order() {
        let err = FuzzyMatcher::default_keys(2.0).unwrap_err();
        let p = project(&bag(), "SWORD", &[], &FilterSchema::inventory(), Err(&err));
        assert_eq!(p.ids(), vec![ItemId::Num(1), ItemId::Num(5)]);
        assert!(p.items.iter().all(|r| r.score.is_none()));
    }

    #[test]
    fn memo_reuses_until_inputs_change() {
        let c = bag();
        let m = FuzzyMatcher::default_keys(DEFAULT_THRESHOLD).unwrap();
        let schema = FilterSchema::inventory();
        let mut memo = ProjectionMemo::new();
        let first = memo.get_or_project(1, &c, "", &[], &schema, Ok(&m)).clone();
        assert_eq!(first.len(), 4);

        let mut smaller = Collection::new();
        smaller.insert(ItemId::Num(9), json!({"name": "Rope"}));
        // same version: cached projection is returned
        let cached = memo.get_or_project(1, &smaller, "", &[], &schema, Ok(&m)).clone();
        assert_eq!(cached, first);
        let fresh = memo.get_or_project(2, &smaller, "", &[], &schema, Ok(&m)).clone();
        assert_eq!(fresh.ids(), vec![ItemId::Num(9)]);
    }
}
