use digimagang::store::{Collection, Entity, FeedChange, FeedOutcome, Placement};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: String,
    rank: i64,
}

impl Entity for Item {
    fn id(&self) -> &str {
        &self.id
    }
}

fn by_rank(a: &Item, b: &Item) -> std::cmp::Ordering {
    a.rank.cmp(&b.rank)
}

#[derive(Debug, Clone)]
enum Op {
    Feed(FeedChange<Item>),
    Begin(String),
    Finish(String),
    Abort(String),
    BeginCreate,
    Created(Item),
    Removed(String),
}

fn item() -> impl Strategy<Value = Item> {
    (0u8..8, -5i64..5).prop_map(|(id, rank)| Item {
        id: id.to_string(),
        rank,
    })
}

fn id() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|id| id.to_string())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => item().prop_map(|i| Op::Feed(FeedChange::Upsert(i))),
        2 => id().prop_map(|i| Op::Feed(FeedChange::Remove(i))),
        1 => id().prop_map(Op::Begin),
        1 => id().prop_map(Op::Finish),
        1 => id().prop_map(Op::Abort),
        1 => Just(Op::BeginCreate),
        1 => item().prop_map(Op::Created),
        1 => id().prop_map(Op::Removed),
    ]
}

fn placement() -> impl Strategy<Value = Placement<Item>> {
    prop_oneof![
        Just(Placement::Append),
        Just(Placement::Prepend),
        Just(Placement::SortedBy(by_rank as fn(&Item, &Item) -> std::cmp::Ordering)),
    ]
}

fn run(collection: &mut Collection<Item>, ops: Vec<Op>) {
    let mut tokens = std::collections::HashMap::new();
    for op in ops {
        match op {
            Op::Feed(change) => {
                collection.apply_feed(change);
            }
            Op::Begin(id) => {
                tokens.insert(id.clone(), collection.begin_write(&id));
            }
            Op::Finish(id) => {
                if let Some(token) = tokens.remove(&id) {
                    collection.finish_write(&id, token);
                }
            }
            Op::Abort(id) => {
                if let Some(token) = tokens.remove(&id) {
                    collection.abort_write(&id, token);
                }
            }
            Op::BeginCreate => collection.begin_create(),
            Op::Created(item) => {
                collection.settle_created(item);
            }
            Op::Removed(id) => {
                collection.settle_removed(&id);
            }
        }
    }
}

proptest! {
    #[test]
    fn test_identifiers_stay_unique(
        placement in placement(),
        seed in prop::collection::vec(item(), 0..8),
        ops in prop::collection::vec(op(), 0..40),
    ) {
        let mut collection = Collection::new(placement);
        collection.replace_all(seed);
        run(&mut collection, ops);

        let ids: Vec<&str> = collection.entities().iter().map(Entity::id).collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_repeated_upsert_is_idempotent(
        placement in placement(),
        seed in prop::collection::vec(item(), 0..8),
        change in item(),
    ) {
        let mut once = Collection::new(placement);
        once.replace_all(seed);
        once.apply_feed(FeedChange::Upsert(change.clone()));

        let mut twice = once.clone();
        let outcome = twice.apply_feed(FeedChange::Upsert(change));

        prop_assert_eq!(outcome, FeedOutcome::Replaced);
        prop_assert_eq!(once.entities(), twice.entities());
    }

    #[test]
    fn test_sorted_placement_stays_sorted(
        seed in prop::collection::vec(item(), 0..8),
        ops in prop::collection::vec(op(), 0..40),
    ) {
        let mut collection = Collection::new(Placement::SortedBy(by_rank));
        collection.replace_all(seed);
        run(&mut collection, ops);

        let ranks: Vec<i64> = collection.entities().iter().map(|i| i.rank).collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }
}
