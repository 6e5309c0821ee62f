//! Persistence properties that must hold across a close and reopen.

use std::collections::HashSet;

use proptest::prelude::*;

use convpipe_core::{ConversionRequest, RecordId};
use convpipe_store::PersistedStore;

fn currency() -> impl Strategy<Value = String> {
    "[A-Z]{3}"
}

fn request() -> impl Strategy<Value = ConversionRequest> {
    (currency(), currency(), 0.01f64..1.0e7)
        .prop_map(|(from, to, amount)| ConversionRequest::new(from, to, amount))
}

/// Edits applied after the initial inserts: `Some(amount)` updates the
/// record at that index, `None` deletes it.
fn edits() -> impl Strategy<Value = Vec<(usize, Option<f64>)>> {
    prop::collection::vec((0usize..32, prop::option::of(0.01f64..1.0e7)), 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reopen_yields_same_records(
        requests in prop::collection::vec(request(), 0..32),
        edits in edits(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.jsonl");

        let expected = {
            let store = PersistedStore::<ConversionRequest>::open(&path).unwrap();
            for req in requests {
                store.create(req);
            }
            for (index, edit) in edits {
                let all = store.get_all();
                if all.is_empty() {
                    break;
                }
                let mut target = all[index % all.len()].clone();
                match edit {
                    Some(amount) => {
                        target.amount = amount;
                        prop_assert!(store.update(target));
                    }
                    None => prop_assert!(store.delete(&target.id)),
                }
            }
            prop_assert!(!store.is_diverged());
            store.get_all()
        };

        let reopened = PersistedStore::<ConversionRequest>::open(&path).unwrap();
        prop_assert_eq!(reopened.get_all(), expected);
    }

    #[test]
    fn ids_are_unique_and_non_empty(requests in prop::collection::vec(request(), 1..64)) {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistedStore::<ConversionRequest>::open(dir.path().join("r.jsonl")).unwrap();

        let count = requests.len();
        let ids: HashSet<RecordId> = requests.into_iter().map(|r| store.create(r).id).collect();
        prop_assert_eq!(ids.len(), count);
        prop_assert!(ids.iter().all(|id| !id.is_empty()));
    }
}
