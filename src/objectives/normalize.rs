//! Coercion of untrusted JSON into well-formed records.
//!
//! Every reader here is total: a missing or wrong-typed field takes its default and unknown
//! fields are dropped. Store rows go through the same path with an empty `LastModified`
//! fallback so legacy rows stay distinguishable from fresh ones.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::internal_error::SyncError;

use super::data::*;

type Fields = Map<String, Value>;

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn fields(raw: &Value) -> Option<&Fields> {
    raw.as_object()
}

fn read_str(fields: Option<&Fields>, key: &str) -> String {
    fields
        .and_then(|f| f.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn read_bool(fields: Option<&Fields>, key: &str, default: bool) -> bool {
    fields
        .and_then(|f| f.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn read_f64(fields: Option<&Fields>, key: &str) -> f64 {
    fields
        .and_then(|f| f.get(key))
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or_default()
}

fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
            .map(|n| n as i64)
    })
}

fn read_i64(fields: Option<&Fields>, key: &str) -> i64 {
    fields
        .and_then(|f| f.get(key))
        .and_then(as_integer)
        .unwrap_or_default()
}

fn read_strings(fields: Option<&Fields>, key: &str) -> Vec<String> {
    match fields.and_then(|f| f.get(key)).and_then(Value::as_array) {
        Some(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => vec![],
    }
}

fn read_integers(fields: Option<&Fields>, key: &str) -> Vec<i64> {
    match fields.and_then(|f| f.get(key)).and_then(Value::as_array) {
        Some(values) => values.iter().filter_map(as_integer).collect(),
        None => vec![],
    }
}

fn read_last_modified(fields: Option<&Fields>, fallback: &str) -> String {
    match fields.and_then(|f| f.get("LastModified")).and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => fallback.to_string(),
    }
}

fn read_tags(fields: Option<&Fields>) -> Vec<String> {
    let mut tags: Vec<String> = vec![];
    for tag in read_strings(fields, "Tags") {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub fn normalize_objective(raw: &Value) -> Objective {
    normalize_objective_at(raw, &now_timestamp())
}

/// Same as [`normalize_objective`] with an explicit `LastModified` fallback.
pub fn normalize_objective_at(raw: &Value, last_modified_fallback: &str) -> Objective {
    let f = fields(raw);

    Objective {
        user_id: read_str(f, "UserId"),
        objective_id: read_str(f, "ObjectiveId"),
        title: read_str(f, "Title"),
        done: read_bool(f, "Done", false),
        theme: read_str(f, "Theme"),
        is_archived: read_bool(f, "IsArchived", false),
        is_locked: read_bool(f, "IsLocked", false),
        is_showing: read_bool(f, "IsShowing", true),
        is_showing_checked_grocery: read_bool(f, "IsShowingCheckedGrocery", false),
        is_showing_checked_step: read_bool(f, "IsShowingCheckedStep", false),
        is_showing_checked_medicine: read_bool(f, "IsShowingCheckedMedicine", false),
        is_showing_checked_exercise: read_bool(f, "IsShowingCheckedExercise", false),
        pos: read_f64(f, "Pos"),
        tags: read_tags(f),
        last_modified: read_last_modified(f, last_modified_fallback),
    }
}

fn read_item_type(fields: Option<&Fields>) -> ItemType {
    fields
        .and_then(|f| f.get("Type"))
        .and_then(as_integer)
        .and_then(|tag| u64::try_from(tag).ok())
        .and_then(ItemType::from_tag)
        .unwrap_or(ItemType::Note)
}

fn read_kind(item_type: ItemType, f: Option<&Fields>) -> ItemKind {
    match item_type {
        ItemType::Step => ItemKind::Step(Step {
            title: read_str(f, "Title"),
            done: read_bool(f, "Done", false),
            importance: read_i64(f, "Importance"),
            auto_destroy: read_bool(f, "AutoDestroy", false),
        }),
        ItemType::Wait => ItemKind::Wait(Wait {
            title: read_str(f, "Title"),
        }),
        ItemType::Question => ItemKind::Question(Question {
            statement: read_str(f, "Statement"),
            answer: read_str(f, "Answer"),
        }),
        ItemType::Note => ItemKind::Note(Note {
            text: read_str(f, "Text"),
        }),
        ItemType::Location => ItemKind::Location(Location {
            title: read_str(f, "Title"),
            url: read_str(f, "Url"),
            is_showing_map: read_bool(f, "IsShowingMap", false),
        }),
        ItemType::Divider => ItemKind::Divider(Divider {
            title: read_str(f, "Title"),
            is_open: read_bool(f, "IsOpen", false),
        }),
        ItemType::Grocery => ItemKind::Grocery(Grocery {
            title: read_str(f, "Title"),
            is_checked: read_bool(f, "IsChecked", false),
            quantity: read_f64(f, "Quantity"),
            unit: read_str(f, "Unit"),
            good_price: read_str(f, "GoodPrice"),
        }),
        ItemType::Medicine => ItemKind::Medicine(Medicine {
            title: read_str(f, "Title"),
            is_checked: read_bool(f, "IsChecked", false),
            quantity: read_f64(f, "Quantity"),
            unit: read_str(f, "Unit"),
            purpose: read_str(f, "Purpose"),
            components: read_strings(f, "Components"),
        }),
        ItemType::Exercise => ItemKind::Exercise(Exercise {
            title: read_str(f, "Title"),
            is_done: read_bool(f, "IsDone", false),
            reps: read_i64(f, "Reps"),
            series: read_i64(f, "Series"),
            max_weight: read_str(f, "MaxWeight"),
            description: read_str(f, "Description"),
            weekdays: read_integers(f, "Weekdays"),
            last_done: read_str(f, "LastDone"),
            body_images: read_strings(f, "BodyImages"),
        }),
        ItemType::Link => ItemKind::Link(Link {
            title: read_str(f, "Title"),
            link: read_str(f, "Link"),
        }),
        ItemType::Fake => ItemKind::Fake(Placeholder {}),
        ItemType::Image => ItemKind::Image(Image {
            title: read_str(f, "Title"),
            name: read_str(f, "Name"),
            size: read_i64(f, "Size"),
            width: read_i64(f, "Width"),
            height: read_i64(f, "Height"),
            is_displaying: read_bool(f, "IsDisplaying", false),
        }),
        ItemType::House => ItemKind::House(House {
            title: read_str(f, "Title"),
        }),
    }
}

pub fn normalize_item(raw: &Value) -> Item {
    normalize_item_at(raw, &now_timestamp())
}

/// Same as [`normalize_item`] with an explicit `LastModified` fallback.
pub fn normalize_item_at(raw: &Value, last_modified_fallback: &str) -> Item {
    let f = fields(raw);

    Item {
        item_id: read_str(f, "ItemId"),
        user_id_objective_id: read_str(f, "UserIdObjectiveId"),
        pos: read_f64(f, "Pos"),
        last_modified: read_last_modified(f, last_modified_fallback),
        kind: read_kind(read_item_type(f), f),
    }
}

fn read_list<'a>(body: Option<&'a Fields>, key: &str) -> Result<&'a [Value], SyncError> {
    match body.and_then(|b| b.get(key)) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(values)) => Ok(values.as_slice()),
        Some(_) => Err(SyncError::Malformed(format!("{} must be an array", key))),
    }
}

/// Array body of the batch endpoints.
pub fn read_array(body: &Value) -> Result<&[Value], SyncError> {
    body.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| SyncError::Malformed("request body must be an array".to_string()))
}

pub fn objective_ref(raw: &Value) -> ObjectiveRef {
    ObjectiveRef {
        objective_id: read_str(fields(raw), "ObjectiveId"),
    }
}

pub fn item_ref(raw: &Value) -> ItemRef {
    let f = fields(raw);
    ItemRef {
        user_id_objective_id: read_str(f, "UserIdObjectiveId"),
        item_id: read_str(f, "ItemId"),
    }
}

/// Parses a sync body `{ Objectives, Items, DeleteObjectives, DeleteItems }`.
///
/// Each list may be absent or null. Anything else that is not an array rejects the whole body.
pub fn read_delta(body: &Value) -> Result<Delta, SyncError> {
    let fields = match body {
        Value::Object(map) => Some(map),
        Value::Null => None,
        _ => return Err(SyncError::Malformed("request body must be an object".to_string())),
    };

    Ok(Delta {
        objectives: read_list(fields, "Objectives")?
            .iter()
            .map(normalize_objective)
            .collect(),
        items: read_list(fields, "Items")?.iter().map(normalize_item).collect(),
        delete_objectives: read_list(fields, "DeleteObjectives")?
            .iter()
            .map(objective_ref)
            .collect(),
        delete_items: read_list(fields, "DeleteItems")?
            .iter()
            .map(item_ref)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objective_defaults_fill_every_field() {
        for raw in [json!(null), json!(42), json!("x"), json!([]), json!({})] {
            let objective = normalize_objective_at(&raw, "fallback");

            assert_eq!(objective.objective_id, "");
            assert_eq!(objective.title, "");
            assert!(!objective.done);
            assert!(objective.is_showing);
            assert!(!objective.is_archived);
            assert!(!objective.is_showing_checked_exercise);
            assert_eq!(objective.pos, 0.0);
            assert!(objective.tags.is_empty());
            assert_eq!(objective.last_modified, "fallback");
        }
    }

    #[test]
    fn wrong_typed_objective_fields_take_defaults() {
        let objective = normalize_objective(&json!({
            "Title": 7,
            "Done": "yes",
            "IsShowing": 0,
            "Pos": "3",
            "Tags": ["a", 1, "b", "a", null],
            "Password": "hunter2"
        }));

        assert_eq!(objective.title, "");
        assert!(!objective.done);
        assert!(objective.is_showing);
        assert_eq!(objective.pos, 0.0);
        assert_eq!(objective.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(!objective.last_modified.is_empty());
        assert!(serde_json::to_value(&objective).unwrap().get("Password").is_none());
    }

    #[test]
    fn objective_keeps_well_typed_fields() {
        let objective = normalize_objective(&json!({
            "ObjectiveId": "abc",
            "Title": "Groceries",
            "Done": true,
            "Theme": "dark",
            "IsLocked": true,
            "IsShowing": false,
            "IsShowingCheckedGrocery": true,
            "Pos": 4,
            "LastModified": "2024-05-01T10:00:00.000Z"
        }));

        assert_eq!(objective.objective_id, "abc");
        assert_eq!(objective.title, "Groceries");
        assert!(objective.done);
        assert!(objective.is_locked);
        assert!(!objective.is_showing);
        assert!(objective.is_showing_checked_grocery);
        assert_eq!(objective.pos, 4.0);
        assert_eq!(objective.last_modified, "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn unknown_or_invalid_type_becomes_note() {
        for raw in [
            json!({}),
            json!({ "Type": 99 }),
            json!({ "Type": -1 }),
            json!({ "Type": 2.5 }),
            json!({ "Type": "6" }),
            json!({ "Type": 3, "Text": "hello" }),
        ] {
            assert_eq!(normalize_item(&raw).item_type(), ItemType::Note);
        }
    }

    #[test]
    fn each_type_gets_its_own_shape() {
        for t in ItemType::ALL.iter() {
            let item = normalize_item(&json!({ "Type": t.tag() }));
            assert_eq!(item.item_type(), *t);
        }
    }

    #[test]
    fn grocery_fields_are_layered_over_the_base() {
        let item = normalize_item(&json!({
            "ItemId": "id",
            "UserIdObjectiveId": "partition",
            "Type": 6,
            "Pos": 1.5,
            "Title": "Eggs",
            "IsChecked": true,
            "Quantity": 12,
            "Unit": "un",
            "Text": "not a grocery field"
        }));

        assert_eq!(item.item_id, "id");
        assert_eq!(item.pos, 1.5);
        assert_eq!(
            item.kind,
            ItemKind::Grocery(Grocery {
                title: "Eggs".to_string(),
                is_checked: true,
                quantity: 12.0,
                unit: "un".to_string(),
                good_price: String::new(),
            })
        );
    }

    #[test]
    fn exercise_lists_drop_wrong_typed_entries() {
        let item = normalize_item(&json!({
            "Type": 8,
            "Reps": 10,
            "Series": "3",
            "Weekdays": [1, "2", 3.0, 4.5],
            "BodyImages": ["chest", false]
        }));

        match item.kind {
            ItemKind::Exercise(exercise) => {
                assert_eq!(exercise.reps, 10);
                assert_eq!(exercise.series, 0);
                assert_eq!(exercise.weekdays, vec![1, 3]);
                assert_eq!(exercise.body_images, vec!["chest".to_string()]);
                assert_eq!(exercise.max_weight, "");
            }
            other => panic!("expected exercise, got {:?}", other),
        }
    }

    #[test]
    fn image_defaults() {
        let item = normalize_item(&json!({ "Type": 11, "Name": "cat.png", "Width": 640 }));

        assert_eq!(
            item.kind,
            ItemKind::Image(Image {
                name: "cat.png".to_string(),
                width: 640,
                ..Image::default()
            })
        );
    }

    #[test]
    fn empty_last_modified_is_kept() {
        let item = normalize_item(&json!({ "LastModified": "" }));
        assert_eq!(item.last_modified, "");

        let legacy = normalize_item_at(&json!({ "Type": 0 }), "");
        assert_eq!(legacy.last_modified, "");
    }

    #[test]
    fn delta_lists_must_be_arrays() {
        assert!(read_delta(&json!({ "Items": {} })).is_err());
        assert!(read_delta(&json!({ "DeleteObjectives": "all" })).is_err());
        assert!(read_delta(&json!([1, 2])).is_err());

        let delta = read_delta(&json!({ "Objectives": null })).unwrap();
        assert_eq!(delta, Delta::default());
        assert_eq!(read_delta(&json!(null)).unwrap(), Delta::default());
    }

    #[test]
    fn delta_reads_every_list() {
        let delta = read_delta(&json!({
            "Objectives": [{ "Title": "a" }],
            "Items": [{ "Type": 1 }, "junk"],
            "DeleteObjectives": [{ "ObjectiveId": "x" }, 3],
            "DeleteItems": [{ "UserIdObjectiveId": "p", "ItemId": "i" }]
        }))
        .unwrap();

        assert_eq!(delta.objectives.len(), 1);
        assert_eq!(delta.items.len(), 2);
        assert_eq!(delta.items[1].item_type(), ItemType::Note);
        assert_eq!(delta.delete_objectives[1].objective_id, "");
        assert_eq!(delta.delete_items[0].item_id, "i");
    }
}
