// SPDX-License-Identifier: Apache-2.0

use dataledger_model::{Dataset, Ledger, VersionEntry, VersionLabel};
use serde_json::{json, Value};

fn sha(fill: char) -> String {
    std::iter::repeat(fill).take(64).collect()
}

#[test]
fn serialized_field_names_match_the_published_format() {
    let entry = VersionEntry::placeholder(
        VersionLabel::parse("v3").expect("label"),
        format!("grid/v3-{}.sqlite", sha('d')),
        sha('d'),
        "add Q3 rows".to_string(),
        Some("# summary: 2 additions, 0 deletions".to_string()),
        None,
    );
    let ledger = Ledger {
        datasets: vec![Dataset::new("grid.sqlite".to_string(), entry)],
    };

    let value = serde_json::to_value(&ledger).expect("serialize");
    let expected = json!([
        {
            "fileName": "grid.sqlite",
            "history": [
                {
                    "version": "v3",
                    "objectKey": format!("grid/v3-{}.sqlite", sha('d')),
                    "sha256": sha('d'),
                    "description": "add Q3 rows",
                    "diffSummary": "# summary: 2 additions, 0 deletions"
                }
            ]
        }
    ]);
    assert_eq!(value, expected);
}

#[test]
fn placeholder_omits_commit_hash_entirely() {
    let entry = VersionEntry::placeholder(
        VersionLabel::parse("v1").expect("label"),
        format!("grid/v1-{}.sqlite", sha('a')),
        sha('a'),
        "initial import".to_string(),
        None,
        None,
    );
    let value = serde_json::to_value(&entry).expect("serialize");
    let object = value.as_object().expect("object");
    assert!(!object.contains_key("commitHash"));
    assert!(!object.contains_key("diffSummary"));
    assert!(!object.contains_key("diffDetail"));
}

#[test]
fn finalized_entry_round_trips() {
    let raw = json!({
        "version": "v2",
        "objectKey": format!("grid/v2-{}.sqlite", sha('b')),
        "sha256": sha('b'),
        "description": "monthly refresh",
        "commitHash": "abc123",
        "diffSummary": "UPDATE rows changed: 4",
        "diffDetail": "UPDATE grid SET value=2 WHERE id=7;"
    });
    let entry: VersionEntry = serde_json::from_value(raw.clone()).expect("deserialize");
    assert!(!entry.is_placeholder());
    assert_eq!(serde_json::to_value(&entry).expect("serialize"), raw);
}

#[test]
fn unknown_fields_are_rejected() {
    let raw = json!({
        "version": "v1",
        "objectKey": "grid/v1-aa.sqlite",
        "sha256": sha('a'),
        "description": "x",
        "timestamp": "2024-01-01T00:00:00Z"
    });
    let parsed: Result<VersionEntry, _> = serde_json::from_value(raw);
    assert!(parsed.is_err(), "unexpected fields must not pass silently");
}

#[test]
fn ledger_parses_from_raw_document() {
    let raw: Value = json!([
        {
            "fileName": "grid.sqlite",
            "history": [
                {
                    "version": "v2",
                    "objectKey": format!("grid/v2-{}.sqlite", sha('b')),
                    "sha256": sha('b'),
                    "description": "refresh",
                    "commitHash": "fff000"
                },
                {
                    "version": "v1",
                    "objectKey": format!("grid/v1-{}.sqlite", sha('a')),
                    "sha256": sha('a'),
                    "description": "initial",
                    "commitHash": "abc123"
                }
            ]
        }
    ]);
    let ledger: Ledger = serde_json::from_value(raw).expect("deserialize ledger");
    ledger.validate().expect("valid ledger");
    assert_eq!(ledger.datasets.len(), 1);
    assert_eq!(
        ledger.datasets[0].latest().expect("latest").version.to_string(),
        "v2"
    );
}
