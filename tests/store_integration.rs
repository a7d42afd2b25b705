//! End-to-end tests over real store files on disk.

use chrono::NaiveDate;
use semgraph::store::writer::{append_record, write_snapshot};
use semgraph::types::{parse_timestamp, Record, RecordKind, Stance};
use semgraph::{validate_store, Header, IntegrityWarning, Snapshot, StoreError};
use std::fs;
use std::path::PathBuf;

fn item(id: &str, content: &str, stance: Stance) -> Record {
    let ts = parse_timestamp("2024-01-15T10:00:00Z").unwrap();
    let mut record = Record::new_item(id, content, stance, ts);
    record.certainty = 0.9;
    record.perspective = "me".to_string();
    record
}

fn link(id: &str, ref1: &str, ref2: &str) -> Record {
    let mut record = item(id, "connects", Stance::Link);
    record.kind = RecordKind::Link;
    record.ref1 = Some(ref1.to_string());
    record.ref2 = Some(ref2.to_string());
    record.relation = Some("supports".to_string());
    record
}

fn store_file(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("graph.tsv")
}

#[test]
fn test_append_load_validate_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    append_record(&path, &header, &item("a", "water boils at 100C", Stance::Fact)).unwrap();
    append_record(&path, &header, &item("b", "tea tastes better at 80C", Stance::Opinion)).unwrap();
    append_record(&path, &header, &link("l1", "a", "b")).unwrap();

    let (snapshot, parse) = Snapshot::load(&path).unwrap();
    assert_eq!(snapshot.len(), 3);
    assert!(parse.skipped.is_empty());
    assert!(parse.errors.is_empty());

    let report = validate_store(&path).unwrap();
    assert!(report.is_valid());
    assert!(report.warnings.is_empty());
    assert_eq!(report.record_count, 3);
}

#[test]
fn test_malformed_row_tolerant_vs_strict() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    append_record(&path, &header, &item("a", "good row", Stance::Fact)).unwrap();
    // Wrong field count: unreadable, not silently dropped.
    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str("broken\trow\n");
    fs::write(&path, text).unwrap();
    append_record(&path, &header, &item("b", "another good row", Stance::Fact)).unwrap();

    let (snapshot, parse) = Snapshot::load(&path).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(parse.skipped.len(), 1);
    assert_eq!(parse.skipped[0].line, 3);

    let err = Snapshot::load_strict(&path).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRow { line: 3, .. }));

    // Tolerant validation reports the store invalid without aborting.
    let report = validate_store(&path).unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.record_count, 2);
}

#[test]
fn test_dangling_link_is_warning_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    append_record(&path, &header, &item("a", "anchor", Stance::Fact)).unwrap();
    append_record(&path, &header, &link("l1", "a", "ghost")).unwrap();

    let report = validate_store(&path).unwrap();
    assert!(report.is_valid());
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        &report.warnings[0],
        IntegrityWarning::DanglingLinkReference { target, .. } if target == "ghost"
    ));
}

#[test]
fn test_unknown_stance_survives_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    let mut odd = item("a", "something half-formed", Stance::Fact);
    odd.raw_stance = Some("musing".to_string());
    append_record(&path, &header, &odd).unwrap();

    let (snapshot, parse) = Snapshot::load(&path).unwrap();
    assert_eq!(parse.warnings.len(), 1);
    assert!(matches!(
        &parse.warnings[0],
        IntegrityWarning::UnknownStance { token, .. } if token == "musing"
    ));

    // Rewriting must emit the original token, not the coerced stance.
    write_snapshot(&path, &snapshot).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("musing"));

    let (reloaded, _) = Snapshot::load(&path).unwrap();
    assert_eq!(reloaded.get("a").unwrap().stance, Stance::Fact);
    assert_eq!(reloaded.get("a").unwrap().raw_stance.as_deref(), Some("musing"));
}

#[test]
fn test_archive_rewrites_store_and_index_follows() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    append_record(&path, &header, &item("a", "transient claim", Stance::Observation)).unwrap();
    append_record(&path, &header, &item("b", "kept claim", Stance::Fact)).unwrap();

    let (mut snapshot, _) = Snapshot::load(&path).unwrap();
    let archived = semgraph::archive(
        snapshot.get("a").unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    )
    .unwrap();
    snapshot.replace(archived).unwrap();
    write_snapshot(&path, &snapshot).unwrap();

    let (reloaded, _) = Snapshot::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(!reloaded.get("a").unwrap().archived_date.is_active());
    assert!(reloaded.get("b").unwrap().archived_date.is_active());
    assert_eq!(reloaded.iter_active().count(), 1);
    assert_eq!(reloaded.archived_count(), 1);
}

#[test]
fn test_crlf_and_blank_lines_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_file(&dir);
    let header = Header::canonical();

    append_record(&path, &header, &item("a", "unix line", Stance::Fact)).unwrap();
    let text = fs::read_to_string(&path).unwrap().replace('\n', "\r\n") + "\r\n";
    fs::write(&path, text).unwrap();

    let (snapshot, parse) = Snapshot::load(&path).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(parse.skipped.is_empty());
    assert_eq!(snapshot.get("a").unwrap().content, "unix line");
}
