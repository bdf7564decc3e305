// End-to-end fidelity of the document pipeline: what an author writes is what
// the store keeps, with only the managed metadata lines rewritten.

use chrono::{DateTime, Utc};

use stepflow_core::document::{parse_document, serialize_revision};
use stepflow_core::source_patch::{apply_metadata, MetadataPatch};
use stepflow_core::StepTypeRegistry;

const AUTHORED: &str = r#"# Nightly cleanup pipeline
# Owner: platform team
namespace: ops
id: nightly-cleanup

name: Nightly cleanup
description: Rotates logs and prunes temp data

parameters:
  - name: env
    type: STRING
    required: true
  - name: dryRun
    type: BOOLEAN
    required: false
    default: true

steps:
  - type: Sequence
    id: main
    steps:
      - type: LogTask
        message: "cleanup starting"   # keep first
      - type: If
        condition: dryRun
        ifTrue:
          type: LogTask
          message: "dry run only"
"#;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn serialize_then_parse_is_identity() {
    let registry = StepTypeRegistry::with_builtins();
    let revision = parse_document(AUTHORED, &registry).unwrap();
    let serialized = serialize_revision(&revision).unwrap();
    assert_eq!(parse_document(&serialized, &registry).unwrap(), revision);
}

#[test]
fn store_patch_keeps_the_authored_text_readable() {
    // Simulates saveFirst: assign version 1, stamp timestamps, mark inactive.
    let now = ts("2026-08-01T12:00:00Z");
    let stored = apply_metadata(
        AUTHORED,
        &MetadataPatch {
            version: Some(1),
            created_at: Some(now),
            updated_at: Some(now),
            active: Some(false),
        },
    );

    // Comments, blank lines, and field order survive
    assert!(stored.starts_with("# Nightly cleanup pipeline\n# Owner: platform team\n"));
    assert!(stored.contains("        message: \"cleanup starting\"   # keep first"));

    // The patched text is still a valid document carrying the new metadata
    let registry = StepTypeRegistry::with_builtins();
    let revision = parse_document(&stored, &registry).unwrap();
    assert_eq!(revision.version, 1);
    assert!(!revision.active);
    assert_eq!(revision.created_at, Some(now));
    assert_eq!(revision.updated_at, Some(now));
}

#[test]
fn activation_patch_touches_only_the_managed_lines() {
    // Simulates saveFirst followed by setActive(true)
    let created = ts("2026-08-01T12:00:00Z");
    let stored = apply_metadata(
        AUTHORED,
        &MetadataPatch {
            version: Some(1),
            created_at: Some(created),
            updated_at: Some(created),
            active: Some(false),
        },
    );

    let activated_at = ts("2026-08-02T09:00:00Z");
    let activated = apply_metadata(
        &stored,
        &MetadataPatch {
            updated_at: Some(activated_at),
            active: Some(true),
            ..Default::default()
        },
    );

    // Only the updatedAt and active lines changed
    let before: Vec<&str> = stored.lines().collect();
    let after: Vec<&str> = activated.lines().collect();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        if b.starts_with("updatedAt:") {
            assert_eq!(*a, "updatedAt: \"2026-08-02T09:00:00Z\"");
        } else if b.starts_with("active:") {
            assert_eq!(*a, "active: true");
        } else {
            assert_eq!(a, b);
        }
    }

    let registry = StepTypeRegistry::with_builtins();
    let revision = parse_document(&activated, &registry).unwrap();
    assert!(revision.active);
    assert_eq!(revision.created_at, Some(created));
    assert_eq!(revision.updated_at, Some(activated_at));
}
