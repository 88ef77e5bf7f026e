//! Text and JSON renderings of a snapshot diff.

use std::io::{self, Write};

use crate::diff::SnapshotDiff;

/// Compact human-readable form:
///
/// ```text
/// @<timestamp_ns> seq:<old>-><new> +objs:[a,b] -objs:[c]
///   <label>.<field>: <old> -> <new>
/// ```
///
/// An unknown old value (decoded integer changes carry only the delta)
/// renders as `?`.
pub fn write_text<W: Write>(w: &mut W, diff: &SnapshotDiff) -> io::Result<()> {
    write!(
        w,
        "@{} seq:{}->{}",
        diff.timestamp_ns, diff.old_sequence, diff.new_sequence
    )?;

    if !diff.added.is_empty() {
        write!(w, " +objs:[{}]", diff.added.join(","))?;
    }
    if !diff.removed.is_empty() {
        write!(w, " -objs:[{}]", diff.removed.join(","))?;
    }
    writeln!(w)?;

    for change in &diff.changes {
        let old = change
            .old
            .map_or_else(|| "?".to_string(), |value| value.text());
        writeln!(
            w,
            "  {}.{}: {} -> {}",
            change.object,
            change.field,
            old,
            change.new.text()
        )?;
    }
    Ok(())
}

/// JSON form: one object per diff with `timestamp_ns`, `old_sequence`,
/// `new_sequence`, `added`, `removed` and `changes[]` keys. Line mode emits
/// one object per line (JSONL).
pub fn write_json<W: Write>(w: &mut W, diff: &SnapshotDiff, pretty: bool) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *w, diff)?;
    } else {
        serde_json::to_writer(&mut *w, diff)?;
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::FieldChange;
    use crate::value::Value;

    fn sample() -> SnapshotDiff {
        SnapshotDiff {
            timestamp_ns: 1_000_000_000,
            old_sequence: 4,
            new_sequence: 6,
            added: vec!["extra".to_string()],
            removed: vec!["gone".to_string()],
            changes: vec![FieldChange {
                object: "main".to_string(),
                field: "value".to_string(),
                old: Some(Value::U64(100)),
                new: Value::U64(105),
            }],
        }
    }

    #[test]
    fn text_form_matches_the_documented_shape() {
        let mut out = Vec::new();
        write_text(&mut out, &sample()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "@1000000000 seq:4->6 +objs:[extra] -objs:[gone]\n  main.value: 100 -> 105\n"
        );
    }

    #[test]
    fn text_form_omits_empty_label_sets() {
        let diff = SnapshotDiff {
            timestamp_ns: 5,
            old_sequence: 1,
            new_sequence: 1,
            ..SnapshotDiff::default()
        };
        let mut out = Vec::new();
        write_text(&mut out, &diff).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "@5 seq:1->1\n");
    }

    #[test]
    fn unknown_old_values_render_as_question_mark() {
        let diff = SnapshotDiff {
            changes: vec![FieldChange {
                object: "main".to_string(),
                field: "value".to_string(),
                old: None,
                new: Value::I64(5),
            }],
            ..SnapshotDiff::default()
        };
        let mut out = Vec::new();
        write_text(&mut out, &diff).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("main.value: ? -> 5"));
    }

    #[test]
    fn json_line_form_parses_back() {
        let mut out = Vec::new();
        write_json(&mut out, &sample(), false).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.lines().count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["timestamp_ns"], 1_000_000_000u64);
        assert_eq!(parsed["old_sequence"], 4);
        assert_eq!(parsed["new_sequence"], 6);
        assert_eq!(parsed["added"][0], "extra");
        assert_eq!(parsed["removed"][0], "gone");
        assert_eq!(parsed["changes"][0]["obj"], "main");
        assert_eq!(parsed["changes"][0]["field"], "value");
        assert_eq!(parsed["changes"][0]["old"], 100);
        assert_eq!(parsed["changes"][0]["new"], 105);
    }

    #[test]
    fn json_pretty_form_is_still_one_document() {
        let mut out = Vec::new();
        write_json(&mut out, &sample(), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().count() > 1);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["changes"][0]["new"], 105);
    }
}
