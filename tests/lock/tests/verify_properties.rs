//! Diff engine and payload inspector properties over realistic kernel text.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use outcheck_verify::diff::{diff_text, render_report, verify_text};
use outcheck_verify::payload::{
    decode_binary, inspect_payloads, validate_container_format, ContainerFormat, PayloadFinding,
    PNG_SIGNATURE,
};
use outcheck_verify::text::{hex_dump, inspect_text, line_breakdown};
use outcheck_verify::EncodingError;
use outcheck_wire::{MimeBundle, Payload};

const SAMPLES: &[&str] = &[
    "",
    "plain",
    "  Source |  SS\n---------+----\n   Model | 18\n",
    "caf\u{e9} | na\u{ef}ve",
    "tab\tseparated\r\n",
    "\u{1b}[1mbold\u{1b}[0m",
    "\u{2500}\u{2500}\u{253c}\u{2500}",
];

#[test]
fn self_diff_is_empty() {
    for sample in SAMPLES {
        assert!(diff_text(sample, sample).is_identical(), "{sample:?}");
    }
}

#[test]
fn swapping_sides_keeps_divergent_indices() {
    for a in SAMPLES {
        for b in SAMPLES {
            let forward = diff_text(a, b);
            let backward = diff_text(b, a);
            assert_eq!(forward.divergent_indices(), backward.divergent_indices());
            for (f, r) in forward.divergences.iter().zip(&backward.divergences) {
                assert_eq!(f.first_char_divergence, r.first_char_divergence);
                assert_eq!(f.actual_line, r.expected_line);
            }
        }
    }
}

#[test]
fn pipe_table_divergence_is_at_index_one_column_two() {
    let report = diff_text("a|b\nc|e", "a|b\nc|d");
    assert_eq!(report.divergences.len(), 1);
    assert_eq!(report.divergences[0].index, 1);
    assert_eq!(report.divergences[0].first_char_divergence, Some(2));
    assert!(render_report(&report).contains("pos 2: actual='e' expected='d'"));
    assert!(verify_text("a|b\nc|e", "a|b\nc|d").is_err());
}

#[test]
fn byte_length_bounds_char_length() {
    for sample in SAMPLES {
        let d = inspect_text(sample);
        assert!(d.byte_length >= d.char_length, "{sample:?}");
        assert_eq!(d.byte_length == d.char_length, sample.is_ascii(), "{sample:?}");
    }
    let plain = inspect_text("cafe");
    let accented = inspect_text("caf\u{e9}");
    assert_eq!(accented.byte_length, plain.byte_length + 1);
    assert_eq!(accented.char_length, plain.char_length);
}

#[test]
fn diagnostics_expose_invisible_characters() {
    let d = inspect_text("tab\tseparated\r\n\u{1b}[0m");
    assert!(d.contains_tabs);
    assert!(d.contains_carriage_returns);
    assert!(d.contains_control_sequences);
    assert_eq!((d.tab_count, d.carriage_return_count, d.newline_count), (1, 1, 1));

    let dump = hex_dump(d.bytes(), 0, 16);
    assert_eq!(
        dump,
        "0000:  74 61 62 09 73 65 70 61 72 61 74 65 64 0d 0a 1b   tab.separated...\n"
    );

    let lines = line_breakdown("ab\n\u{e9}", 5, 1);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].leading_hex, "61");
    assert!(lines[0].truncated);
    assert_eq!(lines[1].leading_hex, "e9");
}

#[test]
fn png_payload_decodes_and_validates() {
    let mut png = PNG_SIGNATURE.to_vec();
    png.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
    let decoded = decode_binary(&BASE64.encode(&png)).unwrap();
    assert!(validate_container_format(&decoded, PNG_SIGNATURE));
    assert_eq!(ContainerFormat::detect(&decoded), Some(ContainerFormat::Png));
}

#[test]
fn non_base64_is_an_encoding_error() {
    for bad in ["not base64!", "abc", "=abc", "\u{e9}\u{e9}\u{e9}\u{e9}"] {
        assert!(
            matches!(decode_binary(bad), Err(EncodingError::InvalidBase64 { .. })),
            "{bad:?}"
        );
    }
}

#[test]
fn one_bad_payload_does_not_hide_the_others() {
    let payloads: MimeBundle = [
        ("image/png".to_string(), Payload::Text("%%%".into())),
        ("text/plain".to_string(), Payload::Text("<Figure>".into())),
        ("application/pdf".to_string(), Payload::Text("JVBERi0=".into())),
    ]
    .into_iter()
    .collect();
    let reports = inspect_payloads(&payloads);
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].mime, "application/pdf");
    assert_eq!(reports[0].finding, PayloadFinding::Opaque);
    assert!(matches!(reports[1].finding, PayloadFinding::Invalid(_)));
    assert!(matches!(reports[2].finding, PayloadFinding::Text(_)));
}
