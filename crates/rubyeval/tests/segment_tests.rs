//! Tests for statement segmentation.
//!
//! Uses the bundled MiniRuby grammar for real documents and closure parsers to
//! feed the segmenter hand-made trees.

use pretty_assertions::assert_eq;
use rubyeval::{NodeLocation, ParseError, StatementSpan, SyntaxTree, mini::MiniRubyParser, segment, segment_all};

fn sources(text: &str) -> Vec<String> {
    segment_all(&MiniRubyParser, text)
        .expect("document should parse")
        .into_iter()
        .map(|span| span.source)
        .collect()
}

/// Checks the invariants every segmentation must satisfy.
fn assert_well_formed(text: &str, spans: &[StatementSpan]) {
    let mut last_end = 0;
    for span in spans {
        assert!(span.start >= last_end, "span {span:?} overlaps the previous one");
        assert_eq!(span.end - span.start, span.length);
        assert_eq!(span.source, &text[span.start..span.end]);
        last_end = span.end;
    }
}

// ============================================================================
// Documents
// ============================================================================

#[test]
fn one_statement_per_line() {
    let spans = segment_all(&MiniRubyParser, "a = 1\nb = 2").unwrap();
    assert_eq!(
        spans,
        vec![
            StatementSpan {
                start: 0,
                end: 5,
                length: 5,
                source: "a = 1".to_owned(),
            },
            StatementSpan {
                start: 6,
                end: 11,
                length: 5,
                source: "b = 2".to_owned(),
            },
        ]
    );
}

#[test]
fn multi_line_statements_are_one_span() {
    let text = "\
def greet(name)
  \"Hello, #{name}!\"
end

[1, 2, 3].each do |n|
  puts n
end
greet('you')
";
    let spans = segment_all(&MiniRubyParser, text).unwrap();
    assert_well_formed(text, &spans);
    assert_eq!(spans.len(), 3);
    assert!(spans[0].source.starts_with("def greet"));
    assert!(spans[0].source.ends_with("end"));
    assert!(spans[1].source.starts_with("[1, 2, 3].each do"));
    assert_eq!(spans[2].source, "greet('you')");
}

#[test]
fn comments_and_blank_lines_are_not_statements() {
    let text = "# setup\n\nx = 1 # one\n\n# done\n";
    assert_eq!(sources(text), vec!["x = 1"]);
}

#[test]
fn semicolons_split_statements_and_empty_ones_are_skipped() {
    let text = "a = 1;; b = 2; ";
    let spans = segment_all(&MiniRubyParser, text).unwrap();
    assert_well_formed(text, &spans);
    assert_eq!(sources(text), vec!["a = 1", "b = 2"]);
}

#[test]
fn empty_document_has_no_statements() {
    assert_eq!(sources(""), Vec::<String>::new());
    assert_eq!(sources("  \n# nothing here\n"), Vec::<String>::new());
}

#[test]
fn offsets_are_bytes_of_the_original_text() {
    let text = "s = \"h\u{e9}llo\"\nputs s";
    let spans = segment_all(&MiniRubyParser, text).unwrap();
    assert_well_formed(text, &spans);
    assert_eq!(spans[0].length, 12);
    assert_eq!(spans[1].start, 13);
    assert_eq!(spans[1].source, "puts s");
}

#[test]
fn end_marker_ends_the_document() {
    assert_eq!(sources("__END__\nfoo"), Vec::<String>::new());
    assert_eq!(sources("a = 1\n__END__\nfoo\n) not ruby ("), vec!["a = 1"]);
}

#[test]
fn segmenting_twice_gives_identical_spans() {
    let text = "x = 10\nif x > 5\n  puts 'big'\nend\ny = [x, x * 2]\n";
    let first = segment_all(&MiniRubyParser, text).unwrap();
    let second = segment_all(&MiniRubyParser, text).unwrap();
    assert_eq!(first, second);
    assert_well_formed(text, &first);
}

#[test]
fn spans_are_yielded_lazily() {
    let text = "a = 1\nb = 2\nc = 3";
    let mut statements = segment(&MiniRubyParser, text).unwrap();
    assert_eq!(statements.next().unwrap().unwrap().source, "a = 1");
    let rest: Vec<String> = statements.map(|span| span.unwrap().source).collect();
    assert_eq!(rest, vec!["b = 2", "c = 3"]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn unterminated_block_is_a_parse_error() {
    let err = segment_all(&MiniRubyParser, "a = 1\ndef foo\n  1\n").unwrap_err();
    assert!(
        err.message.starts_with("unexpected end-of-input"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn errors_at_end_of_input_are_marked_incomplete() {
    for text in ["def foo\n", "x = [1,\n", "puts 'abc", "y = \"#{1 +"] {
        let err = segment_all(&MiniRubyParser, text).unwrap_err();
        assert!(err.incomplete, "{text:?} should wait for more input: {err}");
    }
    for text in ["end", "x = )", "\"#{1 +}\""] {
        let err = segment_all(&MiniRubyParser, text).unwrap_err();
        assert!(!err.incomplete, "{text:?} can never become valid: {err}");
    }
}

#[test]
fn deeply_nested_brackets_are_a_parse_error() {
    let text = format!("x = {}1{}", "[".repeat(20_000), "]".repeat(20_000));
    let err = segment_all(&MiniRubyParser, &text).unwrap_err();
    assert_eq!(err.message, "nesting too deep");
    assert!(!err.incomplete);
}

#[test]
fn deeply_nested_blocks_are_a_parse_error() {
    let text = format!("{}1\n{}", "if true\n".repeat(5_000), "end\n".repeat(5_000));
    let err = segment_all(&MiniRubyParser, &text).unwrap_err();
    assert_eq!(err.message, "nesting too deep");
}

#[test]
fn parse_error_produces_no_partial_segmentation() {
    assert!(segment(&MiniRubyParser, "a = 1\nb = (2 +\n").is_err());
}

#[test]
fn parse_error_display_includes_source_name_and_offset() {
    let err = ParseError::new("unexpected 'end'", Some(7)).with_source_name("script.rb");
    assert_eq!(err.to_string(), "script.rb:7: unexpected 'end'");
    let err = ParseError::new("empty", None);
    assert_eq!(err.to_string(), "<document>: empty");
}

// ============================================================================
// Custom parsers
// ============================================================================

#[test]
fn closure_parsers_drive_the_segmenter() {
    let parser = |_: &str| -> Result<SyntaxTree, ParseError> {
        Ok(SyntaxTree::new(vec![
            Some(NodeLocation::new(0, 3)),
            None,
            Some(NodeLocation::new(4, 3)),
        ]))
    };
    let spans = segment_all(&parser, "foo;bar").unwrap();
    let sources: Vec<&str> = spans.iter().map(|span| span.source.as_str()).collect();
    assert_eq!(sources, vec!["foo", "bar"]);
}

#[test]
fn parser_errors_propagate_unchanged() {
    let parser = |_: &str| -> Result<SyntaxTree, ParseError> { Err(ParseError::new("nope", Some(2))) };
    assert_eq!(segment_all(&parser, "xyz").unwrap_err(), ParseError::new("nope", Some(2)));
}

#[test]
fn out_of_range_locations_are_errors_not_panics() {
    let parser = |_: &str| -> Result<SyntaxTree, ParseError> {
        Ok(SyntaxTree::new(vec![
            Some(NodeLocation::new(0, 2)),
            Some(NodeLocation::new(3, 50)),
            Some(NodeLocation::new(0, 1)),
        ]))
    };
    let mut statements = segment(&parser, "ab cd").unwrap();
    assert_eq!(statements.next().unwrap().unwrap().source, "ab");
    let err = statements.next().unwrap().unwrap_err();
    assert_eq!(err.offset, Some(3));
    assert!(statements.next().is_none(), "iteration stops after a bad location");
}

#[test]
fn locations_splitting_a_character_are_errors() {
    let parser = |_: &str| -> Result<SyntaxTree, ParseError> { Ok(SyntaxTree::new(vec![Some(NodeLocation::new(0, 1))])) };
    assert!(segment_all(&parser, "\u{e9}").is_err());
}
