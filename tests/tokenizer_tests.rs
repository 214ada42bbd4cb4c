use streamdecode::tokenizer::{Tokenizer, MIN_BUFFER_SIZE};
use streamdecode::{StreamError, Token, TokenKind};

fn tokenize(input: &str) -> Result<Vec<Token>, StreamError> {
    Tokenizer::new(input.as_bytes()).collect()
}

fn first_error(input: &[u8]) -> StreamError {
    Tokenizer::with_buffer_size(input, MIN_BUFFER_SIZE)
        .find_map(Result::err)
        .expect("input should fail to tokenize")
}

#[test]
fn test_object_keys_are_classified() {
    let tokens = tokenize(r#"{"a": "b", "c": ["d"]}"#).unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::ObjectStart,
            Token::Key("a".into()),
            Token::String("b".into()),
            Token::Key("c".into()),
            Token::ArrayStart,
            Token::String("d".into()),
            Token::ArrayEnd,
            Token::ObjectEnd,
        ]
    );
}

#[test]
fn test_scalars_and_literals() {
    let tokens = tokenize(" [true, false, null, -0.5e+3, 0, \"\"] ").unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::ArrayStart,
            Token::Bool(true),
            Token::Bool(false),
            Token::Null,
            Token::Number("-0.5e+3".into()),
            Token::Number("0".into()),
            Token::String(String::new()),
            Token::ArrayEnd,
        ]
    );
}

#[test]
fn test_numbers_keep_their_source_text() {
    let tokens = tokenize("[12345678901234567890, 1.0000000000000002, 1E400]").unwrap();
    assert_eq!(tokens[1], Token::Number("12345678901234567890".into()));
    assert_eq!(tokens[2], Token::Number("1.0000000000000002".into()));
    assert_eq!(tokens[3], Token::Number("1E400".into()));
}

#[test]
fn test_root_scalar_then_end_of_stream() {
    let mut t = Tokenizer::new(&b"  42  "[..]);
    assert_eq!(t.next_token().unwrap(), Token::Number("42".into()));
    assert_eq!(t.next_token().unwrap(), Token::EndOfStream);
    assert_eq!(t.peek_kind().unwrap(), TokenKind::EndOfStream);
}

#[test]
fn test_escapes_and_surrogate_pairs() {
    let tokens = tokenize(r#"["a\"b\\c\/d\b\f\n\r\t", "é😀"]"#).unwrap();
    assert_eq!(tokens[1], Token::String("a\"b\\c/d\u{8}\u{c}\n\r\t".into()));
    assert_eq!(tokens[2], Token::String("\u{e9}\u{1f600}".into()));
}

#[test]
fn test_tokens_split_across_small_buffers() {
    let input = r#"{"long key that spans buffers": "value é that spans buffers", "n": -123.456e-7}"#;
    let small: Result<Vec<_>, _> = Tokenizer::with_buffer_size(input.as_bytes(), MIN_BUFFER_SIZE).collect();
    assert_eq!(small.unwrap(), tokenize(input).unwrap());
}

#[test]
fn test_empty_document_is_a_lex_error() {
    assert!(matches!(first_error(b"   "), StreamError::Lex { offset: 3, .. }));
}

#[test]
fn test_trailing_garbage_is_a_lex_error() {
    assert!(matches!(first_error(b"{} x"), StreamError::Lex { offset: 3, .. }));
    assert!(matches!(first_error(b"]"), StreamError::Lex { offset: 0, .. }));
}

#[test]
fn test_grammar_violations_are_structural() {
    // missing colon
    assert!(matches!(first_error(br#"{"a" 1}"#), StreamError::Structural { offset: 5, .. }));
    // missing comma
    assert!(matches!(first_error(b"[1 2]"), StreamError::Structural { offset: 3, .. }));
    // trailing comma
    assert!(matches!(first_error(b"[1,]"), StreamError::Structural { offset: 3, .. }));
    assert!(matches!(first_error(br#"{"a":1,}"#), StreamError::Structural { offset: 7, .. }));
    // closer of the wrong kind
    assert!(matches!(first_error(b"[1}"), StreamError::Structural { offset: 2, .. }));
    // unterminated container
    assert!(matches!(first_error(b"[1, [2"), StreamError::Structural { offset: 6, .. }));
}

#[test]
fn test_number_grammar() {
    assert!(matches!(first_error(b"[01]"), StreamError::Lex { offset: 2, .. }));
    assert!(matches!(first_error(b"[1.]"), StreamError::Lex { offset: 3, .. }));
    assert!(matches!(first_error(b"[-]"), StreamError::Lex { offset: 2, .. }));
    assert!(matches!(first_error(b"[+1]"), StreamError::Lex { offset: 1, .. }));
    // incomplete at end of stream
    assert!(matches!(first_error(b"1e"), StreamError::Lex { offset: 2, .. }));
    assert!(matches!(first_error(b"1e+"), StreamError::Lex { offset: 3, .. }));
    assert!(matches!(first_error(b"-"), StreamError::Lex { offset: 1, .. }));
}

#[test]
fn test_string_faults_report_backslash_offset() {
    assert!(matches!(first_error(br#"["ab\x"]"#), StreamError::Lex { offset: 4, .. }));
    assert!(matches!(first_error(br#"["\u12G4"]"#), StreamError::Lex { offset: 2, .. }));
    // lone low surrogate
    assert!(matches!(first_error(br#"["\udc00"]"#), StreamError::Lex { offset: 2, .. }));
    // high surrogate without a partner
    assert!(matches!(first_error(br#"["x\ud800y"]"#), StreamError::Lex { offset: 3, .. }));
}

#[test]
fn test_raw_control_character_in_string() {
    assert!(matches!(first_error(b"[\"a\nb\"]"), StreamError::Lex { offset: 3, .. }));
}

#[test]
fn test_bad_literal_reports_its_start() {
    assert!(matches!(first_error(b"[1, nul]"), StreamError::Lex { offset: 4, .. }));
    assert!(matches!(first_error(b"[tru"), StreamError::Lex { offset: 1, .. }));
}

#[test]
fn test_non_ascii_outside_string() {
    assert!(matches!(first_error("[1, \u{e9}]".as_bytes()), StreamError::Lex { offset: 4, .. }));
}

#[test]
fn test_skip_value_does_not_return_payloads() {
    let mut t = Tokenizer::new(&br#"["skip me", {"k": [1, 2, {"z": "deep"}]}, 7]"#[..]);
    assert_eq!(t.next_token().unwrap(), Token::ArrayStart);
    t.skip_value().unwrap();
    t.skip_value().unwrap();
    assert_eq!(t.next_token().unwrap(), Token::Number("7".into()));
    assert_eq!(t.next_token().unwrap(), Token::ArrayEnd);
    assert_eq!(t.next_token().unwrap(), Token::EndOfStream);
}

#[test]
fn test_skip_value_validates_what_it_skips() {
    let mut t = Tokenizer::new(&br#"[{"a": [1, 2}], 3]"#[..]);
    t.next_token().unwrap();
    assert!(matches!(t.skip_value(), Err(StreamError::Structural { offset: 12, .. })));
}

#[test]
fn test_iterator_stops_after_first_error() {
    let mut t = Tokenizer::new(&b"[1, x, 2]"[..]);
    assert!(matches!(t.next(), Some(Ok(Token::ArrayStart))));
    assert!(matches!(t.next(), Some(Ok(Token::Number(_)))));
    assert!(matches!(t.next(), Some(Err(StreamError::Lex { offset: 4, .. }))));
    assert!(t.next().is_none());
}
