//! Integration tests for the Anki deck creator

use anki_deck_creator::cards::INSTRUCTION_HEADER;
use anki_deck_creator::deck::{COLLECTION_ENTRY, MEDIA_ENTRY};
use anki_deck_creator::history::PRESERVED_HEADER;
use anki_deck_creator::{
    Body, CardExtractor, CardRecord, DeckBuilder, DeckCreatorConfig, DeckCreatorError, DeckSpec,
    FieldSchema, HistoryReducer, Interceptor, Message, NullSink, PreservePatterns, RetentionUnit,
    Role,
};
use pretty_assertions::assert_eq;
use std::io::{Cursor, Read};
use tempfile::TempDir;

fn chapter_transcript() -> Vec<Message> {
    vec![
        Message::system("You are a tutor."),
        Message::user("A"),
        Message::assistant("B"),
        Message::user("Source: Ch5\nC"),
        Message::assistant("D"),
        Message::user("current question"),
    ]
}

/// Dropping everything but the anchors still carries the Source line
#[test]
fn test_reduce_keeps_source_line_with_zero_window() {
    let reducer = HistoryReducer::new(
        0,
        RetentionUnit::Messages,
        PreservePatterns::compile(["Source:.*"]).unwrap(),
    );

    let out = reducer.reduce(&chapter_transcript()).unwrap().messages;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].role, Role::System);
    assert_eq!(out[0].text(), "You are a tutor.");
    assert_eq!(out[1].role, Role::User);
    let current = out[1].text();
    assert!(current.contains("Source: Ch5"));
    assert!(current.contains(PRESERVED_HEADER));
    assert!(current.ends_with("current question"));
    for gone in ["B", "D"] {
        assert!(!current.contains(gone));
    }
}

/// One valid record plus one malformed entry
#[test]
fn test_extract_valid_and_malformed() {
    let extractor = CardExtractor::new(FieldSchema::default());
    let messages = vec![
        Message::user("make a card"),
        Message::assistant(
            "Here:\n<anki_cards>[{\"body\":\"X\",\"more\":\"Y\"}, {\"body\": [1, 2]}]</anki_cards>",
        ),
    ];

    let scan = extractor.extract(&messages);
    assert_eq!(scan.records, vec![CardRecord::new([("body", "X"), ("more", "Y")])]);
    assert_eq!(scan.malformed, 1);
}

/// Values survive extraction and note assembly unchanged
#[test]
fn test_extract_then_build_round_trip() {
    let schema = FieldSchema::from_description_json(
        r#"{"body": "cloze", "more": "context", "source": "where"}"#,
    )
    .unwrap();
    let extractor = CardExtractor::new(schema.clone());
    let messages = vec![Message::assistant(
        r#"<anki_cards>[
            {"body": "The {{c1::mitochondria}} is the powerhouse", "more": "of the cell", "source": "Bio 101"},
            {"body": "{{c1::H2O}} is water"}
        ]</anki_cards>"#,
    )];

    let scan = extractor.extract(&messages);
    let spec = DeckSpec::new("Bio", "Bio Cloze", schema.clone()).unwrap();
    let deck = DeckBuilder::new(spec).assemble(&scan.records).unwrap();

    assert_eq!(deck.notes.len(), scan.records.len());
    for (note, record) in deck.notes.iter().zip(&scan.records) {
        for name in schema.names() {
            assert_eq!(
                note.field(&schema, name).unwrap(),
                record.get(name).unwrap_or_default()
            );
        }
    }
}

#[test]
fn test_build_ids_are_deterministic() {
    let records = vec![CardRecord::new([("body", "{{c1::x}}")])];
    let make = || {
        let spec = DeckSpec::new("Same Deck", "Same Model", FieldSchema::default()).unwrap();
        DeckBuilder::new(spec).assemble(&records).unwrap()
    };

    let (a, b) = (make(), make());
    assert_eq!(a.deck_id, b.deck_id);
    assert_eq!(a.model_id, b.model_id);
    assert_eq!(a.notes[0].guid, b.notes[0].guid);
}

#[test]
fn test_build_empty_is_error() {
    let spec = DeckSpec::new("Deck", "Model", FieldSchema::default()).unwrap();
    let err = DeckBuilder::new(spec).build(&[]).unwrap_err();
    assert!(matches!(err, DeckCreatorError::EmptyDeck));
}

#[test]
fn test_build_produces_readable_package() {
    let spec = DeckSpec::new("Deck", "Model", FieldSchema::default()).unwrap();
    let bytes = DeckBuilder::new(spec)
        .build(&[CardRecord::new([("body", "{{c1::one}}"), ("more", "two")])])
        .unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut collection = Vec::new();
    archive
        .by_name(COLLECTION_ENTRY)
        .unwrap()
        .read_to_end(&mut collection)
        .unwrap();
    assert!(collection.starts_with(b"SQLite format 3\0"));
    assert!(archive.by_name(MEDIA_ENTRY).is_ok());
}

/// Full round: inlet, reply, outlet, next inlet, export
#[test]
fn test_conversation_lifecycle() {
    let config = DeckCreatorConfig::default()
        .with_keep_messages(2)
        .with_preserve_patterns(["^Topic:.*"]);
    let ic = Interceptor::new(config).unwrap();

    // Turn 1
    let mut transcript = vec![Message::user("Topic: Geography\nMake cards about France")];
    let request = ic.inlet(Body::new(transcript.clone()), &mut NullSink).unwrap();
    assert!(request.messages[0].text().contains(INSTRUCTION_HEADER));

    transcript.push(Message::assistant(
        r#"<anki_cards>[{"body":"{{c1::Paris}} is the capital","more":"France"}]</anki_cards>"#,
    ));
    let out = ic
        .outlet(Body::new(transcript.clone()), None, &mut NullSink)
        .unwrap();
    let first = out.tally.unwrap();
    assert_eq!((first.new, first.total), (1, 1));
    transcript = out.body.messages;

    // Turn 2
    transcript.push(Message::user("Now Italy"));
    transcript.push(Message::assistant(
        r#"<anki_cards>[{"body":"{{c1::Rome}}"},{"body":"{{c1::Milan}} fashion"}]</anki_cards>"#,
    ));
    let out = ic
        .outlet(Body::new(transcript.clone()), Some(first.total), &mut NullSink)
        .unwrap();
    let second = out.tally.unwrap();
    assert_eq!((second.new, second.total), (2, 3));
    transcript = out.body.messages;

    // Turn 3 inlet: window of two drops the first exchange
    transcript.push(Message::user("And Spain?"));
    let request = ic.inlet(Body::new(transcript.clone()), &mut NullSink).unwrap();
    let texts: Vec<String> = request.messages.iter().map(|m| m.text()).collect();
    assert_eq!(request.messages.len(), 4);
    assert!(texts[1].starts_with(PRESERVED_HEADER));
    assert!(texts[1].contains("Topic: Geography"));
    assert!(!texts.iter().any(|t| t.contains("ANKI_INFO_START")));
    assert!(!texts.iter().any(|t| t.contains("Paris")));

    // Export sees every card, including ones trimmed from the prompt
    let exported = ic.export(&Body::new(transcript), &mut NullSink).unwrap();
    assert_eq!(exported.note_count, 3);
    assert_eq!(exported.file_name, "LLM_Generated_Cards.apkg");
}

#[tokio::test]
async fn test_config_file_drives_interceptor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    tokio::fs::write(
        &path,
        r#"
deck_name = "Chem"
keep_messages = 0
preserve_patterns = ["^Ref:"]
fields_description = '{"front": "cloze text", "notes": "extra"}'
"#,
    )
    .await
    .unwrap();

    let config = DeckCreatorConfig::load(&path).await.unwrap();
    let ic = Interceptor::new(config).unwrap();

    let body = Body::new(vec![
        Message::user("Ref: p.12\nexplain"),
        Message::assistant(r#"<anki_cards>[{"front":"{{c1::NaCl}} is salt","notes":"ionic"}]</anki_cards>"#),
        Message::user("thanks"),
    ]);

    let request = ic.inlet(body.clone(), &mut NullSink).unwrap();
    assert_eq!(request.messages.len(), 2);
    assert!(request.messages[0].text().contains("- **front**: cloze text"));
    assert!(request.messages[1].text().contains("Ref: p.12"));

    let exported = ic.export(&body, &mut NullSink).unwrap();
    assert_eq!(exported.file_name, "Chem.apkg");
    assert_eq!(exported.note_count, 1);
}

#[test]
fn test_invalid_config_rejected_up_front() {
    let config = DeckCreatorConfig::default().with_preserve_patterns(["(broken"]);
    assert!(matches!(
        Interceptor::new(config).unwrap_err(),
        DeckCreatorError::Configuration(_)
    ));

    let config = DeckCreatorConfig::default().with_fields_description("[]");
    assert!(matches!(
        Interceptor::new(config).unwrap_err(),
        DeckCreatorError::Configuration(_)
    ));
}

/// A card repeated in a later reply becomes one note in the package
#[test]
fn test_export_merges_repeated_cards() {
    let ic = Interceptor::new(DeckCreatorConfig::default()).unwrap();
    let card = r#"<anki_cards>[{"body":"{{c1::Oslo}} is the capital of Norway"}]</anki_cards>"#;
    let body = Body::new(vec![
        Message::user("cards on Norway"),
        Message::assistant(card),
        Message::user("again please"),
        Message::assistant(card),
    ]);

    let exported = ic.export(&body, &mut NullSink).unwrap();
    assert_eq!(exported.note_count, 1);
    assert_eq!(exported.duplicates, 1);
}

/// Host bodies with image parts and tool-call messages go through both hooks
#[test]
fn test_hooks_on_list_content_and_null_content() {
    let config = DeckCreatorConfig::default()
        .with_keep_messages(2)
        .with_preserve_patterns(["^Source:"]);
    let ic = Interceptor::new(config).unwrap();
    let body: Body = serde_json::from_str(
        r#"{"model": "m", "messages": [
            {"role": "user", "content": [
                {"type": "text", "text": "Source: Field guide\nwhich bird is this?"},
                {"type": "image_url", "image_url": {"url": "https://example.org/bird.png"}}
            ]},
            {"role": "assistant", "content": null, "tool_calls": [{"id": "c1"}]},
            {"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": "https://example.org/egg.png"}},
                {"type": "text", "text": "and this egg?"}
            ]},
            {"role": "assistant", "content": "a robin egg"},
            {"role": "user", "content": "make cards"}
        ]}"#,
    )
    .unwrap();

    let request = ic.inlet(body, &mut NullSink).unwrap();
    let json = serde_json::to_value(&request).unwrap();
    let kept = &json["messages"][1]["content"];
    assert_eq!(kept[0]["type"], "text");
    assert!(kept[0]["text"].as_str().unwrap().contains("Source: Field guide"));
    assert_eq!(kept[1]["image_url"]["url"], "https://example.org/egg.png");
    assert_eq!(kept[2]["text"], "and this egg?");
    assert_eq!(json["model"], "m");

    let mut transcript = request.messages;
    transcript.push(Message::assistant(
        r#"<anki_cards>[{"body":"A {{c1::robin}} lays blue eggs"}]</anki_cards>"#,
    ));
    let out = ic.outlet(Body::new(transcript), None, &mut NullSink).unwrap();
    assert_eq!(out.tally.unwrap().new, 1);
}
