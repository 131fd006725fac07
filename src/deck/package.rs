//! `.apkg` writer
//!
//! An `.apkg` is a zip holding a legacy Anki collection (`collection.anki2`,
//! SQLite, schema version 11) and a `media` manifest. The collection is
//! written to a scratch directory, read back, and zipped in memory.

use super::builder::Deck;
use super::ids::field_checksum;
use crate::Result;
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the collection entry inside the package
pub const COLLECTION_ENTRY: &str = "collection.anki2";

/// Name of the media manifest entry inside the package
pub const MEDIA_ENTRY: &str = "media";

const FIELD_SEPARATOR: &str = "\x1f";

const NOTE_TYPE_CLOZE: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE col (
    id      integer primary key,
    crt     integer not null,
    mod     integer not null,
    scm     integer not null,
    ver     integer not null,
    dty     integer not null,
    usn     integer not null,
    ls      integer not null,
    conf    text not null,
    models  text not null,
    decks   text not null,
    dconf   text not null,
    tags    text not null
);
CREATE TABLE notes (
    id      integer primary key,
    guid    text not null,
    mid     integer not null,
    mod     integer not null,
    usn     integer not null,
    tags    text not null,
    flds    text not null,
    sfld    integer not null,
    csum    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE cards (
    id      integer primary key,
    nid     integer not null,
    did     integer not null,
    ord     integer not null,
    mod     integer not null,
    usn     integer not null,
    type    integer not null,
    queue   integer not null,
    due     integer not null,
    ivl     integer not null,
    factor  integer not null,
    reps    integer not null,
    lapses  integer not null,
    left    integer not null,
    odue    integer not null,
    odid    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE revlog (
    id      integer primary key,
    cid     integer not null,
    usn     integer not null,
    ease    integer not null,
    ivl     integer not null,
    lastIvl integer not null,
    factor  integer not null,
    time    integer not null,
    type    integer not null
);
CREATE TABLE graves (
    usn     integer not null,
    oid     integer not null,
    type    integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

/// Write `deck` as `.apkg` bytes. `timestamp_ms` seeds note/card ids and
/// modification times.
pub fn write_apkg(deck: &Deck, timestamp_ms: i64) -> Result<Vec<u8>> {
    let scratch = tempfile::tempdir()?;
    let db_path = scratch.path().join(COLLECTION_ENTRY);

    let conn = Connection::open(&db_path)?;
    write_collection(&conn, deck, timestamp_ms)?;
    conn.close().map_err(|(_, e)| e)?;

    let collection = std::fs::read(&db_path)?;
    debug!("Collection written: {} bytes", collection.len());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(COLLECTION_ENTRY, options)?;
    zip.write_all(&collection)?;

    zip.start_file(MEDIA_ENTRY, options)?;
    zip.write_all(b"{}")?;

    Ok(zip.finish()?.into_inner())
}

fn write_collection(conn: &Connection, deck: &Deck, timestamp_ms: i64) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let mod_secs = timestamp_ms / 1000;
    conn.execute(
        "INSERT INTO col VALUES (1, ?1, ?2, ?3, 11, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')",
        params![
            mod_secs,
            timestamp_ms,
            timestamp_ms,
            collection_conf(deck).to_string(),
            models_json(deck, mod_secs).to_string(),
            decks_json(deck, mod_secs).to_string(),
            deck_conf_json().to_string(),
        ],
    )?;

    // Ids count up from the timestamp, one per note and card.
    let mut next_id = timestamp_ms;
    let mut due = 0i64;
    for note in &deck.notes {
        let note_id = next_id;
        next_id += 1;

        let sort_field = note.fields.first().map(String::as_str).unwrap_or_default();
        conn.execute(
            "INSERT INTO notes VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
            params![
                note_id,
                note.guid,
                deck.model_id,
                mod_secs,
                note.fields.join(FIELD_SEPARATOR),
                sort_field,
                field_checksum(sort_field),
            ],
        )?;

        due += 1;
        for ord in &note.card_ords {
            conn.execute(
                "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, ?5, -1, 0, 0, ?6, 0, 0, 0, 0, 0, 0, 0, 0, '')",
                params![next_id, note_id, deck.deck_id, ord, mod_secs, due],
            )?;
            next_id += 1;
        }
    }

    Ok(())
}

fn collection_conf(deck: &Deck) -> Value {
    json!({
        "activeDecks": [deck.deck_id],
        "curDeck": deck.deck_id,
        "curModel": deck.model_id.to_string(),
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "nextPos": deck.notes.len() + 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true
    })
}

fn models_json(deck: &Deck, mod_secs: i64) -> Value {
    let spec = &deck.spec;
    let fields: Vec<Value> = spec
        .schema
        .names()
        .enumerate()
        .map(|(ord, name)| {
            json!({
                "name": name,
                "ord": ord,
                "font": "Arial",
                "size": 20,
                "media": [],
                "rtl": false,
                "sticky": false
            })
        })
        .collect();

    let model = json!({
        "id": deck.model_id,
        "name": spec.model_name,
        "type": NOTE_TYPE_CLOZE,
        "mod": mod_secs,
        "usn": -1,
        "sortf": 0,
        "did": deck.deck_id,
        "flds": fields,
        "tmpls": [{
            "name": "Cloze",
            "ord": 0,
            "qfmt": spec.question_template(),
            "afmt": spec.answer_template(),
            "bqfmt": "",
            "bafmt": "",
            "did": null
        }],
        "css": ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n.cloze {\n font-weight: bold;\n color: blue;\n}\n",
        "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
        "latexPost": "\\end{document}",
        "latexsvg": false,
        "req": [[0, "any", [0]]],
        "tags": [],
        "vers": []
    });

    let mut models = Map::new();
    models.insert(deck.model_id.to_string(), model);
    Value::Object(models)
}

fn deck_entry(id: i64, name: &str, mod_secs: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "mod": mod_secs,
        "usn": -1,
        "desc": "",
        "dyn": 0,
        "conf": 1,
        "collapsed": false,
        "extendNew": 10,
        "extendRev": 50,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "lrnToday": [0, 0],
        "timeToday": [0, 0]
    })
}

fn decks_json(deck: &Deck, mod_secs: i64) -> Value {
    let mut decks = Map::new();
    decks.insert("1".to_string(), deck_entry(1, "Default", 0));
    decks.insert(
        deck.deck_id.to_string(),
        deck_entry(deck.deck_id, &deck.spec.deck_name, mod_secs),
    );
    Value::Object(decks)
}

fn deck_conf_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "dyn": false,
            "maxTaken": 60,
            "timer": 0,
            "autoplay": true,
            "replayq": true,
            "new": {
                "bury": true,
                "delays": [1.0, 10.0],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1.0,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            },
            "lapse": {
                "delays": [10.0],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0.0
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardRecord, FieldSchema};
    use crate::deck::{DeckBuilder, DeckSpec};
    use std::io::Read;
    use zip::ZipArchive;

    fn sample_deck() -> Deck {
        let spec = DeckSpec::new("Geo", "Geo Cloze", FieldSchema::default()).unwrap();
        DeckBuilder::new(spec)
            .assemble(&[
                CardRecord::new([("body", "{{c1::Paris}} is in France"), ("more", "capital")]),
                CardRecord::new([("body", "{{c1::Rome}} and {{c2::Milan}}")]),
            ])
            .unwrap()
    }

    fn open_collection(bytes: &[u8]) -> (tempfile::TempDir, Connection) {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut media = String::new();
        archive
            .by_name(MEDIA_ENTRY)
            .unwrap()
            .read_to_string(&mut media)
            .unwrap();
        assert_eq!(media, "{}");

        let mut collection = Vec::new();
        archive
            .by_name(COLLECTION_ENTRY)
            .unwrap()
            .read_to_end(&mut collection)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.anki2");
        std::fs::write(&path, collection).unwrap();
        let conn = Connection::open(&path).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_package_contents() {
        let deck = sample_deck();
        let bytes = write_apkg(&deck, 1_700_000_000_000).unwrap();
        let (_dir, conn) = open_collection(&bytes);

        let notes: i64 = conn
            .query_row("SELECT count(*) FROM notes", [], |r| r.get(0))
            .unwrap();
        let cards: i64 = conn
            .query_row("SELECT count(*) FROM cards", [], |r| r.get(0))
            .unwrap();
        assert_eq!(notes, 2);
        assert_eq!(cards, 3);

        let flds: String = conn
            .query_row("SELECT flds FROM notes ORDER BY id LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(flds, "{{c1::Paris}} is in France\x1fcapital");

        let mid: i64 = conn
            .query_row("SELECT DISTINCT mid FROM notes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mid, deck.model_id);

        let did: i64 = conn
            .query_row("SELECT DISTINCT did FROM cards", [], |r| r.get(0))
            .unwrap();
        assert_eq!(did, deck.deck_id);
    }

    #[test]
    fn test_models_and_decks_json() {
        let deck = sample_deck();
        let bytes = write_apkg(&deck, 1_700_000_000_000).unwrap();
        let (_dir, conn) = open_collection(&bytes);

        let (models, decks): (String, String) = conn
            .query_row("SELECT models, decks FROM col", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();

        let models: Value = serde_json::from_str(&models).unwrap();
        let model = &models[deck.model_id.to_string()];
        assert_eq!(model["name"], "Geo Cloze");
        assert_eq!(model["type"], NOTE_TYPE_CLOZE);
        assert_eq!(model["flds"][0]["name"], "body");
        assert_eq!(model["flds"][1]["name"], "more");
        assert_eq!(model["tmpls"][0]["qfmt"], "{{cloze:body}}");

        let decks: Value = serde_json::from_str(&decks).unwrap();
        assert_eq!(decks[deck.deck_id.to_string()]["name"], "Geo");
        assert_eq!(decks["1"]["name"], "Default");
    }

    #[test]
    fn test_guids_stable_across_exports() {
        let deck = sample_deck();
        let guids = |bytes: Vec<u8>| {
            let (_dir, conn) = open_collection(&bytes);
            let mut stmt = conn.prepare("SELECT guid FROM notes ORDER BY id").unwrap();
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))
                .unwrap()
                .collect::<std::result::Result<Vec<_>, _>>()
                .unwrap();
            rows
        };

        let first = guids(write_apkg(&deck, 1_700_000_000_000).unwrap());
        let second = guids(write_apkg(&deck, 1_800_000_000_000).unwrap());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
