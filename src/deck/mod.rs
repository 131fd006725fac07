//! Deck assembly and `.apkg` packaging

mod builder;
mod ids;
mod package;

pub use builder::{Deck, DeckBuilder, DeckSpec, Note};
pub use ids::{field_checksum, note_guid, stable_id};
pub use package::{write_apkg, COLLECTION_ENTRY, MEDIA_ENTRY};
