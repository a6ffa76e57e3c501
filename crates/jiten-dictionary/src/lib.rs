pub mod database;
mod draw;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod types;
mod worker;

pub use self::database::{
    DatabaseUpdateItem, DeleteDictionaryProgress, DeleteProgressFn, DictionaryCounts,
    DictionaryDatabase, StoreCounts,
};
pub use self::error::DictionaryError;
pub use self::protocol::{DecodedImage, DrawMediaRequest, DrawReply, WorkerRequest};
pub use self::types::{
    DictionaryRecord, DictionarySet, DictionarySummary, DrawMedia, KanjiEntry, KanjiMetaEntry,
    KanjiMetaRecord, KanjiRecord, MatchSource, MatchType, Media, MediaRecord, MediaRequest, Tag,
    TagMetaRequest, TermEntry, TermExactRequest, TermMetaEntry, TermMetaMode, TermMetaRecord,
    TermRecord, TermSequenceRequest,
};

#[cfg(test)]
mod tests;
