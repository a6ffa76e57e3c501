use jiten_store::{SchemaUpgrade, StoreDefinition};

/// Current on-disk version; the target of [`SCHEMA`]'s additive history.
pub const DATABASE_VERSION: u64 = 60;

/// Object store names.
pub mod stores {
    pub const TERMS: &str = "terms";
    pub const KANJI: &str = "kanji";
    pub const TERM_META: &str = "termMeta";
    pub const KANJI_META: &str = "kanjiMeta";
    pub const TAG_META: &str = "tagMeta";
    pub const DICTIONARIES: &str = "dictionaries";
    pub const MEDIA: &str = "media";
}

/// The full additive upgrade history. Every entry only ever adds stores or
/// indices; reapplying on an already-current database is a no-op.
pub const SCHEMA: &[SchemaUpgrade] = &[
    SchemaUpgrade {
        version: 20,
        stores: &[
            StoreDefinition {
                name: stores::TERMS,
                indices: &["dictionary", "expression", "reading"],
            },
            StoreDefinition {
                name: stores::KANJI,
                indices: &["dictionary", "character"],
            },
            StoreDefinition {
                name: stores::TAG_META,
                indices: &["dictionary"],
            },
            StoreDefinition {
                name: stores::DICTIONARIES,
                indices: &["title", "version"],
            },
        ],
    },
    SchemaUpgrade {
        version: 30,
        stores: &[
            StoreDefinition {
                name: stores::TERM_META,
                indices: &["dictionary", "expression"],
            },
            StoreDefinition {
                name: stores::KANJI_META,
                indices: &["dictionary", "character"],
            },
            StoreDefinition {
                name: stores::TAG_META,
                indices: &["dictionary", "name"],
            },
        ],
    },
    SchemaUpgrade {
        version: 40,
        stores: &[StoreDefinition {
            name: stores::TERMS,
            indices: &["dictionary", "expression", "reading", "sequence"],
        }],
    },
    SchemaUpgrade {
        version: 50,
        stores: &[StoreDefinition {
            name: stores::TERMS,
            indices: &[
                "dictionary",
                "expression",
                "reading",
                "sequence",
                "expressionReverse",
                "readingReverse",
            ],
        }],
    },
    SchemaUpgrade {
        version: 60,
        stores: &[StoreDefinition {
            name: stores::MEDIA,
            indices: &["dictionary", "path"],
        }],
    },
];
