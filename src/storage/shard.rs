//! Language shard selection
//!
//! Articles live in one table per supported language. Languages without a
//! dedicated table share the base `articles` table.

/// Table used for languages without a dedicated shard
pub const BASE_SHARD: &str = "articles";

/// Languages with a dedicated table, paired with the table name
const SHARDS: [(&str, &str); 15] = [
    ("en", "articles_en"),
    ("es", "articles_es"),
    ("fr", "articles_fr"),
    ("de", "articles_de"),
    ("it", "articles_it"),
    ("pt", "articles_pt"),
    ("nl", "articles_nl"),
    ("pl", "articles_pl"),
    ("ru", "articles_ru"),
    ("tr", "articles_tr"),
    ("ar", "articles_ar"),
    ("hi", "articles_hi"),
    ("ja", "articles_ja"),
    ("ko", "articles_ko"),
    ("zh", "articles_zh"),
];

/// Table identifier for `language_code`
///
/// Total: region subtags are ignored (`pt-BR` uses the `pt` shard) and
/// anything unknown maps to [`BASE_SHARD`]. The result is always one of a
/// fixed set of identifiers, so it is safe to splice into SQL.
pub fn shard_for(language_code: &str) -> &'static str {
    let primary = language_code
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    SHARDS
        .iter()
        .find(|(code, _)| *code == primary)
        .map(|(_, table)| *table)
        .unwrap_or(BASE_SHARD)
}

/// Every table name `shard_for` can return
pub fn all_shards() -> impl Iterator<Item = &'static str> {
    std::iter::once(BASE_SHARD).chain(SHARDS.iter().map(|(_, table)| *table))
}
