//! Static city-name resolver.
//!
//! The full fuzzy lookup is an external concern; the bot only needs a
//! deterministic map from what users type (Cyrillic names, latin slugs,
//! common prefixes) to the canonical slug the adapters understand.

const CITIES: &[(&str, &str)] = &[
    ("барановичи", "baranovichi"),
    ("минск", "minsk"),
    ("брест", "brest"),
    ("витебск", "vitebsk"),
    ("гомель", "gomel"),
    ("гродно", "grodno"),
    ("могилёв", "mogilev"),
    ("могилев", "mogilev"),
    ("бобруйск", "bobruisk"),
    ("пинск", "pinsk"),
    ("орша", "orsha"),
    ("мозырь", "mozyr"),
    ("лида", "lida"),
    ("борисов", "borisov"),
    ("солигорск", "soligorsk"),
    ("молодечно", "molodechno"),
    ("полоцк", "polotsk"),
    ("новополоцк", "novopolotsk"),
];

/// Resolve free-form user input to a canonical city slug.
///
/// Exact matches (Cyrillic name or slug) win; otherwise an unambiguous
/// prefix of either form is accepted. Returns `None` when nothing matches
/// or the prefix is ambiguous.
#[must_use]
pub fn resolve_city(input: &str) -> Option<&'static str> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    for (name, slug) in CITIES {
        if needle == *name || needle == *slug {
            return Some(slug);
        }
    }

    let mut prefix_hits = CITIES
        .iter()
        .filter(|(name, slug)| name.starts_with(&needle) || slug.starts_with(&needle))
        .map(|(_, slug)| *slug);
    let first = prefix_hits.next()?;
    // An ambiguous prefix resolves to nothing rather than to a guess,
    // unless every hit is the same slug (Cyrillic spelling variants).
    if prefix_hits.all(|s| s == first) {
        Some(first)
    } else {
        None
    }
}

/// Slugs the resolver knows, for the city-selection keyboard.
#[must_use]
pub fn known_slugs() -> Vec<&'static str> {
    let mut slugs: Vec<&'static str> = CITIES.iter().map(|(_, slug)| *slug).collect();
    slugs.dedup();
    slugs
}
