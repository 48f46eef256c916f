//! Address normalisation shared by the content hash, the near-duplicate
//! signature and brief-mode grouping.

/// City names recognised in free-text addresses, in both the Cyrillic form
/// portals print and the latin slug form filters use. Stripped from
/// addresses before hashing so "ул. Ленина 1, Барановичи" and "Ленина 1"
/// collide.
pub const RECOGNISED_CITIES: &[&str] = &[
    "барановичи",
    "минск",
    "брест",
    "витебск",
    "гомель",
    "гродно",
    "могилев",
    "могилёв",
    "бобруйск",
    "пинск",
    "орша",
    "мозырь",
    "лида",
    "борисов",
    "солигорск",
    "молодечно",
    "полоцк",
    "новополоцк",
    "baranovichi",
    "minsk",
    "brest",
    "vitebsk",
    "gomel",
    "grodno",
    "mogilev",
    "bobruisk",
    "pinsk",
    "orsha",
    "mozyr",
    "lida",
    "borisov",
    "soligorsk",
    "molodechno",
    "polotsk",
    "novopolotsk",
];

/// Pairs of (Cyrillic city name, canonical slug) used to derive the cache's
/// `city` index column from an address.
const CITY_SLUGS: &[(&str, &str)] = &[
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

/// Normalise a free-text address for cross-source comparison.
///
/// Lower-cases, strips any recognised city name, replaces punctuation with
/// spaces and collapses whitespace. The result is the grouping key for
/// brief mode and one input of the content hash.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    let mut addr = address.to_lowercase();
    for city in RECOGNISED_CITIES {
        if addr.contains(city) {
            addr = addr.replace(city, " ");
        }
    }
    let cleaned: String = addr
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort city slug for an address, used to populate the cache's
/// `(city, rooms, price)` index. Falls back to the provided default when no
/// recognised city appears in the text.
#[must_use]
pub fn city_from_address<'a>(address: &str, default_slug: &'a str) -> &'a str {
    let addr = address.to_lowercase();
    for (name, slug) in CITY_SLUGS {
        if addr.contains(name) || addr.contains(slug) {
            return slug;
        }
    }
    default_slug
}
