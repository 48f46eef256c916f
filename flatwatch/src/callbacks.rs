//! Callback-data codec.
//!
//! Inline-button payloads are capped at 64 bytes by the platform, so
//! anything potentially longer (building addresses, portal URLs) is stored
//! server-side and referenced by a 12-hex code. Decoding is an explicit
//! allow-list; unknown actions fall through to `None`.

use flatwatch_core::storage::ShortLinkStore;
use flatwatch_core::short_code;
use flatwatch_types::FlatwatchError;

/// Parsed inline-button action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// One-shot filter field update: `filters:<uid>:<field>:<value>`.
    FilterSet {
        /// Subscriber the update belongs to.
        uid: i64,
        /// Field name (allow-listed by the handler).
        field: String,
        /// New raw value.
        value: String,
    },
    /// Expand a building group: `show_house|<code>|<offset>`.
    ShowHouse {
        /// Short-link code of the group key.
        code: String,
        /// Pagination offset into the group.
        offset: usize,
    },
    /// Resolve a stored ad URL and reply: `open_ad:<code>`.
    OpenAd {
        /// Short-link code of the URL.
        code: String,
    },
    /// Future persistence stub: `save_ad:<code>`.
    SaveAd {
        /// Short-link code of the ad.
        code: String,
    },
    /// Future persistence stub: `mute_ad:<code>`.
    MuteAd {
        /// Short-link code of the ad.
        code: String,
    },
    /// City disambiguation pick: `select_city|<code>`.
    SelectCity {
        /// Short-link code of the slug (slugs are short; kept uniform).
        code: String,
    },
    /// Menu action: run a check for this subscriber now.
    CheckNow,
    /// Menu action: show the current filter.
    ShowFilters,
    /// Menu action: show statistics.
    ShowStats,
    /// Menu action: switch delivery mode.
    SetMode {
        /// "brief" or "full".
        mode: String,
    },
}

/// Decode a callback payload against the allow-list.
#[must_use]
pub fn parse(data: &str) -> Option<CallbackAction> {
    match data {
        "check_now" => return Some(CallbackAction::CheckNow),
        "show_filters" => return Some(CallbackAction::ShowFilters),
        "show_stats" => return Some(CallbackAction::ShowStats),
        _ => {}
    }

    if let Some(rest) = data.strip_prefix("filters:") {
        let mut parts = rest.splitn(3, ':');
        let uid = parts.next()?.parse().ok()?;
        let field = parts.next()?.to_string();
        let value = parts.next()?.to_string();
        return Some(CallbackAction::FilterSet { uid, field, value });
    }
    if let Some(rest) = data.strip_prefix("show_house|") {
        let mut parts = rest.splitn(2, '|');
        let code = parts.next()?.to_string();
        let offset = parts.next().unwrap_or("0").parse().ok()?;
        return Some(CallbackAction::ShowHouse { code, offset });
    }
    if let Some(code) = data.strip_prefix("open_ad:") {
        return Some(CallbackAction::OpenAd { code: code.to_string() });
    }
    if let Some(code) = data.strip_prefix("save_ad:") {
        return Some(CallbackAction::SaveAd { code: code.to_string() });
    }
    if let Some(code) = data.strip_prefix("mute_ad:") {
        return Some(CallbackAction::MuteAd { code: code.to_string() });
    }
    if let Some(code) = data.strip_prefix("select_city|") {
        return Some(CallbackAction::SelectCity { code: code.to_string() });
    }
    if let Some(mode) = data.strip_prefix("set_mode:") {
        if mode == "brief" || mode == "full" {
            return Some(CallbackAction::SetMode { mode: mode.to_string() });
        }
    }
    None
}

/// Store a payload and return its stable 12-hex code for button data.
///
/// # Errors
/// Returns `Store` when the short-link write fails.
pub async fn encode_payload(
    links: &dyn ShortLinkStore,
    payload: &str,
) -> Result<String, FlatwatchError> {
    let code = short_code(payload);
    links.save_link(&code, payload).await?;
    Ok(code)
}

/// Resolve a code back into its payload.
///
/// # Errors
/// Returns `NotFound` for unknown codes, `Store` on query failure.
pub async fn decode_payload(
    links: &dyn ShortLinkStore,
    code: &str,
) -> Result<String, FlatwatchError> {
    links
        .resolve_link(code)
        .await?
        .ok_or_else(|| FlatwatchError::not_found(format!("short link {code}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_actions_parse() {
        assert_eq!(
            parse("filters:42:max_price:60000"),
            Some(CallbackAction::FilterSet {
                uid: 42,
                field: "max_price".into(),
                value: "60000".into()
            })
        );
        assert_eq!(
            parse("show_house|a1b2c3d4e5f6|5"),
            Some(CallbackAction::ShowHouse {
                code: "a1b2c3d4e5f6".into(),
                offset: 5
            })
        );
        assert_eq!(
            parse("open_ad:deadbeef0123"),
            Some(CallbackAction::OpenAd {
                code: "deadbeef0123".into()
            })
        );
        assert_eq!(parse("check_now"), Some(CallbackAction::CheckNow));
    }

    #[test]
    fn junk_is_rejected() {
        assert_eq!(parse("filters:notanumber:x:y"), None);
        assert_eq!(parse("drop_table:users"), None);
        assert_eq!(parse("set_mode:loud"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn codes_fit_the_platform_cap() {
        let code = short_code("house:улица ленина 1, барановичи:offset=0");
        assert_eq!(code.len(), 12);
        let data = format!("show_house|{code}|0");
        assert!(data.len() <= 64);
    }
}
