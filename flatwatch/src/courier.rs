//! Production [`Courier`]: renders survivors and pushes them through the
//! rate-limited messenger.

use std::sync::Arc;

use async_trait::async_trait;

use flatwatch_core::score::BuildingGroup;
use flatwatch_core::storage::ShortLinkStore;
use flatwatch_types::Listing;

use crate::callbacks;
use crate::delivery::{Keyboard, Messenger, SendOutcome};
use crate::dispatcher::Courier;
use crate::render;

/// Telegram photo captions are shorter than messages.
const MAX_CAPTION_LEN: usize = 1024;

/// Renders listings and summaries, stores callback payloads, and sends.
pub struct ListingCourier {
    messenger: Arc<Messenger>,
    links: Arc<dyn ShortLinkStore>,
    max_photos: usize,
}

impl ListingCourier {
    /// Build the courier.
    #[must_use]
    pub fn new(
        messenger: Arc<Messenger>,
        links: Arc<dyn ShortLinkStore>,
        max_photos: usize,
    ) -> Self {
        Self {
            messenger,
            links,
            max_photos,
        }
    }

    async fn listing_buttons(&self, listing: &Listing) -> Option<Keyboard> {
        let code = callbacks::encode_payload(self.links.as_ref(), &listing.url)
            .await
            .ok()?;
        Some(vec![vec![
            ("🔗 Открыть".to_string(), format!("open_ad:{code}")),
            ("🔕 Скрыть".to_string(), format!("mute_ad:{code}")),
        ]])
    }
}

#[async_trait]
impl Courier for ListingCourier {
    async fn deliver_listing(&self, chat_id: i64, listing: &Listing) -> SendOutcome {
        let text = render::format_listing(listing);

        if listing.photos.is_empty() {
            let buttons = self.listing_buttons(listing).await;
            return self.messenger.send_text(chat_id, &text, buttons).await;
        }

        let photos: Vec<String> = listing
            .photos
            .iter()
            .take(self.max_photos)
            .cloned()
            .collect();
        let caption = if text.chars().count() > MAX_CAPTION_LEN {
            let mut short: String = text.chars().take(MAX_CAPTION_LEN - 1).collect();
            short.push('…');
            short
        } else {
            text
        };
        self.messenger
            .send_media_group(chat_id, &photos, &caption)
            .await
    }

    async fn deliver_summary(&self, chat_id: i64, groups: &[BuildingGroup]) -> SendOutcome {
        let text = render::format_summary(groups);

        let mut keyboard: Keyboard = Vec::with_capacity(groups.len());
        for group in groups {
            match callbacks::encode_payload(self.links.as_ref(), &format!("house:{}", group.key))
                .await
            {
                Ok(code) => {
                    let label = format!(
                        "🏠 {} ({})",
                        truncate(&group.address, 24),
                        group.listings.len()
                    );
                    keyboard.push(vec![(label, format!("show_house|{code}|0"))]);
                }
                Err(e) => {
                    // The summary still goes out, just without this button.
                    tracing::warn!(error = %e, "short-link write failed for group button");
                }
            }
        }

        let buttons = (!keyboard.is_empty()).then_some(keyboard);
        self.messenger.send_text(chat_id, &text, buttons).await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars - 1).collect();
        out.push('…');
        out
    }
}
