//! Minimal validation every adapter-produced listing must pass before it
//! enters the pipeline.

use flatwatch_types::Listing;

/// The fields a record must carry to be worth keeping. Everything else on
/// a [`Listing`] is optional garnish.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDto<'a> {
    /// Listing title.
    pub title: &'a str,
    /// Price in the primary currency; zero means "negotiable" and is kept.
    pub price: i64,
    /// Listing URL; must be http(s).
    pub url: &'a str,
    /// Address or location text (may be empty).
    pub location: &'a str,
    /// Adapter tag.
    pub source: &'a str,
}

impl<'a> ListingDto<'a> {
    /// Check the record against the drop rules.
    ///
    /// # Errors
    /// Returns a short reason when the record must be dropped: empty title,
    /// empty or non-http url, empty source, or negative price.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("empty title");
        }
        if self.source.trim().is_empty() {
            return Err("empty source");
        }
        if self.url.trim().is_empty() || !self.url.starts_with("http") {
            return Err("missing or non-http url");
        }
        if self.price < 0 {
            return Err("negative price");
        }
        Ok(())
    }
}

/// Validate a fully-built listing; logs and returns `false` when it must
/// be dropped.
#[must_use]
pub fn accept(listing: &Listing) -> bool {
    let dto = ListingDto {
        title: &listing.title,
        price: listing.price,
        url: &listing.url,
        location: &listing.address,
        source: &listing.source,
    };
    match dto.validate() {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(source = %listing.source, id = %listing.id, reason, "listing failed validation");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto() -> ListingDto<'static> {
        ListingDto {
            title: "2-комн., 45 м²",
            price: 50_000,
            url: "https://re.kufar.by/item/1",
            location: "Барановичи",
            source: "kufar",
        }
    }

    #[test]
    fn valid_record_passes() {
        assert!(dto().validate().is_ok());
    }

    #[test]
    fn zero_price_is_kept() {
        let d = ListingDto { price: 0, ..dto() };
        assert!(d.validate().is_ok());
    }

    #[test]
    fn negative_price_is_dropped() {
        let d = ListingDto { price: -1, ..dto() };
        assert_eq!(d.validate(), Err("negative price"));
    }

    #[test]
    fn non_http_url_is_dropped() {
        let d = ListingDto { url: "ftp://x", ..dto() };
        assert!(d.validate().is_err());
        let d = ListingDto { url: "", ..dto() };
        assert!(d.validate().is_err());
    }

    #[test]
    fn empty_title_is_dropped() {
        let d = ListingDto { title: "  ", ..dto() };
        assert_eq!(d.validate(), Err("empty title"));
    }
}
