//! flatwatch-sources
//!
//! The unified HTTP client and one adapter per supported portal. Every
//! adapter implements [`flatwatch_core::source::ListingSource`] and emits
//! canonical [`flatwatch_types::Listing`] records that already passed the
//! minimal DTO validation; nothing here persists anything.
#![warn(missing_docs)]

pub mod dto;
pub mod http;
pub mod util;

mod domovita;
mod etagi;
mod gohome;
mod kufar;
mod onliner;
mod realt;

pub use domovita::DomovitaSource;
pub use etagi::EtagiSource;
pub use gohome::GohomeSource;
pub use http::{HttpClient, HttpClientConfig};
pub use kufar::KufarSource;
pub use onliner::OnlinerSource;
pub use realt::RealtSource;

use std::sync::Arc;

use flatwatch_core::source::{DeliveredProbe, ListingSource};

/// Names of every adapter this crate ships, in default fan-out order.
pub const ALL_SOURCES: &[&str] = &["kufar", "onliner", "realt", "domovita", "gohome", "etagi"];

/// Construct the enabled adapters over one shared HTTP client.
///
/// `enabled` filters by adapter name (unknown names are ignored with a
/// warning); the delivered-set probe powers the pagination early stop where
/// an adapter supports it.
#[must_use]
pub fn build_sources(
    http: &Arc<HttpClient>,
    enabled: &[String],
    delivered: Option<Arc<dyn DeliveredProbe>>,
) -> Vec<Arc<dyn ListingSource>> {
    let mut sources: Vec<Arc<dyn ListingSource>> = Vec::new();
    for name in enabled {
        match name.as_str() {
            "kufar" => {
                let mut source = KufarSource::new(Arc::clone(http));
                if let Some(probe) = &delivered {
                    source = source.with_delivered_probe(Arc::clone(probe));
                }
                sources.push(Arc::new(source));
            }
            "onliner" => sources.push(Arc::new(OnlinerSource::new(Arc::clone(http)))),
            "realt" => sources.push(Arc::new(RealtSource::new(Arc::clone(http)))),
            "domovita" => sources.push(Arc::new(DomovitaSource::new(Arc::clone(http)))),
            "gohome" => sources.push(Arc::new(GohomeSource::new(Arc::clone(http)))),
            "etagi" => sources.push(Arc::new(EtagiSource::new(Arc::clone(http)))),
            other => tracing::warn!(source = other, "unknown source in enable-list, ignoring"),
        }
    }
    sources
}
