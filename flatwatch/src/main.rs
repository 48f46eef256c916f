//! Process entry point: wire the stores, sources, dispatcher, scheduler
//! and the Telegram bot together, then poll for updates.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

use flatwatch::config::Config;
use flatwatch::courier::ListingCourier;
use flatwatch::delivery::Messenger;
use flatwatch::dispatcher::{DispatchConfig, Dispatcher, Stores};
use flatwatch::gateway::{self, BotContext};
use flatwatch::inbound_limit::InboundLimiter;
use flatwatch::telegram::TelegramTransport;
use flatwatch::{scheduler, Aggregator};
use flatwatch_core::source::DeliveredProbe;
use flatwatch_core::storage::ProbeOver;
use flatwatch_sources::{build_sources, HttpClient};
use flatwatch_store::Store;
use flatwatch_types::FlatwatchError;

/// City codes shipped with the binary; kept in the store so tooling can
/// inspect and extend them without a rebuild.
const CITY_CODES: &[(&str, &str, &str)] = &[
    ("baranovichi", "kufar", "country-belarus~province-brestskaja_oblast~locality-baranovichi"),
    ("brest", "kufar", "country-belarus~province-brestskaja_oblast~locality-brest"),
    ("minsk", "kufar", "country-belarus~province-minsk~locality-minsk"),
    ("gomel", "kufar", "country-belarus~province-gomelskaja_oblast~locality-gomel"),
    ("grodno", "kufar", "country-belarus~province-grodnenskaja_oblast~locality-grodno"),
    ("vitebsk", "kufar", "country-belarus~province-vitebskaja_oblast~locality-vitebsk"),
    ("mogilev", "kufar", "country-belarus~province-mogilevskaja_oblast~locality-mogilev"),
];

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), FlatwatchError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        interval_min = config.check_interval.as_secs() / 60,
        sources = ?config.enabled_sources,
        "starting flatwatch"
    );

    let store = Arc::new(Store::connect(&config.database_url).await?);
    store.ensure_schema().await?;
    store.load_city_map(CITY_CODES).await?;

    let stores = Stores {
        cache: store.clone(),
        seen: store.clone(),
        delivered: store.clone(),
        subscribers: store.clone(),
        links: store.clone(),
    };

    let http = Arc::new(HttpClient::new());
    let probe: Arc<dyn DeliveredProbe> = Arc::new(ProbeOver(store.clone()));
    let sources = build_sources(&http, &config.enabled_sources, Some(probe));
    let aggregator = Arc::new(
        Aggregator::builder()
            .with_sources(sources)
            .build()?,
    );

    let bot = Bot::new(&config.bot_token);
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let messenger = Arc::new(Messenger::new(transport));
    let courier = Arc::new(ListingCourier::new(
        messenger.clone(),
        stores.links.clone(),
        config.max_photos,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        stores.clone(),
        aggregator,
        courier,
        DispatchConfig {
            fx_rate_byn_usd: config.fx_rate_byn_usd,
            ..DispatchConfig::default()
        },
    ));

    let _dispatch_loop = scheduler::spawn_dispatch_loop(dispatcher.clone(), config.check_interval);
    let _sweep_loop = scheduler::spawn_daily_sweep(stores.cache.clone(), stores.delivered.clone());

    let ctx = Arc::new(BotContext {
        config,
        stores,
        dispatcher,
        messenger,
        limiter: Arc::new(InboundLimiter::new()),
    });

    tracing::info!("bot ready, polling for updates");
    teloxide::dispatching::Dispatcher::builder(bot, gateway::schema())
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
