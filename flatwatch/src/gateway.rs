//! Telegram gateway: command and callback handling.
//!
//! The conversational filter-setup flow stays thin by design — filters are
//! edited through one-shot callback updates; everything stateful lives in
//! the stores. Handlers never propagate errors: a failure is logged with
//! the event kind and chat id only, and the update is considered handled.

use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use flatwatch_core::storage::{DeliveredStore, SeenStore, SubscriberStore};
use flatwatch_types::{DeliveryMode, SellerFilter};

use crate::callbacks::{self, CallbackAction};
use crate::city;
use crate::config::Config;
use crate::delivery::{Keyboard, Messenger};
use crate::dispatcher::{Dispatcher, Stores};
use crate::inbound_limit::{InboundLimiter, Verdict};
use crate::render;

/// Shared handler context, injected through dptree.
pub struct BotContext {
    /// Startup configuration (admin list, defaults).
    pub config: Config,
    /// Storage handles.
    pub stores: Stores,
    /// Dispatch pipeline for on-demand runs.
    pub dispatcher: Arc<Dispatcher>,
    /// Outbound messenger (owns all pacing).
    pub messenger: Arc<Messenger>,
    /// Inbound anti-abuse limiter.
    pub limiter: Arc<InboundLimiter>,
}

/// Chat command surface.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Команды бота:")]
pub enum Command {
    /// Register and show the main menu.
    #[command(description = "регистрация и главное меню")]
    Start,
    /// On-demand dispatch run for this subscriber.
    #[command(description = "проверить объявления сейчас")]
    Check,
    /// Resume scheduled monitoring.
    #[command(description = "включить мониторинг")]
    StartMonitoring,
    /// Pause scheduled monitoring.
    #[command(description = "выключить мониторинг")]
    StopMonitoring,
    /// Show the current filter.
    #[command(description = "показать текущий фильтр")]
    Filters,
    /// Choose the delivery mode.
    #[command(description = "режим доставки: сводка или подробно")]
    Mode,
    /// Personal statistics (admins see global duplicate stats too).
    #[command(description = "статистика")]
    Stats,
    /// Admin only: wipe a subscriber's seen set.
    #[command(description = "админ: очистить историю отправок")]
    AdminClearSent { telegram_id: i64 },
}

/// Build the dptree update handler.
#[must_use]
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    let commands = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command);
    let callbacks = Update::filter_callback_query().endpoint(handle_callback);
    dptree::entry().branch(commands).branch(callbacks)
}

fn command_tag(cmd: &Command) -> &'static str {
    match cmd {
        Command::Start => "/start",
        Command::Check => "/check",
        Command::StartMonitoring => "/start_monitoring",
        Command::StopMonitoring => "/stop_monitoring",
        Command::Filters => "/filters",
        Command::Mode => "/mode",
        Command::Stats => "/stats",
        Command::AdminClearSent { .. } => "/admin_clear_sent",
    }
}

async fn handle_command(
    _bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    match ctx.limiter.check(chat_id, command_tag(&cmd)) {
        Verdict::Allow => {}
        Verdict::AllowWithWarning(warning) => {
            let _ = ctx.messenger.send_text(chat_id, &warning, None).await;
        }
        Verdict::Reject(reason) => {
            let _ = ctx.messenger.send_text(chat_id, &reason, None).await;
            return Ok(());
        }
    }

    match cmd {
        Command::Start => cmd_start(&ctx, chat_id).await,
        Command::Check => cmd_check(&ctx, chat_id).await,
        Command::StartMonitoring => cmd_toggle(&ctx, chat_id, true).await,
        Command::StopMonitoring => cmd_toggle(&ctx, chat_id, false).await,
        Command::Filters => cmd_filters(&ctx, chat_id).await,
        Command::Mode => cmd_mode(&ctx, chat_id).await,
        Command::Stats => cmd_stats(&ctx, chat_id).await,
        Command::AdminClearSent { telegram_id } => {
            cmd_admin_clear_sent(&ctx, chat_id, telegram_id).await;
        }
    }
    Ok(())
}

async fn cmd_start(ctx: &BotContext, chat_id: i64) {
    if let Err(e) = ctx.stores.subscribers.upsert_subscriber(chat_id).await {
        tracing::warn!(chat_id, error = %e, "subscriber upsert failed");
    }
    match ctx.stores.subscribers.get_filter(chat_id).await {
        Ok(Some(filter)) => {
            let (_, keyboard) = render::actions_menu(0);
            let text = format!(
                "👋 <b>С возвращением!</b>\n\n{}\n\nЧто дальше?",
                render::format_filter(&filter)
            );
            let _ = ctx.messenger.send_text(chat_id, &text, Some(keyboard)).await;
        }
        Ok(None) => {
            let keyboard = city_keyboard(ctx).await;
            let _ = ctx
                .messenger
                .send_text(
                    chat_id,
                    "👋 <b>Добро пожаловать!</b>\n\nВыберите город для поиска квартир:",
                    keyboard,
                )
                .await;
        }
        Err(e) => {
            tracing::warn!(chat_id, error = %e, "filter read failed");
            let _ = ctx
                .messenger
                .send_text(chat_id, "😔 Что-то пошло не так, попробуйте позже.", None)
                .await;
        }
    }
}

async fn city_keyboard(ctx: &BotContext) -> Option<Keyboard> {
    let mut keyboard: Keyboard = Vec::new();
    for slug in city::known_slugs().into_iter().take(8) {
        match callbacks::encode_payload(ctx.stores.links.as_ref(), &format!("city:{slug}")).await {
            Ok(code) => keyboard.push(vec![(slug.to_string(), format!("select_city|{code}"))]),
            Err(e) => tracing::warn!(error = %e, "city button encode failed"),
        }
    }
    (!keyboard.is_empty()).then_some(keyboard)
}

async fn cmd_check(ctx: &BotContext, chat_id: i64) {
    let _ = ctx
        .messenger
        .send_text(chat_id, "🔍 Ищу новые объявления…", None)
        .await;
    let report = ctx.dispatcher.run_for_subscriber(chat_id).await;
    if report.deactivated {
        return;
    }
    let (text, keyboard) = render::actions_menu(report.sent);
    let _ = ctx.messenger.send_text(chat_id, &text, Some(keyboard)).await;
}

async fn cmd_toggle(ctx: &BotContext, chat_id: i64, active: bool) {
    match ctx.stores.subscribers.set_active(chat_id, active).await {
        Ok(()) => {
            let text = if active {
                "🔔 Мониторинг включен. Я напишу, когда появятся новые объявления."
            } else {
                "🔕 Мониторинг выключен. Вернуть: /start_monitoring"
            };
            let _ = ctx.messenger.send_text(chat_id, text, None).await;
        }
        Err(e) => tracing::warn!(chat_id, error = %e, "active toggle failed"),
    }
}

async fn cmd_filters(ctx: &BotContext, chat_id: i64) {
    match ctx.stores.subscribers.get_filter(chat_id).await {
        Ok(Some(filter)) => {
            let _ = ctx
                .messenger
                .send_text(chat_id, &render::format_filter(&filter), None)
                .await;
        }
        Ok(None) => {
            let _ = ctx
                .messenger
                .send_text(chat_id, "Фильтр ещё не настроен — начните со /start.", None)
                .await;
        }
        Err(e) => tracing::warn!(chat_id, error = %e, "filter read failed"),
    }
}

async fn cmd_mode(ctx: &BotContext, chat_id: i64) {
    let keyboard = vec![vec![
        ("📋 Сводка по домам".to_string(), "set_mode:brief".to_string()),
        ("📨 Каждое объявление".to_string(), "set_mode:full".to_string()),
    ]];
    let _ = ctx
        .messenger
        .send_text(chat_id, "Как присылать результаты?", Some(keyboard))
        .await;
}

async fn cmd_stats(ctx: &BotContext, chat_id: i64) {
    let seen = ctx.stores.seen.seen_count(chat_id).await.unwrap_or(0);
    let mut text = format!("📊 Вам отправлено объявлений: <b>{seen}</b>");
    if ctx.config.is_admin(chat_id) {
        match ctx.stores.delivered.duplicate_stats().await {
            Ok(stats) => {
                text.push_str(&format!(
                    "\n\n<b>Глобально</b>\nвсего: {}\nуникальных: {}\nгрупп дублей: {}",
                    stats.total_delivered, stats.unique_hashes, stats.duplicate_groups
                ));
                for (source, count) in &stats.by_source {
                    text.push_str(&format!("\n• {source}: {count}"));
                }
            }
            Err(e) => tracing::warn!(error = %e, "duplicate stats failed"),
        }
    }
    let _ = ctx.messenger.send_text(chat_id, &text, None).await;
}

async fn cmd_admin_clear_sent(ctx: &BotContext, chat_id: i64, target: i64) {
    if !ctx.config.is_admin(chat_id) {
        let _ = ctx
            .messenger
            .send_text(chat_id, "Эта команда доступна только администратору.", None)
            .await;
        return;
    }
    match ctx.stores.seen.clear_seen(target).await {
        Ok(removed) => {
            let _ = ctx
                .messenger
                .send_text(
                    chat_id,
                    &format!("🧹 Очищено записей у {target}: <b>{removed}</b>"),
                    None,
                )
                .await;
        }
        Err(e) => tracing::warn!(target, error = %e, "seen-set wipe failed"),
    }
}

async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let chat_id = i64::try_from(query.from.id.0).unwrap_or_default();
    // Acknowledge first so the client stops its spinner.
    let _ = bot.answer_callback_query(query.id.clone()).await;

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    match ctx.limiter.check(chat_id, data) {
        Verdict::Allow | Verdict::AllowWithWarning(_) => {}
        Verdict::Reject(reason) => {
            let _ = ctx.messenger.send_text(chat_id, &reason, None).await;
            return Ok(());
        }
    }

    let Some(action) = callbacks::parse(data) else {
        tracing::debug!(chat_id, data, "unknown callback payload");
        return Ok(());
    };

    match action {
        CallbackAction::CheckNow => cmd_check(&ctx, chat_id).await,
        CallbackAction::ShowFilters => cmd_filters(&ctx, chat_id).await,
        CallbackAction::ShowStats => cmd_stats(&ctx, chat_id).await,
        CallbackAction::SetMode { mode } => cb_set_mode(&ctx, chat_id, &mode).await,
        CallbackAction::SelectCity { code } => cb_select_city(&ctx, chat_id, &code).await,
        CallbackAction::FilterSet { uid, field, value } => {
            if uid == chat_id {
                cb_filter_set(&ctx, chat_id, &field, &value).await;
            }
        }
        CallbackAction::ShowHouse { code, offset } => {
            cb_show_house(&ctx, chat_id, &code, offset).await;
        }
        CallbackAction::OpenAd { code } => cb_open_ad(&ctx, chat_id, &code).await,
        CallbackAction::SaveAd { .. } | CallbackAction::MuteAd { .. } => {
            let _ = ctx
                .messenger
                .send_text(chat_id, "Эта функция скоро появится.", None)
                .await;
        }
    }
    Ok(())
}

async fn cb_set_mode(ctx: &BotContext, chat_id: i64, mode: &str) {
    let Ok(Some(mut filter)) = ctx.stores.subscribers.get_filter(chat_id).await else {
        let _ = ctx
            .messenger
            .send_text(chat_id, "Сначала настройте фильтр: /start", None)
            .await;
        return;
    };
    filter.mode = DeliveryMode::parse(mode);
    if let Err(e) = ctx.stores.subscribers.set_filter(chat_id, &filter).await {
        tracing::warn!(chat_id, error = %e, "mode write failed");
        return;
    }
    let text = match filter.mode {
        DeliveryMode::Brief => "📋 Теперь вы получаете одну сводку с группировкой по домам.",
        DeliveryMode::Full => "📨 Теперь вы получаете подробное сообщение по каждому объявлению.",
    };
    let _ = ctx.messenger.send_text(chat_id, text, None).await;
}

async fn cb_select_city(ctx: &BotContext, chat_id: i64, code: &str) {
    let payload = match callbacks::decode_payload(ctx.stores.links.as_ref(), code).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::info!(chat_id, error = %e, "city code lookup failed");
            let _ = ctx
                .messenger
                .send_text(chat_id, "😔 Кнопка устарела, попробуйте /start ещё раз.", None)
                .await;
            return;
        }
    };
    let Some(slug) = payload.strip_prefix("city:").and_then(city::resolve_city) else {
        tracing::warn!(chat_id, payload = %payload, "unexpected city payload");
        return;
    };

    let mut filter = ctx
        .stores
        .subscribers
        .get_filter(chat_id)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    filter.city_slug = slug.to_string();
    filter.normalize();
    if let Err(e) = ctx.stores.subscribers.set_filter(chat_id, &filter).await {
        tracing::warn!(chat_id, error = %e, "city write failed");
        return;
    }
    let text = format!(
        "🏙 Город: <b>{slug}</b>\n\n{}\n\nУточнить параметры: /filters, запустить поиск: /check",
        render::format_filter(&filter)
    );
    let _ = ctx.messenger.send_text(chat_id, &text, None).await;
}

async fn cb_filter_set(ctx: &BotContext, chat_id: i64, field: &str, value: &str) {
    let mut filter = ctx
        .stores
        .subscribers
        .get_filter(chat_id)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();

    let applied = match field {
        "min_rooms" => value.parse().map(|v| filter.min_rooms = v).is_ok(),
        "max_rooms" => value.parse().map(|v| filter.max_rooms = v).is_ok(),
        "min_price" => value.parse().map(|v| filter.min_price = v).is_ok(),
        "max_price" => value.parse().map(|v| filter.max_price = v).is_ok(),
        "seller" => {
            filter.seller = SellerFilter::parse(value);
            true
        }
        "city" => match city::resolve_city(value) {
            Some(slug) => {
                filter.city_slug = slug.to_string();
                true
            }
            None => false,
        },
        other => {
            tracing::debug!(chat_id, field = other, "filter field not in allow-list");
            false
        }
    };
    if !applied {
        let _ = ctx
            .messenger
            .send_text(chat_id, "🤔 Не удалось применить это значение.", None)
            .await;
        return;
    }

    filter.normalize();
    if let Err(reason) = filter.validate() {
        let _ = ctx
            .messenger
            .send_text(chat_id, &format!("⚠️ {reason}"), None)
            .await;
        return;
    }
    match ctx.stores.subscribers.set_filter(chat_id, &filter).await {
        Ok(()) => {
            let _ = ctx
                .messenger
                .send_text(chat_id, &render::format_filter(&filter), None)
                .await;
        }
        Err(e) => tracing::warn!(chat_id, error = %e, "filter write failed"),
    }
}

/// Expand a building group: re-read the subscriber's candidates from the
/// cache, regroup, and page through the requested group.
async fn cb_show_house(ctx: &BotContext, chat_id: i64, code: &str, offset: usize) {
    use flatwatch_core::storage::ListingCacheStore;

    let Ok(payload) = callbacks::decode_payload(ctx.stores.links.as_ref(), code).await else {
        let _ = ctx
            .messenger
            .send_text(chat_id, "😔 Эта сводка устарела, запустите /check ещё раз.", None)
            .await;
        return;
    };
    let Some(key) = payload.strip_prefix("house:") else {
        return;
    };

    let Ok(Some(filter)) = ctx.stores.subscribers.get_filter(chat_id).await else {
        return;
    };
    let query = flatwatch_types::SearchQuery::from_filter(&filter);
    let cached = ctx
        .stores
        .cache
        .read_cache(&query, 200)
        .await
        .unwrap_or_default();
    let listings: Vec<_> = cached.into_iter().map(|row| row.listing).collect();

    let groups = flatwatch_core::build_groups(&listings);
    let Some(group) = groups.iter().find(|g| g.key == key) else {
        let _ = ctx
            .messenger
            .send_text(chat_id, "😔 Этот дом уже выпал из выборки.", None)
            .await;
        return;
    };

    let page: Vec<_> = group.listings.iter().skip(offset).take(5).collect();
    if page.is_empty() {
        let _ = ctx
            .messenger
            .send_text(chat_id, "Больше вариантов в этом доме нет.", None)
            .await;
        return;
    }

    let mut lines = vec![format!(
        "🏠 <b>{}</b> — варианты {}–{} из {}",
        render::escape_html(&group.address),
        offset + 1,
        offset + page.len(),
        group.listings.len()
    )];
    for (i, listing) in page.iter().enumerate() {
        lines.push(String::new());
        lines.push(render::format_group_row(offset + i, listing));
    }

    let mut keyboard: Keyboard = Vec::new();
    if offset + page.len() < group.listings.len() {
        keyboard.push(vec![(
            "➡️ Ещё".to_string(),
            format!("show_house|{code}|{}", offset + page.len()),
        )]);
    }
    let buttons = (!keyboard.is_empty()).then_some(keyboard);
    let _ = ctx
        .messenger
        .send_text(chat_id, &lines.join("\n"), buttons)
        .await;
}

async fn cb_open_ad(ctx: &BotContext, chat_id: i64, code: &str) {
    match callbacks::decode_payload(ctx.stores.links.as_ref(), code).await {
        Ok(url) => {
            let _ = ctx
                .messenger
                .send_text(chat_id, &format!("🔗 <a href=\"{url}\">Открыть объявление</a>"), None)
                .await;
        }
        Err(_) => {
            let _ = ctx
                .messenger
                .send_text(chat_id, "😔 Ссылка устарела.", None)
                .await;
        }
    }
}
