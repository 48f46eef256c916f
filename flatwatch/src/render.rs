//! HTML rendering for listing messages, summaries and menus.
//!
//! Rendering owns escaping; the delivery layer is content-oblivious.

use flatwatch_core::BuildingGroup;
use flatwatch_types::{DeliveryMode, FilterRecord, Listing, SellerType};

use crate::delivery::Keyboard;

/// Escape the three characters Telegram's HTML mode cares about.
#[must_use]
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_usd(amount: i64) -> String {
    let raw = amount.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

fn price_line(listing: &Listing) -> String {
    if listing.price == 0 {
        return "Цена не указана".to_string();
    }
    if listing.currency == "USD" {
        format!("${}", format_usd(listing.price))
    } else {
        format!("{} BYN", format_usd(listing.price))
    }
}

/// Full per-listing message for `full` delivery mode.
#[must_use]
pub fn format_listing(listing: &Listing) -> String {
    let title = if listing.rooms > 0 && listing.area > 0.0 {
        format!("{}-комн. • {} м²", listing.rooms, listing.area)
    } else {
        escape_html(&listing.title)
    };

    let mut lines = vec![format!("🏠 <b>{title}</b>"), String::new()];
    lines.push(format!("💰 <b>Цена:</b> {}", price_line(listing)));
    if let Some(ppm) = listing.price_per_sqm() {
        lines.push(format!("📊 <b>Цена/м²:</b> {} $/м²", format_usd(ppm)));
    }
    if listing.rooms > 0 {
        lines.push(format!("🚪 <b>Комнат:</b> {}", listing.rooms));
    }
    if listing.area > 0.0 {
        lines.push(format!("📐 <b>Площадь:</b> {} м²", listing.area));
    }
    if !listing.floor.is_empty() {
        lines.push(format!("🏢 <b>Этаж:</b> {}", escape_html(&listing.floor)));
    } else if !listing.total_floors.is_empty() {
        lines.push(format!(
            "🏢 <b>Этажность:</b> {}",
            escape_html(&listing.total_floors)
        ));
    }
    if !listing.year_built.is_empty() {
        lines.push(format!("📅 <b>Год:</b> {}", escape_html(&listing.year_built)));
    }
    if !listing.house_type.is_empty() {
        lines.push(format!(
            "🏗️ <b>Тип дома:</b> {}",
            escape_html(&listing.house_type)
        ));
    }
    if !listing.renovation_state.is_empty() {
        lines.push(format!(
            "🔧 <b>Ремонт:</b> {}",
            escape_html(&listing.renovation_state)
        ));
    }
    match listing.seller {
        SellerType::Company => lines.push("🏢 Агентство".to_string()),
        SellerType::Owner => lines.push("👤 Собственник".to_string()),
        SellerType::Unknown => {}
    }
    if !listing.created_at.is_empty() {
        lines.push(format!(
            "📆 <b>Опубликовано:</b> {}",
            escape_html(&listing.created_at)
        ));
    }
    if !listing.description.is_empty() {
        let mut descr: String = listing.description.chars().take(300).collect();
        if listing.description.chars().count() > 300 {
            descr.push('…');
        }
        lines.push(String::new());
        lines.push(format!("📝 <i>{}</i>", escape_html(&descr)));
    }
    lines.push(String::new());
    lines.push(format!("📍 <b>Адрес:</b> {}", escape_html(&listing.address)));
    lines.push(format!("🌐 <b>Источник:</b> {}", escape_html(&listing.source)));
    lines.push(String::new());
    lines.push(format!(
        "🔗 <a href=\"{}\">Открыть объявление</a>",
        listing.url
    ));
    lines.join("\n")
}

/// Brief-mode summary over ranked building groups.
#[must_use]
pub fn format_summary(groups: &[BuildingGroup]) -> String {
    let mut lines = vec![
        format!("🏘 <b>Сводка по домам</b> ({} шт.)", groups.len()),
        String::new(),
    ];
    for (i, group) in groups.iter().enumerate() {
        lines.push(format!(
            "<b>{}. {}</b>",
            i + 1,
            escape_html(&group.address)
        ));
        let mut facts = vec![format!("{} вариант(ов)", group.listings.len())];
        if let Some(price) = group.median_price {
            facts.push(format!("медиана ${}", format_usd(price)));
        }
        if let Some(ppm) = group.house_ppm {
            facts.push(format!("{} $/м²", format_usd(ppm.round() as i64)));
        }
        lines.push(facts.join(" • "));
        lines.push(String::new());
    }
    lines.push("Нажмите на дом, чтобы раскрыть варианты.".to_string());
    lines.join("\n")
}

/// One short row of a group expansion ("show variants").
#[must_use]
pub fn format_group_row(index: usize, listing: &Listing) -> String {
    let rooms = if listing.rooms > 0 {
        format!("{}-комн.", listing.rooms)
    } else {
        "?".to_string()
    };
    let area = if listing.area > 0.0 {
        format!("{} м²", listing.area)
    } else {
        "?".to_string()
    };
    format!(
        "<b>{}.</b> {rooms}, {area} — {}\n🔗 <a href=\"{}\">объявление</a>",
        index + 1,
        price_line(listing),
        listing.url
    )
}

/// Current-filter card for `/filters`.
#[must_use]
pub fn format_filter(filter: &FilterRecord) -> String {
    let seller = match filter.seller {
        flatwatch_types::SellerFilter::All => "все продавцы",
        flatwatch_types::SellerFilter::OwnerOnly => "только собственники",
    };
    let mode = match filter.mode {
        DeliveryMode::Brief => "сводка по домам",
        DeliveryMode::Full => "каждое объявление",
    };
    format!(
        "⚙️ <b>Текущий фильтр</b>\n\n\
         🏙 Город: <b>{}</b>\n\
         🚪 Комнат: <b>{}–{}</b>\n\
         💰 Цена: <b>${}–${}</b>\n\
         👤 Продавец: <b>{seller}</b>\n\
         📨 Режим: <b>{mode}</b>\n\
         🔔 Мониторинг: <b>{}</b>",
        escape_html(&filter.city_slug),
        filter.min_rooms,
        filter.max_rooms,
        format_usd(filter.min_price),
        format_usd(filter.max_price),
        if filter.active { "включен" } else { "выключен" },
    )
}

/// Post-run actions menu.
#[must_use]
pub fn actions_menu(sent: usize) -> (String, Keyboard) {
    let text = if sent > 0 {
        format!(
            "✅ <b>Готово!</b>\n\n📨 Отправлено объявлений: <b>{sent}</b>\n\nЧто дальше?"
        )
    } else {
        "📭 <b>Новых объявлений нет</b>\n\nВсе подходящие объявления уже были отправлены ранее."
            .to_string()
    };
    let keyboard = vec![
        vec![("🔍 Проверить сейчас".to_string(), "check_now".to_string())],
        vec![("⚙️ Фильтры".to_string(), "show_filters".to_string())],
        vec![("📊 Статистика".to_string(), "show_stats".to_string())],
    ];
    (text, keyboard)
}
