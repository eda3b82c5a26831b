// src/banner.rs
//
// Countdown and date copy for the reset status surface. The wording matches
// what the dashboard banner showed its users.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;

use crate::period::PeriodScheme;
use crate::reset_scheduler::PeriodResetScheduler;

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// "lunes, 1 de septiembre de 2025"
pub fn format_long_date(date: NaiveDate) -> String {
    format!(
        "{}, {} de {} de {}",
        weekday_name(date.weekday()),
        date.day(),
        MONTHS_ES[date.month0() as usize],
        date.year()
    )
}

fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAYS_ES[weekday.num_days_from_monday() as usize]
}

/// Remaining time until the reset, in the largest sensible unit.
pub fn format_countdown(now: NaiveDateTime, next_reset: NaiveDate) -> String {
    let target = next_reset
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    let secs = (target - now).num_seconds();
    if secs <= 0 {
        return "¡Reset ahora!".to_string();
    }

    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{} día{}", days, if days > 1 { "s" } else { "" })
    } else if hours > 0 {
        format!("{} hora{}", hours, if hours > 1 { "s" } else { "" })
    } else {
        format!("{} minuto{}", minutes, if minutes != 1 { "s" } else { "" })
    }
}

/// Banner state as rendered by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BannerStatus {
    pub visible: bool,
    pub next_reset: NaiveDate,
    pub next_reset_formatted: String,
    pub countdown: String,
    pub days_until_reset: i64,
    pub last_reset: Option<NaiveDateTime>,
}

pub fn banner_status<S: PeriodScheme>(scheduler: &PeriodResetScheduler<S>) -> BannerStatus {
    let now = scheduler.now();
    let next_reset = scheduler.next_reset_date();
    BannerStatus {
        visible: scheduler.config().show_banner && scheduler.should_show_banner(),
        next_reset,
        next_reset_formatted: format_long_date(next_reset),
        countdown: format_countdown(now, next_reset),
        days_until_reset: scheduler.days_until_reset(),
        last_reset: scheduler.last_reset(),
    }
}
