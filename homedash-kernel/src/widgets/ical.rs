/**
 * ICAL WIDGET - Événements du jour d'un calendrier iCalendar distant
 *
 * FONCTIONNEMENT :
 * - fetch de `ical_href` toutes les `refresh_interval` secondes (défaut 5 min)
 * - parse des VEVENT (lignes repliées, TZID, VALUE=DATE, suffixe Z)
 * - occurrences du jour via RRULE + RDATE moins EXDATE (crate rrule), triées
 *   par heure de début
 * - état persistant : les lignes de la liste (`rows_v1`)
 *
 * Rafraîchissement non "guarded" : un échec laisse la vue précédente.
 */

use super::{check_interval, check_url, Widget, WidgetError};
use crate::scheduler::InstanceHandle;
use crate::view::{Header, ListBlock, ListRow, View};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rrule::{RRule, Tz, Unvalidated};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_OCCURRENCES_PER_DAY: u16 = 64;

fn default_five_minutes() -> u64 {
    5 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ICalConfig {
    pub friendly_name: Option<String>,
    pub title: String,
    #[serde(rename = "subTitle")]
    pub sub_title: Option<String>,
    pub icon: Option<String>,
    #[serde(default = "default_five_minutes")]
    pub refresh_interval: u64,
    pub ical_href: String,
    /// Zone d'affichage (IANA) ; défaut : zone locale du serveur
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ICalState {
    pub rows_v1: Vec<ListRow>,
}

#[derive(Debug, Clone, PartialEq)]
enum EventTime {
    Date(NaiveDate),
    Floating(NaiveDateTime),
    Utc(DateTime<Utc>),
    Zoned(NaiveDateTime, chrono_tz::Tz),
}

impl EventTime {
    fn parse(value: &str, params: &HashMap<String, String>) -> Result<Self, WidgetError> {
        let value = value.trim();
        let bad = || WidgetError::Calendar(format!("invalid date-time '{value}'"));
        if params.get("VALUE").map(String::as_str) == Some("DATE") || value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d").map(EventTime::Date).map_err(|_| bad());
        }
        if let Some(utc) = value.strip_suffix('Z') {
            let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| bad())?;
            return Ok(EventTime::Utc(naive.and_utc()));
        }
        let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| bad())?;
        match params.get("TZID").map(|id| id.trim_matches('"').parse::<chrono_tz::Tz>()) {
            Some(Ok(tz)) => Ok(EventTime::Zoned(naive, tz)),
            // TZID inconnu (noms Windows...) : heure flottante
            _ => Ok(EventTime::Floating(naive)),
        }
    }

    /// Instant absolu ; les dates et heures flottantes sont lues dans `zone`
    fn resolve(&self, zone: &Tz) -> Option<DateTime<Tz>> {
        match self {
            EventTime::Date(d) => zone.from_local_datetime(&d.and_hms_opt(0, 0, 0)?).earliest(),
            EventTime::Floating(n) => zone.from_local_datetime(n).earliest(),
            EventTime::Utc(dt) => Some(dt.with_timezone(&Tz::UTC)),
            EventTime::Zoned(n, tz) => Tz::Tz(*tz).from_local_datetime(n).earliest(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RawEvent {
    summary: String,
    start: Option<EventTime>,
    rrule: Option<String>,
    rdates: Vec<EventTime>,
    exdates: Vec<EventTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    /// Heure de début dans la zone d'affichage
    pub start: NaiveDateTime,
    pub all_day: bool,
}

/// Dé-replie les lignes de contenu (continuation = ligne commençant par espace/tab)
fn unfold(ics: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in ics.lines() {
        let line = line.trim_end_matches('\r');
        match (line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')), lines.last_mut()) {
            (Some(rest), Some(last)) => last.push_str(rest),
            _ if line.is_empty() => {}
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// `NAME;P1=V1;P2=V2:value` -> (NAME, params, value)
fn split_line(line: &str) -> Option<(String, HashMap<String, String>, &str)> {
    let mut in_quotes = false;
    let colon = line.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ':' if !in_quotes => Some(i),
        _ => None,
    })?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);
    let mut parts = head.split(';');
    let name = parts.next()?.to_ascii_uppercase();
    let params = parts
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| (k.to_ascii_uppercase(), v.to_string()))
        .collect();
    Some((name, params, value))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push(' '),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// EXDATE / RDATE : liste séparée par des virgules, mêmes paramètres que DTSTART
fn date_list(value: &str, params: &HashMap<String, String>) -> Vec<EventTime> {
    value
        .split(',')
        .filter_map(|v| match EventTime::parse(v, params) {
            Ok(time) => Some(time),
            Err(e) => {
                // RDATE;VALUE=PERIOD non supporté
                debug!(error = %e, "ignoring recurrence date");
                None
            }
        })
        .collect()
}

fn parse_events(ics: &str) -> Result<Vec<RawEvent>, WidgetError> {
    let mut events = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<RawEvent> = None;

    for line in unfold(ics) {
        let Some((name, params, value)) = split_line(&line) else {
            continue;
        };
        match name.as_str() {
            "BEGIN" => {
                let component = value.trim().to_ascii_uppercase();
                if component == "VEVENT" {
                    current = Some(RawEvent::default());
                }
                stack.push(component);
            }
            "END" => {
                if stack.pop().as_deref() == Some("VEVENT") {
                    events.extend(current.take());
                }
            }
            _ if stack.last().map(String::as_str) == Some("VEVENT") => {
                let Some(event) = current.as_mut() else { continue };
                match name.as_str() {
                    "SUMMARY" => event.summary = unescape(value),
                    "DTSTART" => event.start = Some(EventTime::parse(value, &params)?),
                    "RRULE" => event.rrule = Some(value.to_string()),
                    "RDATE" => event.rdates.extend(date_list(value, &params)),
                    "EXDATE" => event.exdates.extend(date_list(value, &params)),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(WidgetError::Calendar(format!("unterminated component {}", stack.join("/"))));
    }
    Ok(events)
}

fn resolve_all(times: &[EventTime], zone: &Tz) -> Vec<DateTime<Tz>> {
    times.iter().filter_map(|t| t.resolve(zone)).collect()
}

fn occurrences(
    event: &RawEvent,
    rule: &str,
    dtstart: DateTime<Tz>,
    zone: &Tz,
    from: DateTime<Tz>,
    to: DateTime<Tz>,
) -> Result<Vec<DateTime<Tz>>, String> {
    let rule: RRule<Unvalidated> = rule.parse().map_err(|e| format!("{e}"))?;
    let set = rule.build(dtstart).map_err(|e| format!("{e}"))?;
    let set = resolve_all(&event.rdates, zone).into_iter().fold(set, |set, date| set.rdate(date));
    let set = resolve_all(&event.exdates, zone).into_iter().fold(set, |set, date| set.exdate(date));
    let result = set
        .after(from - ChronoDuration::seconds(1))
        .before(to)
        .all(MAX_OCCURRENCES_PER_DAY);
    if result.limited {
        debug!(summary = %event.summary, "recurrence truncated");
    }
    Ok(result.dates)
}

/// Événements du jour `day` (dans `zone`), récurrences comprises, triés par début
pub fn events_on(ics: &str, day: NaiveDate, zone: Tz) -> Result<Vec<CalendarEvent>, WidgetError> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .and_then(|n| zone.from_local_datetime(&n).earliest())
        .ok_or_else(|| WidgetError::Calendar(format!("no midnight for {day}")))?;
    let next_midnight = midnight + ChronoDuration::days(1);

    let mut found = Vec::new();
    for event in parse_events(ics)? {
        let Some(start) = &event.start else { continue };
        let all_day = matches!(start, EventTime::Date(_));
        let Some(dtstart) = start.resolve(&zone) else { continue };

        let starts: Vec<DateTime<Tz>> = match &event.rrule {
            None => {
                let excluded = resolve_all(&event.exdates, &zone);
                std::iter::once(dtstart)
                    .chain(resolve_all(&event.rdates, &zone))
                    .filter(|s| !excluded.contains(s))
                    .collect()
            }
            Some(rule) => match occurrences(&event, rule, dtstart, &zone, midnight, next_midnight) {
                Ok(dates) => dates,
                Err(e) => {
                    warn!(summary = %event.summary, error = %e, "skipping event with unusable RRULE");
                    continue;
                }
            },
        };

        found.extend(
            starts
                .into_iter()
                .map(|s| s.with_timezone(&zone).naive_local())
                .filter(|s| s.date() == day)
                .map(|start| CalendarEvent {
                    summary: event.summary.clone(),
                    start,
                    all_day,
                }),
        );
    }

    found.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.summary.cmp(&b.summary)));
    Ok(found)
}

fn rows(events: &[CalendarEvent]) -> Vec<ListRow> {
    events
        .iter()
        .map(|e| {
            let when = if e.all_day {
                "All day".to_string()
            } else {
                e.start.format("%I:%M %p").to_string()
            };
            ListRow::pair(&e.summary, Some(when), None)
        })
        .collect()
}

fn header(config: &ICalConfig) -> Header {
    Header::new(&config.title)
        .subtitle(config.sub_title.clone())
        .icon(config.icon.clone())
}

fn render(config: &ICalConfig, rows: Vec<ListRow>) -> View {
    View::new("ical").with(header(config)).with(ListBlock { title: None, rows })
}

fn display_zone(config: &ICalConfig) -> Result<Tz, WidgetError> {
    match &config.timezone {
        Some(name) => name
            .parse::<chrono_tz::Tz>()
            .map(Tz::Tz)
            .map_err(|_| WidgetError::InvalidConfig(format!("unknown timezone '{name}'"))),
        None => Ok(Tz::LOCAL),
    }
}

pub struct ICalWidget {
    http: reqwest::Client,
}

impl ICalWidget {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

async fn refresh(http: &reqwest::Client, config: &ICalConfig, zone: Tz) -> Result<Vec<ListRow>, WidgetError> {
    let ics = http
        .get(&config.ical_href)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let today = Utc::now().with_timezone(&zone).date_naive();
    Ok(rows(&events_on(&ics, today, zone)?))
}

impl Widget for ICalWidget {
    type Config = ICalConfig;
    type State = ICalState;

    fn kind(&self) -> &'static str {
        "ical"
    }

    fn validate(&self, config: &ICalConfig) -> Result<(), WidgetError> {
        check_url("ical_href", &config.ical_href)?;
        check_interval(config.refresh_interval)?;
        display_zone(config).map(|_| ())
    }

    fn identity(&self, config: &ICalConfig) -> String {
        format!("app_{}", config.friendly_name.as_deref().unwrap_or(&config.ical_href))
    }

    fn init(&self, config: ICalConfig, previous: Option<ICalState>, handle: InstanceHandle) -> Result<View, WidgetError> {
        let zone = display_zone(&config)?;
        let initial = match previous {
            Some(state) => render(&config, state.rows_v1),
            None => View::new("ical").with(header(&config)),
        };

        let period = Duration::from_secs(config.refresh_interval);
        let config = Arc::new(config);
        let http = self.http.clone();
        let updates = handle.clone();
        handle.every(period, move || {
            let http = http.clone();
            let config = config.clone();
            let handle = updates.clone();
            async move {
                match refresh(&http, &config, zone).await {
                    Ok(rows) => {
                        if let Err(e) = handle.persist_state(&ICalState { rows_v1: rows.clone() }) {
                            warn!(instance = %handle.instance_id(), error = %e, "failed to persist calendar rows");
                        }
                        handle.replace_view(render(&config, rows));
                    }
                    Err(e) => warn!(instance = %handle.instance_id(), error = %e, "calendar refresh failed, keeping previous view"),
                }
            }
        });

        Ok(initial)
    }
}
