use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use waymark_shared::LocationRecord;

use crate::api;
use crate::map_bridge;
use crate::sensor::PositionFix;
use crate::time_format::format_relative;

/// Rows kept in the on-screen history list.
pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub timestamp_secs: i64,
}

/// Prepend a row, dropping the oldest past the cap.
pub fn push_entry(list: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    list.insert(0, entry);
    list.truncate(HISTORY_LIMIT);
}

/// Convert one stored record; records with unparseable timestamps are skipped.
pub fn entry_from_record(record: &LocationRecord) -> Option<HistoryEntry> {
    Some(HistoryEntry {
        latitude: record.latitude,
        longitude: record.longitude,
        accuracy_m: record.accuracy.unwrap_or(0.0),
        timestamp_secs: record.timestamp_secs()?,
    })
}

/// Add a just-saved fix to the top of the panel.
pub(crate) fn record_saved_fix(history: RwSignal<Vec<HistoryEntry>>, fix: &PositionFix) {
    let entry = HistoryEntry {
        latitude: fix.latitude,
        longitude: fix.longitude,
        accuracy_m: fix.accuracy_m,
        timestamp_secs: (fix.observed_at_ms / 1000.0) as i64,
    };
    history.update(|list| push_entry(list, entry));
}

/// Seed the panel from the server, newest first.
pub(crate) fn seed_from_server(history: RwSignal<Vec<HistoryEntry>>) {
    spawn_local(async move {
        match api::fetch_locations(api::HISTORY_FETCH_LIMIT).await {
            Ok(page) => {
                if page.locations.is_empty() {
                    return;
                }
                let entries: Vec<HistoryEntry> = page
                    .locations
                    .iter()
                    .filter_map(entry_from_record)
                    .take(HISTORY_LIMIT)
                    .collect();
                history.set(entries);
            }
            Err(e) => {
                web_sys::console::warn_1(&format!("History fetch failed: {e}").into());
            }
        }
    });
}

/// Scrolling list of recently saved locations.
#[component]
pub fn HistoryPanel() -> impl IntoView {
    let history: RwSignal<Vec<HistoryEntry>> = expect_context();
    let tick: RwSignal<i64> = expect_context();

    view! {
        <div style="margin-top: 14px; background: #13161f; border: 1px solid #282c3e; border-radius: 6px; padding: 10px 12px;">
            <div style="font-size: 0.8rem; color: #9a9590; margin-bottom: 6px;">"Recent locations"</div>
            {move || {
                let entries = history.get();
                let now = tick.get();
                if entries.is_empty() {
                    return view! {
                        <div style="font-size: 0.72rem; color: #5a5860;">"No locations recorded yet"</div>
                    }.into_any();
                }
                entries
                    .iter()
                    .map(|entry| {
                        let when = format_relative(now, entry.timestamp_secs);
                        let coords = format!(
                            "Lat: {:.6}, Lon: {:.6}",
                            entry.latitude, entry.longitude
                        );
                        let accuracy = format!("{:.0} m", entry.accuracy_m);
                        let (lat, lon, acc) = (entry.latitude, entry.longitude, entry.accuracy_m);
                        view! {
                            <div style="display: flex; align-items: center; gap: 10px; padding: 4px 0; border-top: 1px solid rgba(40,44,62,0.5); font-size: 0.72rem; font-family: 'JetBrains Mono', monospace;">
                                <span style="color: #9a9590; min-width: 96px;">{when}</span>
                                <span style="color: #e2e0d8; flex: 1;">{coords}</span>
                                <span style="color: #9a9590;">{accuracy}</span>
                                <button
                                    title="Show on map"
                                    style="background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; color: #9a9590; cursor: pointer; font-size: 0.68rem; padding: 2px 8px;"
                                    on:click=move |_| map_bridge::recenter(lat, lon, acc)
                                >
                                    "view"
                                </button>
                            </div>
                        }
                    })
                    .collect_view()
                    .into_any()
            }}
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(secs: i64) -> HistoryEntry {
        HistoryEntry {
            latitude: 37.0,
            longitude: -122.0,
            accuracy_m: 10.0,
            timestamp_secs: secs,
        }
    }

    #[test]
    fn newest_entry_goes_on_top() {
        let mut list = vec![entry(1), entry(0)];
        push_entry(&mut list, entry(2));
        let order: Vec<i64> = list.iter().map(|e| e.timestamp_secs).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn list_is_capped() {
        let mut list = Vec::new();
        for secs in 0..30 {
            push_entry(&mut list, entry(secs));
        }
        assert_eq!(list.len(), HISTORY_LIMIT);
        assert_eq!(list[0].timestamp_secs, 29);
        assert_eq!(list[HISTORY_LIMIT - 1].timestamp_secs, 10);
    }

    #[test]
    fn records_without_timestamps_are_skipped() {
        let record = LocationRecord {
            latitude: 1.0,
            longitude: 2.0,
            accuracy: None,
            timestamp: "not a time".to_string(),
        };
        assert_eq!(entry_from_record(&record), None);
    }

    #[test]
    fn missing_accuracy_defaults_to_zero() {
        let record = LocationRecord {
            latitude: 1.0,
            longitude: 2.0,
            accuracy: None,
            timestamp: "2025-06-01T12:00:00Z".to_string(),
        };
        let converted = entry_from_record(&record).unwrap();
        assert_eq!(converted.accuracy_m, 0.0);
    }
}
