use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt::Display;

use chrono::{Local, TimeZone, Utc};
use common::{ActivityRecord, DecodeError, StatusDocument};

pub mod poller;

pub use poller::{
    CycleOutcome, DEFAULT_REQUEST_TIMEOUT, POLL_INTERVAL, PollerHandle, StatusPoller,
    StatusSource, ViewSink, run_cycle,
};

pub const FRESH_COLOR: &str = "#B6DB49";
pub const OUTDATED_COLOR: &str = "#FF7979";

pub const PEER_TABLE_HEADER: [&str; 5] = ["#", "Id", "Last Seen", "Address", "Port"];
pub const EVICT_TABLE_HEADER: [&str; 4] = ["#", "Plugin", "Cache", "Key"];

pub const SELF_LABEL: &str = "Self";
pub const LAST_SEEN_PLACEHOLDER: &str = "-";
pub const INVALID_DATE: &str = "Invalid Date";

const LAST_SEEN_FORMAT: &str = "%a %b %d %Y %H:%M:%S GMT%z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Outdated,
}

impl Freshness {
    /// A peer is fresh while strictly less than `threshold_millis` has passed
    /// since it was last seen.
    pub fn classify(now_millis: i64, last_seen_millis: i64, threshold_millis: i64) -> Self {
        if now_millis.saturating_sub(last_seen_millis) < threshold_millis {
            Self::Fresh
        } else {
            Self::Outdated
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Fresh => FRESH_COLOR,
            Self::Outdated => OUTDATED_COLOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRow {
    /// `Self` for the local node, otherwise the zero-based position.
    pub label: String,
    pub peer_id: String,
    pub last_seen: String,
    pub host: String,
    pub port: String,
    /// `None` for the self row, which is never colored.
    pub freshness: Option<Freshness>,
}

impl PeerRow {
    pub fn cells(&self) -> [&str; 5] {
        [
            self.label.as_str(),
            self.peer_id.as_str(),
            self.last_seen.as_str(),
            self.host.as_str(),
            self.port.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictRow {
    pub plugin_name: String,
    pub cache_name: String,
    pub key: String,
}

impl EvictRow {
    pub fn cells(&self) -> [&str; 3] {
        [
            self.plugin_name.as_str(),
            self.cache_name.as_str(),
            self.key.as_str(),
        ]
    }
}

/// Rows of the peer and eviction tables for one render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusView {
    pub peer_rows: Vec<PeerRow>,
    pub evict_rows: Vec<EvictRow>,
}

impl StatusView {
    pub fn build(document: &StatusDocument, now_millis: i64) -> Result<Self, DecodeError> {
        Self::build_in_zone(document, now_millis, &Local)
    }

    pub fn build_in_zone<Tz>(
        document: &StatusDocument,
        now_millis: i64,
        zone: &Tz,
    ) -> Result<Self, DecodeError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let self_peer = &document.self_peer;
        let mut peer_rows = Vec::with_capacity(document.activities.len() + 1);
        peer_rows.push(PeerRow {
            label: SELF_LABEL.to_string(),
            peer_id: self_peer.id.to_string(),
            last_seen: LAST_SEEN_PLACEHOLDER.to_string(),
            host: self_peer.receive_host()?,
            port: self_peer.receive_port()?,
            freshness: None,
        });

        for (index, activity) in sort_activities(&document.activities)
            .into_iter()
            .enumerate()
        {
            let peer = &activity.peer;
            peer_rows.push(PeerRow {
                label: index.to_string(),
                peer_id: peer.id.to_string(),
                last_seen: format_last_seen(activity.last_seen, zone),
                host: peer.receive_host()?,
                port: peer.receive_port()?,
                freshness: Some(Freshness::classify(
                    now_millis,
                    activity.last_seen,
                    document.outdated_threshold,
                )),
            });
        }

        let evict_rows = document
            .recent_evicts
            .iter()
            .map(|evict| EvictRow {
                plugin_name: evict.plugin_name.clone(),
                cache_name: evict.cache_name.clone(),
                key: evict.key.clone(),
            })
            .collect();

        Ok(Self {
            peer_rows,
            evict_rows,
        })
    }
}

/// Orders activities by descending `last_seen`, keeping input order for
/// equal timestamps.
///
/// Records sharing a peer id always keep their relative input order. When
/// a peer's later record carries a newer timestamp, its records are put
/// back into input order across the slots they occupy after sorting, so
/// descending order yields only between those records.
pub fn sort_activities(activities: &[ActivityRecord]) -> Vec<&ActivityRecord> {
    let mut sorted: Vec<&ActivityRecord> = activities.iter().collect();
    sorted.sort_by_key(|activity| Reverse(activity.last_seen));

    let mut by_peer: HashMap<&str, Vec<usize>> = HashMap::new();
    for (slot, activity) in sorted.iter().enumerate() {
        by_peer.entry(activity.peer.id.as_str()).or_default().push(slot);
    }

    let mut restored = sorted.clone();
    for activity in activities {
        if let Some(slots) = by_peer.get_mut(activity.peer.id.as_str())
            && !slots.is_empty()
        {
            restored[slots.remove(0)] = activity;
        }
    }
    restored
}

pub fn format_last_seen<Tz>(last_seen_millis: i64, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match zone.timestamp_millis_opt(last_seen_millis).single() {
        Some(at) => at.format(LAST_SEEN_FORMAT).to_string(),
        None => INVALID_DATE.to_string(),
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
