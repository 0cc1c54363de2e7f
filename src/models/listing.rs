use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::endpoint::ProxyEndpoint;

/// A candidate proxy offered to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyListing {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub country: String,
    pub anonymity: String,
    pub uptime: Option<f64>,
    pub timeout: Option<f64>,
    /// `scheme://ip:port`, ready to hand back to the browse endpoint
    pub proxy: ProxyEndpoint,
}

/// Filters accepted by the proxy list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyListQuery {
    pub protocol: Option<String>,
    pub country: Option<String>,
    pub limit: Option<usize>,
}

impl ProxyListQuery {
    pub fn matches(&self, listing: &ProxyListing) -> bool {
        let protocol_ok = self
            .protocol
            .as_deref()
            .map_or(true, |p| p.is_empty() || listing.protocol.eq_ignore_ascii_case(p));
        let country_ok = self
            .country
            .as_deref()
            .map_or(true, |c| c.is_empty() || listing.country == c);
        protocol_ok && country_ok
    }

    pub fn apply(&self, listings: &[ProxyListing]) -> Vec<ProxyListing> {
        let limit = self.limit.unwrap_or(usize::MAX);
        listings
            .iter()
            .filter(|l| self.matches(l))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Proxy list response body
#[derive(Debug, Clone, Serialize)]
pub struct ProxyListResponse {
    pub proxies: Vec<ProxyListing>,
    pub fetched_at: DateTime<Utc>,
}

/// Best candidates first: highest uptime, then lowest timeout.
/// Entries missing a metric sort after entries that have it.
pub fn rank_listings(listings: &mut [ProxyListing]) {
    listings.sort_by(|a, b| {
        desc_missing_last(a.uptime, b.uptime).then_with(|| asc_missing_last(a.timeout, b.timeout))
    });
}

fn desc_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn asc_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
