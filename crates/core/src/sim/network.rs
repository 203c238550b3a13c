// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::services::{ConnectionData, ConnectionStatus, HttpClient, Network, WifiNetworkInfo};
use crate::{FirmwareError, FwResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// What the firmware asked the radio to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkLog {
    pub scans: u32,
    pub connects: Vec<String>,
    pub disconnects: u32,
    pub reinits: u32,
}

#[derive(Debug, Default)]
struct Radio {
    in_range: Vec<WifiNetworkInfo>,
    password: Option<String>,
    ipv4: String,
    results: Vec<WifiNetworkInfo>,
    status: ConnectionStatus,
    ssid: String,
    attempt: Option<(String, String)>,
    log: NetworkLog,
}

/// Wi-Fi radio with a fixed set of access points. A connection attempt is
/// resolved on the next `poll`.
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    radio: Arc<Mutex<Radio>>,
}

impl SimNetwork {
    pub fn new(in_range: Vec<WifiNetworkInfo>) -> Self {
        let s = Self::default();
        {
            let mut radio = s.radio();
            radio.in_range = in_range;
            radio.ipv4 = "192.168.1.64".to_string();
        }
        s
    }

    /// Only this password is accepted. Without one, any password is.
    pub fn with_password(self, password: &str) -> Self {
        self.radio().password = Some(password.to_string());
        self
    }

    pub fn with_ipv4(self, ipv4: &str) -> Self {
        self.radio().ipv4 = ipv4.to_string();
        self
    }

    /// Forces the status, as a dropped link would.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.radio().status = status;
    }

    pub fn log(&self) -> NetworkLog {
        self.radio().log.clone()
    }

    fn radio(&self) -> MutexGuard<'_, Radio> {
        self.radio.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Network for SimNetwork {
    fn connect(&mut self, ssid: &str, password: &str, _auth_mode: u16) -> FwResult<()> {
        let mut radio = self.radio();
        radio.log.connects.push(ssid.to_string());
        radio.attempt = Some((ssid.to_string(), password.to_string()));
        radio.status = ConnectionStatus::Connecting;
        Ok(())
    }

    fn disconnect(&mut self) -> FwResult<()> {
        let mut radio = self.radio();
        radio.log.disconnects += 1;
        radio.attempt = None;
        radio.ssid.clear();
        radio.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    fn reinit(&mut self) -> FwResult<()> {
        let mut radio = self.radio();
        radio.log.reinits += 1;
        radio.results.clear();
        radio.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    fn start_scan(&mut self) -> FwResult<()> {
        let mut radio = self.radio();
        radio.log.scans += 1;
        radio.results = radio.in_range.clone();
        Ok(())
    }

    fn scan_results(&self) -> Vec<WifiNetworkInfo> {
        self.radio().results.clone()
    }

    fn status(&self) -> ConnectionStatus {
        self.radio().status
    }

    fn connection(&self) -> ConnectionData {
        let radio = self.radio();
        let connected = radio.status == ConnectionStatus::ConnectedWifiIp;
        ConnectionData {
            ssid: radio.ssid.clone(),
            ipv4_address: if connected {
                radio.ipv4.clone()
            } else {
                String::new()
            },
            ipv6_address: String::new(),
            status: radio.status,
        }
    }

    fn poll(&mut self) {
        let mut radio = self.radio();
        let Some((ssid, password)) = radio.attempt.take() else {
            return;
        };
        let known = radio.in_range.iter().any(|n| n.ssid == ssid);
        let accepted = radio.password.as_deref().map_or(true, |p| p == password);
        let status = match (known, accepted) {
            (false, _) => ConnectionStatus::ConnectFailedError,
            (true, false) => ConnectionStatus::BadAuthError,
            (true, true) => ConnectionStatus::ConnectedWifiIp,
        };
        if status == ConnectionStatus::ConnectedWifiIp {
            radio.ssid = ssid.clone();
        }
        radio.status = status;
        debug!(ssid = %ssid, status = ?radio.status, "Association finished");
    }
}

#[derive(Debug, Default)]
struct Routes {
    bodies: BTreeMap<String, Vec<u8>>,
    requests: Vec<String>,
}

/// HTTP client answering from fixed bodies keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct FixtureHttp {
    routes: Arc<Mutex<Routes>>,
}

impl FixtureHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, body: &[u8]) -> Self {
        self.routes().bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.routes().requests.clone()
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HttpClient for FixtureHttp {
    fn get(&mut self, url: &str) -> FwResult<Vec<u8>> {
        let mut routes = self.routes();
        routes.requests.push(url.to_string());
        routes
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FirmwareError::Http {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Vec<WifiNetworkInfo> {
        vec![WifiNetworkInfo {
            ssid: "home".into(),
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            auth_mode: 3,
        }]
    }

    #[test]
    fn test_connection_resolves_on_poll() {
        let mut net = SimNetwork::new(home()).with_password("secret");
        net.connect("home", "wrong", 3).unwrap();
        assert_eq!(net.status(), ConnectionStatus::Connecting);
        net.poll();
        assert_eq!(net.status(), ConnectionStatus::BadAuthError);

        net.connect("home", "secret", 3).unwrap();
        net.poll();
        let c = net.connection();
        assert_eq!(c.status, ConnectionStatus::ConnectedWifiIp);
        assert_eq!(c.ssid, "home");
        assert_eq!(c.ipv4_address, "192.168.1.64");
        assert_eq!(net.log().connects, vec!["home", "home"]);
    }

    #[test]
    fn test_scan_results_need_a_scan() {
        let mut net = SimNetwork::new(home());
        assert!(net.scan_results().is_empty());
        net.start_scan().unwrap();
        assert_eq!(net.scan_results().len(), 1);
    }

    #[test]
    fn test_fixture_http_records_requests() {
        let mut http = FixtureHttp::new().with("http://x/a", b"body");
        assert_eq!(http.get("http://x/a").unwrap(), b"body");
        assert!(matches!(http.get("http://x/b"), Err(FirmwareError::Http { .. })));
        assert_eq!(http.requests().len(), 2);
    }
}
