// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end scenario suite: a wiremock-backed
//! controller, fake integrations and delivery adapters, and a pipeline
//! builder wiring the real components together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unireport::aggregate::{Aggregator, RoamFlappingDetector, ThreatSummaryAggregator};
use unireport::checkpoint::CheckpointStore;
use unireport::collect::push::{PushBuffer, PushCollector};
use unireport::collect::rest::RestCollector;
use unireport::collect::{CollectWindow, Collector, Orchestrator};
use unireport::config::Config;
use unireport::deliver::Delivery;
use unireport::health::HealthFile;
use unireport::integrations::{Integration, IntegrationRunner};
use unireport::model::{DeviceStats, IntegrationSection, Report};
use unireport::pipeline::{Pipeline, StatsSource};
use unireport::render::RenderedReport;
use unireport::rules::builtin::default_registry;
use unireport::session::ControllerSession;

/// A mock UniFi OS controller with login and site endpoints mounted.
pub struct TestController {
    pub server: MockServer,
}

impl TestController {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-csrf-token", "spec-token")
                    .set_body_json(json!({"unique_id": "spec"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/network/api/self/sites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"rc": "ok"},
                "data": [{"name": "default", "desc": "Default"}]
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub async fn mount_events(&self, records: Vec<Value>) {
        let count = records.len();
        Mock::given(method("POST"))
            .and(path("/proxy/network/api/s/default/stat/event"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"rc": "ok", "count": count},
                "data": records
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_empty_alarms_and_devices(&self) {
        Mock::given(method("POST"))
            .and(path("/proxy/network/api/s/default/stat/alarm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"rc": "ok"},
                "data": []
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/proxy/network/api/s/default/stat/device"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"rc": "ok"},
                "data": []
            })))
            .mount(&self.server)
            .await;
    }

    pub fn config(&self) -> anyhow::Result<Config> {
        use clap::Parser;
        Ok(Config::try_parse_from([
            "unireport",
            "--host",
            &self.server.uri(),
            "--username",
            "reporter",
            "--password",
            "hunter2",
            "--site",
            "default",
        ])?)
    }

    pub fn session(&self) -> anyhow::Result<Arc<ControllerSession>> {
        Ok(Arc::new(ControllerSession::new(&self.config()?)?))
    }
}

pub fn roam_record(id: &str, ts_ms: i64, user: &str, ap_from: &str, ap_to: &str) -> Value {
    json!({
        "_id": id,
        "key": "EVT_WU_Roam",
        "time": ts_ms,
        "user": user,
        "ap_from": ap_from,
        "ap_to": ap_to,
        "msg": format!("User[{user}] roamed from {ap_from} to {ap_to}")
    })
}

pub fn ips_record(id: &str, ts_ms: i64, src_ip: &str, signature_id: u64, action: &str) -> Value {
    json!({
        "_id": id,
        "key": "EVT_IPS_IpsAlert",
        "time": ts_ms,
        "inner_alert_signature_id": signature_id,
        "inner_alert_signature": "ET EXPLOIT remote probe",
        "inner_alert_category": "exploit",
        "inner_alert_action": action,
        "src_ip": src_ip,
        "dst_ip": "10.0.0.5",
        "proto": "TCP",
        "msg": "IPS Alert"
    })
}

/// Delivery adapter that records rendered reports and can be told to fail.
pub struct RecordingDelivery {
    pub delivered: parking_lot::Mutex<Vec<(Report, RenderedReport)>>,
    pub fail: bool,
}

impl RecordingDelivery {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self { delivered: parking_lot::Mutex::new(Vec::new()), fail })
    }
}

#[async_trait::async_trait]
impl Delivery for RecordingDelivery {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, report: &Report, rendered: &RenderedReport) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow::anyhow!("smtp relay unreachable"));
        }
        self.delivered.lock().push((report.clone(), rendered.clone()));
        Ok(())
    }
}

/// Integration that either returns a section immediately or hangs forever.
pub struct SpecIntegration {
    name: &'static str,
    hang: bool,
}

impl SpecIntegration {
    pub fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name, hang: false })
    }

    pub fn hanging(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name, hang: true })
    }
}

#[async_trait::async_trait]
impl Integration for SpecIntegration {
    fn name(&self) -> &'static str {
        self.name
    }

    fn title(&self) -> &'static str {
        "Spec integration"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn validate_config(&self) -> Option<String> {
        None
    }

    async fn fetch(&self, _window: CollectWindow) -> anyhow::Result<IntegrationSection> {
        if self.hang {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        Ok(IntegrationSection {
            name: self.name.to_owned(),
            title: self.title().to_owned(),
            items: vec![("status".to_owned(), "ok".to_owned())],
            error: None,
        })
    }
}

/// Device-state source backed by canned snapshots.
pub struct FakeStatsSource {
    pub stats: Vec<DeviceStats>,
}

#[async_trait::async_trait]
impl StatsSource for FakeStatsSource {
    async fn device_stats(&self) -> anyhow::Result<Vec<DeviceStats>> {
        Ok(self.stats.clone())
    }
}

/// A device snapshot hot enough to raise a severe health finding.
pub fn overheating_device(name: &str, temperature_c: f64) -> DeviceStats {
    DeviceStats {
        mac: "aa:bb:cc:00:11:22".to_owned(),
        name: name.to_owned(),
        device_type: "usw".to_owned(),
        model: None,
        uptime_s: Some(86_400),
        cpu_pct: None,
        mem_pct: None,
        temperature_c: Some(temperature_c),
        poe_draw_w: None,
        poe_budget_w: None,
    }
}

/// Everything a scenario needs to drive and observe one pipeline.
pub struct SpecHarness {
    pub pipeline: Pipeline,
    pub runner: Arc<IntegrationRunner>,
    pub delivery: Arc<RecordingDelivery>,
    pub checkpoint: CheckpointStore,
    pub health: HealthFile,
    pub reports_dir: tempfile::TempDir,
}

pub struct SpecHarnessBuilder {
    pub collectors: Vec<Arc<dyn Collector>>,
    pub integrations: Vec<Arc<dyn Integration>>,
    pub integration_timeout: std::time::Duration,
    pub delivery_fails: bool,
    pub min_entries: usize,
    pub device_stats: Vec<DeviceStats>,
}

impl Default for SpecHarnessBuilder {
    fn default() -> Self {
        Self {
            collectors: Vec::new(),
            integrations: Vec::new(),
            integration_timeout: std::time::Duration::from_millis(200),
            delivery_fails: false,
            min_entries: 10,
            device_stats: Vec::new(),
        }
    }
}

impl SpecHarnessBuilder {
    pub fn with_rest(mut self, session: Arc<ControllerSession>) -> Self {
        self.collectors.push(Arc::new(RestCollector::new(session)));
        self
    }

    pub fn with_push_buffer(mut self, buffer: Arc<PushBuffer>) -> Self {
        self.collectors.insert(0, Arc::new(PushCollector::new(buffer)));
        self
    }

    pub fn build(self) -> anyhow::Result<SpecHarness> {
        let reports_dir = tempfile::tempdir()?;
        let checkpoint = CheckpointStore::new(reports_dir.path());
        let health = HealthFile::new(reports_dir.path().join("health.json"));
        let delivery = RecordingDelivery::new(self.delivery_fails);
        let runner = Arc::new(IntegrationRunner::new(self.integrations, self.integration_timeout));
        let aggregators: Vec<Arc<dyn Aggregator>> = vec![
            Arc::new(RoamFlappingDetector::default()),
            Arc::new(ThreatSummaryAggregator::default()),
        ];
        let stats_source = if self.device_stats.is_empty() {
            None
        } else {
            Some(Arc::new(FakeStatsSource { stats: self.device_stats }) as Arc<dyn StatsSource>)
        };

        let pipeline = Pipeline::new(
            "default".to_owned(),
            "unifi-os".to_owned(),
            Arc::new(Orchestrator::new(self.collectors, self.min_entries)),
            Arc::clone(&runner),
            Arc::new(default_registry()?),
            aggregators,
            stats_source,
            Arc::clone(&delivery) as Arc<dyn Delivery>,
            checkpoint.clone(),
            health.clone(),
            chrono::Duration::hours(24),
            std::time::Duration::from_secs(30),
        );
        Ok(SpecHarness { pipeline, runner, delivery, checkpoint, health, reports_dir })
    }
}

/// Milliseconds for an instant `minutes` before now — spec records need
/// timestamps inside the run window.
pub fn minutes_ago_ms(minutes: i64) -> i64 {
    (Utc::now() - chrono::Duration::minutes(minutes)).timestamp_millis()
}

pub fn parse_ms(ms: i64) -> Option<DateTime<Utc>> {
    chrono::TimeZone::timestamp_millis_opt(&Utc, ms).single()
}
