//! In-memory stand-ins for the worker's collaborators, shared by unit tests.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::lock::{LockError, LockHandle, LockManager};
use crate::mail::{EmailMessage, MailError, Mailer};
use crate::powerdns::types::*;
use crate::powerdns::{PdnsError, ZoneApi};
use crate::publish::batch::PublishBatch;
use crate::queue::{QueueError, TaskQueue};
use crate::registry::{DomainRecord, HostRecord, RegistrarContact, RegistryError, RegistryStore};
use crate::validation::strip_trailing_dot;
use crate::writer::{DnsWriter, DnsWriterFactory, WriterError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub const SAMPLE_CONFIG: &str = r#"
    [powerdns]
    base_url = "http://127.0.0.1:8081/api/v1"
    api_key = "secret"
    dnssec_enabled = true
    tsig_enabled = true
    root_nameservers = ["A.NIC.test", "b.nic.test."]
    soa_contact = "hostmaster.nic.test"

    [publish]
    task_queue_url = "http://queue.internal/tasks/dns-publish"

    [email]
    relay_url = "http://mail.internal/send"
    subject = "DNS update failed"
    body_template = "Dear {registrar}, publishing {kind} {name} failed. Contact {support_email}. {registry_name}"
    registry_name = "Example Registry"
    support_email = "support@registry.test"
    bcc_email = "ops@registry.test"

    [queue_auth]
    username = "queue"
    password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$aGFzaA"
"#;

pub fn sample_config() -> AppConfig {
    AppConfig::from_toml(SAMPLE_CONFIG).unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

//------------ FakeClock ------------------------------------------------------

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(t0()),
        }
    }
}

impl FakeClock {
    pub fn advance(&self, by: chrono::Duration) {
        *lock(&self.now) += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.now) = to;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

//------------ FakeZoneApi ----------------------------------------------------

#[derive(Default)]
pub struct FakePdns {
    pub zones: BTreeMap<String, PdnsZone>,
    pub keys: HashMap<String, Vec<PdnsCryptokey>>,
    pub metadata: HashMap<(String, String), Vec<String>>,
    pub tsig_keys: HashMap<String, PdnsTsigKey>,
    pub patches: Vec<(String, Vec<PdnsRrset>)>,
    pub settings: Vec<(String, PdnsZoneSettings)>,
    pub calls: Vec<&'static str>,
    pub failing: HashSet<&'static str>,
    next_key_id: u32,
}

/// An in-memory PowerDNS server with a call log and per-operation failure injection.
#[derive(Default)]
pub struct FakeZoneApi {
    state: Mutex<FakePdns>,
}

impl FakeZoneApi {
    pub fn state(&self) -> MutexGuard<'_, FakePdns> {
        lock(&self.state)
    }

    /// Add a zone with apex SOA and NS, as PowerDNS would return it.
    pub fn add_zone(&self, name: &str, soa: &str, ns: &[&str]) -> PdnsZone {
        let ns: Vec<String> = ns.iter().map(|s| s.to_string()).collect();
        let zone = PdnsZone {
            id: name.to_string(),
            name: name.to_string(),
            kind: Some("Master".into()),
            serial: Some(2025060101),
            dnssec: false,
            account: Some(String::new()),
            rrsets: vec![
                PdnsRrset::replace(name, "SOA", 3600, &[soa.to_string()]),
                PdnsRrset::replace(name, "NS", 3600, &ns),
            ],
        };
        self.state().zones.insert(zone.id.clone(), zone.clone());
        zone
    }

    pub fn add_key(&self, zone_id: &str, keytype: KeyType, active: bool) -> u32 {
        let mut state = self.state();
        state.next_key_id += 1;
        let id = state.next_key_id;
        let mut key = PdnsCryptokey::new(keytype, 1024, active, true, "rsasha256");
        key.id = Some(id);
        state.keys.entry(zone_id.to_string()).or_default().push(key);
        if let Some(zone) = state.zones.get_mut(zone_id) {
            zone.dnssec = true;
        }
        id
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    pub fn keys(&self, zone_id: &str) -> Vec<PdnsCryptokey> {
        self.state().keys.get(zone_id).cloned().unwrap_or_default()
    }

    pub fn zone(&self, zone_id: &str) -> PdnsZone {
        self.state().zones[zone_id].clone()
    }

    fn begin(&self, op: &'static str) -> Result<MutexGuard<'_, FakePdns>, PdnsError> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failing.contains(op) {
            return Err(PdnsError::Status {
                op,
                status: 500,
                message: "injected failure".into(),
            });
        }
        Ok(state)
    }
}

fn apply_rrsets(zone: &mut PdnsZone, rrsets: &[PdnsRrset]) {
    for rr in rrsets {
        zone.rrsets
            .retain(|existing| !(existing.name == rr.name && existing.rrtype == rr.rrtype));
        if rr.changetype != Some(ChangeType::Delete) {
            let mut stored = rr.clone();
            stored.changetype = None;
            zone.rrsets.push(stored);
        }
    }
}

#[async_trait]
impl ZoneApi for FakeZoneApi {
    async fn list_zones(&self) -> Result<Vec<PdnsZone>, PdnsError> {
        let state = self.begin("list_zones")?;
        Ok(state
            .zones
            .values()
            .map(|z| PdnsZone {
                rrsets: Vec::new(),
                ..z.clone()
            })
            .collect())
    }

    async fn get_zone(&self, zone_id: &str) -> Result<PdnsZone, PdnsError> {
        let state = self.begin("get_zone")?;
        state
            .zones
            .get(zone_id)
            .cloned()
            .ok_or(PdnsError::NotFound { op: "get_zone" })
    }

    async fn create_zone(&self, zone: &PdnsZoneCreate) -> Result<PdnsZone, PdnsError> {
        drop(self.begin("create_zone")?);
        // Give concurrent resolvers a chance to race.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut state = self.state();
        let mut created = PdnsZone {
            id: zone.name.clone(),
            name: zone.name.clone(),
            kind: Some(zone.kind.clone()),
            serial: Some(1),
            dnssec: false,
            account: Some(String::new()),
            rrsets: Vec::new(),
        };
        apply_rrsets(&mut created, &zone.rrsets);
        state.zones.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn patch_zone(&self, zone_id: &str, rrsets: &[PdnsRrset]) -> Result<(), PdnsError> {
        let mut state = self.begin("patch_zone")?;
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or(PdnsError::NotFound { op: "patch_zone" })?;
        apply_rrsets(zone, rrsets);
        state.patches.push((zone_id.to_string(), rrsets.to_vec()));
        Ok(())
    }

    async fn update_zone(
        &self,
        zone_id: &str,
        settings: &PdnsZoneSettings,
    ) -> Result<(), PdnsError> {
        let mut state = self.begin("update_zone")?;
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or(PdnsError::NotFound { op: "update_zone" })?;
        if let Some(account) = &settings.account {
            zone.account = Some(account.clone());
        }
        state.settings.push((zone_id.to_string(), settings.clone()));
        Ok(())
    }

    async fn rectify_zone(&self, _zone_id: &str) -> Result<(), PdnsError> {
        drop(self.begin("rectify_zone")?);
        Ok(())
    }

    async fn list_cryptokeys(&self, zone_id: &str) -> Result<Vec<PdnsCryptokey>, PdnsError> {
        let state = self.begin("list_cryptokeys")?;
        Ok(state.keys.get(zone_id).cloned().unwrap_or_default())
    }

    async fn create_cryptokey(
        &self,
        zone_id: &str,
        key: &PdnsCryptokey,
    ) -> Result<PdnsCryptokey, PdnsError> {
        let mut state = self.begin("create_cryptokey")?;
        state.next_key_id += 1;
        let mut created = key.clone();
        created.id = Some(state.next_key_id);
        if created.keytype == KeyType::Ksk {
            created.ds = vec![format!("{} 8 2 ABCDEF", 10000 + state.next_key_id)];
        }
        state
            .keys
            .entry(zone_id.to_string())
            .or_default()
            .push(created.clone());
        if let Some(zone) = state.zones.get_mut(zone_id) {
            zone.dnssec = true;
        }
        Ok(created)
    }

    async fn set_cryptokey_active(
        &self,
        zone_id: &str,
        key_id: u32,
        active: bool,
    ) -> Result<(), PdnsError> {
        let mut state = self.begin("set_cryptokey_active")?;
        let key = state
            .keys
            .get_mut(zone_id)
            .and_then(|keys| keys.iter_mut().find(|k| k.id == Some(key_id)))
            .ok_or(PdnsError::NotFound {
                op: "set_cryptokey_active",
            })?;
        key.active = active;
        Ok(())
    }

    async fn delete_cryptokey(&self, zone_id: &str, key_id: u32) -> Result<(), PdnsError> {
        let mut state = self.begin("delete_cryptokey")?;
        if let Some(keys) = state.keys.get_mut(zone_id) {
            keys.retain(|k| k.id != Some(key_id));
        }
        Ok(())
    }

    async fn get_metadata(&self, zone_id: &str, kind: &str) -> Result<PdnsMetadata, PdnsError> {
        let state = self.begin("get_metadata")?;
        state
            .metadata
            .get(&(zone_id.to_string(), kind.to_string()))
            .map(|values| PdnsMetadata {
                kind: kind.to_string(),
                metadata: values.clone(),
            })
            .ok_or(PdnsError::NotFound { op: "get_metadata" })
    }

    async fn create_metadata(
        &self,
        zone_id: &str,
        metadata: &PdnsMetadata,
    ) -> Result<(), PdnsError> {
        let mut state = self.begin("create_metadata")?;
        state
            .metadata
            .entry((zone_id.to_string(), metadata.kind.clone()))
            .or_default()
            .extend(metadata.metadata.iter().cloned());
        Ok(())
    }

    async fn get_tsig_key(&self, name: &str) -> Result<PdnsTsigKey, PdnsError> {
        let state = self.begin("get_tsig_key")?;
        state
            .tsig_keys
            .get(name)
            .cloned()
            .ok_or(PdnsError::NotFound { op: "get_tsig_key" })
    }

    async fn create_tsig_key(&self, key: &PdnsTsigKey) -> Result<PdnsTsigKey, PdnsError> {
        let mut state = self.begin("create_tsig_key")?;
        let mut created = key.clone();
        created.id = Some(format!("{}.", key.name));
        state.tsig_keys.insert(key.name.clone(), created.clone());
        Ok(created)
    }
}

//------------ FakeRegistry ---------------------------------------------------

#[derive(Default)]
pub struct RegistryData {
    pub shard_counts: HashMap<String, u32>,
    pub domains: HashMap<String, DomainRecord>,
    pub hosts: HashMap<String, HostRecord>,
    pub registrars: HashMap<String, RegistrarContact>,
    pub refreshes: Vec<(Vec<String>, Vec<String>)>,
}

#[derive(Default)]
pub struct FakeRegistry {
    data: Mutex<RegistryData>,
}

impl FakeRegistry {
    pub fn data(&self) -> MutexGuard<'_, RegistryData> {
        lock(&self.data)
    }

    pub fn with_shards(self, tld: &str, count: u32) -> Self {
        self.data().shard_counts.insert(tld.to_string(), count);
        self
    }

    pub fn add_domain(&self, domain: DomainRecord) {
        self.data()
            .domains
            .insert(strip_trailing_dot(&domain.name), domain);
    }

    pub fn add_host(&self, host: HostRecord) {
        self.data().hosts.insert(strip_trailing_dot(&host.name), host);
    }

    pub fn add_registrar(&self, registrar: RegistrarContact) {
        self.data().registrars.insert(registrar.id.clone(), registrar);
    }
}

#[async_trait]
impl RegistryStore for FakeRegistry {
    async fn publish_shard_count(&self, tld: &str) -> Result<Option<u32>, RegistryError> {
        Ok(self.data().shard_counts.get(tld).copied())
    }

    async fn load_domain(&self, name: &str) -> Result<Option<DomainRecord>, RegistryError> {
        Ok(self.data().domains.get(&strip_trailing_dot(name)).cloned())
    }

    async fn load_host(&self, name: &str) -> Result<Option<HostRecord>, RegistryError> {
        Ok(self.data().hosts.get(&strip_trailing_dot(name)).cloned())
    }

    async fn load_registrar(&self, id: &str) -> Result<Option<RegistrarContact>, RegistryError> {
        Ok(self.data().registrars.get(id).cloned())
    }

    async fn request_refresh(
        &self,
        domains: &[String],
        hosts: &[String],
        _now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.data()
            .refreshes
            .push((domains.to_vec(), hosts.to_vec()));
        Ok(())
    }
}

//------------ FakeLocks ------------------------------------------------------

#[derive(Default)]
pub struct FakeLocks {
    held: Mutex<HashSet<(String, String)>>,
    pub acquired: Mutex<Vec<String>>,
    pub released: Mutex<Vec<String>>,
}

impl FakeLocks {
    /// Mark a lock as held by someone else.
    pub fn hold(&self, resource: &str, name: &str) {
        lock(&self.held).insert((resource.to_string(), name.to_string()));
    }

    pub fn is_held(&self, resource: &str, name: &str) -> bool {
        lock(&self.held).contains(&(resource.to_string(), name.to_string()))
    }
}

#[async_trait]
impl LockManager for FakeLocks {
    async fn try_acquire(
        &self,
        resource: &str,
        name: &str,
        _lease: Duration,
    ) -> Result<Option<LockHandle>, LockError> {
        if !lock(&self.held).insert((resource.to_string(), name.to_string())) {
            return Ok(None);
        }
        lock(&self.acquired).push(format!("{resource}/{name}"));
        Ok(Some(LockHandle {
            resource: resource.to_string(),
            name: name.to_string(),
            owner: "fake".into(),
        }))
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        lock(&self.held).remove(&(handle.resource.clone(), handle.name.clone()));
        lock(&self.released).push(format!("{}/{}", handle.resource, handle.name));
        Ok(())
    }
}

//------------ RecordingQueue / RecordingMailer -------------------------------

#[derive(Default)]
pub struct RecordingQueue {
    pub batches: Mutex<Vec<PublishBatch>>,
}

impl RecordingQueue {
    pub fn batches(&self) -> Vec<PublishBatch> {
        lock(&self.batches).clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, batch: &PublishBatch) -> Result<(), QueueError> {
        lock(&self.batches).push(batch.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

//------------ ScriptedWriter -------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct WriterLog {
    pub domains: Vec<String>,
    pub hosts: Vec<String>,
    pub commits: usize,
}

/// Writer factory whose writers record what they were given and fail commits on demand.
pub struct ScriptedWriterFactory {
    name: String,
    fail_commits: AtomicBool,
    stall_commits: AtomicBool,
    log: Arc<Mutex<WriterLog>>,
}

impl ScriptedWriterFactory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_commits: AtomicBool::new(false),
            stall_commits: AtomicBool::new(false),
            log: Arc::default(),
        }
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Commits never finish, like a backend that stopped answering.
    pub fn stall_commits(&self, stall: bool) {
        self.stall_commits.store(stall, Ordering::SeqCst);
    }

    pub fn log(&self) -> WriterLog {
        lock(&self.log).clone()
    }
}

impl DnsWriterFactory for ScriptedWriterFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _tld: &str) -> Box<dyn DnsWriter> {
        Box::new(ScriptedWriter {
            fail: self.fail_commits.load(Ordering::SeqCst),
            stall: self.stall_commits.load(Ordering::SeqCst),
            log: self.log.clone(),
        })
    }
}

pub struct ScriptedWriter {
    fail: bool,
    stall: bool,
    log: Arc<Mutex<WriterLog>>,
}

#[async_trait]
impl DnsWriter for ScriptedWriter {
    fn publish_domain(&mut self, name: &str) {
        lock(&self.log).domains.push(name.to_string());
    }

    fn publish_host(&mut self, name: &str) {
        lock(&self.log).hosts.push(name.to_string());
    }

    async fn commit(&mut self) -> Result<(), WriterError> {
        lock(&self.log).commits += 1;
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(WriterError::Patch(PdnsError::Status {
                op: "patch_zone",
                status: 503,
                message: "backend unavailable".into(),
            }));
        }
        Ok(())
    }
}
