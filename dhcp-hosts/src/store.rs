//! The read-validate-write cycle around a dhcpd.conf file.
//!
//! Each mutation holds the config lock while it reads the file, plans the
//! change and writes the result. The service restart and the audit entry
//! follow after the lock is released. A failed restart never fails the
//! operation; it comes back as a warning on the outcome.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use dhcpd_conf::{parse_file, write_file, ConfigDocument, HostRecord, Placement};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditSink, AuditStatus, ResourceType};
use crate::ip::{available_ips_in_range, ip_to_int, validate_ip};
use crate::lock::{ConfLock, LockError};
use crate::reconcile::{
    plan_create, plan_delete, plan_rename, plan_update, Plan, PlanError, RejectReason, Rejection,
};
use crate::rules::{load_rules, PolicyRules};
use crate::service::{RestartOutcome, ServiceController, ServiceStatus};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0}")]
    Rejected(Rejection),
    #[error("host {name} not found")]
    NotFound { name: String },
    #[error("storage failure on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("config {} is locked by another operation", path.display())]
    Locked { path: PathBuf },
}

impl HostError {
    /// True for failures caused by the request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, HostError::Rejected(_) | HostError::NotFound { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            HostError::Rejected(rejection) => rejection.reason.code(),
            HostError::NotFound { .. } => "not_found",
            HostError::Storage { .. } => "storage_failure",
            HostError::Locked { .. } => "locked",
        }
    }

    fn storage(path: &Path, source: impl Into<BoxError>) -> Self {
        HostError::Storage {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    fn audit_status(&self) -> AuditStatus {
        if self.is_client_error() {
            AuditStatus::Failure
        } else {
            AuditStatus::Error
        }
    }
}

impl From<PlanError> for HostError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Rejected(rejection) => HostError::Rejected(rejection),
            PlanError::NotFound { name } => HostError::NotFound { name },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Rename,
    Delete,
}

impl Operation {
    fn audit_action(self) -> AuditAction {
        match self {
            Operation::Create => AuditAction::Create,
            Operation::Update | Operation::Rename => AuditAction::Update,
            Operation::Delete => AuditAction::Delete,
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Update => "updated",
            Operation::Rename => "renamed",
            Operation::Delete => "deleted",
        }
    }
}

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub operation: Operation,
    pub host: HostRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<HostRecord>,
    /// Rule label for the host's address.
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    pub warnings: Vec<String>,
}

/// A host record annotated with the rule covering its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostView {
    #[serde(flatten)]
    pub host: HostRecord,
    pub rule: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_hosts: usize,
    pub total_rules: usize,
    pub total_used_ips: usize,
}

/// Host reservations backed by a dhcpd.conf file and a rules script.
pub struct HostStore {
    conf_path: PathBuf,
    rules_path: PathBuf,
    lock_timeout: Duration,
    actor: String,
    service: Box<dyn ServiceController>,
    audit: Box<dyn AuditSink>,
}

impl HostStore {
    pub fn new(
        conf_path: impl Into<PathBuf>,
        rules_path: impl Into<PathBuf>,
        service: Box<dyn ServiceController>,
        audit: Box<dyn AuditSink>,
    ) -> Self {
        Self {
            conf_path: conf_path.into(),
            rules_path: rules_path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            actor: "anonymous".to_string(),
            service,
            audit,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Name recorded as the actor of audit entries.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn load_document(&self) -> Result<ConfigDocument, HostError> {
        parse_file(&self.conf_path).map_err(|err| HostError::storage(&self.conf_path, err))
    }

    pub fn load_rules(&self) -> Result<PolicyRules, HostError> {
        load_rules(&self.rules_path).map_err(|err| HostError::storage(&self.rules_path, err))
    }

    pub fn hosts(&self) -> Result<Vec<HostView>, HostError> {
        let doc = self.load_document()?;
        let rules = self.load_rules()?;
        Ok(doc
            .hosts()
            .into_iter()
            .map(|host| HostView {
                rule: rules.label_for(&host.ip_address),
                host,
            })
            .collect())
    }

    pub fn stats(&self) -> Result<Stats, HostError> {
        let doc = self.load_document()?;
        let rules = self.load_rules()?;
        Ok(Stats {
            total_hosts: doc.hosts().len(),
            total_rules: rules.len(),
            total_used_ips: doc.used_ips().len(),
        })
    }

    /// Free addresses between `start` and `end` inclusive, at most `limit`.
    pub fn available(&self, start: &str, end: &str, limit: usize) -> Result<Vec<String>, HostError> {
        for ip in [start, end] {
            if !validate_ip(ip) {
                return Err(HostError::Rejected(Rejection::new(
                    RejectReason::InvalidIp,
                    format!("invalid IP address: {ip}"),
                )));
            }
        }
        if ip_to_int(start) > ip_to_int(end) {
            return Err(HostError::Rejected(Rejection::new(
                RejectReason::InvalidRange,
                format!("range start {start} is after range end {end}"),
            )));
        }

        let used = self.load_document()?.used_ips();
        Ok(available_ips_in_range(start, end, &used, limit))
    }

    pub fn create(&self, name: &str, mac: &str, ip: &str) -> Result<MutationOutcome, HostError> {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.mutate(Operation::Create, name, |doc, rules| {
            plan_create(doc, rules, name, mac, ip, &now)
        })
    }

    pub fn update(&self, name: &str, mac: &str, ip: &str) -> Result<MutationOutcome, HostError> {
        self.mutate(Operation::Update, name, |doc, rules| {
            plan_update(doc, rules, name, mac, ip)
        })
    }

    pub fn rename(&self, name: &str, new_name: &str) -> Result<MutationOutcome, HostError> {
        self.mutate(Operation::Rename, name, |doc, _| {
            plan_rename(doc, name, new_name)
        })
    }

    pub fn delete(&self, name: &str) -> Result<MutationOutcome, HostError> {
        self.mutate(Operation::Delete, name, |doc, _| plan_delete(doc, name))
    }

    pub fn service_status(&self) -> ServiceStatus {
        let status = self.service.status();
        info!(state = %status.state, "checked DHCP service status");
        status
    }

    /// Restart the service on request and audit the attempt.
    pub fn restart_service(&self) -> RestartOutcome {
        let outcome = self.service.restart();
        let mut entry = AuditEntry::new(&self.actor, AuditAction::Update, ResourceType::Config)
            .resource("dhcp-service")
            .details(json!({ "action": "restart", "message": outcome.message }));
        if outcome.success {
            info!("DHCP service restarted");
        } else {
            warn!("DHCP service restart failed: {}", outcome.message);
            entry = entry.failed(AuditStatus::Error, outcome.message.clone());
        }
        self.audit.record(entry);
        outcome
    }

    fn mutate<F>(
        &self,
        operation: Operation,
        resource: &str,
        planner: F,
    ) -> Result<MutationOutcome, HostError>
    where
        F: FnOnce(&ConfigDocument, &PolicyRules) -> Result<Plan, PlanError>,
    {
        let result = self.apply(planner);
        let entry = AuditEntry::new(&self.actor, operation.audit_action(), ResourceType::Host);

        let (plan, rules) = match result {
            Ok(applied) => applied,
            Err(err) => {
                warn!(
                    operation = ?operation,
                    host = resource,
                    code = err.code(),
                    "host {resource} not {}: {err}",
                    operation.past_tense()
                );
                self.audit.record(
                    entry
                        .resource(resource)
                        .failed(err.audit_status(), err.to_string()),
                );
                return Err(err);
            }
        };

        let mut warnings = Vec::new();
        if plan.placement == Some(Placement::AppendedAtEnd) {
            let message = format!(
                "no closing brace found in {}; host block appended at end of file",
                self.conf_path.display()
            );
            warn!("{message}");
            warnings.push(message);
        }

        let restart = self.service.restart();
        let restart_warning = (!restart.success).then(|| {
            warn!(host = %plan.host.name, "service restart after change failed: {}", restart.message);
            format!("host saved but service restart failed: {}", restart.message)
        });

        let mut details = audit_details(operation, &plan, &rules);
        if let (Some(warning), Value::Object(map)) = (&restart_warning, &mut details) {
            map.insert("restart_warning".to_string(), Value::String(warning.clone()));
        }
        warnings.extend(restart_warning);

        let resource_name = match operation {
            Operation::Rename => resource.to_string(),
            _ => plan.host.name.clone(),
        };
        self.audit
            .record(entry.resource(resource_name).details(details));
        info!(
            operation = ?operation,
            host = %plan.host.name,
            ip = %plan.host.ip_address,
            "host {}",
            operation.past_tense()
        );

        Ok(MutationOutcome {
            operation,
            rule: rules.label_for(&plan.host.ip_address),
            host: plan.host,
            previous: plan.previous,
            placement: plan.placement,
            warnings,
        })
    }

    /// Lock, read, plan and write. The lock is released on return.
    fn apply<F>(&self, planner: F) -> Result<(Plan, PolicyRules), HostError>
    where
        F: FnOnce(&ConfigDocument, &PolicyRules) -> Result<Plan, PlanError>,
    {
        let _lock = ConfLock::acquire(&self.conf_path, self.lock_timeout).map_err(|err| match err {
            LockError::Timeout(path) => HostError::Locked { path },
            LockError::Io { path, source } => HostError::storage(&path, source),
        })?;

        let doc = self.load_document()?;
        let rules = self.load_rules()?;
        let plan = planner(&doc, &rules)?;
        write_file(&plan.document, &self.conf_path)
            .map_err(|err| HostError::storage(&self.conf_path, err))?;
        Ok((plan, rules))
    }
}

fn audit_details(operation: Operation, plan: &Plan, rules: &PolicyRules) -> Value {
    let host = &plan.host;
    let rule_name = rules.label_for(&host.ip_address);
    match (operation, &plan.previous) {
        (Operation::Update, Some(old)) => {
            let old_data = json!({
                "mac_address": old.mac_address,
                "ip_address": old.ip_address,
                "rule_name": rules.label_for(&old.ip_address),
            });
            let new_data = json!({
                "mac_address": host.mac_address,
                "ip_address": host.ip_address,
                "rule_name": rule_name,
            });
            let mut changes = Map::new();
            for field in ["mac_address", "ip_address", "rule_name"] {
                if old_data[field] != new_data[field] {
                    changes.insert(
                        field.to_string(),
                        json!({ "from": old_data[field], "to": new_data[field] }),
                    );
                }
            }
            json!({ "old_data": old_data, "new_data": new_data, "changes": changes })
        }
        (Operation::Rename, Some(old)) => json!({
            "old_name": old.name,
            "new_name": host.name,
            "mac_address": host.mac_address,
            "ip_address": host.ip_address,
            "rule_name": rule_name,
        }),
        _ => json!({
            "host_name": host.name,
            "mac_address": host.mac_address,
            "ip_address": host.ip_address,
            "rule_name": rule_name,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::time::Duration;

    use dhcpd_conf::Placement;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::{HostError, HostStore, Operation};
    use crate::audit::{AuditAction, AuditEntry, AuditSink, AuditStatus, ResourceType};
    use crate::lock::ConfLock;
    use crate::reconcile::RejectReason;
    use crate::service::{RestartOutcome, ServiceController, ServiceState, ServiceStatus, SimulatedService};

    #[derive(Clone, Default)]
    struct MemoryAudit(Rc<RefCell<Vec<AuditEntry>>>);

    impl AuditSink for MemoryAudit {
        fn record(&self, entry: AuditEntry) {
            self.0.borrow_mut().push(entry);
        }
    }

    struct BrokenService;

    impl ServiceController for BrokenService {
        fn status(&self) -> ServiceStatus {
            ServiceStatus {
                state: ServiceState::Failed,
                message: "failed".to_string(),
                raw_output: String::new(),
            }
        }

        fn restart(&self) -> RestartOutcome {
            RestartOutcome {
                success: false,
                message: "unit masked".to_string(),
                raw_output: Some(String::new()),
            }
        }
    }

    fn fixture(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
    }

    struct Setup {
        dir: TempDir,
        audit: MemoryAudit,
        store: HostStore,
    }

    impl Setup {
        fn conf(&self) -> PathBuf {
            self.dir.path().join("dhcpd.conf")
        }

        fn entries(&self) -> Vec<AuditEntry> {
            self.audit.0.borrow().clone()
        }
    }

    fn setup_with(service: Box<dyn ServiceController>) -> Setup {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::copy(fixture("fixtures/dhcpd.conf"), dir.path().join("dhcpd.conf")).expect("copy conf");
        fs::copy(
            fixture("fixtures/ips_disponiveis.sh"),
            dir.path().join("ips_disponiveis.sh"),
        )
        .expect("copy rules");

        let audit = MemoryAudit::default();
        let store = HostStore::new(
            dir.path().join("dhcpd.conf"),
            dir.path().join("ips_disponiveis.sh"),
            service,
            Box::new(audit.clone()),
        )
        .with_actor("alice")
        .with_lock_timeout(Duration::from_millis(100));
        Setup { dir, audit, store }
    }

    fn setup() -> Setup {
        setup_with(Box::new(SimulatedService::new("isc-dhcp-server")))
    }

    #[test]
    fn lists_hosts_with_rules() {
        let s = setup();
        let hosts = s.store.hosts().expect("hosts");
        let labels: Vec<_> = hosts
            .iter()
            .map(|h| (h.host.name.as_str(), h.rule.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("printer1", "staff - full"),
                ("lab-switch", "lab - restricted"),
                ("nas.storage", "storage - full"),
            ]
        );
    }

    #[test]
    fn stats_count_hosts_rules_and_ips() {
        let stats = setup().store.stats().expect("stats");
        assert_eq!(stats.total_hosts, 3);
        assert_eq!(stats.total_rules, 4);
        assert_eq!(stats.total_used_ips, 3);
    }

    #[test]
    fn available_skips_used_addresses() {
        let s = setup();
        let free = s.store.available("10.0.0.14", "10.0.0.17", 10).expect("available");
        assert_eq!(free, vec!["10.0.0.14", "10.0.0.16", "10.0.0.17"]);

        let err = s.store.available("10.0.0.20", "10.0.0.10", 10).expect_err("reversed");
        assert_eq!(err.code(), "invalid_range");
        let err = s.store.available("10.0.0.300", "10.0.0.10", 10).expect_err("invalid");
        assert_eq!(err.code(), "invalid_ip");
        assert!(err.is_client_error());
    }

    #[test]
    fn create_writes_file_and_audits() {
        let s = setup();
        let outcome = s
            .store
            .create("camera 2", "aa-bb-cc-dd-ee-10", "10.0.0.31")
            .expect("create");

        assert_eq!(outcome.operation, Operation::Create);
        assert_eq!(outcome.host.name, "camera_2");
        assert_eq!(outcome.rule, "lab - restricted");
        assert_eq!(outcome.placement, Some(Placement::BeforeTerminator));
        assert!(outcome.warnings.is_empty());

        let doc = dhcpd_conf::parse_file(&s.conf()).expect("reparse");
        let created = doc.find_host("camera_2").expect("created");
        assert_eq!(created.mac_address, "AA:BB:CC:DD:EE:10");
        ConfLock::acquire(&s.conf(), Duration::from_millis(10)).expect("lock released");

        let entries = s.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "alice");
        assert_eq!(entries[0].action, AuditAction::Create);
        assert_eq!(entries[0].resource_type, ResourceType::Host);
        assert_eq!(entries[0].status, AuditStatus::Success);
        let details = entries[0].details.clone().expect("details");
        assert_eq!(details["host_name"], "camera_2");
        assert_eq!(details["rule_name"], "lab - restricted");
    }

    #[test]
    fn rejection_leaves_file_untouched_and_audits_failure() {
        let s = setup();
        let before = fs::read(s.conf()).expect("read");

        let err = s
            .store
            .create("dup", "AA:BB:CC:DD:EE:99", "10.0.0.15")
            .expect_err("ip in use");
        match &err {
            HostError::Rejected(rejection) => assert_eq!(rejection.reason, RejectReason::IpInUse),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fs::read(s.conf()).expect("read"), before);

        let entries = s.entries();
        assert_eq!(entries[0].status, AuditStatus::Failure);
        assert!(entries[0]
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("already in use"));
    }

    #[test]
    fn delete_missing_host_changes_nothing() {
        let s = setup();
        let before = fs::read(s.conf()).expect("read");

        let err = s.store.delete("ghost").expect_err("missing");
        assert!(matches!(err, HostError::NotFound { ref name } if name == "ghost"));
        assert_eq!(err.code(), "not_found");
        assert_eq!(fs::read(s.conf()).expect("read"), before);
    }

    #[test]
    fn delete_removes_host_and_its_trailer() {
        let s = setup();
        s.store.delete("nas.storage").expect("delete");

        let text = fs::read_to_string(s.conf()).expect("read");
        assert!(!text.contains("nas.storage"));
        assert!(!text.contains("2024-05-20 17:42:08"));
        assert!(text.ends_with("}\n"));
        assert_eq!(s.entries()[0].action, AuditAction::Delete);
    }

    #[test]
    fn update_records_changes() {
        let s = setup();
        let outcome = s
            .store
            .update("printer1", "AA:BB:CC:DD:EE:01", "10.0.0.55")
            .expect("update");
        assert_eq!(outcome.rule, "storage - full");

        let details = s.entries()[0].details.clone().expect("details");
        assert_eq!(details["old_data"]["ip_address"], "10.0.0.15");
        assert_eq!(details["new_data"]["ip_address"], "10.0.0.55");
        assert_eq!(details["changes"]["ip_address"]["to"], "10.0.0.55");
        assert_eq!(details["changes"]["rule_name"]["from"], "staff - full");
        assert!(details["changes"].get("mac_address").is_none());
    }

    #[test]
    fn rename_audits_old_and_new_names() {
        let s = setup();
        s.store.rename("lab-switch", "core switch").expect("rename");

        let entries = s.entries();
        assert_eq!(entries[0].resource_name.as_deref(), Some("lab-switch"));
        let details = entries[0].details.clone().expect("details");
        assert_eq!(details["old_name"], "lab-switch");
        assert_eq!(details["new_name"], "core_switch");
        assert_eq!(details["mac_address"], "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn restart_failure_is_a_warning() {
        let s = setup_with(Box::new(BrokenService));
        let outcome = s
            .store
            .create("camera", "AA:BB:CC:DD:EE:10", "10.0.0.31")
            .expect("create still succeeds");

        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("unit masked"));
        let entries = s.entries();
        assert_eq!(entries[0].status, AuditStatus::Success);
        let details = entries[0].details.clone().expect("details");
        assert!(details["restart_warning"]
            .as_str()
            .unwrap_or_default()
            .contains("unit masked"));
    }

    #[test]
    fn held_lock_reports_locked() {
        let s = setup();
        let _held = ConfLock::acquire(&s.conf(), Duration::from_millis(10)).expect("lock");

        let err = s.store.delete("printer1").expect_err("locked");
        assert!(matches!(err, HostError::Locked { .. }));
        assert!(!err.is_client_error());
        assert_eq!(s.entries()[0].status, AuditStatus::Error);
    }

    #[test]
    fn stale_lock_file_does_not_block_mutations() {
        let s = setup();
        fs::write(ConfLock::lock_path(&s.conf()), "999999\n").expect("stale lock");

        s.store
            .create("cam", "AA:BB:CC:DD:EE:10", "10.0.0.31")
            .expect("first create");
        s.store
            .create("cam2", "AA:BB:CC:DD:EE:11", "10.0.0.32")
            .expect("second create");
        assert_eq!(s.store.stats().expect("stats").total_hosts, 5);
    }

    #[test]
    fn config_without_closing_brace_appends_with_warning() {
        let s = setup();
        fs::write(s.conf(), "authoritative;\n").expect("write conf");

        let outcome = s
            .store
            .create("cam", "AA:BB:CC:DD:EE:10", "10.0.0.31")
            .expect("create");

        assert_eq!(outcome.placement, Some(Placement::AppendedAtEnd));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("no closing brace found"));
        assert!(outcome.warnings[0].contains("appended at end of file"));

        let text = fs::read_to_string(s.conf()).expect("read conf");
        assert!(text.starts_with("authoritative;\n"));
        let doc = dhcpd_conf::parse_file(&s.conf()).expect("reparse");
        assert_eq!(doc.find_host("cam").expect("cam").ip_address, "10.0.0.31");
        assert_eq!(s.entries()[0].status, AuditStatus::Success);
    }

    #[test]
    fn missing_config_is_storage_failure() {
        let s = setup();
        fs::remove_file(s.conf()).expect("remove");

        let err = s.store.hosts().expect_err("missing");
        assert!(matches!(err, HostError::Storage { .. }));
        assert_eq!(err.code(), "storage_failure");
    }

    #[test]
    fn manual_restart_is_audited_as_config_change() {
        let s = setup_with(Box::new(BrokenService));
        assert!(!s.store.restart_service().success);
        assert_eq!(s.store.service_status().state, ServiceState::Failed);

        let entries = s.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_type, ResourceType::Config);
        assert_eq!(entries[0].status, AuditStatus::Error);
    }
}
