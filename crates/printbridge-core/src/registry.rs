// ── Tenant-scoped printer registry ──
//
// Concurrent keyed storage for the active tenant's printers with
// push-based change notification: every mutation rebuilds the snapshot
// a `watch` channel hands to subscribers. The registry never holds
// records for a tenant other than the currently active one.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;

use printbridge_api::PrinterStatus;
use printbridge_api::message::{PrinterInfo, PrinterStatusUpdate};

use crate::model::PrinterRecord;

pub struct PrinterRegistry {
    /// Tenant whose printers this view holds.
    active_tenant: RwLock<Option<String>>,

    /// Primary storage: printer id -> record.
    printers: DashMap<String, Arc<PrinterRecord>>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<PrinterRecord>>>>,
}

impl PrinterRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            active_tenant: RwLock::new(None),
            printers: DashMap::new(),
            snapshot,
        }
    }

    // ── Tenant scoping ───────────────────────────────────────────────

    pub fn active_tenant(&self) -> Option<String> {
        self.active_tenant.read().ok().and_then(|t| t.clone())
    }

    /// Switch the active tenant. A change clears the whole view before
    /// any registration for the new tenant is accepted.
    pub fn set_active_tenant(&self, tenant_id: Option<String>) {
        let changed = {
            let Ok(mut active) = self.active_tenant.write() else {
                return;
            };
            if *active == tenant_id {
                false
            } else {
                *active = tenant_id;
                true
            }
        };

        if changed && !self.printers.is_empty() {
            self.printers.clear();
            self.rebuild_snapshot();
        }
    }

    /// Whether an inbound event tagged with `tenant_id` belongs to this
    /// view. An untagged event is accepted: the gateway already scoped
    /// the socket to the authenticated tenant.
    pub fn accepts(&self, tenant_id: Option<&str>) -> bool {
        match tenant_id {
            None => true,
            Some(tid) => self.active_tenant().as_deref() == Some(tid),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Upsert from a registration acknowledgment. Keyed by printer id, so
    /// a duplicated ack yields one record, not two. The record always
    /// comes back online: the ack proves the device is reachable.
    pub fn upsert_registered(&self, info: &PrinterInfo, now: DateTime<Utc>) -> Arc<PrinterRecord> {
        let mut record = PrinterRecord::from_info(info, now);
        record.status = PrinterStatus::Online;
        record.registered_at = now;

        let record = Arc::new(record);
        self.printers
            .insert(record.printer_id.clone(), Arc::clone(&record));
        self.rebuild_snapshot();
        record
    }

    /// Mark one printer offline. Records are retained for history rather
    /// than removed. Returns `false` when the printer is unknown.
    pub fn mark_offline(&self, printer_id: &str, now: DateTime<Utc>) -> bool {
        let updated = self.printers.get_mut(printer_id).map(|mut entry| {
            let mut record = (**entry.value()).clone();
            record.status = PrinterStatus::Offline;
            record.last_update = now;
            *entry.value_mut() = Arc::new(record);
        });

        if updated.is_some() {
            self.rebuild_snapshot();
            true
        } else {
            false
        }
    }

    /// Apply a status push. Returns `false` when the printer is unknown.
    pub fn apply_status(&self, update: &PrinterStatusUpdate, now: DateTime<Utc>) -> bool {
        let applied = self.printers.get_mut(&update.printer_id).map(|mut entry| {
            let mut record = (**entry.value()).clone();
            record.status = update.status;
            if update.error_message.is_some() {
                record.last_error = update.error_message.clone();
            }
            record.last_update = update.timestamp.unwrap_or(now);
            *entry.value_mut() = Arc::new(record);
        });

        if applied.is_some() {
            self.rebuild_snapshot();
            true
        } else {
            false
        }
    }

    /// Reconcile against a full roster push: upsert everything in the
    /// list, mark anything absent from it offline.
    pub fn reconcile(&self, roster: &[PrinterInfo], now: DateTime<Utc>) {
        let mut seen = Vec::with_capacity(roster.len());
        for info in roster {
            let existing_registered_at = self
                .printers
                .get(&info.printer_id)
                .map(|r| r.registered_at);

            let mut record = PrinterRecord::from_info(info, now);
            if let Some(registered_at) = existing_registered_at {
                record.registered_at = registered_at;
            }
            seen.push(record.printer_id.clone());
            self.printers
                .insert(record.printer_id.clone(), Arc::new(record));
        }

        let absent: Vec<String> = self
            .printers
            .iter()
            .filter(|entry| !seen.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for printer_id in absent {
            if let Some(mut entry) = self.printers.get_mut(&printer_id) {
                let mut record = (**entry.value()).clone();
                record.status = PrinterStatus::Offline;
                record.last_update = now;
                *entry.value_mut() = Arc::new(record);
            }
        }

        self.rebuild_snapshot();
    }

    /// Transport dropped: every record in the view goes stale/offline.
    pub fn mark_all_offline(&self) {
        if self.printers.is_empty() {
            return;
        }
        let now = Utc::now();
        for mut entry in self.printers.iter_mut() {
            let mut record = (**entry.value()).clone();
            record.status = PrinterStatus::Offline;
            record.last_update = now;
            *entry.value_mut() = Arc::new(record);
        }
        self.rebuild_snapshot();
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, printer_id: &str) -> Option<Arc<PrinterRecord>> {
        self.printers.get(printer_id).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone), ordered by printer id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<PrinterRecord>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<PrinterRecord>>>> {
        self.snapshot.subscribe()
    }

    pub fn len(&self) -> usize {
        self.printers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.printers.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all records (ordered by printer id, so consumers get a
    /// stable listing) and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let mut records: Vec<Arc<PrinterRecord>> =
            self.printers.iter().map(|r| Arc::clone(r.value())).collect();
        records.sort_by(|a, b| a.printer_id.cmp(&b.printer_id));
        self.snapshot.send_modify(|snap| *snap = Arc::new(records));
    }
}

impl Default for PrinterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info(printer_id: &str, tenant: Option<&str>) -> PrinterInfo {
        PrinterInfo {
            printer_id: printer_id.to_owned(),
            printer_name: None,
            printer_type: None,
            location: None,
            status: None,
            tenant_id: tenant.map(str::to_owned),
            last_error: None,
            message: None,
        }
    }

    #[test]
    fn duplicate_registration_ack_yields_one_record() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-42".into()));

        registry.upsert_registered(&info("P1", Some("unit-42")), Utc::now());
        registry.upsert_registered(&info("P1", Some("unit-42")), Utc::now());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("P1").unwrap().is_online());
    }

    #[test]
    fn switching_tenant_clears_the_view() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P1", None), Utc::now());
        assert_eq!(registry.len(), 1);

        registry.set_active_tenant(Some("unit-2".into()));
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn same_tenant_reselection_keeps_records() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P1", None), Utc::now());

        registry.set_active_tenant(Some("unit-1".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn foreign_tenant_events_are_rejected() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));

        assert!(registry.accepts(None));
        assert!(registry.accepts(Some("unit-1")));
        assert!(!registry.accepts(Some("unit-2")));
    }

    #[test]
    fn mark_offline_keeps_history() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P1", None), Utc::now());

        assert!(registry.mark_offline("P1", Utc::now()));
        let record = registry.get("P1").unwrap();
        assert_eq!(record.status, PrinterStatus::Offline);

        assert!(!registry.mark_offline("ghost", Utc::now()));
    }

    #[test]
    fn status_push_updates_error_and_timestamp() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P1", None), Utc::now());

        let update = PrinterStatusUpdate {
            printer_id: "P1".into(),
            status: PrinterStatus::Error,
            error_message: Some("jam".into()),
            tenant_id: Some("unit-1".into()),
            timestamp: None,
        };
        assert!(registry.apply_status(&update, Utc::now()));

        let record = registry.get("P1").unwrap();
        assert_eq!(record.status, PrinterStatus::Error);
        assert_eq!(record.last_error.as_deref(), Some("jam"));
    }

    #[test]
    fn reconcile_marks_absentees_offline() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P1", None), Utc::now());
        registry.upsert_registered(&info("P2", None), Utc::now());

        let mut p1 = info("P1", None);
        p1.status = Some(PrinterStatus::Online);
        registry.reconcile(&[p1], Utc::now());

        assert_eq!(registry.len(), 2);
        assert!(registry.get("P1").unwrap().is_online());
        assert_eq!(registry.get("P2").unwrap().status, PrinterStatus::Offline);
    }

    #[test]
    fn snapshot_subscribers_see_mutations() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        let mut rx = registry.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        registry.upsert_registered(&info("P1", None), Utc::now());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[test]
    fn snapshot_is_ordered_by_printer_id() {
        let registry = PrinterRegistry::new();
        registry.set_active_tenant(Some("unit-1".into()));
        registry.upsert_registered(&info("P9", None), Utc::now());
        registry.upsert_registered(&info("P1", None), Utc::now());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].printer_id, "P1");
        assert_eq!(snapshot[1].printer_id, "P9");
    }
}
