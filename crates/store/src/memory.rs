//! In-process feature store.
//!
//! Mirrors the PostgreSQL tables closely enough to drive the engine without a
//! database: activity ids are assigned per `(login, day)`, `(activity_id,
//! name)` is unique, and every unit of work applies all-or-nothing. Commit
//! failures can be injected with [`MemoryFeatureStore::fail_commit_when`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use likelihood_core::{ActivityId, ActivityLookup, EmployeeId, FeatureRow, FeatureSeries};

use crate::error::StoreError;
use crate::store::{ActivityDirectory, FeatureSeriesLoader, FeatureStore, FeatureUnit, WriteKind};

/// Makes the commit of any unit staging a matching write fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Failpoint {
    kind: WriteKind,
    /// `None` matches every activity.
    activity_id: Option<ActivityId>,
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Insert(FeatureRow),
    Update(FeatureRow),
    Delete(ActivityId, String),
}

impl StagedWrite {
    fn kind(&self) -> WriteKind {
        match self {
            StagedWrite::Insert(_) => WriteKind::Insert,
            StagedWrite::Update(_) => WriteKind::Update,
            StagedWrite::Delete(..) => WriteKind::Delete,
        }
    }

    fn activity_id(&self) -> ActivityId {
        match self {
            StagedWrite::Insert(row) | StagedWrite::Update(row) => row.activity_id,
            StagedWrite::Delete(id, _) => *id,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    activities: BTreeMap<ActivityId, (EmployeeId, NaiveDate)>,
    activity_index: HashMap<(EmployeeId, NaiveDate), ActivityId>,
    features: BTreeMap<(ActivityId, String), Option<f64>>,
    next_activity_id: ActivityId,
    failpoints: Vec<Failpoint>,
    commits: usize,
    rollbacks: usize,
}

impl Tables {
    /// Apply writes to a copy of the feature table; the live table changes
    /// only if every write succeeds.
    fn apply(&mut self, writes: &[StagedWrite]) -> Result<(), StoreError> {
        if let Some(write) = writes.iter().find(|w| {
            self.failpoints.iter().any(|fp| {
                fp.kind == w.kind() && fp.activity_id.map_or(true, |id| id == w.activity_id())
            })
        }) {
            return Err(StoreError::Injected(format!(
                "{} on activity {}",
                write.kind(),
                write.activity_id()
            )));
        }

        let mut features = self.features.clone();
        for write in writes {
            match write {
                StagedWrite::Insert(row) => {
                    let key = (row.activity_id, row.name.clone());
                    if features.contains_key(&key) {
                        return Err(StoreError::UniqueViolation {
                            activity_id: row.activity_id,
                            name: row.name.clone(),
                        });
                    }
                    features.insert(key, row.value);
                }
                StagedWrite::Update(row) => {
                    if let Some(value) = features.get_mut(&(row.activity_id, row.name.clone())) {
                        *value = row.value;
                    }
                }
                StagedWrite::Delete(activity_id, name) => {
                    features.remove(&(*activity_id, name.clone()));
                }
            }
        }
        self.features = features;
        Ok(())
    }
}

/// Shared in-memory store; clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatureStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the activity id of `(login, day)`, creating it if needed.
    pub fn add_activity(&self, login: &str, day: NaiveDate) -> ActivityId {
        let mut tables = self.lock();
        let key = (login.to_string(), day);
        if let Some(id) = tables.activity_index.get(&key) {
            return *id;
        }
        tables.next_activity_id += 1;
        let id = tables.next_activity_id;
        tables.activities.insert(id, key.clone());
        tables.activity_index.insert(key, id);
        id
    }

    /// Write a feature value directly, bypassing units of work.
    pub fn put_feature(&self, activity_id: ActivityId, name: &str, value: Option<f64>) {
        self.lock()
            .features
            .insert((activity_id, name.to_string()), value);
    }

    /// Stored value of `(activity_id, name)`: `None` if no row exists.
    pub fn feature(&self, activity_id: ActivityId, name: &str) -> Option<Option<f64>> {
        self.lock()
            .features
            .get(&(activity_id, name.to_string()))
            .copied()
    }

    /// All stored rows named `name`, ordered by activity id.
    pub fn rows_named(&self, name: &str) -> Vec<FeatureRow> {
        self.lock()
            .features
            .iter()
            .filter(|((_, n), _)| n == name)
            .map(|((id, n), v)| FeatureRow::new(*id, n.clone(), *v))
            .collect()
    }

    /// Fail every commit that stages a `kind` write on `activity_id`
    /// (or on any activity when `None`).
    pub fn fail_commit_when(&self, kind: WriteKind, activity_id: Option<ActivityId>) {
        self.lock().failpoints.push(Failpoint { kind, activity_id });
    }

    pub fn clear_failpoints(&self) {
        self.lock().failpoints.clear();
    }

    /// Number of successfully committed units.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Number of rolled back units, including failed commits.
    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }
}

pub struct MemoryFeatureUnit {
    tables: Arc<Mutex<Tables>>,
    writes: Vec<StagedWrite>,
}

impl MemoryFeatureUnit {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FeatureUnit for MemoryFeatureUnit {
    async fn insert(&mut self, row: &FeatureRow) -> Result<(), StoreError> {
        self.writes.push(StagedWrite::Insert(row.clone()));
        Ok(())
    }

    async fn update(&mut self, row: &FeatureRow) -> Result<(), StoreError> {
        self.writes.push(StagedWrite::Update(row.clone()));
        Ok(())
    }

    async fn delete(&mut self, activity_id: ActivityId, name: &str) -> Result<(), StoreError> {
        self.writes.push(StagedWrite::Delete(activity_id, name.to_string()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.lock();
        match tables.apply(&self.writes) {
            Ok(()) => {
                tables.commits += 1;
                Ok(())
            }
            Err(e) => {
                tables.rollbacks += 1;
                Err(e)
            }
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.lock().rollbacks += 1;
        Ok(())
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    async fn begin(&self) -> Result<Box<dyn FeatureUnit>, StoreError> {
        Ok(Box::new(MemoryFeatureUnit {
            tables: Arc::clone(&self.tables),
            writes: Vec::new(),
        }))
    }
}

#[async_trait]
impl FeatureSeriesLoader for MemoryFeatureStore {
    async fn load_series(
        &self,
        names: &[String],
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<HashMap<EmployeeId, FeatureSeries>, StoreError> {
        let tables = self.lock();
        let mut series: HashMap<EmployeeId, FeatureSeries> = employees
            .iter()
            .map(|login| (login.clone(), FeatureSeries::new()))
            .collect();

        for ((activity_id, name), value) in &tables.features {
            let Some(value) = value else { continue };
            if !names.contains(name) {
                continue;
            }
            let Some((login, day)) = tables.activities.get(activity_id) else {
                continue;
            };
            if start.is_some_and(|s| *day < s) || *day > end {
                continue;
            }
            if let Some(employee_series) = series.get_mut(login) {
                employee_series
                    .entry(*day)
                    .or_default()
                    .insert(name.clone(), *value);
            }
        }

        Ok(series)
    }
}

#[async_trait]
impl ActivityDirectory for MemoryFeatureStore {
    async fn load_activities(
        &self,
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<ActivityLookup, StoreError> {
        let tables = self.lock();
        let mut lookup = ActivityLookup::new();
        for (id, (login, day)) in &tables.activities {
            if !employees.contains(login) {
                continue;
            }
            if start.is_some_and(|s| *day < s) || *day > end {
                continue;
            }
            lookup.entry(login.clone()).or_default().insert(*day, *id);
        }
        Ok(lookup)
    }
}
