//! The record database: arena, lifecycle driver and generic field access.
//!
//! All records live in one arena indexed by [`RecordId`]. References between
//! records are indices into that arena, never owning pointers, so the graph
//! may contain cycles and a record never outlives the database.
//!
//! # Lifecycle
//!
//! ```text
//! create_record ──▶ Constructed ──link──▶ Linked ──validate──▶ Validated ──open──▶ Opened
//!                        │                   │                     │                 │
//!                        └───────────────────┴──────── Failed ◀────┘            close│
//!                                                                                    ▼
//!                                                                                  Closed
//! ```
//!
//! [`RecordDatabase::initialize`] runs link, validate and open over every
//! record in dependency order. A failure marks only that record `Failed`;
//! siblings continue, and records that reference a failed record fail their
//! next stage with `CorruptState`.
//!
//! # Dispatch
//!
//! Class operations go through [`RecordDatabase::dispatch`]: the record's
//! private state is checked out of the arena for the duration of the call and
//! handed to the driver together with a [`DriverContext`]. A re-entrant call
//! on the same record therefore fails closed with `CorruptState` instead of
//! aliasing the state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::claims::ResourceClaims;
use crate::class::ClassState;
use crate::context::DriverContext;
use crate::error::{MxError, Result};
use crate::field::{
    fit_array, format_value, view_array, Dim, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    FieldValue,
};
use crate::limits::{validate_array_length, validate_record_name};
use crate::record::{missing_body, Record, RecordBody, RecordDriver};
use crate::registry::{DriverDescriptor, DriverRegistry};
use crate::scheduler::{CallbackScheduler, Clock, SystemClock};
use crate::types::{LifecycleState, RecordClass, RecordId};

/// Outcome of a whole-database lifecycle pass.
#[derive(Debug, Default, Clone)]
pub struct InitReport {
    /// Records that reached `Opened` during the pass.
    pub opened: Vec<String>,
    /// Records that failed, with the stage that failed.
    pub failures: Vec<InitFailure>,
}

/// One record's failure during a lifecycle pass.
#[derive(Debug, Clone)]
pub struct InitFailure {
    pub record: String,
    pub stage: &'static str,
    pub error: MxError,
}

impl InitReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, record: &str) -> Option<&InitFailure> {
        self.failures.iter().find(|f| f.record == record)
    }
}

/// Arena of records plus the services their drivers share.
pub struct RecordDatabase {
    records: Vec<Record>,
    index: HashMap<String, RecordId>,
    scheduler: CallbackScheduler,
    claims: ResourceClaims,
}

impl Default for RecordDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordDatabase {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
            scheduler: CallbackScheduler::new(clock),
            claims: ResourceClaims::new(),
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> {
        (0..self.records.len()).map(RecordId)
    }

    /// Resolves a record name.
    pub fn find(&self, name: &str) -> Result<RecordId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| MxError::not_found("find", format!("no record named '{}'", name)))
    }

    pub fn record(&self, id: RecordId) -> Result<&Record> {
        self.record_for(id, "record")
    }

    fn record_for(&self, id: RecordId, operation: &str) -> Result<&Record> {
        self.records
            .get(id.0)
            .ok_or_else(|| null_record(id, operation))
    }

    pub fn state(&self, id: RecordId) -> Result<LifecycleState> {
        Ok(self.record(id)?.state)
    }

    pub(crate) fn name_of(&self, id: RecordId) -> &str {
        self.records.get(id.0).map_or("<unknown>", |r| r.name.as_str())
    }

    pub fn records_of_class(&self, class: RecordClass) -> Vec<RecordId> {
        self.ids()
            .filter(|id| self.records[id.0].class() == class)
            .collect()
    }

    pub fn scheduler(&self) -> &CallbackScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut CallbackScheduler {
        &mut self.scheduler
    }

    pub fn claims(&self) -> &ResourceClaims {
        &self.claims
    }

    pub(crate) fn claims_mut(&mut self) -> &mut ResourceClaims {
        &mut self.claims
    }

    /// Reads another record's type state through the safe-downcast path.
    pub fn with_type_state<D: RecordDriver, T>(
        &self,
        id: RecordId,
        operation: &str,
        f: impl FnOnce(&D) -> T,
    ) -> Result<T> {
        let record = self.record_for(id, operation)?;
        let state = record.body(operation)?.type_state::<D>(&record.name, operation)?;
        Ok(f(state))
    }

    pub fn with_type_state_mut<D: RecordDriver, T>(
        &mut self,
        id: RecordId,
        operation: &str,
        f: impl FnOnce(&mut D) -> T,
    ) -> Result<T> {
        let record = self
            .records
            .get_mut(id.0)
            .ok_or_else(|| null_record(id, operation))?;
        let name = record.name.clone();
        let state = record.body_mut(operation)?.type_state_mut::<D>(&name, operation)?;
        Ok(f(state))
    }

    /// Reads a record's class state.
    pub fn with_class_state<T>(
        &self,
        id: RecordId,
        operation: &str,
        f: impl FnOnce(&ClassState) -> T,
    ) -> Result<T> {
        let record = self.record_for(id, operation)?;
        Ok(f(&record.body(operation)?.class_state))
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Constructs a record of a registered type and applies its configured fields.
    ///
    /// If a configured field is rejected the record is still added, in the
    /// `Failed` state, so that its name stays reserved and records that
    /// reference it fail with a diagnosable error.
    pub fn create_record<I>(
        &mut self,
        registry: &DriverRegistry,
        name: &str,
        type_name: &str,
        fields: I,
    ) -> Result<RecordId>
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        let descriptor = registry.lookup(type_name)?;
        self.insert_record(name, descriptor, fields)
    }

    /// Constructs a record from an already resolved descriptor.
    pub fn insert_record<I>(
        &mut self,
        name: &str,
        descriptor: Arc<DriverDescriptor>,
        fields: I,
    ) -> Result<RecordId>
    where
        I: IntoIterator<Item = (String, FieldValue)>,
    {
        const OP: &str = "create_record";
        validate_record_name(name)?;
        if self.index.contains_key(name) {
            return Err(MxError::illegal_argument(
                OP,
                format!("a record named '{}' already exists", name),
            ));
        }

        let id = RecordId(self.records.len());
        let body = RecordBody {
            class_state: ClassState::for_class(descriptor.class),
            driver: descriptor.construct(),
        };
        self.records.push(Record {
            name: name.to_string(),
            descriptor,
            state: LifecycleState::Unconstructed,
            body: Some(body),
        });
        self.index.insert(name.to_string(), id);

        // Scalars first so that varargs lengths are known before arrays.
        let (arrays, scalars): (Vec<_>, Vec<_>) = fields.into_iter().partition(|(_, value)| {
            matches!(
                value,
                FieldValue::IntArray(_) | FieldValue::FloatArray(_) | FieldValue::FloatMatrix(_)
            )
        });

        for (field, value) in scalars.into_iter().chain(arrays) {
            if let Err(err) = self.store_field(id, &field, value, OP) {
                let err = err.in_record(name);
                warn!("Record '{}' failed construction: {}", name, err);
                self.records[id.0].state = LifecycleState::Failed;
                return Err(err);
            }
        }

        self.records[id.0].state = LifecycleState::Constructed;
        debug!(
            "Constructed record '{}' of type '{}'",
            name,
            self.records[id.0].type_name()
        );
        Ok(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolves every reference field of a `Constructed` record.
    pub fn link(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "link";
        self.expect_state(id, LifecycleState::Constructed, OP)?;
        let result = self.link_references(id);
        self.finish_stage(id, result, LifecycleState::Linked, OP)
    }

    fn link_references(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "link";
        let record = &self.records[id.0];
        let name = record.name.clone();
        let references: Vec<&'static FieldDescriptor> = record
            .descriptor
            .describe()
            .filter(|f| matches!(f.kind, FieldKind::Record(_)))
            .collect();

        for field in references {
            let target_name = match self.raw_read(&self.records[id.0], field, OP)? {
                FieldValue::Record(target) => target,
                other => {
                    return Err(MxError::corrupt_state(
                        OP,
                        format!(
                            "reference field '{}' of record '{}' holds {}",
                            field.name,
                            name,
                            other.label()
                        ),
                    ))
                }
            };
            if target_name.is_empty() {
                return Err(MxError::not_found(
                    OP,
                    format!(
                        "reference field '{}' of record '{}' names no record",
                        field.name, name
                    ),
                ));
            }
            if target_name == name {
                return Err(MxError::illegal_argument(
                    OP,
                    format!(
                        "record '{}' references itself through field '{}'",
                        name, field.name
                    ),
                ));
            }
            let target = self.index.get(&target_name).copied().ok_or_else(|| {
                MxError::not_found(
                    OP,
                    format!(
                        "record '{}' field '{}' references '{}', which does not exist",
                        name, field.name, target_name
                    ),
                )
            })?;

            let body = self.records[id.0].body_mut(OP)?;
            match field.block {
                FieldBlock::Class => body
                    .class_state
                    .access_mut()
                    .ok_or_else(|| no_class_block(&name, OP))?
                    .bind_reference(field.name, target)?,
                FieldBlock::Type => body.driver.bind_reference(field.name, target)?,
                FieldBlock::Record => {}
            }
        }
        Ok(())
    }

    /// Checks references against the driver's requirements and runs
    /// `finish_record_initialization`.
    pub fn validate(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "finish_record_initialization";
        self.expect_state(id, LifecycleState::Linked, OP)?;
        let result = self
            .check_references(id, OP, true)
            .and_then(|_| {
                self.with_body(id, OP, |cx, class, driver| {
                    driver.finish_record_initialization(cx, class)
                })
            });
        self.finish_stage(id, result, LifecycleState::Validated, OP)
    }

    fn check_references(&self, id: RecordId, operation: &str, check_kind: bool) -> Result<()> {
        let record = &self.records[id.0];
        for field in record.descriptor.describe() {
            let FieldKind::Record(requirement) = field.kind else {
                continue;
            };
            let target = self.reference_of(record, field, operation)?;
            let target_record = self.record_for(target, operation)?;

            if target_record.state == LifecycleState::Failed {
                return Err(MxError::corrupt_state(
                    operation,
                    format!(
                        "record '{}' field '{}' references record '{}', which failed initialization",
                        record.name, field.name, target_record.name
                    ),
                ));
            }
            if check_kind {
                requirement
                    .check(
                        target_record.superclass(),
                        target_record.class(),
                        target_record.type_name(),
                    )
                    .map_err(|mismatch| {
                        MxError::type_mismatch(
                            operation,
                            format!(
                                "record '{}' field '{}' references '{}': {} (type '{}')",
                                record.name,
                                field.name,
                                target_record.name,
                                mismatch,
                                target_record.type_name()
                            ),
                        )
                    })?;
            }
        }
        Ok(())
    }

    fn reference_of(&self, record: &Record, field: &FieldDescriptor, operation: &str) -> Result<RecordId> {
        let value = self.raw_read(record, field, operation)?;
        value
            .as_str()
            .and_then(|name| self.index.get(name).copied())
            .ok_or_else(|| {
                MxError::corrupt_state(
                    operation,
                    format!(
                        "reference field '{}' of record '{}' is unresolved",
                        field.name, record.name
                    ),
                )
            })
    }

    /// Runs the driver's one-time `open`.
    pub fn open(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "open";
        self.expect_state(id, LifecycleState::Validated, OP)?;
        let result = self
            .check_references(id, OP, false)
            .and_then(|_| self.with_body(id, OP, |cx, class, driver| driver.open(cx, class)));
        if result.is_err() {
            self.release_owned(id);
        }
        self.finish_stage(id, result, LifecycleState::Opened, OP)
    }

    /// Closes an opened record. A no-op for records that are not open.
    pub fn close(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "close";
        let record = self.record_for(id, OP)?;
        if record.state != LifecycleState::Opened {
            debug!(
                "close on record '{}' in state {} is a no-op",
                record.name, record.state
            );
            return Ok(());
        }

        let result = self.with_body(id, OP, |cx, class, driver| driver.close(cx, class));
        self.release_owned(id);
        self.records[id.0].state = LifecycleState::Closed;
        debug!("Closed record '{}'", self.records[id.0].name);
        result.map_err(|e| e.in_record(self.name_of(id)))
    }

    fn release_owned(&mut self, id: RecordId) {
        let claims = self.claims.release_all(id);
        let timers = self.scheduler.cancel_all(id);
        if claims + timers > 0 {
            debug!(
                "Released {} claims and {} timers of record '{}'",
                claims,
                timers,
                self.name_of(id)
            );
        }
    }

    /// Best-effort recovery on an opened record.
    pub fn resynchronize(&mut self, id: RecordId) -> Result<()> {
        const OP: &str = "resynchronize";
        self.expect_state(id, LifecycleState::Opened, OP)?;
        self.with_body(id, OP, |cx, class, driver| driver.resynchronize(cx, class))
            .map_err(|e| e.in_record(self.name_of(id)))
    }

    /// Links, validates and opens every record that can advance.
    pub fn initialize(&mut self) -> InitReport {
        let mut report = InitReport::default();
        let order = self.dependency_order();

        for &id in &order {
            if self.records[id.0].state == LifecycleState::Constructed {
                if let Err(error) = self.link(id) {
                    report.push(&self.records[id.0].name, "link", error);
                }
            }
        }
        for &id in &order {
            if self.records[id.0].state == LifecycleState::Linked {
                if let Err(error) = self.validate(id) {
                    report.push(&self.records[id.0].name, "validate", error);
                }
            }
        }
        for &id in &order {
            if self.records[id.0].state == LifecycleState::Validated {
                match self.open(id) {
                    Ok(()) => report.opened.push(self.records[id.0].name.clone()),
                    Err(error) => report.push(&self.records[id.0].name, "open", error),
                }
            }
        }

        info!(
            "Initialized record database: {} opened, {} failed",
            report.opened.len(),
            report.failures.len()
        );
        report
    }

    /// Closes every open record, dependents before their dependencies.
    pub fn close_all(&mut self) -> InitReport {
        let mut report = InitReport::default();
        let mut order = self.dependency_order();
        order.reverse();
        for id in order {
            if let Err(error) = self.close(id) {
                report.push(&self.records[id.0].name, "close", error);
            }
        }
        report
    }

    /// Record ids ordered so that referenced records precede the records
    /// referencing them. Creation order breaks ties and cycles.
    pub fn dependency_order(&self) -> Vec<RecordId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Visiting,
            Done,
        }

        fn visit(db: &RecordDatabase, id: RecordId, marks: &mut [Mark], out: &mut Vec<RecordId>) {
            if marks[id.0] != Mark::New {
                return;
            }
            marks[id.0] = Mark::Visiting;
            for dep in db.dependencies(id) {
                visit(db, dep, marks, out);
            }
            marks[id.0] = Mark::Done;
            out.push(id);
        }

        let mut marks = vec![Mark::New; self.records.len()];
        let mut out = Vec::with_capacity(self.records.len());
        for id in self.ids() {
            visit(self, id, &mut marks, &mut out);
        }
        out
    }

    /// Records named by the reference fields of `id`, resolved or not.
    pub fn dependencies(&self, id: RecordId) -> Vec<RecordId> {
        let Some(record) = self.records.get(id.0) else {
            return Vec::new();
        };
        record
            .descriptor
            .describe()
            .filter(|f| matches!(f.kind, FieldKind::Record(_)))
            .filter_map(|f| self.raw_read(record, f, "dependencies").ok())
            .filter_map(|v| v.as_str().and_then(|name| self.index.get(name).copied()))
            .filter(|dep| *dep != id)
            .collect()
    }

    fn expect_state(&self, id: RecordId, expected: LifecycleState, operation: &str) -> Result<()> {
        let record = self.record_for(id, operation)?;
        if record.state != expected {
            return Err(MxError::not_ready(
                operation,
                format!(
                    "record '{}' is {}, expected {}",
                    record.name, record.state, expected
                ),
            ));
        }
        Ok(())
    }

    fn finish_stage(
        &mut self,
        id: RecordId,
        result: Result<()>,
        next: LifecycleState,
        operation: &str,
    ) -> Result<()> {
        let record = &mut self.records[id.0];
        match result {
            Ok(()) => {
                record.state = next;
                debug!("Record '{}' is {}", record.name, next);
                Ok(())
            }
            Err(err) => {
                record.state = LifecycleState::Failed;
                let err = err.in_record(&record.name);
                warn!("Record '{}' failed {}: {}", record.name, operation, err);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Runs a class operation on an opened record of the given class.
    pub fn dispatch<T>(
        &mut self,
        id: RecordId,
        class: RecordClass,
        operation: &str,
        f: impl FnOnce(&mut DriverContext<'_>, &mut ClassState, &mut dyn RecordDriver) -> Result<T>,
    ) -> Result<T> {
        let record = self.record_for(id, operation)?;
        if record.class() != class {
            return Err(MxError::type_mismatch(
                operation,
                format!(
                    "record '{}' is a {} record, not a {} record",
                    record.name,
                    record.class(),
                    class
                ),
            ));
        }
        if record.state != LifecycleState::Opened {
            return Err(MxError::not_ready(
                operation,
                format!(
                    "record '{}' is {}, class operations need an opened record",
                    record.name, record.state
                ),
            ));
        }

        let result = self.with_body(id, operation, f);
        if let Err(err) = &result {
            debug!("{} on record '{}' failed: {}", operation, self.name_of(id), err);
        }
        result.map_err(|e| e.in_record(self.name_of(id)))
    }

    fn with_body<T>(
        &mut self,
        id: RecordId,
        operation: &str,
        f: impl FnOnce(&mut DriverContext<'_>, &mut ClassState, &mut dyn RecordDriver) -> Result<T>,
    ) -> Result<T> {
        let record = self
            .records
            .get_mut(id.0)
            .ok_or_else(|| null_record(id, operation))?;
        let mut body = record
            .body
            .take()
            .ok_or_else(|| missing_body(&record.name, operation))?;

        let result = {
            let mut cx = DriverContext::new(self, id);
            f(&mut cx, &mut body.class_state, &mut *body.driver)
        };

        self.records[id.0].body = Some(body);
        result
    }

    /// Delivers every due timer tick to its record's driver.
    ///
    /// Returns the number of ticks delivered. Callback failures are logged
    /// and do not stop delivery to other records.
    pub fn process_callbacks(&mut self) -> usize {
        self.scheduler.poll();
        let mut delivered = 0;

        while let Some(tick) = self.scheduler.next_tick() {
            let id = tick.record;
            match self.records.get(id.0).map(|r| r.state) {
                Some(LifecycleState::Opened) => {}
                _ => {
                    debug!("Dropping tick for record {} which is not open", id);
                    continue;
                }
            }
            if let Err(err) = self.with_body(id, "on_tick", |cx, class, driver| {
                driver.on_tick(cx, class, tick)
            }) {
                error!(
                    "Timer callback for record '{}' failed: {}",
                    self.name_of(id),
                    err
                );
            }
            delivered += 1;
        }
        delivered
    }

    // =========================================================================
    // Field engine
    // =========================================================================

    /// Ordered field descriptors of a record.
    pub fn describe(&self, id: RecordId) -> Result<Vec<&'static FieldDescriptor>> {
        Ok(self.record_for(id, "describe")?.descriptor.describe().collect())
    }

    fn field_of(&self, id: RecordId, name: &str, operation: &str) -> Result<&'static FieldDescriptor> {
        let record = self.record_for(id, operation)?;
        record.descriptor.field(name).ok_or_else(|| {
            MxError::not_found(
                operation,
                format!("record '{}' has no field named '{}'", record.name, name),
            )
        })
    }

    /// Reads a field by name.
    pub fn read_field(&self, id: RecordId, name: &str) -> Result<FieldValue> {
        const OP: &str = "read_field";
        let field = self.field_of(id, name, OP)?;
        if field.has(FieldFlags::NO_ACCESS) {
            return Err(permission_denied(OP, self.name_of(id), name));
        }
        self.read_shaped(id, field, OP)
    }

    fn read_shaped(&self, id: RecordId, field: &FieldDescriptor, operation: &str) -> Result<FieldValue> {
        let record = self.record_for(id, operation)?;
        if field.rank() == 0 {
            return self.raw_read(record, field, operation);
        }
        let lengths = self.lengths(record, field, operation)?;
        let value = self.raw_read(record, field, operation)?;
        Ok(view_array(value, &lengths))
    }

    /// Reads one element of a rank-1 array field.
    pub fn read_field_element(&self, id: RecordId, name: &str, index: usize) -> Result<FieldValue> {
        const OP: &str = "read_field_element";
        let field = self.field_of(id, name, OP)?;
        if field.rank() != 1 {
            return Err(MxError::illegal_argument(
                OP,
                format!("field '{}' is not a one-dimensional array", name),
            ));
        }
        if field.has(FieldFlags::NO_ACCESS) {
            return Err(permission_denied(OP, self.name_of(id), name));
        }
        let record = self.record_for(id, OP)?;
        let length = self.lengths(record, field, OP)?[0];
        if index >= length {
            return Err(MxError::out_of_range(
                OP,
                format!(
                    "index {} of field '{}' on record '{}' is past its length {}",
                    index, name, record.name, length
                ),
            ));
        }
        let element = match view_array(self.raw_read(record, field, OP)?, &[length]) {
            FieldValue::FloatArray(v) => v.get(index).copied().map(FieldValue::Float),
            FieldValue::IntArray(v) => v.get(index).copied().map(FieldValue::Int),
            _ => None,
        };
        element.ok_or_else(|| {
            MxError::corrupt_state(OP, format!("field '{}' does not hold an array", name))
        })
    }

    /// Writes a field by name, honoring its access flags.
    pub fn write_field(&mut self, id: RecordId, name: &str, value: FieldValue) -> Result<()> {
        const OP: &str = "write_field";
        let field = self.field_of(id, name, OP)?;
        if field.block == FieldBlock::Record
            || field.has(FieldFlags::READ_ONLY)
            || field.has(FieldFlags::NO_ACCESS)
        {
            return Err(permission_denied(OP, self.name_of(id), name));
        }
        if matches!(field.kind, FieldKind::Record(_))
            && self.records[id.0].state != LifecycleState::Constructed
        {
            return Err(MxError::permission_denied(
                OP,
                format!(
                    "reference field '{}' of record '{}' cannot change after linking",
                    name,
                    self.name_of(id)
                ),
            ));
        }
        self.store_field(id, name, value, OP)
    }

    /// Shapes and stores a value; shared by construction and run-time writes.
    fn store_field(&mut self, id: RecordId, name: &str, value: FieldValue, operation: &str) -> Result<()> {
        let field = self.field_of(id, name, operation)?;
        if field.block == FieldBlock::Record {
            return Err(permission_denied(operation, self.name_of(id), name));
        }

        let value = if field.rank() > 0 {
            let lengths = self.lengths(self.record_for(id, operation)?, field, operation)?;
            fit_array(field, value, &lengths)?
        } else if value.fits(&field.kind, 0) {
            value
        } else {
            return Err(MxError::illegal_argument(
                operation,
                format!(
                    "field '{}' is {}, got {}",
                    name,
                    field.kind.label(),
                    value.label()
                ),
            ));
        };

        let record = &mut self.records[id.0];
        let record_name = record.name.clone();
        let body = record.body_mut(operation)?;
        match field.block {
            FieldBlock::Class => body
                .class_state
                .access_mut()
                .ok_or_else(|| no_class_block(&record_name, operation))?
                .set_field(name, value),
            FieldBlock::Type => body.driver.set_field(name, value),
            FieldBlock::Record => Ok(()),
        }
    }

    fn raw_read(&self, record: &Record, field: &FieldDescriptor, operation: &str) -> Result<FieldValue> {
        match field.block {
            FieldBlock::Record => Ok(FieldValue::Str(match field.name {
                "name" => record.name.clone(),
                "superclass" => record.superclass().to_string(),
                "class" => record.class().to_string(),
                "type" => record.type_name().to_string(),
                _ => record.state.to_string(),
            })),
            FieldBlock::Class => record
                .body(operation)?
                .class_state
                .access()
                .ok_or_else(|| no_class_block(&record.name, operation))?
                .get_field(field.name),
            FieldBlock::Type => record.body(operation)?.driver.get_field(field.name),
        }
    }

    /// Run-time lengths of every dimension; varargs lengths are read first.
    fn lengths(&self, record: &Record, field: &FieldDescriptor, operation: &str) -> Result<Vec<usize>> {
        field
            .dims
            .iter()
            .map(|dim| match dim {
                Dim::Fixed(n) => Ok(*n),
                Dim::Varargs(source) => {
                    let length_field = record.descriptor.field(source).ok_or_else(|| {
                        MxError::corrupt_state(
                            operation,
                            format!("length field '{}' of '{}' is not declared", source, field.name),
                        )
                    })?;
                    let raw = self
                        .raw_read(record, length_field, operation)?
                        .as_i64()
                        .unwrap_or(-1);
                    let length = usize::try_from(raw).map_err(|_| {
                        MxError::corrupt_state(
                            operation,
                            format!(
                                "length field '{}' of record '{}' holds {}",
                                source, record.name, raw
                            ),
                        )
                    })?;
                    validate_array_length(field.name, length)?;
                    Ok(length)
                }
            })
            .collect()
    }

    /// Human-readable dump of every field flagged for the description.
    pub fn print_structure(&self, id: RecordId) -> Result<String> {
        let record = self.record_for(id, "print_structure")?;
        let mut out = String::new();
        for field in record.descriptor.describe() {
            if !field.has(FieldFlags::IN_DESCRIPTION) || field.has(FieldFlags::NO_ACCESS) {
                continue;
            }
            let shown = match self.read_shaped(id, field, "print_structure") {
                Ok(value) => format_value(field, &value),
                Err(err) => format!("<unavailable: {}>", err.kind),
            };
            out.push_str(&format!("  {:<24} = {}\n", field.name, shown));
        }
        Ok(out)
    }

    /// One-line summary built from the fields flagged for it.
    pub fn summary(&self, id: RecordId) -> Result<String> {
        let record = self.record_for(id, "summary")?;
        let parts: Vec<String> = record
            .descriptor
            .describe()
            .filter(|f| f.has(FieldFlags::IN_SUMMARY))
            .map(|f| match self.read_shaped(id, f, "summary") {
                Ok(value) => format_value(f, &value),
                Err(_) => "?".to_string(),
            })
            .collect();
        Ok(parts.join(" "))
    }
}

impl InitReport {
    fn push(&mut self, record: &str, stage: &'static str, error: MxError) {
        self.failures.push(InitFailure {
            record: record.to_string(),
            stage,
            error,
        });
    }
}

impl std::fmt::Debug for RecordDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordDatabase")
            .field("records", &self.records.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

fn null_record(id: RecordId, operation: &str) -> MxError {
    MxError::null_argument(
        operation,
        format!("record id {} does not refer to a record", id),
    )
}

fn no_class_block(record: &str, operation: &str) -> MxError {
    MxError::corrupt_state(
        operation,
        format!("record '{}' has no class block fields", record),
    )
}

fn permission_denied(operation: &str, record: &str, field: &str) -> MxError {
    MxError::permission_denied(
        operation,
        format!("field '{}' of record '{}' may not be accessed this way", field, record),
    )
}
