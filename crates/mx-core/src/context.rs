//! The handle a driver receives while one of its operations runs.
//!
//! While an operation is in progress the record's own private state is
//! checked out of the database and handed to the driver directly, so the
//! context only exposes what lies outside the record: the rest of the
//! database (to reach referenced records through their own class
//! operations), the clock, the callback scheduler and the resource claims.

use std::time::Instant;

use crate::claims::Resource;
use crate::database::RecordDatabase;
use crate::error::Result;
use crate::record::RecordDriver;
use crate::scheduler::{TimerId, TimerKind};
use crate::types::RecordId;

pub struct DriverContext<'a> {
    db: &'a mut RecordDatabase,
    record: RecordId,
}

impl<'a> DriverContext<'a> {
    pub(crate) fn new(db: &'a mut RecordDatabase, record: RecordId) -> Self {
        Self { db, record }
    }

    /// Id of the record whose operation is running.
    pub fn record_id(&self) -> RecordId {
        self.record
    }

    /// Name of the record whose operation is running.
    pub fn record_name(&self) -> &str {
        self.db.name_of(self.record)
    }

    pub fn now(&self) -> Instant {
        self.db.scheduler().now()
    }

    /// The database, for dispatching operations on referenced records.
    pub fn db(&mut self) -> &mut RecordDatabase {
        &mut *self.db
    }

    pub fn database(&self) -> &RecordDatabase {
        &*self.db
    }

    /// Registers and arms a timer owned by this record.
    pub fn start_timer(&mut self, kind: TimerKind) -> TimerId {
        let owner = self.record;
        self.db.scheduler_mut().start(owner, kind)
    }

    pub fn restart_timer(&mut self, timer: TimerId) -> Result<()> {
        self.db.scheduler_mut().restart(timer)
    }

    pub fn cancel_timer(&mut self, timer: TimerId) {
        self.db.scheduler_mut().cancel(timer);
    }

    /// Claims a bus resource for this record until it is closed.
    pub fn claim(&mut self, resource: Resource) -> Result<()> {
        let owner = self.record;
        self.db.claims_mut().claim(owner, resource)
    }

    pub fn release(&mut self, resource: Resource) {
        let owner = self.record;
        self.db.claims_mut().release(owner, resource);
    }

    /// Reads the type state of another record through the safe-downcast path.
    pub fn type_state<D: RecordDriver, T>(
        &self,
        id: RecordId,
        operation: &str,
        f: impl FnOnce(&D) -> T,
    ) -> Result<T> {
        self.db.with_type_state(id, operation, f)
    }
}
