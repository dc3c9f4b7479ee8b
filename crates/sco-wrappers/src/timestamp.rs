//! The owned-value wrapper for SQL timestamps.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use sco_types::{ObjectId, Timestamp};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::ScoResult;
use crate::owner::ValueOwner;
use crate::sco::Sco;

/// A timestamp field value that reports every mutation to its owner.
///
/// Reads go through `Deref<Target = Timestamp>`. Every setter marks the
/// owning field dirty and, when no transaction is active, has the change
/// processed right away. A clone is never owned.
pub struct ScoTimestamp {
    value: Timestamp,
    owner: Option<ValueOwner>,
}

impl ScoTimestamp {
    /// A wrapper for `owner`, holding the epoch until initialised.
    pub fn new(owner: ValueOwner) -> Self {
        Self {
            value: Timestamp::epoch(),
            owner: Some(owner),
        }
    }

    pub fn unowned(value: Timestamp) -> Self {
        Self { value, owner: None }
    }

    /// Owned values are always fully loaded; this only logs.
    pub fn initialise(&mut self) {
        self.log_initialised();
    }

    pub fn initialise_from(&mut self, value: Timestamp) {
        self.value = value;
        self.log_initialised();
    }

    /// Replace the value on behalf of the owner, without marking it dirty.
    pub fn initialise_with(&mut self, new: Timestamp, old: Option<Timestamp>) {
        debug!(previous = ?old, "replacing owned timestamp");
        self.initialise_from(new);
    }

    fn log_initialised(&self) {
        if let Some(owner) = &self.owner {
            debug!(
                owner = %owner.printable(),
                field = %owner.member().name,
                value = %self.value,
                "initialised timestamp wrapper"
            );
        }
    }

    pub fn value(&self) -> Timestamp {
        self.value
    }

    /// A plain, disconnected copy of the value.
    pub fn detach_copy(&self) -> Timestamp {
        self.value
    }

    /// Take over a detached value. The owner is only marked dirty when the
    /// represented instant (in milliseconds) changed.
    pub fn attach_copy(&mut self, value: Timestamp) {
        let changed = self.value.millis() != value.millis();
        self.value = value;
        if changed {
            self.make_dirty();
        }
    }

    // ---------------------------------------------------------------
    // Mutators
    // ---------------------------------------------------------------

    /// Set milliseconds since the epoch. The nanosecond fraction becomes
    /// the millisecond remainder.
    pub fn set_time(&mut self, millis: i64) {
        self.value.set_millis(millis);
        self.make_dirty();
    }

    pub fn set_nanos(&mut self, nanos: u32) -> ScoResult<()> {
        self.value.set_nanos(nanos)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_year(&mut self, year: i32) -> ScoResult<()> {
        self.value.set_year(year)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_month(&mut self, month: u32) -> ScoResult<()> {
        self.value.set_month(month)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_date(&mut self, day: u32) -> ScoResult<()> {
        self.value.set_day(day)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_hours(&mut self, hours: u32) -> ScoResult<()> {
        self.value.set_hours(hours)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_minutes(&mut self, minutes: u32) -> ScoResult<()> {
        self.value.set_minutes(minutes)?;
        self.make_dirty();
        Ok(())
    }

    pub fn set_seconds(&mut self, seconds: u32) -> ScoResult<()> {
        self.value.set_seconds(seconds)?;
        self.make_dirty();
        Ok(())
    }
}

impl Sco for ScoTimestamp {
    type Snapshot = Timestamp;

    fn owner_id(&self) -> Option<ObjectId> {
        self.owner.as_ref().map(ValueOwner::id)
    }

    fn field_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|owner| owner.member().name.as_str())
    }

    fn unset_owner(&mut self) {
        self.owner = None;
    }

    /// Marks the field dirty and, outside a transaction, processes the
    /// change right away.
    fn make_dirty(&self) {
        if let Some(owner) = &self.owner {
            owner.changed();
        }
    }

    fn export_snapshot(&self) -> ScoResult<Timestamp> {
        Ok(self.value)
    }
}

impl Clone for ScoTimestamp {
    fn clone(&self) -> Self {
        Self::unowned(self.value)
    }
}

impl Deref for ScoTimestamp {
    type Target = Timestamp;

    fn deref(&self) -> &Timestamp {
        &self.value
    }
}

impl fmt::Display for ScoTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Debug for ScoTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoTimestamp")
            .field("value", &self.value)
            .field("owner", &self.owner)
            .finish()
    }
}

impl PartialEq for ScoTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ScoTimestamp {}

impl PartialEq<Timestamp> for ScoTimestamp {
    fn eq(&self, other: &Timestamp) -> bool {
        self.value == *other
    }
}

impl PartialOrd for ScoTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl PartialOrd<Timestamp> for ScoTimestamp {
    fn partial_cmp(&self, other: &Timestamp) -> Option<Ordering> {
        Some(self.value.cmp(other))
    }
}

impl Hash for ScoTimestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl Serialize for ScoTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ValueFixture;
    use sco_types::TypeError;

    fn owned(fixture: &ValueFixture) -> ScoTimestamp {
        let mut ts = ScoTimestamp::new(fixture.owner());
        ts.initialise_from("2024-03-01 10:20:30.5".parse().unwrap());
        ts
    }

    // ----------------------------------------------------------------
    // Dirty propagation
    // ----------------------------------------------------------------

    #[test]
    fn every_setter_marks_dirty() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        assert_eq!(fixture.dirty(), 0);

        ts.set_time(1_000);
        ts.set_nanos(5).unwrap();
        ts.set_year(2001).unwrap();
        ts.set_month(2).unwrap();
        ts.set_date(3).unwrap();
        ts.set_hours(4).unwrap();
        ts.set_minutes(5).unwrap();
        ts.set_seconds(6).unwrap();

        assert_eq!(fixture.dirty(), 8);
        assert_eq!(ts.to_string(), "2001-02-03 04:05:06.000000005");
    }

    #[test]
    fn non_transactional_update_only_outside_transaction() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        ts.set_time(1);
        assert_eq!(fixture.ctx.nontransactional_updates(), 1);

        fixture.ctx.set_transaction_active(true);
        ts.set_time(2);
        assert_eq!(fixture.ctx.nontransactional_updates(), 1);
        assert_eq!(fixture.dirty(), 2);
    }

    #[test]
    fn rejected_value_leaves_wrapper_clean() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        let before = ts.value();

        assert_eq!(
            ts.set_nanos(2_000_000_000),
            Err(crate::ScoError::Value(TypeError::NanosOutOfRange(2_000_000_000)))
        );
        assert_eq!(ts, before);
        assert_eq!(fixture.dirty(), 0);
    }

    #[test]
    fn initialise_does_not_mark_dirty() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        ts.initialise_with(Timestamp::from_millis(7), Some(ts.value()));
        ts.initialise();
        assert_eq!(ts.millis(), 7);
        assert_eq!(fixture.dirty(), 0);
    }

    // ----------------------------------------------------------------
    // Ownership
    // ----------------------------------------------------------------

    #[test]
    fn unset_owner_stops_dirty_marking() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        ts.unset_owner();
        ts.set_time(42);

        assert_eq!(ts.millis(), 42);
        assert_eq!(ts.owner_id(), None);
        assert_eq!(ts.field_name(), None);
        assert_eq!(fixture.dirty(), 0);
    }

    #[test]
    fn dropped_owner_behaves_as_unowned() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        let ValueFixture { sm, ctx, .. } = fixture;
        drop(sm);

        ts.set_time(42);
        assert_eq!(ts.millis(), 42);
        assert_eq!(ctx.nontransactional_updates(), 0);
    }

    #[test]
    fn clone_is_never_owned() {
        let fixture = ValueFixture::new();
        let ts = owned(&fixture);
        let mut copy = ts.clone();
        assert_eq!(copy, ts);
        assert!(ts.owner_id().is_some());
        assert_eq!(copy.owner_id(), None);

        copy.set_time(0);
        assert_eq!(fixture.dirty(), 0);
    }

    // ----------------------------------------------------------------
    // Detach, attach and export
    // ----------------------------------------------------------------

    #[test]
    fn attach_marks_dirty_only_when_instant_changes() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);

        let same_millis = Timestamp::new(ts.secs(), ts.nanos() + 1).unwrap();
        ts.attach_copy(same_millis);
        assert_eq!(fixture.dirty(), 0);
        assert_eq!(ts.nanos(), same_millis.nanos());

        ts.attach_copy(Timestamp::from_millis(99));
        assert_eq!(fixture.dirty(), 1);
    }

    #[test]
    fn detached_copy_is_disconnected() {
        let fixture = ValueFixture::new();
        let mut ts = owned(&fixture);
        let detached = ts.detach_copy();
        ts.set_time(0);
        assert_ne!(detached, ts.value());
    }

    #[test]
    fn serializes_as_plain_value() {
        let fixture = ValueFixture::new();
        let ts = owned(&fixture);
        let json = serde_json::to_string(&ts).unwrap();
        let plain: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, plain);
        assert_eq!(ts.export_snapshot().unwrap(), plain);
    }

    #[test]
    fn compares_with_plain_timestamps() {
        let ts = ScoTimestamp::unowned(Timestamp::from_millis(10));
        assert!(ts > Timestamp::from_millis(9));
        assert!(ts < ScoTimestamp::unowned(Timestamp::from_millis(11)));
        assert_eq!(ts.millis(), 10);
    }
}
