//! Allocation strategy contract.

use crate::calls::{CallData, Floor};
use crate::gcs::CarStatusSnapshot;
use crate::physics::FlightTables;

/// Read-only context a strategy may consult besides the call and the shadow
/// table: the flight tables (for the arrival-time predictor) and the clock.
pub struct DispatchContext<'a> {
    pub tables: &'a FlightTables,
    pub num_floors: Floor,
    pub now_ms: u64,
}

/// Picks the car that should serve a hall call.
///
/// A strategy is a pure function of the call and the shadow-status snapshot;
/// it must never return a car absent from the snapshot. Ties break by
/// snapshot iteration order (car registration order). Returning `None` makes
/// the dispatcher fall back to the first registered car.
pub trait AllocationStrategy: Send + Sync {
    fn select_car(
        &self,
        call: &CallData,
        statuses: &[(String, CarStatusSnapshot)],
        ctx: &DispatchContext<'_>,
    ) -> Option<String>;

    fn name(&self) -> &'static str;
}
