//! State pool: allocation of FSM state slots on one core.
//!
//! The device is the authority on which slots are in use, since several
//! compilers and the reserved bookkeeping states share one core. Allocation
//! therefore queries occupancy slot by slot. The pool additionally remembers
//! which slots it handed out itself, so those are never queried again or
//! handed out twice while a sequence still references them.

pub mod error;
mod state_set;

pub use error::PoolError;
pub use state_set::StateSet;

use crate::core::{Priority, StateId};
use crate::link::{DeviceLink, LinkError, Transport};
use crate::transition::Transition;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct StatePool {
    owned: StateSet,
}

impl StatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots currently handed out by this pool.
    pub fn owned(&self) -> &StateSet {
        &self.owned
    }

    /// Allocate the first `n` free slots in ascending index order.
    ///
    /// Both transition priorities of every returned slot are disabled. If
    /// fewer than `n` slots are free nothing is touched and
    /// [`PoolError::Exhausted`] names the core.
    pub fn allocate<T: Transport>(
        &mut self,
        link: &mut DeviceLink<T>,
        n: usize,
    ) -> Result<Vec<StateId>, PoolError> {
        let mut free = Vec::with_capacity(n);
        for state in StateId::all() {
            if free.len() == n {
                break;
            }
            if self.owned.contains(state) {
                continue;
            }
            if !link.is_state_occupied(state)? {
                free.push(state);
            }
        }

        if free.len() < n {
            return Err(PoolError::Exhausted {
                core: link.core(),
                requested: n,
                available: free.len(),
            });
        }

        for &state in &free {
            Self::reset_rules(link, state)?;
            self.owned.insert(state);
        }
        debug!(core = %link.core(), states = ?free, "allocated states");
        Ok(free)
    }

    /// Disable both transition priorities of `state`.
    pub fn reset_rules<T: Transport>(
        link: &mut DeviceLink<T>,
        state: StateId,
    ) -> Result<(), LinkError> {
        for priority in [Priority::High, Priority::Low] {
            let commands = Transition::disabled(state, priority).encode()?;
            link.execute(&commands)?;
        }
        Ok(())
    }

    /// Reset `state` on the device and return it to the pool.
    pub fn free<T: Transport>(
        &mut self,
        link: &mut DeviceLink<T>,
        state: StateId,
    ) -> Result<(), PoolError> {
        link.free_state(state)?;
        self.owned.remove(state);
        debug!(core = %link.core(), %state, "freed state");
        Ok(())
    }

    /// Free every slot this pool handed out.
    pub fn free_all<T: Transport>(&mut self, link: &mut DeviceLink<T>) -> Result<(), PoolError> {
        let owned: Vec<StateId> = self.owned.iter().collect();
        for state in owned {
            self.free(link, state)?;
        }
        Ok(())
    }
}
