//! Core data model.
//!
//! A work item is one Collatz sequence in flight. It keeps its identity
//! (index + start value) for life and carries the evolving value and step
//! count between the producer, the queue and the consumer.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A fixed-size record passed through the queue.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// 1-based sequence identifier. Immutable.
    pub index: u32,

    /// Value the sequence started from. Immutable.
    pub start_value: u64,

    /// Current value of the sequence. Always >= 1.
    pub current_value: u64,

    /// Number of Collatz steps applied so far.
    pub step_count: u32,
}

impl WorkItem {
    /// Create a fresh item with `current_value = start_value` and no steps.
    pub fn new(index: u32, start_value: u64) -> Result<Self> {
        if start_value == 0 {
            return Err(Error::InvalidValue(0));
        }
        Ok(Self {
            index,
            start_value,
            current_value: start_value,
            step_count: 0,
        })
    }

    pub fn state(&self) -> ItemState {
        if self.current_value == 1 {
            ItemState::Retired
        } else {
            ItemState::Active
        }
    }

    /// Apply one Collatz step to an active item.
    ///
    /// A retired item is left untouched. Returns the state after the step.
    pub fn advance(&mut self) -> Result<ItemState> {
        if self.state() == ItemState::Retired {
            return Ok(ItemState::Retired);
        }
        self.current_value = collatz_step(self.current_value)?;
        self.step_count += 1;
        Ok(self.state())
    }

    pub fn retirement(&self) -> Retirement {
        Retirement {
            index: self.index,
            start_value: self.start_value,
            step_count: self.step_count,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// `current_value > 1`; the consumer will step it and resubmit.
    Active,
    /// Reached 1. Terminal.
    Retired,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemState::Active => "active",
            ItemState::Retired => "retired",
        };
        write!(f, "{s}")
    }
}

/// What the consumer records when a sequence reaches 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Retirement {
    pub index: u32,
    pub start_value: u64,
    pub step_count: u32,
}

// ---------------------------------------------------------------------------
// Collatz
// ---------------------------------------------------------------------------

/// One application of the Collatz map: `n / 2` if even, else `3n + 1`.
pub fn collatz_step(n: u64) -> Result<u64> {
    match n {
        0 => Err(Error::InvalidValue(0)),
        n if n % 2 == 0 => Ok(n / 2),
        n => n
            .checked_mul(3)
            .and_then(|v| v.checked_add(1))
            .ok_or(Error::Overflow(n)),
    }
}

/// Full trajectory from `start` down to 1, both ends included.
///
/// Computed independently of [`WorkItem`] so reports can be cross-checked.
pub fn trajectory(start: u64) -> Result<Vec<u64>> {
    if start == 0 {
        return Err(Error::InvalidValue(0));
    }
    let mut values = vec![start];
    let mut n = start;
    while n != 1 {
        n = if n % 2 == 0 {
            n / 2
        } else {
            3u64.checked_mul(n)
                .and_then(|v| v.checked_add(1))
                .ok_or(Error::Overflow(n))?
        };
        values.push(n);
    }
    Ok(values)
}

/// Number of steps `start` needs to reach 1.
pub fn steps_to_one(start: u64) -> Result<u32> {
    let len = trajectory(start)?.len() - 1;
    u32::try_from(len).map_err(|_| Error::Overflow(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_halves_even_and_triples_odd() {
        assert_eq!(collatz_step(8).unwrap(), 4);
        assert_eq!(collatz_step(7).unwrap(), 22);
        assert_eq!(collatz_step(2).unwrap(), 1);
    }

    #[test]
    fn step_results_are_positive_for_values_above_one() {
        for n in 2..5_000u64 {
            let next = collatz_step(n).unwrap();
            assert!(next >= 1);
            if n % 2 == 0 {
                assert_eq!(next * 2, n);
            } else {
                assert_eq!(next, 3 * n + 1);
            }
        }
    }

    #[test]
    fn step_rejects_zero_and_overflow() {
        assert!(matches!(collatz_step(0), Err(Error::InvalidValue(0))));
        assert!(matches!(collatz_step(u64::MAX), Err(Error::Overflow(_))));
    }

    #[test]
    fn new_item_rejects_zero_start() {
        assert!(WorkItem::new(1, 0).is_err());
    }

    #[test]
    fn retired_item_is_not_stepped() {
        let mut item = WorkItem::new(3, 1).unwrap();
        assert_eq!(item.state(), ItemState::Retired);
        assert_eq!(item.advance().unwrap(), ItemState::Retired);
        assert_eq!(item.current_value, 1);
        assert_eq!(item.step_count, 0);
    }

    #[test]
    fn power_of_two_retires_after_exponent_steps() {
        let mut item = WorkItem::new(1, 8).unwrap();
        let mut seen = Vec::new();
        while item.state() == ItemState::Active {
            item.advance().unwrap();
            seen.push(item.current_value);
        }
        assert_eq!(seen, vec![4, 2, 1]);
        assert_eq!(item.step_count, 3);
        assert_eq!(item.start_value, 8);
    }

    #[test]
    fn trajectory_of_seven_is_canonical() {
        assert_eq!(
            trajectory(7).unwrap(),
            vec![7, 22, 11, 34, 17, 52, 26, 13, 40, 20, 10, 5, 16, 8, 4, 2, 1]
        );
        assert_eq!(steps_to_one(7).unwrap(), 16);
        assert_eq!(steps_to_one(1).unwrap(), 0);
    }

    #[test]
    fn work_item_steps_agree_with_reference() {
        for start in 1..2_000u64 {
            let mut item = WorkItem::new(1, start).unwrap();
            while item.advance().unwrap() == ItemState::Active {}
            assert_eq!(item.step_count, steps_to_one(start).unwrap(), "start {start}");
        }
    }
}
