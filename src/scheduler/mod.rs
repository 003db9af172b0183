//! Run scheduling: when to run and what to generate
//!
//! # Overview
//!
//! Scheduling is split into three independent pieces that the orchestrator
//! composes:
//!
//! ```text
//! ┌──────────────┐   tick    ┌──────────────┐   open?   ┌──────────────┐
//! │ DailyTrigger │ ────────▶ │  TimingGate  │ ────────▶ │ QuotaPlanner │
//! └──────────────┘           └──────────────┘           └──────────────┘
//!   clock + shutdown           hour window +              per-category
//!                              min interval               deficits
//! ```
//!
//! - [`trigger`] - Periodic tick loop with startup catch-up and shutdown
//! - [`gate`] - Hour window (wrapping past midnight) and minimum interval
//! - [`planner`] - Deficit-ordered list of categories still below target
//!
//! The gate and planner are pure with respect to the clock: callers pass
//! `now` and the day explicitly, which keeps them deterministic under test.
//!
//! # Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `start_hour` | 2 | First hour of the window (local) |
//! | `end_hour` | 6 | Hour the window closes (exclusive) |
//! | `utc_offset_minutes` | 0 | Offset used for hours and the calendar day |
//! | `min_interval_minutes` | 360 | Minimum spacing between successful runs |
//! | `tick_secs` | 300 | Trigger period |
//! | `run_on_startup` | true | Fire a catch-up run when the process starts |

pub mod error;
pub mod gate;
pub mod planner;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use gate::{GateDecision, TimingGate};
pub use planner::{compute_plan, DailyPlan, PlannedUnit, QuotaPlanner};
pub use trigger::{DailyTrigger, RunHandler, RunTrigger};
