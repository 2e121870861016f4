#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core alignment and cargo-routing logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent control engine for a
//! goal-seeking drive base with a two-stage cargo conveyor. All hardware
//! interactions go through the `seeker_traits` device traits.
//!
//! ## Architecture
//!
//! - **Filtering**: low-pass, high-pass, rate limit, clamp (`filter` module)
//! - **Fusion**: complementary estimation over sensor pairs (`fusion` module)
//! - **Control**: PID with gated integrator, bang-bang (`controller` module)
//! - **Debounce**: duration-qualified boolean conditions (`debounce` module)
//! - **Lookup**: nearest-neighbor shot tables (`interpolate` module)
//! - **Alignment**: turn + range loop with a type-state builder (`align`)
//! - **Routing**: priority-ordered conveyor policy (`conveyor` module)
//! - **Runner**: blocking paced run loop (`runner` module)

pub mod align;
pub mod config;
pub mod controller;
pub mod conveyor;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod interpolate;
pub mod mocks;
pub mod runner;

mod hw_error;

pub use align::{
    build_align, speed_adjustment, Align, AlignBuilder, AlignCore, AlignG, AlignState,
    AlignStatus, Missing, RangeAligner, RangeUpdate, Set, TurnAligner, TurnUpdate,
};
pub use config::{
    AlignParams, CameraGeometry, DistanceSource, FusionParams, PidGains, RangeGoal,
};
pub use controller::{BangBangController, FeedbackController, PidController};
pub use conveyor::{route, CargoSights, ConveyorCore, Mode, Routing, RoutingLatch};
pub use debounce::{DebounceEdge, Debouncer};
pub use error::{AbortReason, BuildError, ControlError, Report, Result};
pub use filter::{ClampFilter, Filter, HighPassFilter, LowPassFilter, RateLimiter};
pub use fusion::{FusionEstimator, SharedSample};
pub use interpolate::{InterpolationTable, ShotParams, ShotTables};
pub use runner::{run_alignment, AlignReport};
