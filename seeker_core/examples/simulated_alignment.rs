//! Run a full simulated alignment attempt and a few conveyor cycles.
//!
//! ```text
//! RUST_LOG=debug cargo run -p seeker_core --example simulated_alignment
//! ```

use std::sync::Arc;

use seeker_core::{
    run_alignment, AlignParams, CameraGeometry, ConveyorCore, InterpolationTable, Mode, PidGains,
    RangeGoal, Result, ShotTables,
};
use seeker_hardware::{SimConveyor, SimDrivetrain, SimMotion, SimPlant, SimVision};
use seeker_traits::ManualClock;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Goal 25 degrees off to the right, 3.4 m away; shoot from 2.0 m.
    let plant = SimPlant::new(25.0, 3.4);
    let vision = SimVision::new(plant.clone());
    let motion = SimMotion::new(plant.clone());
    let drive = SimDrivetrain::new(plant.clone(), 0.02);

    let tables = ShotTables::new(
        InterpolationTable::new([(1.5, 2300.0), (2.0, 2500.0), (3.0, 2900.0)])?,
        InterpolationTable::new([(1.5, -0.5), (2.0, 0.0), (3.0, 0.75)])?,
    );
    let range_gains = PidGains {
        kp: 1.0,
        ki: 0.0,
        kd: 0.0,
        integrator_range: 0.0,
        integrator_limit: 0.0,
    };

    // Manual clock: the run completes instantly in simulated time.
    let clock = Arc::new(ManualClock::new());
    let report = run_alignment(
        vision,
        motion,
        drive,
        AlignParams::default(),
        Some(RangeGoal::measured(2.0)),
        CameraGeometry::default(),
        PidGains::default(),
        range_gains,
        0.25,
        Some(tables),
        Some(clock),
    )?;
    println!(
        "aligned in {} ticks: angle error {:.2} deg, distance {:.2} m (plant at {:.2} m)",
        report.ticks,
        report.angle_error_deg,
        report.distance_m.unwrap_or(f64::NAN),
        plant.goal_range_m()
    );

    // Stage a ball through the conveyor in Index mode, then fire it.
    let conveyor = SimConveyor::new();
    let mut routing = ConveyorCore::new(conveyor.clone(), conveyor.clone());
    conveyor.gap_own.set(true);
    routing.cycle()?;
    conveyor.gap_own.set(false);
    conveyor.top_occupied.set(true);
    routing.cycle()?;
    routing.set_mode(Mode::ShootTop);
    let r = routing.cycle()?;
    println!("conveyor firing: gap {:?}, top {:?}", r.gap, r.top);
    Ok(())
}
