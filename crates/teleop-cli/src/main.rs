//! `teleop-cli` – interactive teleoperation shell.
//!
//! 1. Loads `~/.teleop/config.toml`, writing the defaults on first run.
//! 2. Starts an in-process bus with a simulated vehicle on it and connects a
//!    [`RobotController`] to the same bus.
//! 3. Restores a plan paused in the previous session (without starting it).
//! 4. Drops the user into the REPL.  **Ctrl-C** stops the vehicle and leaves
//!    the shell; the paused plan is saved on the way out.

mod config;
mod plans;
mod repl;
mod sim;
mod state;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use teleop_core::RobotController;
use teleop_middleware::EventBus;

use crate::config::{Config, FileConfigSource};
use crate::sim::SimVehicle;

fn main() -> ExitCode {
    let _tracing = telemetry::init_tracing("teleop");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    // ── Bus, vehicle, controller ──────────────────────────────────────────
    let bus = Arc::new(EventBus::default());
    let mut vehicle = match SimVehicle::spawn(bus.as_ref(), &cfg.controller, cfg.sim.clone()) {
        Ok(vehicle) => vehicle,
        Err(e) => {
            error!(error = %e, "simulated vehicle failed to start");
            return ExitCode::FAILURE;
        }
    };

    let controller = RobotController::new(
        Arc::new(FileConfigSource::new(config::config_path())),
        Arc::new(plans::factory),
    );
    if let Err(e) = controller.connect(bus.clone()) {
        error!(error = %e, "controller failed to connect");
        vehicle.shutdown();
        return ExitCode::FAILURE;
    }
    println!("  {} {} on the in-process bus", "✓".green().bold(), controller.node_name().bold());

    // ── Persisted plan ────────────────────────────────────────────────────
    match state::load_from(&state::state_path()) {
        Ok(persisted) => {
            controller.load(persisted);
            if let Some(kind) = controller.paused_plan() {
                println!(
                    "  Plan {} was paused last session; {} to continue.",
                    plans::name_of(kind).bold(),
                    "/resume".bold().cyan()
                );
            }
        }
        Err(e) => warn!(error = %e, "ignoring saved state"),
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    let ctrlc_controller = controller.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the vehicle …".yellow().bold());
        halt(&ctrlc_controller);
        println!("{}", "  ✓ Zero velocity published. Press Enter to exit.".green());
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the vehicle");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&controller, &vehicle, shutdown);

    // ── Teardown ──────────────────────────────────────────────────────────
    halt(&controller);
    if let Err(e) = state::save_to(&controller.save(), &state::state_path()) {
        warn!(error = %e, "could not save plan state");
    }
    controller.disconnect();
    vehicle.shutdown();
    ExitCode::SUCCESS
}

/// Stop the vehicle if anything is driving it or a command is still
/// stored.  A stop while a plan is already paused would forget that plan.
fn halt(controller: &RobotController) {
    if should_halt(controller) {
        controller.stop();
    }
}

fn should_halt(controller: &RobotController) -> bool {
    controller.motion_plan().is_some() || controller.is_publishing() || !controller.velocity_command().is_zero()
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______    __                "#.bold().cyan());
    println!("{}", r#" /_  __/__ / /__ ___  ___    "#.bold().cyan());
    println!("{}", r#"  / / / -_) / -_) _ \/ _ \   "#.bold().cyan());
    println!("{}", r#" /_/  \__/_/\__/\___/ .__/   "#.bold().cyan());
    println!("{}", r#"                   /_/        "#.bold().cyan());
    println!();
    println!("  {} {}", "Teleop".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Vehicle coordination shell");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleop_core::ControllerConfig;

    #[test]
    fn halt_keeps_a_paused_plan() {
        let controller = RobotController::new(Arc::new(ControllerConfig::default()), Arc::new(plans::factory));
        controller.connect(Arc::new(EventBus::default())).expect("connect");
        assert!(!should_halt(&controller));

        controller.publish_velocity(0.4, 0.0, 0.0);
        assert!(should_halt(&controller));
        halt(&controller);
        assert!(controller.velocity_command().is_zero());

        controller.run_plan(plans::by_name("cruise").expect("cruise"));
        halt(&controller);
        assert_eq!(controller.paused_plan(), Some(plans::CRUISE));
        halt(&controller);
        assert_eq!(controller.paused_plan(), Some(plans::CRUISE));
        controller.disconnect();
    }
}
