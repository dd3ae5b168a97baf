//! REPL – the interactive control surface.
//!
//! Supported slash-commands:
//!   /run <plan>   – run `cruise` or `spin`
//!   /stop         – stop the current plan (pauses it when resumable)
//!   /resume       – resume the paused plan
//!   /status       – plan, position, command and location
//!   /help         – show this list
//!   /quit | /exit – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use teleop_core::{PlanState, RobotController};

use crate::plans;
use crate::sim::SimVehicle;

/// Parsed shell input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(String),
    Stop,
    Resume,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let head = words.next()?;
        Some(match head {
            "/run" => match words.next() {
                Some(name) => Command::Run(name.to_string()),
                None => Command::Unknown(line.trim().to_string()),
            },
            "/stop" => Command::Stop,
            "/resume" => Command::Resume,
            "/status" => Command::Status,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        })
    }
}

/// Read commands until `/quit`, end of input or `shutdown` is raised.
pub fn run(controller: &RobotController, vehicle: &SimVehicle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "teleop>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Command::Run(name) => cmd_run(controller, &name),
            Command::Stop => cmd_stop(controller),
            Command::Resume => cmd_resume(controller),
            Command::Status => cmd_status(controller, vehicle),
            Command::Help => cmd_help(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Teleop Commands".bold().underline());
    println!("  {} – run a plan (cruise, spin)", "/run <plan>".bold().cyan());
    println!("  {}       – stop; cruise can be resumed", "/stop".bold().cyan());
    println!("  {}     – resume the paused plan", "/resume".bold().cyan());
    println!("  {}     – vehicle and plan status", "/status".bold().cyan());
    println!("  {} – exit the shell", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_run(controller: &RobotController, name: &str) {
    match plans::by_name(name) {
        Some(plan) => {
            controller.run_plan(plan);
            println!("  {} {}", "▶".green().bold(), name.bold());
        }
        None => println!("{} '{}' (try cruise or spin)", "Unknown plan".red(), name.yellow()),
    }
}

fn cmd_stop(controller: &RobotController) {
    if controller.stop() {
        println!("  {} stopped, {} to continue", "■".yellow().bold(), "/resume".bold());
    } else {
        println!("  {} stopped", "■".yellow().bold());
    }
}

fn cmd_resume(controller: &RobotController) {
    let paused = controller.paused_plan();
    if controller.resume_plan() {
        let name = paused.map_or("plan", plans::name_of);
        println!("  {} {} resumed", "▶".green().bold(), name.bold());
    } else {
        println!("  {}", "Nothing to resume.".dimmed());
    }
}

fn cmd_status(controller: &RobotController, vehicle: &SimVehicle) {
    let plan = match controller.plan_state() {
        PlanState::Idle => "idle".dimmed().to_string(),
        PlanState::Running(plan) => format!("running {}", plan.kind().map_or("ad-hoc", plans::name_of)).green().to_string(),
        PlanState::Paused(kind) => format!("paused {}", plans::name_of(kind)).yellow().to_string(),
    };
    let command = controller.velocity_command();
    let truth = vehicle.state();

    println!();
    println!("  {:<10} {}", "Plan".bold(), plan);
    println!(
        "  {:<10} x={:+.2} m  y={:+.2} m  heading={:+.1}°",
        "Position".bold(),
        controller.x(),
        controller.y(),
        controller.heading().to_degrees()
    );
    println!(
        "  {:<10} {:.2} m/s  turn {:+.2} rad/s",
        "Motion".bold(),
        controller.speed(),
        controller.turn_rate()
    );
    println!(
        "  {:<10} linear_x={:+.2} linear_y={:+.2} angular_z={:+.2} ({})",
        "Command".bold(),
        command.linear_x,
        command.linear_y,
        command.angular_z,
        if controller.is_publishing() { "armed".green() } else { "disarmed".dimmed() }
    );
    match controller.location_provider().last_location() {
        Some(loc) => println!(
            "  {:<10} {:.6}, {:.6}{}",
            "Location".bold(),
            loc.latitude,
            loc.longitude,
            if loc.has_fix { "" } else { " (no fix)" }
        ),
        None => println!("  {:<10} {}", "Location".bold(), "waiting for fix".dimmed()),
    }
    if let Some(scan) = controller.laser_scan() {
        let nearest = scan.ranges.iter().copied().fold(f32::INFINITY, f32::min);
        println!("  {:<10} nearest obstacle {:.2} m", "Scan".bold(), nearest);
    }
    println!(
        "  {:<10} x={:+.2} y={:+.2} (simulator frame)",
        "Truth".dimmed(),
        truth.x,
        truth.y
    );
    println!();
}
