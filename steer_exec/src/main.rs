//! Main steering control executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop, driven by the simulator's telemetry:
//!         - Tuning processing (when a step budget was given)
//!         - PID steering control processing
//!         - Response transmission to the simulator
//!
//! The simulator pushes one telemetry frame per timestep and expects
//! exactly one response per frame: a steering/throttle demand, a manual
//! driving acknowledgement, or, at tuning cycle boundaries, a reset
//! command.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::{
    net::NetParams,
    sim::{SimMessage, SimResponse, SteerDems},
};
use steer_lib::{
    pid_ctrl::{self, Gains, PidCtrl},
    sim_server::SimServer,
    tuner::{self, Tuner},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use structopt::StructOpt;

// Internal
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Parameter file for the PID steering control module.
const PID_CTRL_PARAMS: &str = "pid_ctrl.toml";

/// Parameter file for the tuning module.
const TUNER_PARAMS: &str = "tuner.toml";

/// Parameter file for the network.
const NET_PARAMS: &str = "net.toml";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line arguments.
///
/// Either zero or all three gains must be given. When none are given the
/// defaults from the parameter file are used.
#[derive(Debug, StructOpt)]
#[structopt(name = "steer_exec", about = "PID steering control executable")]
struct CliArgs {
    /// Initial proportional gain (Kp)
    kp: Option<f64>,

    /// Initial integral gain (Ki)
    ki: Option<f64>,

    /// Initial derivative gain (Kd)
    kd: Option<f64>,

    /// Number of scored samples per tuning evaluation cycle. Zero disables
    /// tuning.
    #[structopt(long, default_value = "0")]
    max_steps: u64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("steer_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Steering Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    let result = run(&session);

    // The loop only returns on a fatal error, drain any pending session
    // saves before propagating it
    session.exit();

    result
}

/// Parse arguments, initialise the modules and run the telemetry loop.
fn run(session: &Session) -> Result<(), Report> {
    // ---- PARSE CLI ARGUMENTS ----

    let args = CliArgs::from_args();

    debug!("CLI arguments: {:?}", args);

    let cli_gains = match (args.kp, args.ki, args.kd) {
        (Some(kp), Some(ki), Some(kd)) => Some(Gains { kp, ki, kd }),
        (None, None, None) => None,
        _ => {
            return Err(eyre!(
                "Expected either zero or three gain arguments, see --help"
            ))
        }
    };

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load(NET_PARAMS).wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut pid_ctrl = PidCtrl::default();
    pid_ctrl
        .init((PID_CTRL_PARAMS, cli_gains), session)
        .wrap_err("Failed to initialise PidCtrl")?;
    info!("PidCtrl init complete, gains: {:?}", pid_ctrl.gains());

    // The tuner searches over Kp and Kd, Ki is held at its initial value
    let mut tuner = Tuner::default();
    tuner
        .init(
            (
                TUNER_PARAMS,
                vec![pid_ctrl.gains().kp, pid_ctrl.gains().kd],
                args.max_steps,
            ),
            session,
        )
        .wrap_err("Failed to initialise Tuner")?;

    if tuner.enabled() {
        info!("Tuning enabled, {} scored samples per cycle", args.max_steps);
    } else {
        info!("Tuning disabled");
    }

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let mut sim_server =
        SimServer::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the SimServer")?;

    info!("SimServer listening on {}\n", net_params.sim_endpoint);

    // ---- MAIN LOOP ----

    let mut tuned_reported = false;

    loop {
        // Get the next message, waiting if nothing has arrived yet
        let message = match sim_server
            .get_telemetry()
            .wrap_err("Failed to receive from the simulator")?
        {
            Some(m) => m,
            None => continue,
        };

        let telem = match message {
            SimMessage::Telemetry(t) => t,
            SimMessage::NoData => {
                // Manual driving, just acknowledge
                sim_server
                    .send_response(&SimResponse::Manual)
                    .wrap_err("Failed to acknowledge manual driving")?;
                continue;
            }
        };

        // ---- TUNING PROCESSING ----

        let mut new_gains = None;

        if tuner.enabled() {
            let (tune_output, tune_report) = tuner.proc(&tuner::InputData { cte: telem.cte })?;

            if let Some(summary) = tune_report.cycle_end {
                info!(
                    "End of cycle {} (value {}): score {:.6}, best {:.6}, {:?}, next trial {:?}",
                    summary.cycle,
                    summary.param_idx,
                    summary.score,
                    summary.best_err,
                    summary.action,
                    tune_output.values
                );

                if let Err(e) = tuner.write() {
                    warn!("Could not archive the tuning cycle: {}", e);
                }
            }

            if tune_output.tuned && !tuned_reported {
                tuned_reported = true;
                info!(
                    "Tuning finished, best error: {:.6}, best values: {:?}",
                    tuner.best_error(),
                    tuner.best_values()
                );
                session.save("tuner/best_params.json", tuner.best_values().to_vec());
            }

            new_gains = Some(Gains {
                kp: tune_output.values[0],
                ki: pid_ctrl.gains().ki,
                kd: tune_output.values[1],
            });

            // At a cycle boundary the simulated environment is stale: reset
            // it and discard this sample
            if tune_output.reset_cycle {
                sim_server
                    .send_response(&SimResponse::Reset)
                    .wrap_err("Failed to send the reset command")?;
                continue;
            }
        }

        // ---- STEERING CONTROL PROCESSING ----

        let (output, report) = pid_ctrl.proc(&pid_ctrl::InputData {
            cte: telem.cte,
            speed: telem.speed,
            steering_angle: telem.steering_angle,
            gains: new_gains,
        })?;

        if report.steer_limited {
            debug!("Steering demand saturated");
        }

        if let Err(e) = pid_ctrl.write() {
            warn!("Could not archive the telemetry record: {}", e);
        }

        // ---- RESPONSE ----

        sim_server
            .send_response(&SimResponse::Steer(SteerDems {
                steering_angle: output.steer,
                throttle: output.throttle,
            }))
            .wrap_err("Failed to send the steering demand")?;
    }
}
