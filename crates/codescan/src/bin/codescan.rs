use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use codescan::sim::{SimScenario, SimulatedCamera};
use codescan::{
    CameraBackend, CapabilityProbe, ContentMode, DeviceRegistry, ListenerQueue, Orientation,
    PreviewGeometry, ScanController, ScanOutcome, ScannerOptions, SessionState, Size,
};

#[derive(Parser, Debug)]
#[command(name = "codescan", version, about = "Replay scripted camera scenarios through the scanner")]
struct Cli {
    /// Log lifecycle and per-frame decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print what the scenario's camera can do
    Probe {
        scenario: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Scan the scenario's frames and print every listener outcome
    Run {
        scenario: PathBuf,
        /// Scanner options JSON; defaults apply when omitted
        #[arg(long)]
        options: Option<PathBuf>,
        /// Preview size in points, `WIDTHxHEIGHT`
        #[arg(long, default_value = "375x667", value_parser = parse_size)]
        preview: Size,
        /// Sensor frame size in pixels, `WIDTHxHEIGHT`
        #[arg(long, default_value = "1920x1080", value_parser = parse_size)]
        sensor: Size,
        #[arg(long, value_enum, default_value_t = OrientationArg::Portrait)]
        orientation: OrientationArg,
        /// Give up after this long without the scan finishing
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
        /// One JSON object per outcome
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrientationArg {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl From<OrientationArg> for Orientation {
    fn from(value: OrientationArg) -> Self {
        match value {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::PortraitUpsideDown => Orientation::PortraitUpsideDown,
            OrientationArg::LandscapeLeft => Orientation::LandscapeLeft,
            OrientationArg::LandscapeRight => Orientation::LandscapeRight,
        }
    }
}

fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{s}`"))?;
    let width: f64 = w.trim().parse().map_err(|e| format!("bad width `{w}`: {e}"))?;
    let height: f64 = h.trim().parse().map_err(|e| format!("bad height `{h}`: {e}"))?;
    Ok(Size::new(width, height))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Probe { scenario, json } => probe(scenario, json),
        Command::Run {
            scenario,
            options,
            preview,
            sensor,
            orientation,
            timeout_ms,
            json,
        } => {
            let geometry = PreviewGeometry::new(preview, sensor)
                .with_content_mode(ContentMode::AspectFill)
                .with_orientation(orientation.into());
            run(scenario, options, geometry, Duration::from_millis(timeout_ms), json)
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("codescan: {err}");
            ExitCode::FAILURE
        }
    }
}

fn log_level(verbose: bool) -> log::LevelFilter {
    if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    }
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: bool) {
    let level = log_level(verbose).to_string().to_lowercase();
    codescan::init_tracing_with_default(false, &level);
    let _ = tracing_log::LogTracer::init();
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: bool) {
    if let Err(err) = codescan::init_with_level(log_level(verbose)) {
        eprintln!("logger already installed: {err}");
    }
}

fn probe(path: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let camera: Arc<dyn CameraBackend> = Arc::new(SimulatedCamera::new(SimScenario::load_json(path)?));
    let report = CapabilityProbe::new(camera).report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("scanning available: {}", report.scanning_available);
    println!("authorization: {:?}", report.authorization);
    println!("qr code: {}", report.qr_code);
    println!("torch: {}", report.torch);
    for input in &report.inputs {
        let marker = if Some(&input.id) == report.default_input.as_ref() {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {} ({:?}{})",
            input.id,
            input.position,
            if input.has_torch { ", torch" } else { "" }
        );
    }
    println!("symbologies: {}", report.symbologies);
    Ok(())
}

fn run(
    scenario: PathBuf,
    options: Option<PathBuf>,
    geometry: PreviewGeometry,
    timeout: Duration,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let camera = SimulatedCamera::new(SimScenario::load_json(scenario)?);
    let options = match options {
        Some(path) => ScannerOptions::load_json(path)?,
        None => ScannerOptions::default(),
    };

    let queue = ListenerQueue::new();
    let controller = ScanController::with_registry(
        Arc::new(camera.clone()),
        DeviceRegistry::new(),
        Arc::new(queue.clone()),
    )?;
    let (tx, rx) = mpsc::channel();
    controller.on_decode(move |outcome: ScanOutcome| {
        let _ = tx.send(outcome);
    });

    controller.configure_with_options(&options, geometry)?;
    if controller.state() != SessionState::Running {
        controller.start()?;
    }
    if controller.should_show_torch_button() {
        log::info!("torch button shown");
    }

    let deadline = Instant::now() + timeout;
    let mut quiet_since = Instant::now();
    let mut outcomes = Vec::new();
    while Instant::now() < deadline {
        if queue.pump_timeout(Duration::from_millis(20)) > 0 {
            quiet_since = Instant::now();
        }
        outcomes.extend(rx.try_iter());
        let finished = controller.state() != SessionState::Running && queue.pending() == 0;
        let drained =
            camera.pending_frames() == 0 && quiet_since.elapsed() > Duration::from_millis(200);
        if finished || drained {
            break;
        }
    }
    // a one-shot scan has already stopped itself; stopping again would drop its result
    if controller.state() == SessionState::Running {
        controller.stop();
    }
    queue.pump_timeout(Duration::from_millis(100));
    outcomes.extend(rx.try_iter());

    for outcome in &outcomes {
        if json {
            println!("{}", serde_json::to_string(outcome)?);
        } else if outcome.is_error {
            println!("error: {}", outcome.status_text);
        } else {
            let symbology = outcome
                .symbology
                .map(|s| s.to_string())
                .unwrap_or_default();
            println!(
                "decoded {symbology} {}",
                outcome.payload.as_deref().unwrap_or_default()
            );
        }
    }
    if outcomes.is_empty() && !json {
        println!("no result");
    }
    Ok(())
}
