//! Handmix Player - gesture-controlled stem mixing without a GUI
//!
//! Loads config and mapping profiles, starts the audio engine and the
//! control loop, and feeds them hand poses from a recording or a built-in
//! script. Prints the latency monitor's summary when done.
//!
//! ## Command line flags
//!
//! - `--config PATH`: config file (default ~/.config/handmix/config.yaml)
//! - `--profiles PATH`: profile file (overrides the config)
//! - `--profile NAME`: profile to activate (overrides the config)
//! - `--replay PATH`: JSON-lines pose recording; a scripted demo runs without it
//! - `--script NAME`: built-in motion without `--replay` (`pinch`, `two-hand`, `demo`)
//! - `--switch NAME@SECONDS`: activate another profile from the file mid-run
//! - `--seconds N`: run time (default 10)
//! - `--render PATH`: write the mix to a float WAV (headless only)
//! - `--device`: play through the default output device (`cpal-backend` builds)

mod config;
mod recorder;
mod replay;
mod session;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use handmix_core::config::{default_config_path, load_config, AudioBackendChoice};
use handmix_gesture::mapping::{find_profile, load_profiles, MappingProfile};
use handmix_gesture::UiEvent;

use config::PlayerConfig;
use recorder::WavRecorder;
use replay::{PoseSource, ReplaySource, Script, ScriptedSource};
use session::Session;

/// How often the main thread wakes to drain the tap and UI events
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    profiles: Option<PathBuf>,
    profile: Option<String>,
    replay: Option<PathBuf>,
    script: Script,
    switch: Option<(String, f64)>,
    seconds: f64,
    render: Option<PathBuf>,
    device: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            profiles: None,
            profile: None,
            replay: None,
            script: Script::Demo,
            switch: None,
            seconds: 10.0,
            render: None,
            device: false,
        }
    }
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = || args.next().with_context(|| format!("{} needs a value", arg));
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--profiles" => parsed.profiles = Some(PathBuf::from(value()?)),
                "--profile" => parsed.profile = Some(value()?),
                "--replay" => parsed.replay = Some(PathBuf::from(value()?)),
                "--render" => parsed.render = Some(PathBuf::from(value()?)),
                "--script" => parsed.script = value()?.parse()?,
                "--switch" => parsed.switch = Some(parse_switch(&value()?)?),
                "--seconds" => {
                    let raw = value()?;
                    parsed.seconds = raw
                        .parse::<f64>()
                        .ok()
                        .filter(|s| s.is_finite() && *s > 0.0)
                        .with_context(|| format!("--seconds expects a positive number, got {:?}", raw))?;
                }
                "--device" => parsed.device = true,
                other => bail!("Unknown argument {:?}", other),
            }
        }
        Ok(parsed)
    }
}

/// `NAME@SECONDS`
fn parse_switch(raw: &str) -> Result<(String, f64)> {
    let (name, at) = raw
        .rsplit_once('@')
        .with_context(|| format!("--switch expects NAME@SECONDS, got {:?}", raw))?;
    let at = at
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .with_context(|| format!("--switch time must be a non-negative number, got {:?}", at))?;
    if name.is_empty() {
        bail!("--switch needs a profile name");
    }
    Ok((name.to_string(), at))
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    log::info!("handmix-player starting up");

    let config_path = args.config.clone().unwrap_or_else(|| default_config_path("config.yaml"));
    let mut config: PlayerConfig = load_config(&config_path);
    if args.device {
        config.audio = AudioBackendChoice::Device;
    }
    if args.render.is_some() && config.audio != AudioBackendChoice::Headless {
        bail!("--render needs the headless backend");
    }

    let profiles = available_profiles(&config, &args)?;
    let wanted = args.profile.clone().or_else(|| config.active_profile.clone());
    let profile = select_profile(&profiles, wanted.as_deref())?;
    log::info!("[MAPPING] Active profile {:?} ({} rules)", profile.name, profile.rules.len());
    let mut switch = match &args.switch {
        Some((name, at)) => Some((find_profile(&profiles, name)?, Duration::from_secs_f64(*at))),
        None => None,
    };

    let source: Box<dyn PoseSource> = match &args.replay {
        Some(path) => Box::new(ReplaySource::open(path)?),
        None => Box::new(ScriptedSource::new(args.script, config.gesture.capture_hz, args.seconds)),
    };

    let mut session = Session::start(&config, profile, source, args.render.is_some())?;
    let mut recorder = match (&args.render, session.take_tap()) {
        (Some(path), Some(tap)) => Some(WavRecorder::create(path, session.sample_rate(), tap)?),
        _ => None,
    };

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds);
    let mut last_status = started;
    while started.elapsed() < run_for && !session.source_finished() {
        std::thread::sleep(POLL_INTERVAL);
        if let Some(recorder) = recorder.as_mut() {
            recorder.drain()?;
        }
        if switch.as_ref().is_some_and(|(_, at)| started.elapsed() >= *at) {
            if let Some((next, _)) = switch.take() {
                session.profiles().activate(next)?;
            }
        }
        for event in session.ui_events().try_iter() {
            if let UiEvent::Gesture(gesture) = event {
                log::info!(
                    "[GESTURE] {} {:?} {:?} param {:.2}",
                    gesture.kind,
                    gesture.hand,
                    gesture.phase,
                    gesture.param
                );
            }
        }
        if last_status.elapsed() >= Duration::from_secs(1) {
            last_status = Instant::now();
            log_status(&session);
        }
    }

    let snapshot = session.shutdown()?;
    if let Some(recorder) = recorder {
        recorder.finish()?;
    }
    log::info!("[MONITOR] {}", snapshot);
    Ok(())
}

/// Profiles from `--profiles`/`profiles_path`
///
/// Falls back to the built-in two-hand profile when the default profile
/// file does not exist. An explicitly given file must exist.
fn available_profiles(config: &PlayerConfig, args: &Args) -> Result<Vec<MappingProfile>> {
    let path = args.profiles.clone().unwrap_or_else(|| config.profiles_path());
    let explicit = args.profiles.is_some() || config.profiles_path.is_some();

    if !explicit && !path.exists() {
        log::info!("[MAPPING] {:?} not found, using the built-in profile", path);
        return Ok(vec![MappingProfile::default_two_hand()]);
    }

    let profiles = load_profiles(&path).with_context(|| format!("Failed to load profiles from {:?}", path))?;
    if profiles.is_empty() {
        bail!("{:?} defines no profiles", path);
    }
    Ok(profiles)
}

/// The named profile, or the first one
fn select_profile(profiles: &[MappingProfile], wanted: Option<&str>) -> Result<MappingProfile> {
    match wanted {
        Some(name) => Ok(find_profile(profiles, name)?),
        None => profiles.first().cloned().context("No profiles available"),
    }
}

fn log_status(session: &Session) {
    let observer = session.observer();
    let monitor = session.monitor();
    let hands: Vec<String> = (0..2)
        .map(|slot| match (observer.hand_present(slot), observer.active_gesture(slot)) {
            (false, _) => "-".to_string(),
            (true, None) => "hand".to_string(),
            (true, Some(gesture)) => gesture.to_string(),
        })
        .collect();
    log::info!(
        "[SESSION] hands [{}], {} commands, round trip p95 {:.1} ms, quality {:?}",
        hands.join(", "),
        observer.commands_sent(),
        monitor.round_trip_p95_ms.load(),
        monitor.quality()
    );
}
