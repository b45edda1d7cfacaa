mod cli;
mod report;

use std::fs;
use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dripmon_core::runner::run_ticks;
use dripmon_core::{
    DripFilterCfg, FusionCfg, Monitor, TareCfg, TimingCfg, WeightFilterCfg, WpdCalibrationCfg,
    WpdCfg, CSV_HEADER,
};
use dripmon_hardware::sim::{DripSchedule, SimulatedBag};
use dripmon_traits::clock::ManualClock;

use cli::{Cli, Commands, FILE_GUARD};

/// Build a non-blocking file sink with optional rotation, parking the
/// guard in a OnceLock so it outlives the subscriber.
fn file_layer(
    file: Option<&str>,
    rotation: Option<&str>,
) -> Option<tracing_appender::non_blocking::NonBlocking> {
    let path = file?;
    let p = std::path::Path::new(path);
    if let Some(parent) = p.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let appender = match rotation.unwrap_or("never").to_ascii_lowercase().as_str() {
        "daily" => tracing_appender::rolling::daily(".", path),
        "hourly" => tracing_appender::rolling::hourly(".", path),
        _ => tracing_appender::rolling::never(".", path),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

/// Initialize tracing once for the whole app. RUST_LOG wins over the CLI
/// level when set.
fn init_tracing(level: &str, file: Option<&str>, rotation: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(console);
    if let Some(writer) = file_layer(file, rotation) {
        let _ = registry.with(fmt::layer().with_ansi(false).with_writer(writer)).try_init();
    } else {
        let _ = registry.try_init();
    }
}

/// Render typed errors as what-happened / how-to-fix prose.
fn humanize(err: &eyre::Report) -> String {
    use dripmon_core::error::BuildError;

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingWeightSensor => {
                "What happened: No weight sensor was provided to the engine.\nHow to fix: Pass a sensor via with_weight_sensor(...) before build().".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nHow to fix: Edit the config file or CLI flags, then rerun."
            ),
        };
    }

    let msg = err.to_string();
    if msg.contains("TOML") || msg.contains("expected") || msg.contains("invalid type") {
        return format!(
            "What happened: The config file did not parse.\nDetail: {msg}\nHow to fix: Compare the file against the documented [weight_filter]/[timing]/[tare] sections."
        );
    }
    let mut cause = String::new();
    let e: &(dyn std::error::Error + 'static) = err.as_ref();
    if let Some(src) = std::error::Error::source(e) {
        cause = format!(" Cause: {src}");
    }
    format!("Something went wrong.{cause}\nOriginal: {msg}")
}

fn load_config(cli: &Cli) -> eyre::Result<dripmon_config::Config> {
    match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            dripmon_config::load_toml(&text).wrap_err("parsing config TOML")
        }
        None => Ok(dripmon_config::Config::default()),
    }
}

fn run() -> eyre::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    init_tracing(
        cfg.logging.level.as_deref().unwrap_or(&cli.log_level),
        cfg.logging.file.as_deref(),
        cfg.logging.rotation.as_deref(),
    );

    match &cli.cmd {
        Commands::CheckConfig => {
            // Parsing already happened; surface the effective tick rate so
            // a bare run confirms which file was read.
            println!(
                "config ok: tick_ms={} tare_total_g={}",
                cfg.timing.tick_ms,
                cfg.tare.equipment_g + cfg.tare.empty_bag_g
            );
            Ok(())
        }
        Commands::Simulate {
            initial_g,
            drip_dps,
            wpd_g,
            ticks,
            target_empty_g,
            device_id,
        } => simulate(
            &cli,
            &cfg,
            *initial_g,
            *drip_dps,
            *wpd_g,
            *ticks,
            *target_empty_g,
            device_id,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn simulate(
    cli: &Cli,
    cfg: &dripmon_config::Config,
    initial_g: f32,
    drip_dps: f32,
    wpd_g: f32,
    ticks: u64,
    target_empty_g: f32,
    device_id: &str,
) -> eyre::Result<()> {
    let tare: TareCfg = (&cfg.tare).into();
    let density = cfg.wpd.density_g_per_ml;

    // Virtual timeline shared by the engine and the simulated bag; the
    // runner's period sleep advances it, so the run finishes immediately.
    let clock = ManualClock::new();
    let bag = SimulatedBag::new(initial_g + tare.total_g(), drip_dps * wpd_g)
        .with_clock(Arc::new(clock.clone()));

    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .with_weight_filter(WeightFilterCfg::from(&cfg.weight_filter))
        .with_drip_filter(DripFilterCfg::from(&cfg.drip_filter))
        .with_wpd(WpdCfg::from(&cfg.wpd))
        .with_fusion(FusionCfg::from(&cfg.fusion))
        .with_timing(TimingCfg::from(&cfg.timing))
        .with_tare(tare)
        .with_wpd_calibration(WpdCalibrationCfg::from(&cfg.wpd_calibration))
        .with_target_empty_g(
            cfg.device.target_empty_g.unwrap_or(target_empty_g),
        )
        .build()?;

    for event in monitor.begin() {
        tracing::info!(?event, "startup");
    }

    if !cli.json {
        println!("{CSV_HEADER}");
    }

    let mut schedule = DripSchedule::new(0, drip_dps);
    let json = cli.json;
    let final_snapshot = run_ticks(
        &mut monitor,
        ticks,
        |now_ms, edges| {
            for edge in schedule.edges_until(now_ms) {
                edges.record_edge(edge);
            }
        },
        |report| {
            for event in &report.events {
                tracing::info!(?event, "event");
            }
            if json {
                println!("{}", report::snapshot_json(&report.snapshot));
            } else {
                println!("{}", report.snapshot.csv_row());
            }
        },
    );

    let payload = report::cloud_report(&final_snapshot, device_id, density);
    println!("{payload}");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", humanize(&err));
        std::process::exit(1);
    }
}
