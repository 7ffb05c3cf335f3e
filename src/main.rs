use vthumb::cli::Args;
use vthumb::core::event_bus::EventBus;
use vthumb::core::scheduler::{Pending, Scheduler};
use vthumb::core::thumb_events::{Outcome, SchedulerEvent};
use vthumb::core::{ThumbKey, ThumbRef};
use vthumb::paths::{self, PathConfig, SETTINGS_FILE};
use vthumb::render::{FfmpegRenderer, clear_disk_cache};
use vthumb::scan;
use vthumb::settings::ThumbSettings;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// One output row
#[derive(Debug, serde::Serialize)]
struct ThumbResult {
    path: PathBuf,
    ok: bool,
    thumbnail: ThumbRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("vthumb.log", path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("vthumb {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = paths::config_file(SETTINGS_FILE, &path_config);
    info!("Settings path: {}", settings_path.display());
    let mut settings = ThumbSettings::load(&settings_path)?;
    args.apply(&mut settings);

    if args.save_settings {
        settings.save(&settings_path)?;
        info!("Settings saved to {}", settings_path.display());
    }

    if args.clear_cache {
        let report = clear_disk_cache(&settings.thumbs_dir())?;
        println!("{}", report);
    }

    if args.inputs.is_empty() {
        if !args.clear_cache && !args.save_settings {
            use clap::CommandFactory;
            let _ = Args::command().print_help();
            println!();
        }
        return Ok(());
    }

    let videos = scan::collect_videos(&args.inputs)?;
    if videos.is_empty() {
        warn!("No videos found in {:?}", args.inputs);
        return Ok(());
    }

    let renderer = FfmpegRenderer::from_settings(&settings);
    info!(
        "ffmpeg: {}, output: {}",
        renderer.ffmpeg().display(),
        renderer.out_dir().display()
    );

    let bus = EventBus::new();
    bus.subscribe(|event| {
        let SchedulerEvent::Settled(e) = event else {
            return;
        };
        match e.outcome {
            Outcome::Rendered => debug!("{} ready in {} ms", e.key, e.elapsed.as_millis()),
            Outcome::Placeholder { transient } => warn!(
                "{}: placeholder ({} failure)",
                e.key,
                if transient { "transient" } else { "permanent" }
            ),
        }
    });

    let scheduler = Scheduler::with_events(settings.scheduler_config(), renderer, bus.emitter())
        .context("Failed to start render workers")?;

    let started = Instant::now();
    scheduler.declare_batch_start(videos.len() as u64);
    let mut pending: Vec<(PathBuf, Pending)> = videos
        .iter()
        .map(|v| (v.clone(), scheduler.submit(v.as_path())))
        .collect();

    // Progress loop, like a UI frame loop: wait for events, poll handles
    loop {
        if let Some(first) = bus.recv_timeout(Duration::from_millis(100)) {
            for p in std::iter::once(first).chain(bus.poll()).filter_map(|e| e.progress()) {
                info!(
                    "Progress: {}/{} ({:.0}%)",
                    p.completed,
                    p.total,
                    p.fraction() * 100.0
                );
            }
        }

        let mut done = true;
        for (_, p) in pending.iter_mut() {
            done &= p.try_get().is_some();
        }
        if done {
            break;
        }
    }

    let results: Vec<ThumbResult> = pending
        .into_iter()
        .map(|(path, p)| {
            let thumbnail = p.wait();
            let error = scheduler
                .cached(&ThumbKey::new(&path))
                .and_then(|entry| entry.error().map(|e| e.to_string()));
            ThumbResult {
                ok: !thumbnail.is_placeholder(),
                path,
                thumbnail,
                error,
            }
        })
        .collect();

    let stats = scheduler.cache_stats();
    info!(
        "Done in {:.2}s: {} thumbnails, {} failed, peak {} concurrent renders, cache hit rate {:.0}%",
        started.elapsed().as_secs_f64(),
        results.iter().filter(|r| r.ok).count(),
        results.iter().filter(|r| !r.ok).count(),
        scheduler.peak_renders(),
        stats.hit_rate() * 100.0
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for r in &results {
            println!(
                "{}\t{}\t{}",
                r.path.display(),
                if r.ok { "ok" } else { "placeholder" },
                r.thumbnail
            );
        }
    }

    Ok(())
}
