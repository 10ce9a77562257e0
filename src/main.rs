use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use soundbus::error::AppResult;
use soundbus::{
    AudioEngine, AudioEvent, BgmOptions, EngineConfig, HttpFetcher, PreloadRequest,
    ResourceManifest, RodioBackend, SfxOptions, StopOptions,
};

/// How long the BGM plays before effects start
const INTRO: Duration = Duration::from_secs(3);

/// Gap between consecutive effects
const SFX_GAP: Duration = Duration::from_millis(600);

const FADE_OUT_MS: u64 = 1_500;

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

struct Args {
    manifest: PathBuf,
    config: Option<PathBuf>,
    bgm: Option<String>,
    sfx: Vec<String>,
}

fn parse_args() -> AppResult<Args> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("usage: soundbus-play [--config engine.json] <manifest.json> [bgm] [sfx...]");
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(manifest) = positional.next() else {
        bail!("usage: soundbus-play [--config engine.json] <manifest.json> [bgm] [sfx...]");
    };

    Ok(Args {
        manifest: PathBuf::from(manifest),
        config,
        bgm: positional.next(),
        sfx: positional.collect(),
    })
}

fn build_engine(args: &Args) -> AppResult<AudioEngine> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let base_dir = args
        .manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let fetcher = HttpFetcher::new(config.fetch_timeout()).with_base_dir(base_dir);

    Ok(AudioEngine::builder()
        .config(config)
        .backend(Arc::new(RodioBackend::new()))
        .fetcher(Arc::new(fetcher))
        .build())
}

fn run() -> AppResult<()> {
    let args = parse_args()?;
    let manifest = ResourceManifest::load(&args.manifest)
        .with_context(|| format!("loading manifest {}", args.manifest.display()))?;

    let engine = build_engine(&args)?;
    engine.register_all(&manifest);
    tracing::info!(
        "Registered BGM {:?} and SFX {:?}",
        engine.list_bgm(),
        engine.list_sfx()
    );

    let (events, _subscription) = engine.subscribe();
    thread::Builder::new()
        .name("soundbus-events".to_string())
        .spawn(move || {
            for event in events {
                match event {
                    AudioEvent::LoadFailed { kind, name, message } => {
                        tracing::warn!("{} '{}' failed to load: {}", kind, name, message)
                    }
                    other => tracing::debug!("event: {:?}", other),
                }
            }
        })
        .context("spawning event logger")?;

    let preload = PreloadRequest::default()
        .bgm(args.bgm.iter().cloned())
        .sfx(args.sfx.iter().cloned());
    engine.preload(&preload).context("preloading audio")?;

    engine.enable().context("opening audio output")?;

    if let Some(bgm) = &args.bgm {
        engine
            .play_bgm(bgm, BgmOptions::default())
            .with_context(|| format!("playing BGM '{}'", bgm))?;
        thread::sleep(INTRO);
    }

    for name in &args.sfx {
        engine
            .play_sfx(name, SfxOptions::default())
            .with_context(|| format!("playing SFX '{}'", name))?;
        thread::sleep(SFX_GAP);
    }

    engine.stop_bgm(StopOptions::default().with_fade_ms(FADE_OUT_MS));
    thread::sleep(Duration::from_millis(FADE_OUT_MS) + engine.config().stop_grace() * 2);

    tracing::info!("Done");
    Ok(())
}

fn main() {
    init_logging();

    if let Err(e) = run() {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
