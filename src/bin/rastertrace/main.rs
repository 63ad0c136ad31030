//! rastertrace CLI - render and export preset scenes headlessly.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rastertrace::prelude::*;

/// Parsed command-line options shared by the subcommands.
#[derive(Debug, Default)]
struct Options {
    samples: Option<u32>,
    threads: Option<usize>,
    width: Option<u32>,
    height: Option<u32>,
    mesh: Option<PathBuf>,
    out: Option<PathBuf>,
    flat: Option<PathBuf>,
    no_direct: bool,
    no_shadows: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Global verbosity flags; RUST_LOG still wins when set
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "warn",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "render" | "r" => with_preset(&filtered_args, cmd_render),
        "raster" | "a" => with_preset(&filtered_args, cmd_raster),
        "export" | "e" => with_preset(&filtered_args, cmd_export),
        "presets" | "p" => {
            for p in ScenePreset::ALL {
                let note = if p.uses_mesh() { "  [--mesh]" } else { "" };
                println!("{}{}", p, note);
            }
            Ok(())
        }
        "version" | "-V" | "--version" => {
            print_version();
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_version() {
    println!(
        "rastertrace {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        rastertrace::BUILD_DATE,
        rastertrace::BUILD_TIME
    );
}

fn print_help() {
    print_version();
    println!();
    println!("Usage: rastertrace [options] <command> <preset> [args]");
    println!();
    println!("Commands:");
    println!("  r, render <preset>   Path trace a preset to PNG");
    println!("  a, raster <preset>   Rasterize a preset to PNG");
    println!("  e, export <preset>   Write scene state JSON (and optional flat geometry)");
    println!("  p, presets           List preset names");
    println!("  h, help              Show this help");
    println!();
    println!("Arguments:");
    println!("  --samples N          Target samples per pixel (render)");
    println!("  --threads N          Worker threads, 0 = all cores (render)");
    println!("  --width W --height H Output resolution");
    println!("  --mesh FILE          STL/GLB placed by mesh presets");
    println!("  --out FILE           Output path");
    println!("  --flat FILE          Flat geometry float array as JSON (export)");
    println!("  --no-direct          BSDF sampling only, no shadow rays to lights (render)");
    println!("  --no-shadows         Skip shadow maps (raster)");
    println!();
    println!("Options:");
    println!("  -v, --verbose        Debug output");
    println!("  -vv, --trace         Trace output (very verbose)");
    println!("  -q, --quiet          Warnings only");
}

fn with_preset(args: &[&str], cmd: fn(ScenePreset, &Options) -> Result<()>) -> Result<()> {
    let Some(name) = args.get(1) else {
        bail!("missing preset argument (see `rastertrace presets`)");
    };
    let preset: ScenePreset = name.parse()?;
    let opts = parse_options(&args[2..])?;
    debug!(?opts, "parsed options");
    cmd(preset, &opts)
}

fn parse_options(args: &[&str]) -> Result<Options> {
    let mut opts = Options::default();
    let mut it = args.iter();
    while let Some(&flag) = it.next() {
        let mut value = || {
            it.next()
                .copied()
                .with_context(|| format!("{} needs a value", flag))
        };
        match flag {
            "--samples" | "-s" => opts.samples = Some(value()?.parse().context("--samples")?),
            "--threads" | "-t" => opts.threads = Some(value()?.parse().context("--threads")?),
            "--width" => opts.width = Some(value()?.parse().context("--width")?),
            "--height" => opts.height = Some(value()?.parse().context("--height")?),
            "--mesh" | "-m" => opts.mesh = Some(PathBuf::from(value()?)),
            "--out" | "-o" => opts.out = Some(PathBuf::from(value()?)),
            "--flat" => opts.flat = Some(PathBuf::from(value()?)),
            "--no-direct" => opts.no_direct = true,
            "--no-shadows" => opts.no_shadows = true,
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(opts)
}

fn config_for(opts: &Options) -> EngineConfig {
    let mut config = EngineConfig::load();
    if let Some(w) = opts.width {
        config.width = w;
    }
    if let Some(h) = opts.height {
        config.height = h;
    }
    if let Some(s) = opts.samples {
        config.target_samples = s;
    }
    if let Some(t) = opts.threads {
        config.threads = t;
    }
    if opts.no_direct {
        config.direct_light = false;
    }
    if opts.no_shadows {
        config.shadows = false;
    }
    config.validated()
}

fn load_scene(preset: ScenePreset, opts: &Options, config: &EngineConfig) -> Result<Scene> {
    let bytes = match &opts.mesh {
        Some(path) => Some(std::fs::read(path).with_context(|| format!("reading {}", path.display()))?),
        None => None,
    };
    let mut scene = Scene::from_config(config);
    scene
        .load_preset(preset, bytes.as_deref())
        .with_context(|| format!("loading preset {}", preset))?;
    scene.camera.resize(config.width, config.height);
    Ok(scene)
}

fn cmd_render(preset: ScenePreset, opts: &Options) -> Result<()> {
    let config = config_for(opts);
    let scene = load_scene(preset, opts, &config)?;
    let out = opts.out.clone().unwrap_or_else(|| PathBuf::from(format!("{}.png", preset)));

    let pool = WorkerPool::new(config.worker_threads())?;
    let snapshot = SceneSnapshot::from_scene(&scene);
    let mut job = RenderJob::start(snapshot, RenderSettings::from_config(&config), pool)?;

    while !job.is_finished() {
        std::thread::sleep(Duration::from_millis(500));
        let p = job.progress();
        info!(
            "{:5.1}%  {}/{} spp  tile {}/{}",
            p.fraction() * 100.0,
            p.samples,
            p.target_samples,
            p.tiles_done,
            p.tiles_total
        );
    }

    let image = job.wait().context("render produced no image")?;
    image.save_png(&out)?;
    println!("Wrote {} ({} spp)", out.display(), image.samples);
    Ok(())
}

fn cmd_raster(preset: ScenePreset, opts: &Options) -> Result<()> {
    let config = config_for(opts);
    let scene = load_scene(preset, opts, &config)?;
    let out = opts
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}-raster.png", preset)));

    let mut fb = Framebuffer::new(config.width, config.height);
    let stats = Rasterizer::new(config.ambient)
        .with_shadows(config.shadows)
        .render(&scene, None, &mut fb);
    debug!(?stats, "rasterized");
    fb.save_png(&out)?;
    println!("Wrote {} ({} triangles)", out.display(), stats.triangles);
    Ok(())
}

fn cmd_export(preset: ScenePreset, opts: &Options) -> Result<()> {
    let config = config_for(opts);
    let scene = load_scene(preset, opts, &config)?;
    let out = opts
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.json", preset)));

    scene.export_state().save(&out)?;
    println!("Wrote {} ({} objects)", out.display(), scene.len());

    if let Some(flat_path) = &opts.flat {
        let flat = scene.export_geometry();
        std::fs::write(flat_path, serde_json::to_string(&flat.to_float_array())?)
            .with_context(|| format!("writing {}", flat_path.display()))?;
        println!("Wrote {} ({} triangles)", flat_path.display(), flat.triangle_count());
    }
    Ok(())
}
