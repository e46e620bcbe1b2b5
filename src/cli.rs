use std::{
    ops::AddAssign,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Instant,
};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;
use log::LevelFilter;
use minibvh::{
    BuildSettings, HitRecord, Scene, SplitStrategy, Surface as _, TraversalStats,
    geometry::{FloatType, Ray, TimeInterval, WorldPoint, WorldVector},
    scene::{
        light::Light,
        material::{Material, Rgb},
        primitives::{Facet, MovingSphere, Primitive, Sphere},
    },
};
use rand::{Rng, SeedableRng as _, rngs::SmallRng};

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Split {
    Median,
    Sah,
}

/// Builds a random scene and traces a grid of rays through it
#[derive(Parser)]
#[command(name = "minibvh-cli")]
struct Args {
    /// Number of surfaces in the generated scene
    #[arg(short = 'n', long, default_value = "10000")]
    count: usize,

    /// Maximum number of surfaces in a leaf
    #[arg(long, default_value = "4")]
    leaf_size: usize,

    #[arg(long, value_enum, default_value = "median")]
    split: Split,

    /// Number of bins for the surface area heuristic
    #[arg(long, default_value = "12")]
    bins: usize,

    /// Width and height of the ray grid
    #[arg(short, long, default_value = "512")]
    resolution: usize,

    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Number of worker threads, defaults to one per core and is capped at the core count
    #[arg(short, long)]
    threads: Option<usize>,

    /// Compare every ray against testing all surfaces
    #[arg(long)]
    verify: bool,

    /// Dump the whole tree to stdout
    #[arg(long)]
    print_tree: bool,

    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

const SCENE_SIZE: FloatType = 50.0;
const MATERIALS: [&str; 4] = ["red", "green", "blue", "mirror"];

fn generate_scene(args: &Args) -> Scene {
    let split = match args.split {
        Split::Median => SplitStrategy::Median,
        Split::Sah => SplitStrategy::SurfaceAreaHeuristic { bins: args.bins },
    };
    let settings = BuildSettings::builder()
        .leaf_size(args.leaf_size)
        .split(split)
        .build();
    let mut scene = Scene::with_settings(settings, TimeInterval::default());

    scene.add_material(Material::builder().name("red").diffuse(Rgb::new(0.8, 0.1, 0.1)).build());
    scene.add_material(Material::builder().name("green").diffuse(Rgb::new(0.1, 0.8, 0.1)).build());
    scene.add_material(Material::builder().name("blue").diffuse(Rgb::new(0.1, 0.1, 0.8)).build());
    scene.add_material(
        Material::builder()
            .name("mirror")
            .specular(Rgb::new(1.0, 1.0, 1.0))
            .reflectivity(0.9)
            .build(),
    );
    scene.add_light(Light::Point {
        position: WorldPoint::new(0.0, 2.0 * SCENE_SIZE, -SCENE_SIZE),
        intensity: Rgb::new(1.0, 1.0, 1.0),
    });

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let random_point = |rng: &mut SmallRng| {
        WorldPoint::new(
            rng.random_range(-SCENE_SIZE..SCENE_SIZE),
            rng.random_range(-SCENE_SIZE..SCENE_SIZE),
            rng.random_range(-SCENE_SIZE..SCENE_SIZE),
        )
    };

    for _ in 0..args.count {
        let center = random_point(&mut rng);
        let material = MATERIALS[rng.random_range(0..MATERIALS.len())];
        let radius = rng.random_range(0.1..1.5);

        let surface = match rng.random_range(0..10) {
            0..6 => Primitive::Sphere(Sphere::new(center, radius).with_material(material)),
            6..8 => {
                let motion = WorldVector::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    0.0,
                );
                Primitive::MovingSphere(
                    MovingSphere::new([center, center + motion], TimeInterval::default(), radius)
                        .with_material(material),
                )
            }
            _ => {
                let mut vertex = || {
                    center
                        + WorldVector::new(
                            rng.random_range(-2.0..2.0),
                            rng.random_range(-2.0..2.0),
                            rng.random_range(-2.0..2.0),
                        )
                };
                Primitive::Facet(Facet::new([vertex(), vertex(), vertex()]).with_material(material))
            }
        };
        scene.add_surface(surface);
    }

    scene
}

/// Ray through a pixel of a pinhole camera looking along +z at the scene.
/// Time is spread over the shutter in a fixed pattern.
fn camera_ray(x: usize, y: usize, resolution: usize) -> Ray {
    let to_film = |i: usize| ((i as FloatType + 0.5) / resolution as FloatType - 0.5) * 2.4 * SCENE_SIZE;
    let origin = WorldPoint::new(0.0, 0.0, -3.0 * SCENE_SIZE);
    let target = WorldPoint::new(to_film(x), -to_film(y), -SCENE_SIZE);
    let time = ((x ^ y) % 16) as FloatType / 15.0;
    Ray::with_time(origin, target - origin, time)
}

/// Nearest hit distance found by testing every surface of the scene.
fn brute_force(scene: &Scene, ray: &Ray) -> Option<FloatType> {
    let mut best: Option<FloatType> = None;
    for (_, surface) in scene.tree().surfaces() {
        if let Some(hit) = surface.hit(ray, 0.0, best.unwrap_or(FloatType::INFINITY)) {
            best = Some(hit.t);
        }
    }
    best
}

#[derive(Default)]
struct TraceTotals {
    rays: usize,
    hits: usize,
    mismatches: usize,
    stats: TraversalStats,
}

impl AddAssign for TraceTotals {
    fn add_assign(&mut self, other: Self) {
        self.rays += other.rays;
        self.hits += other.hits;
        self.mismatches += other.mismatches;
        self.stats.boxes_tested += other.stats.boxes_tested;
        self.stats.leaves_visited += other.stats.leaves_visited;
        self.stats.surfaces_tested += other.stats.surfaces_tested;
    }
}

fn trace_row(scene: &Scene, y: usize, resolution: usize, verify: bool, totals: &mut TraceTotals) {
    for x in 0..resolution {
        let ray = camera_ray(x, y, resolution);
        let mut record = HitRecord::default();
        let hit = scene
            .tree()
            .hit_with_stats(&ray, 0.0, FloatType::INFINITY, &mut record, &mut totals.stats);

        totals.rays += 1;
        if hit {
            totals.hits += 1;
        }

        if verify {
            let expected = brute_force(scene, &ray);
            let found = hit.then_some(record.t);
            if expected != found {
                log::error!("Mismatch at pixel {x}, {y}: tree found {found:?}, expected {expected:?}");
                totals.mismatches += 1;
            }
        }
    }
}

fn trace(scene: &Scene, args: &Args) -> anyhow::Result<TraceTotals> {
    let mut cores = core_affinity::get_core_ids().context("We need a CPU list!")?;
    if let Some(threads) = args.threads {
        if threads > cores.len() {
            log::warn!(
                "Requested {threads} threads, but only {} cores are available",
                cores.len()
            );
        }
        cores.truncate(threads.max(1));
    }
    log::info!("Tracing {0}x{0} rays on {1} threads", args.resolution, cores.len());

    let next_row = AtomicUsize::new(0);
    let bar = ProgressBar::new(args.resolution as u64);

    let mut totals = TraceTotals::default();
    thread::scope(|scope| -> anyhow::Result<()> {
        let workers = cores
            .into_iter()
            .enumerate()
            .map(|(worker_id, core)| {
                let next_row = &next_row;
                let bar = bar.clone();
                thread::Builder::new()
                    .name(format!("worker{worker_id}"))
                    .spawn_scoped(scope, move || {
                        core_affinity::set_for_current(core);

                        let mut totals = TraceTotals::default();
                        loop {
                            let y = next_row.fetch_add(1, Ordering::Relaxed);
                            if y >= args.resolution {
                                break;
                            }
                            trace_row(scene, y, args.resolution, args.verify, &mut totals);
                            bar.inc(1);
                        }
                        totals
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for worker in workers {
            totals += worker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        }
        Ok(())
    })?;
    bar.finish_and_clear();

    Ok(totals)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(args.log_level.clone().into())
        .init();

    let mut scene = generate_scene(&args);
    let start = Instant::now();
    scene.finalize();
    println!("Built in {:.1?}", start.elapsed());
    println!("{}", scene.tree().statistics());
    if args.print_tree {
        scene.tree().print_tree();
    }

    let start = Instant::now();
    let totals = trace(&scene, &args)?;
    let elapsed = start.elapsed();

    let rays = totals.rays.max(1) as f64;
    println!("Rays: {}, hits: {}", totals.rays, totals.hits);
    println!(
        "Per ray: {:.1} boxes, {:.1} leaves, {:.1} surfaces",
        totals.stats.boxes_tested as f64 / rays,
        totals.stats.leaves_visited as f64 / rays,
        totals.stats.surfaces_tested as f64 / rays,
    );
    println!(
        "Traced in {:.1?}, {:.2} Mrays/s",
        elapsed,
        totals.rays as f64 / elapsed.as_secs_f64() / 1e6
    );

    if args.verify {
        anyhow::ensure!(
            totals.mismatches == 0,
            "{} of {} rays differ from brute force",
            totals.mismatches,
            totals.rays
        );
        println!("All rays match brute force");
    }

    Ok(())
}
