//! Gray-Scott CLI - Run a decomposed simulation from JSON settings.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use gray_scott::{
    checkpoint::{CheckpointReader, CheckpointWriter, checkpoint_path},
    compute::{GrayScott, Result, Transport},
    schema::Settings,
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_settings();
        return;
    }

    if args.len() < 2 {
        eprintln!("Usage: {} <settings.json> [ranks]", args[0]);
        eprintln!();
        eprintln!("Run a Gray-Scott simulation from JSON settings.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  settings.json  Path to simulation settings file");
        if cfg!(feature = "mpi") {
            eprintln!("  ranks          Expected MPI world size (optional; set by mpirun)");
        } else {
            eprintln!("  ranks          Number of subdomains, one thread each (default: 1)");
        }
        eprintln!();
        eprintln!("Example settings are printed with --example.");
        std::process::exit(1);
    }

    let settings_path = PathBuf::from(&args[1]);
    let ranks = parse_ranks(args.get(2).map(String::as_str)).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let settings_str = fs::read_to_string(&settings_path).unwrap_or_else(|e| {
        eprintln!("Error reading settings file: {}", e);
        std::process::exit(1);
    });

    let settings: Settings = serde_json::from_str(&settings_str).unwrap_or_else(|e| {
        eprintln!("Error parsing settings: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = settings.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    settings.warn();

    if !launch(&settings, ranks) {
        std::process::exit(1);
    }
}

/// Optional positive rank count from the command line.
fn parse_ranks(arg: Option<&str>) -> std::result::Result<Option<usize>, String> {
    match arg.map(str::parse::<usize>) {
        None => Ok(None),
        Some(Ok(0)) => Err("rank count must be positive".to_string()),
        Some(Ok(n)) => Ok(Some(n)),
        Some(Err(e)) => Err(format!("invalid rank count '{}': {}", arg.unwrap_or_default(), e)),
    }
}

/// One thread per rank over the in-process transport.
#[cfg(not(feature = "mpi"))]
fn launch(settings: &Settings, ranks: Option<usize>) -> bool {
    use gray_scott::compute::ThreadTransport;
    use std::thread;

    let handles: Vec<_> = ThreadTransport::universe(ranks.unwrap_or(1))
        .into_iter()
        .map(|transport| {
            let settings = settings.clone();
            thread::spawn(move || run_rank(settings, transport))
        })
        .collect();

    let mut ok = true;
    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("Rank {} failed: {}", rank, e);
                ok = false;
            }
            Err(_) => {
                eprintln!("Rank {} panicked", rank);
                ok = false;
            }
        }
    }
    ok
}

/// This process is one rank of an MPI job.
#[cfg(feature = "mpi")]
fn launch(settings: &Settings, ranks: Option<usize>) -> bool {
    use gray_scott::compute::MpiTransport;

    let Some(mut universe) = mpi::initialize() else {
        eprintln!("Error: MPI is already initialized");
        return false;
    };
    let transport = MpiTransport::new(&mut universe, settings.extent);
    if let Some(n) = ranks.filter(|&n| n != transport.size()) {
        eprintln!(
            "Error: {} ranks requested but the MPI world has {}",
            n,
            transport.size()
        );
        return false;
    }

    let rank = transport.rank();
    match run_rank(settings.clone(), transport) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Rank {} failed: {}", rank, e);
            false
        }
    }
}

fn run_rank<T: Transport>(settings: Settings, transport: T) -> Result<()> {
    let rank = transport.rank();
    let ranks = transport.size();
    let path = checkpoint_path(&settings.output, rank);

    if rank == 0 {
        print_banner(&settings, ranks);
    }

    // A resumed run already carries the restart frame over from the old file.
    let run_settings = Settings {
        init_output: settings.init_output && settings.restart_step.is_none(),
        ..settings.clone()
    };
    let mut sim = GrayScott::new(run_settings, transport)?;

    let mut writer = match settings.restart_step {
        Some(step) => {
            let mut reader = CheckpointReader::open(&path)?;
            let snapshot = reader.read_step(step)?;
            sim.resume(snapshot.step, &snapshot.u, &snapshot.v)?;
            log::info!("rank {} resumed from step {}", rank, step);

            // The old file stays intact until this run finalizes.
            let mut writer = CheckpointWriter::replace(
                &path,
                settings.extent,
                *sim.local(),
                settings.dt,
                settings.compression.into(),
            )?;
            writer.append_from(&mut reader, step)?;
            writer
        }
        None => {
            sim.init()?;
            CheckpointWriter::create(
                &path,
                settings.extent,
                *sim.local(),
                settings.dt,
                settings.compression.into(),
            )?
        }
    };

    let (u, v) = sim.global_stats()?;
    if rank == 0 {
        println!("Initial state (step {}):", sim.step_index());
        println!("  U: {}", u);
        println!("  V: {}", v);
        println!();
    }

    let start = Instant::now();
    let first = sim.step_index();
    let end = first + settings.steps;
    sim.run_with(&mut writer, |sim| {
        let (u, v) = sim.global_stats()?;
        if rank == 0 {
            let elapsed = start.elapsed().as_secs_f32();
            println!(
                "  Step {}/{}: U mean={:.6} V mean={:.6} V max={:.6}, {:.1} steps/s",
                sim.step_index(),
                end,
                u.mean,
                v.mean,
                v.max,
                (sim.step_index() - first) as f32 / elapsed
            );
            if !u.is_finite() || !v.is_finite() {
                log::warn!(
                    "non-finite cells at step {} (U {}, V {}); dt may be too large",
                    sim.step_index(),
                    u.non_finite,
                    v.non_finite
                );
            }
        }
        Ok(())
    })?;

    let stats = writer.finalize()?;
    log::info!("rank {} wrote {}: {}", rank, path.display(), stats);
    sim.close();

    if rank == 0 {
        let elapsed = start.elapsed();
        println!();
        println!(
            "Time: {:.2}s ({:.1} steps/s)",
            elapsed.as_secs_f32(),
            settings.steps as f32 / elapsed.as_secs_f32()
        );
    }
    Ok(())
}

fn print_banner(settings: &Settings, ranks: usize) {
    println!("Gray-Scott Simulation");
    println!("=====================");
    println!(
        "Grid: {}x{}x{} over {} ranks",
        settings.extent[0], settings.extent[1], settings.extent[2], ranks
    );
    println!(
        "Du={} Dv={} F={} k={} dt={} noise={}",
        settings.du, settings.dv, settings.f, settings.k, settings.dt, settings.noise
    );
    println!("Steps: {} (output every {})", settings.steps, settings.output_period);
    println!();
}

fn print_example_settings() {
    let settings = Settings::default();

    println!("Example settings (settings.json):");
    match serde_json::to_string_pretty(&settings) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing settings: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranks() {
        assert_eq!(parse_ranks(None), Ok(None));
        assert_eq!(parse_ranks(Some("4")), Ok(Some(4)));
        assert!(parse_ranks(Some("0")).is_err());
        assert!(parse_ranks(Some("four")).is_err());
        assert!(parse_ranks(Some("-2")).is_err());
    }
}
