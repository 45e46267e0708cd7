//! Raster Waves CLI - Run a backend from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use raster_waves::{
    compute::{Engine, Headless, Registry},
    schema::RunConfig,
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.get(1).is_some_and(|a| a == "--help" || a == "-h") {
        print_usage(&args[0]);
        return;
    }

    if args.get(1).is_some_and(|a| a == "--example") {
        print_example_config();
        return;
    }

    // Load configuration
    let mut config = match args.get(1) {
        Some(path) => RunConfig::from_path(&PathBuf::from(path)).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => RunConfig::default(),
    };

    if let Some(iterations) = args.get(2) {
        config.max_iter = iterations.parse().unwrap_or_else(|_| {
            eprintln!("Error: invalid iteration count '{}'", iterations);
            std::process::exit(1);
        });
    }

    if let Ok(kernel) = std::env::var("KERNEL") {
        config.kernel = kernel;
    }

    let registry = Registry::with_builtin();
    let mut engine = Engine::from_registry(config, &registry).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    println!(
        "Using kernel [{}], version {}",
        engine.config().kernel,
        engine.config().variant
    );

    let cancel = AtomicBool::new(false);
    let summary = engine.run(&mut Headless, &cancel).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    if summary.stabilized {
        println!("Computation completed after {} iterations", summary.iterations);
    } else {
        println!("Stopped after {} iterations", summary.iterations);
    }
    println!("Checksum: {:016x}", summary.checksum);
    eprintln!("{:.3} ms", summary.elapsed_ms);
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [config.json] [iterations]", program);
    eprintln!();
    eprintln!("Run a raster kernel through compute waves.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json  Path to run configuration file (default: built-in)");
    eprintln!("  iterations   Iteration cap, 0 runs until stable (default: from config)");
    eprintln!();
    eprintln!("The KERNEL environment variable overrides the configured kernel.");
    eprintln!("Example configuration is generated with --example flag.");
}

fn print_example_config() {
    let config = RunConfig {
        max_iter: 100,
        ..Default::default()
    };

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
