use simulation::{simulate, simulate_scaling};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub mod simulation;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(async_main())
}

async fn async_main() -> ExitCode {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            COLLABORATIVE EDITING SIMULATIONS                ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut runs = Vec::new();
    for (clients, edits, seed) in [(2, 100, 1), (4, 200, 2), (8, 500, 3)] {
        match simulate(clients, edits, seed).await {
            Ok(stats) => {
                stats.print();
                runs.push(stats);
            }
            Err(err) => {
                eprintln!("simulation failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    match simulate_scaling(12, 4).await {
        Ok(stats) => runs.extend(stats),
        Err(err) => {
            eprintln!("scaling run failed: {err}");
            return ExitCode::FAILURE;
        }
    }

    if runs.iter().all(|s| s.converged) {
        println!("\n✓ All simulations converged!");
        ExitCode::SUCCESS
    } else {
        println!("\n✗ Some simulations did not converge");
        ExitCode::FAILURE
    }
}
