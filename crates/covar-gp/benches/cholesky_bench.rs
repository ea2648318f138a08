//! Benchmark: tiled Cholesky + solve at varying tile counts vs a dense
//! single-tile baseline on the CPU backend.

use std::sync::Arc;
use std::time::Instant;

use covar_gp::{
    backward_solve_tiled, cholesky_tiled, forward_solve_tiled, TiledMatrix, TiledVector,
};
use covar_kernels::CpuBackend;
use covar_sched::Scheduler;

fn make_spd(n: usize) -> Vec<f64> {
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let v = (((i * 7 + j * 11 + 3) % 13) as f64) * 0.05;
            a[i * n + j] = v;
            a[j * n + i] = v;
        }
        a[i * n + i] += n as f64;
    }
    a
}

fn bench_factor_solve(a_dense: &[f64], n: usize, n_tiles: usize, iters: usize) -> f64 {
    let sched = Scheduler::new();
    let backend = Arc::new(CpuBackend::new());
    let y = vec![1.0; n];
    let start = Instant::now();
    for _ in 0..iters {
        let mut a = TiledMatrix::from_dense_square(a_dense, n, n_tiles).unwrap();
        cholesky_tiled(&sched, &backend, &mut a).unwrap();
        let mut b = TiledVector::from_dense(&y, n_tiles).unwrap();
        forward_solve_tiled(&sched, &backend, &a, &mut b).unwrap();
        backward_solve_tiled(&sched, &backend, &a, &mut b).unwrap();
        let _ = b.to_dense().unwrap();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn gflops(n: usize, secs: f64) -> f64 {
    // Cholesky flop count n³/3 dominates.
    (n as f64).powi(3) / 3.0 / secs / 1e9
}

fn main() {
    println!("=== Covar Tiled Cholesky Benchmark ===\n");
    println!(
        "{:<8} {:>8} {:>14} {:>12} {:>10}",
        "N", "Tiles", "Factor+Solve", "GF/s", "Speedup"
    );
    println!("{}", "-".repeat(56));

    for &n in &[256usize, 512, 1024] {
        let a = make_spd(n);
        let iters = if n <= 256 {
            20
        } else if n <= 512 {
            5
        } else {
            2
        };

        let dense_s = bench_factor_solve(&a, n, 1, iters);
        for &n_tiles in &[1usize, 2, 4, 8] {
            let secs = bench_factor_solve(&a, n, n_tiles, iters);
            println!(
                "{:<8} {:>8} {:>12.3}ms {:>12.2} {:>9.1}x",
                n,
                n_tiles,
                secs * 1000.0,
                gflops(n, secs),
                dense_s / secs,
            );
        }
        println!();
    }
}
