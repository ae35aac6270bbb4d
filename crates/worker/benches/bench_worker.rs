use std::hint::black_box;
use std::time::Instant;

use glam::IVec3;
use voxpath_common::Volume;
use voxpath_kernel::{CollisionGrid, find_path};
use voxpath_worker::{JobRequest, Message, WorkerConfig, WorkerHandle};

/// Pillars on a regular lattice, leaving every row and column open somewhere.
fn make_grid(size: u32, depth: u32) -> CollisionGrid {
    let volume = Volume::new(size, size, depth).unwrap();
    let mut grid = CollisionGrid::zeroed(volume);
    for z in 0..depth as i32 {
        for y in (2..size as i32 - 1).step_by(4) {
            for x in (2..size as i32 - 1).step_by(3) {
                grid.set_blocked(IVec3::new(x, y, z), true).unwrap();
            }
        }
    }
    grid
}

fn bench_search(size: u32, depth: u32, iterations: usize) {
    let grid = make_grid(size, depth);
    let dest = IVec3::new(size as i32 - 1, size as i32 - 1, depth as i32 - 1);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(find_path(black_box(&grid), IVec3::ZERO, black_box(dest)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  search ({size}x{size}x{depth}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_worker_queue(size: u32, depth: u32, jobs: u64) {
    let grid = make_grid(size, depth);
    let handle = WorkerHandle::spawn(WorkerConfig::default()).unwrap();
    handle.post(Message::Init([size, size, depth])).unwrap();

    let start = Instant::now();
    for id in 0..jobs {
        let dest = IVec3::new((id % size as u64) as i32, size as i32 - 1, 0);
        let job = JobRequest::new(id, grid.as_slice().to_vec(), IVec3::ZERO, dest);
        handle.post(Message::Job(job)).unwrap();
    }
    for _ in 0..jobs {
        let _ = black_box(handle.recv().unwrap());
    }
    let elapsed = start.elapsed();
    let stats = handle.shutdown().unwrap();
    println!(
        "  worker queue ({size}x{size}x{depth}, {jobs} jobs): total {elapsed:?}, avg job {:?}, \
         max {:?}",
        stats.latency.average(),
        stats.latency.max()
    );
}

fn main() {
    println!("=== Path Search Benchmarks ===\n");

    println!("Single search:");
    bench_search(32, 1, 1000);
    bench_search(64, 4, 100);
    bench_search(128, 8, 10);

    println!("\nWorker round trip (queued jobs):");
    bench_worker_queue(32, 1, 1000);
    bench_worker_queue(64, 4, 100);

    println!("\n=== Done ===");
}
