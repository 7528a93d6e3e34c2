//! Benchmarks for VM dispatch throughput
//!
//! This benchmark suite measures:
//! - End-to-end event processing for a VM draining its queue
//! - Terminating a VM that still holds many jobs

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use vmsim::core::EntityId;
use vmsim::{Simulation, VmSpec};

/// A simulation with a ready VM and `jobs` submitted to it at t = 0.
fn loaded_simulation(cores: u32, jobs: usize) -> (Simulation, EntityId) {
    let mut sim = Simulation::new();
    let owner = sim.add_owner();
    let spec = VmSpec {
        provisioning_delay: 0.0,
        deprovisioning_delay: 0.0,
        ..VmSpec::new(1000, cores, 100.0, 0.1)
    };
    let vm = sim.add_vm(&spec).unwrap();
    sim.request_launch(vm, 0.0).unwrap();
    for index in 0..jobs {
        let job = sim.new_job(1000 + (index % 50) as u64 * 100);
        sim.submit(owner, vm, job, 0.0).unwrap();
    }
    (sim, vm)
}

fn bench_drain_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm/drain_queue");
    group.sample_size(10);

    for &cores in &[1u32, 8, 64] {
        let jobs = 10_000;
        group.throughput(Throughput::Elements(jobs as u64));
        group.bench_with_input(BenchmarkId::new("cores", cores), &cores, |b, &cores| {
            b.iter_batched(
                || loaded_simulation(cores, jobs),
                |(mut sim, _)| {
                    sim.run().unwrap();
                    black_box(sim.processed_events())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_terminate_with_jobs(c: &mut Criterion) {
    let mut group = c.benchmark_group("vm/terminate_held_jobs");
    group.sample_size(10);

    for &jobs in &[1_000usize, 10_000, 100_000] {
        group.throughput(Throughput::Elements(jobs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(jobs), &jobs, |b, &jobs| {
            b.iter_batched(
                || {
                    let (mut sim, vm) = loaded_simulation(4, jobs);
                    // Deliver launch and submissions only
                    sim.run_until(0.0).unwrap();
                    (sim, vm)
                },
                |(mut sim, vm)| {
                    sim.request_terminate(vm, 0.0).unwrap();
                    sim.run().unwrap();
                    black_box(sim.vm(vm).map(|vm| vm.queue_length()))
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_drain_queue, bench_terminate_with_jobs);
criterion_main!(benches);
