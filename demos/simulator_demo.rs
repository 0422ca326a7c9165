//! Walks through a small steady-state swarm and a flash-crowd join burst,
//! printing the resulting metrics. Run with
//! `cargo run --example simulator_demo -p p2psim-simulator`. Shows how a
//! host application drives the simulator in-process.

use p2psim_simulator::{run, SimulationConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Steady swarm");
    println!("------------");
    let steady = SimulationConfig {
        num_peers: 20,
        duration_sec: 30.0,
        request_probability: 0.2,
        file_size_bytes: Some(4 * 1024 * 1024),
        seed: 7,
        ..Default::default()
    };
    let results = run(steady).await?;
    print_summary(&results);

    println!("\nFlash crowd");
    println!("-----------");
    let flash_crowd = SimulationConfig {
        num_peers: 200,
        duration_sec: 60.0,
        flash_crowd: true,
        join_rate: 10.0,
        anchor_signaling_latency_ms: 100,
        request_probability: 0.3,
        file_size_bytes: Some(4 * 1024 * 1024),
        seed: 7,
        ..Default::default()
    };
    let results = run(flash_crowd).await?;
    print_summary(&results);

    Ok(())
}

fn print_summary(results: &p2psim_simulator::SimulationResults) {
    println!("peers simulated:      {}", results.peers_simulated);
    println!("total requests:       {}", results.total_requests);
    println!("cache hit ratio:      {:.1}%", results.cache_hit_ratio);
    println!("avg latency:          {:.1}ms", results.avg_latency);
    println!("jain fairness index:  {:.3}", results.jain_fairness_index);
    println!("anchor nodes:         {}", results.anchor_nodes.len());
}
