//! Compares a churn-resilience run against the three baseline variants so
//! the peer-assisted gains are visible side by side. Run with
//! `cargo run --example chaos_demo -p p2psim-simulator`.

use p2psim_simulator::{run, BaselineVariant, SimulationConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base = SimulationConfig {
        num_peers: 50,
        duration_sec: 60.0,
        request_probability: 0.25,
        churn_rate: 0.02,
        file_size_bytes: Some(2 * 1024 * 1024),
        seed: 13,
        ..Default::default()
    };

    println!("Peer-assisted, under churn");
    println!("--------------------------");
    let peer_assisted = run(base.clone()).await?;
    print_summary(&peer_assisted);
    if let Some(speed) = peer_assisted.recovery_speed {
        println!("recovery speed:       {:.2}", speed);
    }

    for (label, variant) in [
        ("origin-only baseline", BaselineVariant::OriginOnly),
        ("CDN baseline", BaselineVariant::cdn_default()),
        ("DHT baseline", BaselineVariant::dht_default()),
    ] {
        println!("\n{label}");
        println!("{}", "-".repeat(label.len()));
        let config = SimulationConfig {
            baseline_mode: Some(variant),
            ..base.clone()
        };
        print_summary(&run(config).await?);
    }

    Ok(())
}

fn print_summary(results: &p2psim_simulator::SimulationResults) {
    println!("total requests:       {}", results.total_requests);
    println!("origin requests:      {}", results.origin_requests);
    println!("peer requests:        {}", results.peer_requests);
    println!("cache hit ratio:      {:.1}%", results.cache_hit_ratio);
    println!("avg latency:          {:.1}ms", results.avg_latency);
}
