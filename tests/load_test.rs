//! Load testing while the routing table is being swapped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dynhttp::config::ServerConfig;
use dynhttp::Endpoint;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_during_table_swaps() {
    let server = common::start_server(ServerConfig::default()).await;
    let stable = Endpoint::builder(|| async { "stable" })
        .paths(["/stable"])
        .build();
    server.registry.add(stable).unwrap();

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let stop_churn = Arc::new(AtomicBool::new(false));

    // Keep adding and removing an unrelated endpoint while traffic flows.
    let churn = {
        let registry = server.registry.clone();
        let stop_churn = stop_churn.clone();
        tokio::spawn(async move {
            let mut swaps = 0u64;
            while !stop_churn.load(Ordering::Relaxed) {
                let extra = Endpoint::builder(|| async { "extra" })
                    .paths(["/extra/{n}"])
                    .build();
                registry.add(extra.clone()).unwrap();
                registry.remove(&extra).unwrap();
                swaps += 2;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            swaps
        })
    };

    let start = Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = server.url("/stable");
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                let res = client.get(&url).send().await.expect("server unreachable");
                assert!(res.status().is_success(), "unexpected status {}", res.status());
                assert_eq!(res.text().await.unwrap(), "stable");
                latencies.push(req_start.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }
    let duration = start.elapsed();

    stop_churn.store(true, Ordering::Relaxed);
    let swaps = churn.await.unwrap();

    assert_eq!(all_latencies.len(), total_requests);
    assert!(swaps > 0);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Table Swaps:    {}", swaps);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", total_requests as f64 / duration.as_secs_f64());
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");

    server.stop().await;
}
