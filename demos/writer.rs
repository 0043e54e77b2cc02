// In demos/writer.rs
use sha2::{Digest, Sha256};
use slnt_manifold::Manifold::StoreBuilder;
use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <store_name> <num_keys> [max_val_sz]", args[0]);
        eprintln!("  store_name: shared-memory object name, e.g. /slnt_demo");
        eprintln!("  max_val_sz: optional per-slot value capacity (default: 256)");
        std::process::exit(1);
    }

    let store_name = &args[1];
    let num_keys: usize = args[2].parse().expect("Invalid number of keys");
    let max_val_sz: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(256);

    println!(
        "Writer: Connecting to or creating store {} ({} keys, {} byte values)",
        store_name, num_keys, max_val_sz
    );

    // Precompute payloads so the write loop measures the store, not SHA-256
    let start_precompute = std::time::Instant::now();
    let mut payloads = Vec::with_capacity(num_keys);
    for i in 0..num_keys {
        let mut hasher = Sha256::new();
        hasher.update(format!("value_{}", i).as_bytes());
        let result = hasher.finalize();
        payloads.push(format!("{:x}", result));
    }
    println!(
        "Writer: Precomputed {} payloads in {:.2?}",
        num_keys,
        start_precompute.elapsed()
    );

    let store = StoreBuilder::new()
        .with_name(store_name)
        .with_slots((num_keys * 2).next_power_of_two())
        .with_max_value_size(max_val_sz)
        .open_or_create()?;

    println!("Writer: Attached, {:?}", store);

    let keep_alive = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    // Handle Ctrl+C to stop the rewrite loop
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!("Writer: Writing keys in a loop; Ctrl+C to stop");

    let start = std::time::Instant::now();
    let mut total_writes: u64 = 0;
    let mut rounds: u64 = 0;
    while keep_alive.load(Ordering::SeqCst) {
        for (i, payload) in payloads.iter().enumerate() {
            let key = format!("key_{}", i);
            match store.set(&key, payload.as_bytes()) {
                Ok(()) => total_writes += 1,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // Another writer holds this slot; skip and revisit next round
                    continue;
                }
                Err(e) => {
                    eprintln!("Writer: set {} failed: {}", key, e);
                    return Err(e);
                }
            }
        }
        rounds += 1;
        if rounds % 1000 == 0 {
            let elapsed = start.elapsed();
            println!(
                "Writer: {} writes in {:.2?} ({:.0} writes/sec), store epoch {}",
                total_writes,
                elapsed,
                total_writes as f64 / elapsed.as_secs_f64(),
                store.header_snapshot().epoch
            );
        }
    }

    println!("Writer: Stopped after {} writes", total_writes);
    Ok(())
}
