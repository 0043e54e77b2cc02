// In demos/poller.rs
use slnt_manifold::Manifold::StoreBuilder;
use std::env;
use std::io::ErrorKind;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <store_name> <key> [timeout_ms]", args[0]);
        std::process::exit(1);
    }

    let store_name = &args[1];
    let key = &args[2];
    let timeout_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(5000);

    let store = StoreBuilder::new().with_name(store_name).open()?;
    println!(
        "Poller: Waiting up to {} ms for a write to {:?}",
        timeout_ms, key
    );

    let mut buf = vec![0u8; store.max_value_size()];
    loop {
        match store.poll(key, timeout_ms) {
            Ok(()) => {
                // A write committed; pick up the fresh value
                match store.get(key, &mut buf) {
                    Ok(n) => {
                        println!("Poller: {:?} changed -> {} bytes", key, n);
                        println!("  {}", String::from_utf8_lossy(&buf[..n]));
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        println!("Poller: {:?} changed but the read tore; retrying", key);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                println!("Poller: No write within {} ms, exiting", timeout_ms);
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                // Writer active at sample time; immediately poll again
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}
