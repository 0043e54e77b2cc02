// In demos/watcher.rs
use slnt_manifold::Manifold::StoreBuilder;
use std::env;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <store_name> <label_bit> <signal_group>", args[0]);
        eprintln!("  label_bit:    0..63, the bloom bit to watch");
        eprintln!("  signal_group: 0..63, the group pulses are routed to");
        std::process::exit(1);
    }

    let store_name = &args[1];
    let label_bit: u8 = args[2].parse().expect("Invalid label bit");
    let group: u8 = args[3].parse().expect("Invalid signal group");

    let store = StoreBuilder::new().with_name(store_name).open()?;
    println!("Watcher: Attached to {}", store_name);

    // Route writes to labelled slots into our signal group
    store.watch_label_register(1u64 << label_bit, group)?;
    println!(
        "Watcher: Label bit {} now pulses signal group {}",
        label_bit, group
    );

    let keep_alive = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    // Edge detection is a counter delta; the counter itself only grows
    let mut last = store.get_signal_count(group)?;
    println!("Watcher: Baseline count {}; Ctrl+C to stop", last);

    while keep_alive.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
        let now = store.get_signal_count(group)?;
        if now != last {
            println!(
                "Watcher: group {} pulsed {} time(s) (count {})",
                group,
                now - last,
                now
            );
            last = now;
        }
    }

    // Leave the label unwatched for the next consumer
    store.watch_label_unregister(1u64 << label_bit);
    println!("Watcher: Stopped");
    Ok(())
}
