//! Publishes a demo HTTP service until Ctrl-C.
//!
//! Usage: cargo run --example publish [name] [port]
//! (defaults: "rust-demo", 8080)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use zeroconf_bridge::{MdnsSdProvider, Result, ServicePublisher};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "rust-demo".to_string());
    let port: u16 = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(8080);

    let provider = Arc::new(MdnsSdProvider::new()?);
    let mut publisher = ServicePublisher::new(provider);

    publisher.connect_service_published(|request| println!("[published] {request}"));
    publisher.connect_error(|error| eprintln!("[error]     {error}"));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .expect("Error setting Ctrl-C handler");

    publisher.start(&name, "_http._tcp", "local", port)?;
    println!("publishing '{name}' on port {port}, press Ctrl-C to stop");

    while running.load(Ordering::SeqCst) {
        publisher.poll();
        std::thread::sleep(Duration::from_millis(50));
    }

    publisher.stop();
    println!("publication withdrawn");
    Ok(())
}
