//! Browses the local network for a service type and prints every
//! registry change until Ctrl-C.
//!
//! Usage: cargo run --example browse [service_type]
//! (default service type: _http._tcp)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use zeroconf_bridge::{MdnsSdProvider, Result, ServiceBrowser};

fn main() -> Result<()> {
    env_logger::init();

    let service_type = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "_http._tcp".to_string());

    let provider = Arc::new(MdnsSdProvider::new()?);
    let mut browser = ServiceBrowser::new(provider);

    browser.connect_service_added(|record| println!("[added]   {record}"));
    browser.connect_service_updated(|record| println!("[updated] {record}"));
    browser.connect_service_removed(|record| println!("[removed] {record}"));
    browser.connect_error(|error| eprintln!("[error]   {error}"));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .expect("Error setting Ctrl-C handler");

    browser.start(&service_type)?;
    println!("browsing for '{service_type}', press Ctrl-C to stop");

    while running.load(Ordering::SeqCst) {
        browser.poll();
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("{} instance(s) known at shutdown", browser.services().len());
    browser.stop();
    Ok(())
}
