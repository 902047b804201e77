#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::LevelFilter;
use nix::sys::signal::{self, Signal};
use pygdb::gate;
use pygdb::logging::{LogConfig, LogLine, Sink};

// The gate and logger are process-wide, so the whole handshake is one test.
#[test]
fn sigcont_releases_breakpoint() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let captured = Arc::clone(&lines);
    let sink: Sink = Arc::new(move |line: &LogLine<'_>| {
        captured.lock().unwrap().push(line.message.to_string());
    });

    // Disabled gate never blocks.
    assert!(!gate::set());
    assert!(!gate::is_enabled());

    let config = LogConfig {
        level: LevelFilter::Info,
        filter: Some("pygdb=info".to_string()),
        sink: Some(sink),
    };
    assert!(gate::enable(config.clone()).unwrap());
    assert!(!gate::enable(config).unwrap());
    assert!(pygdb::logging::is_initialized());
    assert!(gate::is_enabled());
    assert!(!gate::console_attached());

    let waiter = thread::spawn(gate::set);
    thread::sleep(Duration::from_millis(200));
    assert!(!waiter.is_finished());

    signal::raise(Signal::SIGCONT).unwrap();
    assert!(waiter.join().unwrap());
    assert!(gate::console_attached());

    let pid = std::process::id();
    let lines = lines.lock().unwrap();
    assert!(lines[0].starts_with(&format!("pygdb: (PID: {pid}, TID: 0x")));
    assert!(lines[0].contains("enabled, breakpoint symbol _pygdb_breakpoint_mark"));
    assert!(lines.iter().any(|line| line.ends_with("breakpoint.set: waiting for gdb console")));
    assert_eq!(
        lines.iter().filter(|line| line.ends_with("GDB console attached")).count(),
        1
    );
    drop(lines);

    let swapped = Arc::new(Mutex::new(Vec::<String>::new()));
    let captured = Arc::clone(&swapped);
    let sink: Sink = Arc::new(move |line: &LogLine<'_>| {
        captured.lock().unwrap().push(line.message.to_string());
    });
    pygdb::logging::set_sink(Some(sink));
    gate::log("after attach");
    let swapped = swapped.lock().unwrap();
    assert_eq!(swapped.len(), 1);
    assert!(swapped[0].ends_with("): after attach"));
}
