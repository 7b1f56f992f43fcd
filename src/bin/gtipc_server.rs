// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Interactive compute-server CLI.
//
// Usage:
//   gtipc_server [registry_name]
//
// Starts the server on the well-known registry channel (default
// "/gtipc_registry") and runs until an 'x' line on stdin, SIGINT, or
// SIGTERM. Exits 0 on clean shutdown, 1 when the registry channel cannot
// be created.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gtipc::{ComputeServer, ServerConfig};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut config = ServerConfig::default();
    if args.len() > 1 {
        config.registry_name = args[1].clone();
    }

    let server = match ComputeServer::start(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("gtipc_server: unable to create registry channel: {e}");
            std::process::exit(1);
        }
    };

    println!("gtipc_server: running (enter 'x' to exit)");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        ctrlc_or_sigterm(move || q.store(true, Ordering::Release));
    }

    let stdin = std::io::stdin();
    let mut line = String::new();
    while !quit.load(Ordering::Acquire) {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // stdin closed; fall through to shutdown
            Ok(_) if line.trim() == "x" => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    println!("gtipc_server: shutting down...");
    server.shutdown();
}

fn ctrlc_or_sigterm(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::Mutex;
        static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = f;
    }
}

#[cfg(unix)]
extern crate libc;
