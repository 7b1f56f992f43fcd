// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Demo client: one synchronous ADD, then an asynchronous MUL batch joined at
// the end. Run against a live gtipc_server.
//
// Usage:
//   demo_compute [registry_name]

use gtipc::{ClientConfig, ComputeClient, ServiceId};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut config = ClientConfig::default();
    if args.len() > 1 {
        config.registry_name = args[1].clone();
    }

    let client = match ComputeClient::attach(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("demo_compute: attach failed: {e}");
            std::process::exit(1);
        }
    };

    // Synchronous path.
    match client.call(ServiceId::Add, 3, 4) {
        Ok(res) => println!("sync add(3, 4) = {res}"),
        Err(e) => {
            eprintln!("demo_compute: sync call failed: {e}");
            std::process::exit(1);
        }
    }

    // Asynchronous batch.
    let mut keys = Vec::new();
    for i in 0..20 {
        match client.submit(ServiceId::Mul, i, 3) {
            Ok(key) => keys.push(key),
            Err(e) => {
                eprintln!("demo_compute: submit failed: {e}");
                std::process::exit(1);
            }
        }
    }

    match client.join(&keys) {
        Ok(results) => {
            for (i, res) in results.iter().enumerate() {
                println!("async mul({i}, 3) = {res}");
            }
        }
        Err(e) => {
            eprintln!("demo_compute: join failed: {e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = client.detach() {
        eprintln!("demo_compute: detach failed: {e}");
        std::process::exit(1);
    }
    println!("demo_compute: done");
}
