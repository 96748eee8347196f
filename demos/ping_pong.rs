/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Ping-Pong Example - Two actors exchanging messages
//!
//! Demonstrates:
//! - Spawning actors from behavior closures
//! - Detached react with typed pattern arms
//! - Blocking receive from the other side
//! - reply() routing back to the sender
//! - Waiting for quiescence before the process exits

use std::time::Duration;

use troupe::{receive, reply, Case, Scheduler};

struct Ping {
    count: i32,
}

struct Pong {
    count: i32,
}

fn main() {
    tracing_subscriber::fmt::init();

    // Answers every Ping with a Pong; any String stops it.
    let ponger = troupe::spawn(|| {
        fn serve() {
            troupe::react(
                Case::when(|ping: Box<Ping>| {
                    println!("ponger: received ping {}", ping.count);
                    reply(Box::new(Pong { count: ping.count }));
                    serve();
                })
                .or_when(|_: Box<String>| {
                    println!("ponger: stopping");
                }),
            );
        }
        serve();
    });

    let target = ponger.clone();
    troupe::spawn(move || {
        for i in 1..=5 {
            target.send(Box::new(Ping { count: i }));
            let pong = receive(Case::when(|pong: Box<Pong>| pong));
            println!("pinger: received pong {}", pong.count);
        }
        target.send(Box::new("stop".to_string()));
    });

    if Scheduler::global().wait_idle(Duration::from_secs(5)) {
        println!("all actors quiescent");
    }
}
