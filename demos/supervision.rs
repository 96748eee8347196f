/*

THIS SOFTWARE IS OPEN SOURCE UNDER THE MIT LICENSE

Copyright 2025 Vincent Maciejewski, & M2 Tech
Contact:
v@m2te.ch
mayeski@gmail.com
https://www.linkedin.com/in/vmayeski/
http://m2te.ch/

*/

//! Supervision Example - links, trap_exit, and exit cascading
//!
//! Demonstrates:
//! - Linking actors
//! - Trapping a peer's abnormal termination as an Exit message
//! - The cascade that terminates a non-trapping peer

use std::time::Duration;

use troupe::{receive, Case, Exit, Scheduler};

fn main() {
    tracing_subscriber::fmt::init();

    // Traps exits: sees the worker's failure as an ordinary message.
    let watcher = troupe::actor_of(|| {
        let notice = receive(Case::when(|exit: Box<Exit>| *exit));
        println!(
            "watcher: actor {} exited with reason {:?}",
            notice.from.id(),
            notice.reason
        );
    });
    watcher.set_trap_exit(true);

    // Does not trap: the same failure terminates it.
    let bystander = troupe::actor_of(|| {
        let _ = receive(Case::when(|n: Box<i32>| *n));
        println!("bystander: never reached");
    });

    let worker = troupe::actor_of(|| {
        println!("worker: failing");
        troupe::exit_with("boom");
    });

    worker.link(&watcher);
    worker.link(&bystander);

    watcher.start();
    bystander.start();
    worker.start();

    Scheduler::global().wait_idle(Duration::from_secs(5));

    // The bystander is gone with the worker: this send is never consumed.
    bystander.send(Box::new(1i32));
    println!("done; bystander mailbox holds {} dead letter(s)", bystander.mailbox_size());
}
