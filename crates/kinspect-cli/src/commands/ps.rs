//! Task listing.

use anyhow::Result;
use kinspect::{CoreImage, Session};

pub fn run(session: &Session<CoreImage>) -> Result<()> {
    println!("{:>8} {:>6} {:<18} {}", "PID", "ST", "TASK", "COMM");

    for task in session.tasks()? {
        println!(
            "{:>8} {:>6} {:#018x} {}",
            task.pid,
            task.state_label(),
            task.address,
            task.comm
        );
    }

    Ok(())
}
