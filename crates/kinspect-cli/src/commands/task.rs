//! Task lookup by pid.

use anyhow::{Result, bail};
use kinspect::{CoreImage, Error, Session};

pub fn run(session: &Session<CoreImage>, pid: i32) -> Result<()> {
    let task = match session.task_by_pid(pid) {
        Ok(task) => task,
        Err(Error::TaskNotFound(_)) => bail!("No such task with pid {pid}"),
        Err(e) => return Err(e.into()),
    };

    println!("PID: {}", task.pid);
    println!("COMM: {}", task.comm);
    println!("STATE: {}", task.state_label());
    println!("TASK: {:#018x}", task.address);

    Ok(())
}
