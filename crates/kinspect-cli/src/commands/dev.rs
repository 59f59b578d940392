//! Character device listing.

use anyhow::Result;
use kinspect::{CoreImage, Session};

pub fn run(session: &Session<CoreImage>) -> Result<()> {
    println!(
        "{:^10} {:^16} {:^16} {:^16}",
        "CHRDEV", "NAME", "CDEV", "OPERATIONS"
    );

    for dev in session.chardevs()? {
        if dev.cdev != 0 {
            println!(
                "{:>10} {:<16} {:016x} {:016x}",
                dev.major, dev.name, dev.cdev, dev.ops
            );
        } else {
            println!("{:>10} {:<16} {:^16}", dev.major, dev.name, "(none)");
        }
    }

    Ok(())
}
