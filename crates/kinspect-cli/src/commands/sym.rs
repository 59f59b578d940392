//! Symbol info.

use anyhow::{Result, bail};
use kinspect::{CoreImage, Session};

pub fn run(session: &Session<CoreImage>, name: &str) -> Result<()> {
    let Some(sym) = session.symbols().lookup(name) else {
        bail!("symbol not found: {name}");
    };

    println!("SYMBOL: {name}");
    println!("ADDRESS: {:#018x}", sym.address);
    println!("TYPE: {}", sym.ty);

    let percpu = match session.is_percpu_var(name) {
        Ok(true) => "yes",
        Ok(false) => "no",
        Err(e) if e.is_pending() => "unknown (symbols pending)",
        Err(e) => return Err(e.into()),
    };
    println!("PER-CPU: {percpu}");

    Ok(())
}
