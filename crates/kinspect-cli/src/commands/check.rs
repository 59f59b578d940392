//! Symbol availability report.

use anyhow::Result;
use kinspect::{CoreImage, Session, check_requirements, image_stats, symbol_stats};
use owo_colors::OwoColorize;

pub fn run(session: &Session<CoreImage>) -> Result<()> {
    let image = image_stats(session.image());
    let symbols = symbol_stats(session.symbols());

    println!(
        "image: {} segments, {} bytes mapped",
        image.segments, image.mapped_bytes
    );
    println!(
        "symbols: kernel {}, {} symbols, {} struct layouts",
        symbols.version, symbols.symbols, symbols.structs
    );
    println!();

    let mut missing = 0;
    for req in check_requirements(session.symbols()) {
        let status = if req.ready {
            "ok".green().to_string()
        } else {
            missing += 1;
            "missing".red().to_string()
        };
        println!(
            "{:<8} {:<6} {:<20} {}",
            req.subsystem, req.kind, req.name, status
        );
    }

    println!();
    if missing == 0 {
        println!("all subsystems ready");
    } else {
        println!("{missing} requirements missing; affected queries will report them as pending");
    }
    Ok(())
}
