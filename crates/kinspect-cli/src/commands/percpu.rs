//! Per-CPU variable resolution.

use anyhow::Result;
use kinspect::{CoreImage, ReadImage, Session, TypeInfo, Value};

pub fn run(session: &Session<CoreImage>, symbol: &str, cpu: Option<u32>) -> Result<()> {
    match cpu {
        Some(cpu) => {
            let value = session.get_percpu_var(symbol, cpu)?;
            print_instance(session.image(), cpu, &value);
        }
        None => {
            for (cpu, value) in session.get_percpu_var_all(symbol)? {
                print_instance(session.image(), cpu, &value);
            }
        }
    }
    Ok(())
}

fn print_instance(image: &CoreImage, cpu: u32, value: &Value) {
    println!(
        "cpu {:>3}: {:#018x}  {}{}",
        cpu,
        value.address,
        value.ty,
        render(image, value)
    );
}

/// Scalar contents, when the instance's bytes made it into the dump.
fn render(image: &impl ReadImage, value: &Value) -> String {
    match &value.ty {
        TypeInfo::Int { .. } => match value.read_int(image) {
            Ok(v) => format!(" = {v}"),
            Err(_) => "  <not in dump>".into(),
        },
        TypeInfo::Pointer { .. } => match value.read_pointer(image) {
            Ok(p) => format!(" -> {p:#x}"),
            Err(_) => "  <not in dump>".into(),
        },
        _ => String::new(),
    }
}
