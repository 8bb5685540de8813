use std::fs;

use native_to_llvm::{CodeSlice, IsaKind};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") || args.len() < 4 {
        eprintln!("native-to-llvm - Lift machine code to LLVM IR");
        eprintln!();
        eprintln!("Usage: native-to-llvm <x86_64|aarch64> <code.bin> <entry-hex> [base-hex]");
        eprintln!();
        eprintln!("  <code.bin>  flat binary containing the function's bytes");
        eprintln!("  <entry>     virtual address of the function entry");
        eprintln!("  [base]      virtual address of the file's first byte");
        eprintln!("              (defaults to the entry address)");
        std::process::exit(if args.len() < 4 { 1 } else { 0 });
    }

    let isa = match args[1].as_str() {
        "x86_64" => IsaKind::X86_64,
        "aarch64" => IsaKind::AArch64,
        other => {
            eprintln!("Unknown ISA '{other}', expected x86_64 or aarch64");
            std::process::exit(1);
        }
    };

    let bytes = match fs::read(&args[2]) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error reading {}: {e}", args[2]);
            std::process::exit(1);
        }
    };

    let parse_hex = |s: &String| {
        u64::from_str_radix(s.trim_start_matches("0x"), 16)
            .unwrap_or_else(|_| panic!("invalid address '{s}'"))
    };
    let entry = parse_hex(&args[3]);
    let base = args.get(4).map(parse_hex).unwrap_or(entry);

    match native_to_llvm::lift_function_ir(isa, &CodeSlice::new(base, &bytes), entry) {
        Ok(ir) => print!("{ir}"),
        Err(e) => {
            eprintln!("Lifting error: {e}");
            std::process::exit(1);
        }
    }
}
