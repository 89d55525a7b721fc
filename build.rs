use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    enforce_no_io_in_library();
}

fn enforce_no_io_in_library() {
    // The library reports through `log` and diagnostic sinks only; it never
    // touches stdio, files or sockets.
    let forbidden = [
        "println!(",
        "eprintln!(",
        "print!(",
        "eprint!(",
        "dbg!(",
        "std::fs",
        "std::net",
        "std::io::stdout",
        "std::io::stderr",
    ];

    let mut violations = Vec::new();
    let src_root = PathBuf::from("src");
    let mut stack = vec![src_root];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let rel = path.to_string_lossy().to_string();
            let src = match fs::read_to_string(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for (line_no, line) in src.lines().enumerate() {
                for token in &forbidden {
                    if line.contains(token) {
                        violations.push(format!(
                            "{}:{} contains forbidden token '{}'",
                            rel,
                            line_no + 1,
                            token
                        ));
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nerror: I/O calls detected in spatial-linalg library sources:");
        for v in violations {
            eprintln!("  - {v}");
        }
        panic!("library sources must not perform I/O");
    }
}
