use anyhow::Context;
use std::fs;
use std::path::Path;

// The tool registry contains executor panics with `catch_unwind`, which only
// works when panics unwind. This test fails if any profile in Cargo.toml
// switches to `panic = "abort"`.

#[test]
fn profiles_keep_unwinding_panics() -> anyhow::Result<()> {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    let content = fs::read_to_string(&manifest)
        .with_context(|| format!("read failed: {}", manifest.display()))?;

    let mut section = String::new();
    let mut failures: Vec<String> = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            section = trimmed.to_string();
            continue;
        }
        if !section.starts_with("[profile") {
            continue;
        }
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.starts_with("panic=\"abort\"") {
            failures.push(format!("{} line {}: {}", section, lineno + 1, trimmed));
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "panic = \"abort\" disables tool panic containment:\n{}",
            failures.join("\n")
        );
    }
    Ok(())
}
