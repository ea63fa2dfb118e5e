use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

// Session names, tool names and model output are arbitrary UTF-8. Slicing
// them with a literal byte range (`name[..8]`, `id[4..]`) panics on a
// multi-byte boundary, so `src/` must go through `utils::string` instead.
// Ranges ending in a variable (`&buf[..n]`) are not flagged.

fn collect_sources(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read_dir failed: {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sources(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

fn literal_slice_patterns() -> Vec<Regex> {
    [
        r"\[\s*\d*\s*\.\.=?\s*\d+\s*\]",
        r"\[\s*\d+\s*\.\.\s*\]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
}

#[test]
fn patterns_flag_literal_ranges_only() {
    let patterns = literal_slice_patterns();
    let flagged = |line: &str| patterns.iter().any(|re| re.is_match(line));

    assert!(flagged("let short = &name[..8];"));
    assert!(flagged("let tail = &id[4..];"));
    assert!(flagged("let mid = &id[2..6];"));
    assert!(!flagged("let head = &buf[..n];"));
    assert!(!flagged("let all = &items[..];"));
    assert!(!flagged("let first = items[0];"));
}

#[test]
fn sources_avoid_literal_byte_slices() -> anyhow::Result<()> {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let patterns = literal_slice_patterns();

    let mut files = Vec::new();
    collect_sources(&src_dir, &mut files)?;

    let mut failures = Vec::new();
    for path in files {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for (i, line) in text.lines().enumerate() {
            let code = line.split("//").next().unwrap_or_default();
            if patterns.iter().any(|re| re.is_match(code)) {
                failures.push(format!("{}:{}: {}", path.display(), i + 1, line.trim()));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "Found literal-range slices in source files:\n{}",
            failures.join("\n")
        );
    }
    Ok(())
}
