use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SOURCE_DIRS: [&str; 8] = [
    "predict", "shared", "session", "imaging", "cli", "tests", "benches", "build.rs",
];

/// A source hygiene rule. Lines matching `pattern` are handed to `accept`,
/// which decides whether the line is a violation.
struct Gate {
    title: &'static str,
    pattern: &'static str,
    hint: &'static str,
    covers_build_script: bool,
    accept: fn(&str) -> bool,
}

const GATES: [Gate; 5] = [
    Gate {
        title: "underscore-prefixed names",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        hint: "Underscore-prefixed names are not allowed. Use the binding or remove it.",
        covers_build_script: true,
        accept: is_code_identifier,
    },
    Gate {
        title: "change-log words in comments",
        pattern: r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        hint: "Comments narrating edits are not allowed. Delete them rather than rewording.",
        covers_build_script: false,
        accept: any_line,
    },
    Gate {
        title: "'**' in non-doc comments",
        pattern: r"(//|/\*).*\*\*",
        hint: "The '**' pattern is only allowed in `///` doc comments.",
        covers_build_script: false,
        accept: is_not_doc_comment,
    },
    Gate {
        title: "comments written entirely in uppercase",
        pattern: r"(//|/\*)",
        hint: "Comments whose letters are all uppercase are not allowed.",
        covers_build_script: false,
        accept: is_shouting_comment,
    },
    Gate {
        title: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        hint: "#[allow(dead_code)] is not allowed. Use the code or remove it.",
        covers_build_script: false,
        accept: any_line,
    },
];

/// Collects `line:text` for every accepted match in one file.
struct LineCollector {
    accept: fn(&str) -> bool,
    hits: Vec<String>,
}

impl Sink for LineCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.accept)(text) {
            let line_number = mat.line_number().unwrap_or(0);
            self.hits.push(format!("{line_number}:{text}"));
        }
        Ok(true)
    }
}

fn any_line(_: &str) -> bool {
    true
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn is_not_doc_comment(line: &str) -> bool {
    !is_doc_comment(line)
}

// Skips comment lines and matches that sit between quotes.
fn is_code_identifier(line: &str) -> bool {
    if line.trim_start().starts_with("//") || line.contains("/*") {
        return false;
    }
    !line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

fn is_shouting_comment(line: &str) -> bool {
    comment_text(line).is_some_and(|text| {
        let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
        letters.peek().is_some() && letters.all(char::is_uppercase)
    })
}

// Rust sources of this crate, excluding build output and ./examples.
fn is_project_source(path: &Path) -> bool {
    !path.starts_with("./target")
        && !path.starts_with("./examples")
        && path.extension().is_some_and(|ext| ext == "rs")
}

fn project_sources() -> Vec<PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| is_project_source(e.path()))
        .map(|e| e.into_path())
        .collect()
}

fn run_gate(gate: &Gate, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(gate.pattern)?;
    let mut searcher = Searcher::new();

    for path in sources {
        if !gate.covers_build_script && path.file_name().is_some_and(|name| name == "build.rs") {
            continue;
        }
        let mut collector = LineCollector {
            accept: gate.accept,
            hits: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;

        if !collector.hits.is_empty() {
            let mut message = format!(
                "\n❌ ERROR: Found {} {} in {}:\n",
                collector.hits.len(),
                gate.title,
                path.display()
            );
            for hit in &collector.hits {
                message.push_str(&format!("   {hit}\n"));
            }
            message.push_str(&format!("\n⚠️ {}\n", gate.hint));
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    for source in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={source}");
    }

    // Stamp the binary so `clinpredict version` can report its age.
    let build_timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=CLINPREDICT_BUILD_TIMESTAMP={build_timestamp}");

    let sources = project_sources();
    for gate in &GATES {
        if let Err(e) = run_gate(gate, &sources) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
