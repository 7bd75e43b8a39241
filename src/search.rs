//! Search result presentation.

use std::path::Path;

use serde::Serialize;

use crate::vector_store::SearchHit;

/// JSON projection of a hit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonHit<'a> {
    rank: usize,
    score: f32,
    id: String,
    filepath: &'a str,
    line_start: u32,
    line_end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    results: Vec<JsonHit<'a>>,
}

/// Render a path relative to the repository root when possible.
fn relative_display<'a>(filepath: &'a str, root: &Path) -> &'a str {
    Path::new(filepath)
        .strip_prefix(root)
        .ok()
        .and_then(|p| p.to_str())
        .unwrap_or(filepath)
}

/// Format results for human-readable terminal output.
pub fn format_human(hits: &[SearchHit], root: &Path, show_content: bool) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}:{}-{} #{}",
            rank + 1,
            hit.score,
            relative_display(&hit.filepath, root),
            hit.line_start,
            hit.line_end,
            hit.id.short()
        );
        if show_content {
            for line in hit.content.lines() {
                println!("     | {line}");
            }
            println!();
        }
    }
}

/// Format results as a single JSON document on stdout.
pub fn format_json(hits: &[SearchHit], query: &str, show_content: bool) {
    let output = JsonOutput {
        query,
        results: hits
            .iter()
            .enumerate()
            .map(|(rank, hit)| JsonHit {
                rank: rank + 1,
                score: hit.score,
                id: hit.id.to_string(),
                filepath: &hit.filepath,
                line_start: hit.line_start,
                line_end: hit.line_end,
                content: show_content.then_some(hit.content.as_str()),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    );
}
