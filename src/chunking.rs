//! Chunking utilities for splitting source files into embedding-sized regions.
//!
//! Embedding models lose signal on inputs beyond a few hundred lines, so
//! files are cut into line-bounded chunks. When the file's language is
//! recognized, cuts prefer top-level declaration boundaries (functions,
//! classes, impls); otherwise a sliding line window with a small overlap is
//! used.

use std::{path::Path, sync::LazyLock};

use regex::Regex;

/// Default maximum chunk height in lines.
pub const MAX_CHUNK_LINES: usize = 150;

/// Default overlap between consecutive window chunks, in lines.
pub const OVERLAP_LINES: usize = 5;

/// Default minimum chunk height; shorter regions are dropped.
pub const MIN_CHUNK_LINES: usize = 5;

/// Tuning knobs for the chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_lines: usize,
    pub overlap_lines: usize,
    pub min_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_lines: MAX_CHUNK_LINES,
            overlap_lines: OVERLAP_LINES,
            min_lines: MIN_CHUNK_LINES,
        }
    }
}

/// A contiguous region of one file, the unit of embedding and retrieval.
///
/// Line numbers are 1-based and inclusive, and always reference lines of the
/// original file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub text: String,
    pub line_start: usize,
    pub line_end: usize,
}

macro_rules! regexes {
    ($($pattern:literal),+ $(,)?) => {
        vec![$(Regex::new($pattern).unwrap()),+]
    };
}

static JS_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^\s*(export\s+)?(default\s+)?(async\s+)?function\b",
        r"^\s*(export\s+)?(abstract\s+)?class\b",
        r"^\s*(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s*)?(\(|function\b)",
        r"^\s*(export\s+)?interface\b",
        r"^\s*(export\s+)?type\s+\w+\s*=",
        r"^\s*(export\s+)?enum\b",
    ]
});

static PY_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^(async\s+)?def\s+\w+",
        r"^class\s+\w+",
        r"^@\w+",
    ]
});

static JAVA_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^\s*(public|private|protected)?\s*(static\s+)?(final\s+)?(abstract\s+)?(class|interface|enum|record)\s+\w+",
        r"^\s*(public|private|protected)\s+[\w<>\[\]]+\s+\w+\s*\(",
    ]
});

static GO_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![r"^func\s", r"^type\s+\w+", r"^(var|const)\s+\w+"]
});

static RS_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+",
        r"^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait|mod|type|union)\s+\w+",
        r"^impl\b",
    ]
});

static RB_BOUNDARIES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| regexes![r"^\s*(def|class|module)\s+\w+"]);

static PHP_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^\s*((public|private|protected|static|abstract|final)\s+)*function\s+\w+",
        r"^\s*(abstract\s+|final\s+)?class\s+\w+",
        r"^\s*(interface|trait)\s+\w+",
    ]
});

static C_BOUNDARIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    regexes![
        r"^\s*(typedef\s+)?(struct|union|enum|class)\b",
        r"^[A-Za-z_][\w\s\*&<>:,]*\s[\*&]*\w+\s*\([^;]*$",
        r"^(static|inline|extern)\b",
    ]
});

/// Boundary regexes for a file extension, or `None` when the language is
/// not recognized.
fn boundary_patterns(ext: &str) -> Option<&'static [Regex]> {
    let set: &LazyLock<Vec<Regex>> = match ext {
        "ts" | "tsx" | "js" | "jsx" => &JS_BOUNDARIES,
        "py" => &PY_BOUNDARIES,
        "java" => &JAVA_BOUNDARIES,
        "go" => &GO_BOUNDARIES,
        "rs" => &RS_BOUNDARIES,
        "rb" => &RB_BOUNDARIES,
        "php" => &PHP_BOUNDARIES,
        "c" | "cpp" | "h" => &C_BOUNDARIES,
        _ => return None,
    };
    Some(set.as_slice())
}

/// Split file content into ordered chunks.
///
/// Files of at most `max_lines` lines become a single chunk. Longer files
/// are cut at declaration boundaries when the extension has a known regex
/// family; boundary regions taller than `max_lines` (and files without a
/// regex family) fall back to the sliding line window.
pub fn chunk_file(content: &str, path: &Path, config: &ChunkerConfig) -> Vec<ChunkSpan> {
    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len();

    if total <= config.max_lines {
        return vec![make_span(&lines, 0, 1, total)];
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let Some(patterns) = boundary_patterns(&ext) else {
        return window_chunks(&lines, 0, config);
    };

    // Line 0 is always a boundary; a regex match adds a line iff it is not
    // already the last recorded boundary.
    let mut boundaries = vec![0usize];
    for (i, line) in lines.iter().enumerate().skip(1) {
        if patterns.iter().any(|re| re.is_match(line)) && boundaries.last() != Some(&i) {
            boundaries.push(i);
        }
    }
    boundaries.push(total);

    let mut chunks = Vec::new();
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let len = end - start;
        if len > config.max_lines {
            chunks.extend(window_chunks(&lines[start..end], start, config));
        } else if len >= config.min_lines {
            chunks.push(make_span(&lines, start, start + 1, end));
        }
        // Regions shorter than min_lines are dropped.
    }

    if chunks.is_empty() {
        return window_chunks(&lines, 0, config);
    }
    chunks
}

/// Sliding-window chunking over a slice of lines.
///
/// `offset` is the 0-based index of the slice's first line within the
/// original file; emitted line numbers are offset accordingly. Windows of
/// `max_lines` advance by `max_lines - overlap_lines`, so consecutive chunks
/// share `overlap_lines` lines. Tail windows shorter than `min_lines` are
/// dropped unless the slice would otherwise yield nothing.
fn window_chunks(lines: &[&str], offset: usize, config: &ChunkerConfig) -> Vec<ChunkSpan> {
    let n = lines.len();
    let step = config.max_lines.saturating_sub(config.overlap_lines).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + config.max_lines).min(n);
        let len = end - start;
        if len >= config.min_lines || (end == n && chunks.is_empty()) {
            chunks.push(make_span(lines, offset, offset + start + 1, offset + end));
        }
        if end == n {
            break;
        }
        start += step;
    }
    chunks
}

fn make_span(lines: &[&str], offset: usize, line_start: usize, line_end: usize) -> ChunkSpan {
    let lo = line_start - 1 - offset;
    let hi = line_end - offset;
    ChunkSpan {
        text: lines[lo..hi].join("\n"),
        line_start,
        line_end,
    }
}
