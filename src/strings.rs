//! Printable-string scanning for opaque data blocks. Everything here is a
//! heuristic over byte runs; it never changes how a block was classified.

/// Minimum printable run length worth reporting.
const MIN_RUN: usize = 3;
/// At most this many interesting strings are retained per block.
const MAX_SAMPLES: usize = 10;
/// Individual samples are clipped so one long run cannot flood a CSV field.
const MAX_SAMPLE_LEN: usize = 80;

const TEXT_EXTENSIONS: &[&str] = &[".txt", ".log", ".md"];
const TEXT_LEADERS: &[&str] = &["The ", "This "];
const CONFIG_EXTENSIONS: &[&str] = &[".conf", ".cfg", ".ini"];
const LOG_WORDS: &[&str] = &["error", "warning", "info", "debug"];

/// Path fragments, service names, URL schemes and extensions that make a
/// recovered string worth keeping as a sample.
const INTERESTING_PATTERNS: &[&str] = &[
    "/etc/", "/var/", "/usr/", "/home/", "/tmp/", "/opt/", "passwd", "shadow", "systemd", "cron",
    "sshd", "bash", "http://", "https://", "ftp://", ".txt", ".log", ".conf", ".cfg", ".ini",
    ".md", ".sh", ".py", ".db", ".sqlite", ".pem", ".key", ".zip", ".tar", ".gz",
];

/// What the scanner learned about one block of opaque data.
#[derive(Debug, Default, Clone)]
pub struct StringAnalysis {
    pub total_strings: usize,
    pub looks_text: bool,
    pub looks_config: bool,
    pub looks_log: bool,
    pub samples: Vec<String>,
}

impl StringAnalysis {
    pub fn has_strings(&self) -> bool {
        self.total_strings > 0
    }

    /// The sample strings joined for the record's file-path column.
    pub fn joined_samples(&self) -> String {
        self.samples.join("; ")
    }
}

/// Extract printable ASCII runs (0x20..0x7E) of at least `MIN_RUN` bytes.
fn printable_runs(data: &[u8]) -> Vec<&[u8]> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &b) in data.iter().enumerate() {
        let printable = (0x20..=0x7E).contains(&b);
        match (printable, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_RUN {
                    runs.push(&data[s..i]);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if data.len() - s >= MIN_RUN {
            runs.push(&data[s..]);
        }
    }
    runs
}

fn contains_any_ci(lower: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| lower.contains(p))
}

/// Scan one data block.
pub fn scan_block(data: &[u8]) -> StringAnalysis {
    let mut analysis = StringAnalysis::default();

    for run in printable_runs(data) {
        analysis.total_strings += 1;
        let text = String::from_utf8_lossy(run);
        let lower = text.to_lowercase();

        if contains_any_ci(&lower, TEXT_EXTENSIONS) || TEXT_LEADERS.iter().any(|l| text.contains(l))
        {
            analysis.looks_text = true;
        }
        if contains_any_ci(&lower, CONFIG_EXTENSIONS)
            || lower.contains("config")
            || text.contains('=')
        {
            analysis.looks_config = true;
        }
        if contains_any_ci(&lower, LOG_WORDS) || text.contains(':') {
            analysis.looks_log = true;
        }

        if analysis.samples.len() < MAX_SAMPLES && contains_any_ci(&lower, INTERESTING_PATTERNS) {
            let mut sample = text.into_owned();
            if sample.len() > MAX_SAMPLE_LEN {
                sample.truncate(MAX_SAMPLE_LEN);
            }
            analysis.samples.push(sample);
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(strings: &[&str]) -> Vec<u8> {
        let mut data = vec![0u8; 512];
        let mut offset = 7;
        for s in strings {
            data[offset..offset + s.len()].copy_from_slice(s.as_bytes());
            offset += s.len() + 5;
        }
        data
    }

    #[test]
    fn extracts_runs_of_three_or_more() {
        let mut data = vec![0u8; 32];
        data[1..3].copy_from_slice(b"no"); // too short
        data[10..13].copy_from_slice(b"yes");
        let analysis = scan_block(&data);
        assert_eq!(analysis.total_strings, 1);
    }

    #[test]
    fn detects_text_config_and_log_flavors() {
        let analysis = scan_block(&block_with(&["notes.TXT", "This is prose"]));
        assert!(analysis.looks_text);

        let analysis = scan_block(&block_with(&["PATH=/usr/bin"]));
        assert!(analysis.looks_config);

        let analysis = scan_block(&block_with(&["kernel: ERROR on sda1"]));
        assert!(analysis.looks_log);
    }

    #[test]
    fn keeps_interesting_samples_capped() {
        let many: Vec<String> = (0..20).map(|i| format!("/etc/service{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
        let analysis = scan_block(&block_with(&refs));
        assert_eq!(analysis.samples.len(), MAX_SAMPLES);
        assert!(analysis.joined_samples().contains("/etc/service0"));
    }

    #[test]
    fn pure_binary_has_no_strings() {
        let data: Vec<u8> = (0..255u8).filter(|b| !(0x20..=0x7E).contains(b)).collect();
        let analysis = scan_block(&data);
        assert!(!analysis.has_strings());
        assert!(analysis.samples.is_empty());
    }
}
