//! Deterministic filename generation for relayed documents.

use crate::config::RelayConfig;

/// Characters invalid in filesystem/path contexts, always stripped.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Max length of the sanitized original base name.
const MAX_BASE_LEN: usize = 50;

/// How much of the original base name survives into the generated name.
const ORIGINAL_SUFFIX_LEN: usize = 20;

/// Pure filename generator: (original name, sequence, configuration) -> new
/// name. No I/O, no hidden state; same inputs always produce the same output.
#[derive(Debug, Clone)]
pub struct FileNamer {
    prefix: String,
    show_sequence: bool,
    destination_id: String,
}

impl FileNamer {
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        show_sequence: bool,
        destination_id: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            show_sequence,
            destination_id: destination_id.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.file_prefix.clone(),
            config.show_sequence,
            config.destination_id(),
        )
    }

    /// Sanitize a filename without renaming it: invalid characters stripped,
    /// whitespace runs collapsed, base capped at 50 characters, extension
    /// preserved.
    #[must_use]
    pub fn clean_filename(&self, filename: &str) -> String {
        let (base, extension) = split_extension(filename);
        let base = sanitize_base(base);
        match extension {
            Some(ext) => format!("{base}.{ext}"),
            None => base,
        }
    }

    /// Generate the published filename for a relayed document.
    #[must_use]
    pub fn generate(&self, original_filename: &str, sequence: u64) -> String {
        let (raw_base, extension) = split_extension(original_filename);
        let base = sanitize_base(raw_base);

        let mut name = if self.show_sequence {
            format!("{}{:04}_{}", self.prefix, sequence, self.destination_id)
        } else {
            format!("{}{}", self.prefix, self.destination_id)
        };

        if !base.is_empty() {
            let short: String = base.chars().take(ORIGINAL_SUFFIX_LEN).collect();
            name.push('_');
            name.push_str(&short);
        }

        if let Some(ext) = extension {
            name.push('.');
            name.push_str(ext);
        }

        name
    }
}

/// Split on the last dot. An empty extension counts as no extension.
fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() => (base, Some(ext)),
        Some((base, _)) => (base, None),
        None => (filename, None),
    }
}

fn sanitize_base(base: &str) -> String {
    let stripped: String = base.chars().filter(|c| !INVALID_CHARS.contains(c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_BASE_LEN).collect()
}
