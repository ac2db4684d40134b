use semver::Version;
use serde::{Deserialize, Serialize};

/// Parsed output of `codex --version`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CliVersionInfo {
    /// Trimmed output so build metadata is not lost.
    pub raw: String,
    /// `major.minor.patch` when the output contains a semantic version.
    pub semantic: Option<(u64, u64, u64)>,
    /// Version token as printed (minus a leading `v`).
    pub version: Option<String>,
}

fn trim_token(token: &str) -> &str {
    token
        .trim_matches(|c: char| matches!(c, '(' | ')' | ',' | ';' | '[' | ']'))
        .trim_start_matches('v')
}

fn parse_semver_token(raw: &str) -> Option<(String, Version)> {
    raw.split_whitespace().find_map(|token| {
        let candidate = trim_token(token);
        Version::parse(candidate)
            .ok()
            .map(|version| (candidate.to_string(), version))
    })
}

// Accepts dotted numeric tokens such as `1.2` that semver rejects.
fn looks_like_version(candidate: &str) -> bool {
    let mut parts = candidate.split('.');
    let Some(first) = parts.next() else {
        return false;
    };
    let rest: Vec<&str> = parts.collect();
    !first.is_empty()
        && first.chars().all(|c| c.is_ascii_digit())
        && !rest.is_empty()
        && rest
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Extracts version details from CLI output such as `codex-cli 0.46.0`.
pub fn parse_version_output(output: &str) -> CliVersionInfo {
    let raw = output.trim().to_string();
    if let Some((token, parsed)) = parse_semver_token(&raw) {
        return CliVersionInfo {
            semantic: Some((parsed.major, parsed.minor, parsed.patch)),
            version: Some(token),
            raw,
        };
    }

    let version = raw
        .split_whitespace()
        .map(trim_token)
        .find(|candidate| looks_like_version(candidate))
        .map(str::to_string);

    CliVersionInfo {
        raw,
        semantic: None,
        version,
    }
}
