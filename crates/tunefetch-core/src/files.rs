//! File lifecycle: output naming, per-job temp prefixes, and `.part` finalize.
//!
//! A temp pattern is a path prefix such as `~/.cache/tunefetch/partial/tf-<uuid>`.
//! The fetch tool writes `tf-<uuid>.<ext>` (plus its own `.part` leftovers);
//! every sibling whose name starts with `tf-<uuid>.` belongs to the job.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::JobError;

/// Suffix of in-progress conversion output before the atomic rename.
pub const PART_SUFFIX: &str = ".part";

/// Suffixes the fetch tool leaves behind for unfinished transfers.
const FETCH_LEFTOVER_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// `file.mp3` → `file.mp3.part`.
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    PathBuf::from(o)
}

/// Final output path for (title, artist) with the given extension.
pub fn output_path(output_dir: &Path, title: &str, artist: &str, extension: &str) -> PathBuf {
    let stem = match (artist.trim(), title.trim()) {
        ("", t) => t.to_string(),
        (a, "") => a.to_string(),
        (a, t) => format!("{a} - {t}"),
    };
    let mut stem = sanitize_file_stem(&stem);
    if stem.is_empty() {
        stem = "untitled".to_string();
    }
    output_dir.join(format!("{stem}.{extension}"))
}

/// Fresh, unique temp prefix inside `temp_dir`.
pub fn new_temp_pattern(temp_dir: &Path) -> PathBuf {
    temp_dir.join(format!("tf-{}", uuid::Uuid::new_v4().simple()))
}

/// Files matching `<pattern>.*`. A missing directory yields an empty list.
pub fn temp_matches(pattern: &Path) -> std::io::Result<Vec<PathBuf>> {
    let Some(dir) = pattern.parent() else {
        return Ok(Vec::new());
    };
    let Some(stem) = pattern.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{stem}.");
    let read_dir = match std::fs::read_dir(if dir.as_os_str().is_empty() { Path::new(".") } else { dir }) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) && entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            out.push(dir.join(name));
        }
    }
    out.sort();
    Ok(out)
}

/// True if at least one file matches `<pattern>.*`.
pub fn has_temp_files(pattern: &Path) -> bool {
    temp_matches(pattern).map(|m| !m.is_empty()).unwrap_or(false)
}

/// Deletes every file matching `<pattern>.*`; returns how many were removed.
pub fn remove_temp_files(pattern: &Path) -> usize {
    let matches = match temp_matches(pattern) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(pattern = %pattern.display(), "could not list temp files: {}", e);
            return 0;
        }
    };
    let mut removed = 0;
    for path in matches {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted temp file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "could not delete temp file: {}", e),
        }
    }
    removed
}

/// Picks the file the fetch step produced.
///
/// Fetch-tool leftovers (`.part`, `.ytdl`) are ignored. Zero candidates is
/// `TempFileMissing`. Several candidates (stale output of a crashed earlier run)
/// resolve to the most recently modified one.
pub fn select_fetched_file(pattern: &Path) -> Result<PathBuf, JobError> {
    let matches = temp_matches(pattern)
        .map_err(|e| JobError::io(format!("list temp files for {}", pattern.display()), e))?;
    let mut candidates: Vec<PathBuf> = matches
        .into_iter()
        .filter(|p| {
            let name = p.to_string_lossy();
            !FETCH_LEFTOVER_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .collect();

    match candidates.len() {
        0 => Err(JobError::TempFileMissing {
            pattern: pattern.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        n => {
            candidates.sort_by_key(|p| {
                std::fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            });
            let chosen = candidates.pop().ok_or_else(|| JobError::TempFileMissing {
                pattern: pattern.to_path_buf(),
            })?;
            tracing::warn!(
                pattern = %pattern.display(),
                chosen = %chosen.display(),
                "{} files match temp pattern; using the newest",
                n
            );
            Ok(chosen)
        }
    }
}

/// Sanitizes a display name ("Artist - Title") for use as a file stem.
///
/// - Replaces NUL, path separators, control characters, and `:*?"<>|` with `_`
/// - Collapses runs of whitespace to one space and runs of `_` to one
/// - Trims leading/trailing spaces, dots, and underscores
/// - Limits length to 200 bytes, leaving room for the extension and `.part`
pub fn sanitize_file_stem(name: &str) -> String {
    const STEM_MAX: usize = 200;

    let mut out = String::with_capacity(name.len());
    let mut prev: Option<char> = None;

    for c in name.chars() {
        let replacement = if c == '\0'
            || c == '/'
            || c == '\\'
            || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || (c.is_control() && c != '\t')
        {
            '_'
        } else if c.is_whitespace() {
            ' '
        } else {
            c
        };

        if (replacement == '_' || replacement == ' ') && prev == Some(replacement) {
            continue;
        }
        out.push(replacement);
        prev = Some(replacement);
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');

    if trimmed.len() > STEM_MAX {
        let mut take = STEM_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        let p = part_path(Path::new("/music/A - B.mp3"));
        assert_eq!(p.to_string_lossy(), "/music/A - B.mp3.part");
    }

    #[test]
    fn output_path_joins_artist_and_title() {
        let p = output_path(Path::new("/music"), "Song", "Band", "mp3");
        assert_eq!(p, PathBuf::from("/music/Band - Song.mp3"));
        let p = output_path(Path::new("/music"), "Song", "  ", "mp4");
        assert_eq!(p, PathBuf::from("/music/Song.mp4"));
        let p = output_path(Path::new("/music"), "", "", "mp3");
        assert_eq!(p, PathBuf::from("/music/untitled.mp3"));
    }

    #[test]
    fn sanitize_replaces_reserved_chars() {
        assert_eq!(sanitize_file_stem("AC/DC - T.N.T."), "AC_DC - T.N.T");
        assert_eq!(sanitize_file_stem("What? Why: Now*"), "What_ Why_ Now");
        assert_eq!(sanitize_file_stem("a\0b"), "a_b");
    }

    #[test]
    fn sanitize_collapses_whitespace_and_trims() {
        assert_eq!(sanitize_file_stem("  ..Band   -\tSong..  "), "Band - Song");
        assert_eq!(sanitize_file_stem("x///y"), "x_y");
    }

    #[test]
    fn sanitize_limits_length_on_char_boundary() {
        let long = "é".repeat(150);
        let s = sanitize_file_stem(&long);
        assert!(s.len() <= 200);
        assert!(s.chars().all(|c| c == 'é'));
    }

    #[test]
    fn temp_patterns_are_unique() {
        let dir = Path::new("/tmp/partial");
        let a = new_temp_pattern(dir);
        let b = new_temp_pattern(dir);
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("tf-"));
    }

    #[test]
    fn temp_matches_only_prefix_dot_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("tf-abc");
        std::fs::write(dir.path().join("tf-abc.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("tf-abc.webm.part"), b"x").unwrap();
        std::fs::write(dir.path().join("tf-abcd.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("tf-abc"), b"x").unwrap();

        let m = temp_matches(&pattern).unwrap();
        assert_eq!(m.len(), 2);
        assert!(has_temp_files(&pattern));

        assert_eq!(remove_temp_files(&pattern), 2);
        assert!(!has_temp_files(&pattern));
        assert!(dir.path().join("tf-abcd.webm").exists());
    }

    #[test]
    fn temp_matches_missing_dir_is_empty() {
        let m = temp_matches(Path::new("/nonexistent/tunefetch/tf-x")).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn select_fetched_file_ignores_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("tf-1");
        std::fs::write(dir.path().join("tf-1.m4a.part"), b"x").unwrap();
        assert!(matches!(
            select_fetched_file(&pattern),
            Err(JobError::TempFileMissing { .. })
        ));

        std::fs::write(dir.path().join("tf-1.m4a"), b"x").unwrap();
        assert_eq!(
            select_fetched_file(&pattern).unwrap(),
            dir.path().join("tf-1.m4a")
        );
    }

    #[test]
    fn select_fetched_file_prefers_newest_of_many() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("tf-2");
        let old = dir.path().join("tf-2.webm");
        let new = dir.path().join("tf-2.m4a");
        std::fs::write(&old, b"old").unwrap();
        let f = std::fs::File::options().write(true).open(&old).unwrap();
        f.set_modified(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000))
            .unwrap();
        std::fs::write(&new, b"new").unwrap();
        assert_eq!(select_fetched_file(&pattern).unwrap(), new);
    }
}
