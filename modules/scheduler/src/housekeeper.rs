//! Housekeeper: scheduler-integrated cleanup registry. Directories are
//! registered once; a cron-triggered scheduled event applies the union of
//! each registration's age/count/size candidate sets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::SchedulerError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupRegistration {
    pub id: String,
    pub module_id: String,
    pub directory: String,
    pub pattern: String,
    pub retention_days: Option<u64>,
    pub max_files: Option<u64>,
    pub max_size_mb: Option<u64>,
    pub priority: i64,
    pub description: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CleanupRegistrationSpec {
    pub module_id: String,
    pub directory: String,
    pub pattern: String,
    pub retention_days: Option<u64>,
    pub max_files: Option<u64>,
    pub max_size_mb: Option<u64>,
    #[serde(default)]
    pub priority: i64,
    pub description: Option<String>,
}

impl CleanupRegistrationSpec {
    /// At least one retention policy field must be set.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.retention_days.is_none() && self.max_files.is_none() && self.max_size_mb.is_none() {
            return Err(SchedulerError::ParameterInvalid(
                "cleanup registration requires at least one of retention_days, max_files, max_size_mb".into(),
            ));
        }
        Ok(())
    }

    pub fn into_registration(self) -> CleanupRegistration {
        CleanupRegistration {
            id: Uuid::new_v4().to_string(),
            module_id: self.module_id,
            directory: self.directory,
            pattern: self.pattern,
            retention_days: self.retention_days,
            max_files: self.max_files,
            max_size_mb: self.max_size_mb,
            priority: self.priority,
            description: self.description,
            last_run_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CleanupReport {
    pub registration_id: String,
    pub files_scanned: u64,
    pub files_deleted: u64,
    pub bytes_reclaimed: u64,
    pub failures: u64,
    pub dry_run: bool,
}

struct Candidate {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Translate a shell-style glob (`*`, `?`) into an anchored regex. Only
/// these two wildcards are supported in a registration's `pattern` field.
fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if regex_syntax::is_meta_character(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    regex::Regex::new(&out).unwrap_or_else(|_| regex::Regex::new("^$").unwrap())
}

fn scan(directory: &Path, pattern: &str) -> Result<Vec<Candidate>, SchedulerError> {
    if !directory.is_dir() {
        return Err(SchedulerError::DirectoryMissing(directory.display().to_string()));
    }
    let re = glob_to_regex(pattern);
    let entries = std::fs::read_dir(directory)
        .map_err(|e| SchedulerError::PermissionDenied(format!("{}: {e}", directory.display())))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !re.is_match(name) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push(Candidate { path, modified, size: meta.len() });
    }
    Ok(candidates)
}

/// Apply one registration's policy: build the age/count/size candidate sets,
/// union them, and delete (unless `dry_run`).
pub fn run_registration(reg: &CleanupRegistration, dry_run: bool) -> Result<CleanupReport, SchedulerError> {
    let directory = Path::new(&reg.directory);
    let mut candidates = scan(directory, &reg.pattern)?;
    // Newest first, so the size-set walk below accumulates oldest-first.
    candidates.sort_by(|a, b| b.modified.cmp(&a.modified));

    let files_scanned = candidates.len() as u64;
    let mut delete_indices: HashSet<usize> = HashSet::new();

    if let Some(retention_days) = reg.retention_days {
        let cutoff = SystemTime::now() - std::time::Duration::from_secs(retention_days * 86_400);
        for (i, c) in candidates.iter().enumerate() {
            if c.modified < cutoff {
                delete_indices.insert(i);
            }
        }
    }

    if let Some(max_files) = reg.max_files {
        for (i, _) in candidates.iter().enumerate().skip(max_files as usize) {
            delete_indices.insert(i);
        }
    }

    if let Some(max_size_mb) = reg.max_size_mb {
        let budget = max_size_mb * 1_048_576;
        let mut running = 0u64;
        for (i, c) in candidates.iter().enumerate() {
            running += c.size;
            if running > budget {
                delete_indices.insert(i);
            }
        }
    }

    let mut report = CleanupReport {
        registration_id: reg.id.clone(),
        files_scanned,
        files_deleted: 0,
        bytes_reclaimed: 0,
        failures: 0,
        dry_run,
    };

    for i in delete_indices {
        let candidate = &candidates[i];
        if dry_run {
            report.files_deleted += 1;
            report.bytes_reclaimed += candidate.size;
            continue;
        }
        match std::fs::remove_file(&candidate.path) {
            Ok(()) => {
                report.files_deleted += 1;
                report.bytes_reclaimed += candidate.size;
            }
            Err(e) => {
                tracing::warn!(path = %candidate.path.display(), error = %e, "housekeeper: delete failed");
                report.failures += 1;
            }
        }
    }

    Ok(report)
}

mod regex_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '\\' | '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, age_days: u64, size: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; size]).unwrap();
        let mtime = SystemTime::now() - std::time::Duration::from_secs(age_days * 86_400);
        let ft = filetime::FileTime::from_system_time(mtime);
        filetime::set_file_mtime(&path, ft).unwrap();
        path
    }

    #[test]
    fn combined_policy_matches_scenario_s5() {
        let dir = tempdir().unwrap();
        for age in 1..=10u64 {
            touch(dir.path(), &format!("f{age}.log"), age, 20 * 1024 * 1024);
        }
        let reg = CleanupRegistration {
            id: "r1".into(),
            module_id: "m".into(),
            directory: dir.path().display().to_string(),
            pattern: "*".into(),
            retention_days: Some(7),
            max_files: Some(4),
            max_size_mb: Some(100),
            priority: 10,
            description: None,
            last_run_at: None,
        };
        let report = run_registration(&reg, false).unwrap();
        assert_eq!(report.files_scanned, 10);
        assert_eq!(report.files_deleted, 6);
        assert_eq!(report.bytes_reclaimed, 6 * 20 * 1024 * 1024);

        let second = run_registration(&reg, false).unwrap();
        assert_eq!(second.files_deleted, 0);
    }

    #[test]
    fn dry_run_does_not_delete() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "old.log", 30, 1024);
        let reg = CleanupRegistration {
            id: "r2".into(),
            module_id: "m".into(),
            directory: dir.path().display().to_string(),
            pattern: "*.log".into(),
            retention_days: Some(1),
            max_files: None,
            max_size_mb: None,
            priority: 10,
            description: None,
            last_run_at: None,
        };
        let report = run_registration(&reg, true).unwrap();
        assert_eq!(report.files_deleted, 1);
        assert!(dir.path().join("old.log").exists());
    }
}
