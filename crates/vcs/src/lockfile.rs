//! Lockfile and CI file recognition.
//!
//! Recognition is by file name only (the last path segment), case-sensitive,
//! at any depth of the repository tree.

/// Dependency-manifest file names recognized at any depth.
pub const SUPPORTED_LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "requirements.txt",
    "poetry.lock",
    "pom.xml",
    "effective-pom.xml",
    "Gemfile.lock",
    "gradle.lockfile",
    "Pipfile",
    "Pipfile.lock",
];

/// File-name suffixes recognized as lockfiles (.NET project files).
pub const SUPPORTED_LOCKFILE_SUFFIXES: &[&str] = &[".csproj"];

/// CI configuration file names.
pub const CI_FILES: &[&str] = &[".gitlab-ci.yml", ".gitlab-ci.yaml"];

/// Classification of a repository file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Lockfile,
    CiFile,
}

/// A recognized tree entry awaiting download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntry {
    pub class: FileClass,
    /// File name (last path segment).
    pub name: String,
    /// Repository-relative path without a leading slash.
    pub path: String,
    /// Backend content identifier (blob SHA, object id, commit hash).
    pub content_id: String,
}

/// Returns the last path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether `name` is a recognized lockfile name.
pub fn is_lockfile(name: &str) -> bool {
    SUPPORTED_LOCKFILES.contains(&name)
        || SUPPORTED_LOCKFILE_SUFFIXES
            .iter()
            .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
}

/// Whether `name` is a recognized CI file name.
pub fn is_ci_file(name: &str) -> bool {
    CI_FILES.contains(&name)
}

/// Classifies a repository-relative path.
pub fn classify(path: &str) -> Option<FileClass> {
    let name = file_name(path);
    if is_lockfile(name) {
        Some(FileClass::Lockfile)
    } else if is_ci_file(name) {
        Some(FileClass::CiFile)
    } else {
        None
    }
}

/// Filters `(path, content_id)` blob entries down to recognized targets.
///
/// Leading slashes are stripped so every backend reports paths the same way.
/// Output order follows input order.
pub fn select_targets<I, P, C>(entries: I) -> Vec<TargetEntry>
where
    I: IntoIterator<Item = (P, C)>,
    P: AsRef<str>,
    C: Into<String>,
{
    entries
        .into_iter()
        .filter_map(|(path, content_id)| {
            let path = path.as_ref().trim_start_matches('/');
            let class = classify(path)?;
            Some(TargetEntry {
                class,
                name: file_name(path).to_owned(),
                path: path.to_owned(),
                content_id: content_id.into(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_supported_name() {
        for name in SUPPORTED_LOCKFILES {
            assert!(is_lockfile(name), "{name} should be recognized");
        }
    }

    #[test]
    fn recognizes_csproj_suffix() {
        assert!(is_lockfile("Service.csproj"));
        assert!(!is_lockfile(".csproj"));
        assert!(!is_lockfile("Service.csproj.bak"));
    }

    #[test]
    fn recognition_is_case_sensitive() {
        assert!(!is_lockfile("Requirements.txt"));
        assert!(!is_lockfile("gemfile.lock"));
    }

    #[test]
    fn classify_uses_last_segment() {
        assert_eq!(
            classify("backend/requirements.txt"),
            Some(FileClass::Lockfile)
        );
        assert_eq!(classify("deploy/.gitlab-ci.yml"), Some(FileClass::CiFile));
        assert_eq!(classify("requirements.txt/readme.md"), None);
        assert_eq!(classify("src/main.rs"), None);
    }

    #[test]
    fn select_targets_strips_leading_slash() {
        let entries = vec![
            ("/backend/requirements.txt", "a1"),
            ("/README.md", "b2"),
            ("/.gitlab-ci.yml", "c3"),
        ];
        let targets = select_targets(entries);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].path, "backend/requirements.txt");
        assert_eq!(targets[0].name, "requirements.txt");
        assert_eq!(targets[0].content_id, "a1");
        assert_eq!(targets[1].class, FileClass::CiFile);
    }
}
