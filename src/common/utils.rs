use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::error::HelperError;

/// Looks `binary` up on `PATH` the way a shell would, without running it.
pub fn find_in_path(binary: impl AsRef<str>) -> Option<PathBuf> {
    let binary = binary.as_ref();
    if binary.contains('/') {
        let path = Path::new(binary);
        return is_executable(path).then(|| path.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

pub fn require_binary(binary: impl AsRef<str>) -> Result<PathBuf, HelperError> {
    let binary = binary.as_ref();
    find_in_path(binary).ok_or_else(|| HelperError::DependencyMissing(binary.to_string()))
}

pub fn check_dependencies(dependencies: &[String]) -> Result<(), HelperError> {
    info!("Checking system dependencies");
    for dependency in dependencies {
        match find_in_path(dependency) {
            Some(path) => {
                debug!(dependency = %dependency, path = %path.display(), "Dependency found")
            }
            None => {
                info!(missing_dependency = %dependency, "Dependency check failed");
                return Err(HelperError::DependencyMissing(dependency.clone()));
            }
        }
    }
    info!("All dependencies satisfied");
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_in_path_finds_shell() {
        assert!(find_in_path("sh").is_some());
    }

    #[test]
    fn test_check_dependencies_reports_first_missing() {
        let deps = vec![
            "sh".to_string(),
            "definitely-not-a-real-binary-4f1c".to_string(),
        ];
        match check_dependencies(&deps) {
            Err(HelperError::DependencyMissing(dep)) => {
                assert_eq!(dep, "definitely-not-a-real-binary-4f1c")
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }
}
