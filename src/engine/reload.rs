use crate::error::StepError;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::SystemTime;

/// Bump the modification time of the app entry file so a file-watching
/// reloader restarts the app. The file's contents are untouched.
pub(crate) fn touch(path: &Path) -> Result<(), StepError> {
    let failed = |source| StepError::Reload {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new().append(true).open(path).map_err(failed)?;
    file.set_modified(SystemTime::now()).map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn touch_advances_mtime_without_changing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app.py");
        std::fs::write(&app, "print('hi')\n").unwrap();
        let old = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .append(true)
            .open(&app)
            .unwrap()
            .set_modified(old)
            .unwrap();

        touch(&app).unwrap();

        let mtime = std::fs::metadata(&app).unwrap().modified().unwrap();
        assert!(mtime > old + Duration::from_secs(3000));
        assert_eq!(std::fs::read_to_string(&app).unwrap(), "print('hi')\n");
    }

    #[test]
    fn missing_file_is_a_reload_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = touch(&dir.path().join("nope.py")).unwrap_err();
        assert!(matches!(err, StepError::Reload { .. }), "{err:?}");
        assert!(err.to_string().starts_with("reload trigger failed for "));
    }
}
