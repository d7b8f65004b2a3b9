use crate::domain::fixture::Fixture;
use crate::domain::property::OutOfRangePolicy;
use crate::extensions::path_ext::FileName;
use crate::fixture_loader::factory::{FixtureFactoryError, from_yaml};
use futures::stream::FuturesUnordered;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task::JoinError;
use tokio::{fs, task};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, info, instrument, warn};

#[instrument(skip(policy))]
pub async fn load_fixture(path: &Path, policy: OutOfRangePolicy) -> Result<Fixture, LoaderError> {
    info!("📄 Loading fixture...");
    let fixture = load_file(path.to_path_buf(), policy).await?;
    info!("📄 Loading fixture... OK, {} resources", fixture.resource_names().count());
    Ok(fixture)
}

#[instrument(skip(policy))]
pub async fn load_fixtures_from(directory: &str, extension: &str, policy: OutOfRangePolicy) -> Result<Vec<Fixture>, LoaderError> {
    info!("📁 Loading fixtures...");
    let files = fixture_files(directory, extension)
        .await
        .map_err(|e| LoaderError::Io { source: e, path: None })?;

    let mut fixtures = Vec::with_capacity(files.len());
    let mut skipped = 0;
    for result in load_files(files, policy).await {
        match result {
            Ok(fixture) => fixtures.push(fixture),
            Err(error) => {
                skipped += 1;
                report_skipped(&error);
            }
        }
    }

    let resources: usize = fixtures.iter().map(|f| f.resource_names().count()).sum();
    info!(
        "📁 Loading fixtures... OK, {} fixture(s) with {} resource(s), {} skipped",
        fixtures.len(),
        resources,
        skipped
    );
    Ok(fixtures)
}

/// Fixture files directly inside `directory`, sorted by name. Hidden files such as editor backups are ignored.
#[instrument]
async fn fixture_files(directory: &str, extension: &str) -> io::Result<Vec<PathBuf>> {
    let entries = ReadDirStream::new(fs::read_dir(directory).await?);
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!("⚠️ Skipping unreadable entry in '{}': {}", directory, err);
                None
            }
        })
        .filter(|path| is_fixture_file(path, extension))
        .collect()
        .await;

    files.sort();
    debug!("📁 Found {} fixture file(s)", files.len());
    Ok(files)
}

fn is_fixture_file(path: &Path, extension: &str) -> bool {
    let visible = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| !n.starts_with('.'));
    let matches = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(extension));
    visible && matches && path.is_file()
}

#[instrument(skip_all)]
async fn load_files(paths: Vec<PathBuf>, policy: OutOfRangePolicy) -> Vec<Result<Fixture, LoaderError>> {
    FuturesUnordered::from_iter(paths.into_iter().map(|path| load_file(path, policy)))
        .collect()
        .await
}

async fn load_file(path: PathBuf, policy: OutOfRangePolicy) -> Result<Fixture, LoaderError> {
    let content = fs::read_to_string(&path).await.map_err(|source| LoaderError::Io {
        source,
        path: Some(path.clone()),
    })?;
    task::spawn_blocking(move || from_yaml(&content, policy).map_err(|source| LoaderError::FixtureFactory { source, path })).await?
}

fn report_skipped(error: &LoaderError) {
    match error {
        LoaderError::FixtureFactory { source, path } => {
            warn!("⚠️ Skipping fixture '{}', its definition is invalid: {}", path.string_file_name(), source)
        }
        LoaderError::Io { source, path: Some(path) } => warn!("⚠️ Skipping fixture '{}', it cannot be read: {}", path.string_file_name(), source),
        LoaderError::Io { source, path: None } => warn!("⚠️ Skipping fixture: {}", source),
        LoaderError::JoinError(err) => warn!("⚠️ Skipping fixture, parsing did not finish: {}", err),
    }
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("{}", source)]
    FixtureFactory { source: FixtureFactoryError, path: PathBuf },
    #[error("{}", source)]
    Io { source: io::Error, path: Option<PathBuf> },
    #[error(transparent)]
    JoinError(#[from] JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::env::temp_dir;
    use test_log::test;

    fn resource(path: &str) -> PathBuf {
        PathBuf::from(format!("{}/tests/resources/fixtures/{}", env!("CARGO_MANIFEST_DIR"), path))
    }

    #[tokio::test]
    async fn fixture_files_lists_visible_files_with_the_extension_in_order() -> io::Result<()> {
        let dir = temp_dir().join("scpi-sim-fixture-files");
        fs::create_dir_all(&dir).await?;

        let scope = dir.join("scope.yaml");
        let dmm = dir.join("dmm.YAML");
        fs::write(&scope, "spec: '1.1'").await?;
        fs::write(&dmm, "spec: '1.1'").await?;
        fs::write(dir.join("notes.txt"), "text").await?;
        fs::write(dir.join(".scope.yaml"), "spec: '1.1'").await?;
        fs::create_dir_all(dir.join("nested.yaml")).await?;

        let files = fixture_files(dir.to_string_lossy().as_ref(), "yaml").await?;

        assert_eq!(files, vec![dmm, scope]);
        Ok(())
    }

    #[test(tokio::test)]
    async fn load_fixture_returns_a_fixture_for_a_valid_file() -> Result<(), LoaderError> {
        let fixture = load_fixture(&resource("multimeter.yaml"), OutOfRangePolicy::Reject).await?;

        assert!(fixture.device("multimeter").is_some());
        Ok(())
    }

    #[test(tokio::test)]
    async fn load_files_returns_an_error_for_an_invalid_file() {
        let path = resource("invalid/default_out_of_range.yaml");
        assert!(path.is_file(), "expected path to be a file");

        let result = load_files(vec![path], OutOfRangePolicy::Reject).await;

        assert_eq!(result.len(), 1);
        assert!(matches!(
            &result[0],
            Err(LoaderError::FixtureFactory {
                source: FixtureFactoryError::Property { .. },
                path: _
            })
        ));
    }

    #[test(tokio::test)]
    async fn load_fixtures_from_skips_invalid_files() -> Result<(), LoaderError> {
        let fixtures = load_fixtures_from(&resource("invalid").to_string_lossy(), "yaml", OutOfRangePolicy::Reject).await?;

        assert!(fixtures.is_empty());
        Ok(())
    }

    #[test(tokio::test)]
    async fn load_fixtures_from_fails_for_a_missing_directory() {
        let result = load_fixtures_from("/does/not/exist", "yaml", OutOfRangePolicy::Reject).await;

        assert!(matches!(result, Err(LoaderError::Io { path: None, .. })));
    }

    #[test(tokio::test)]
    async fn load_fixture_fails_for_a_missing_file() {
        let result = load_fixture(Path::new("/does/not/exist.yaml"), OutOfRangePolicy::Reject).await;

        assert!(matches!(result, Err(LoaderError::Io { path: Some(_), .. })));
    }
}
