use crate::fixture::{parse_fixtures, FixtureEntry};
use crate::response::Response;
use crate::{Error, ErrorKind};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Only files with this extension are loaded from a fixture directory.
pub const FIXTURE_EXTENSION: &str = "yaml";

///
/// A read-only index of the fixtures found in a directory, one file per host.
///
/// A file named `example.com.yaml` declares the fixtures for the host `example.com`, a file
/// named `localhost:8080.yaml` the ones for `localhost:8080`. Subdirectories are not scanned.
///
/// ## Example
///
/// ```no_run
/// let store = flymock::FixtureStore::new("tests/__mock__").unwrap();
///
/// if let Some(response) = store.find("http://example.com/demo", "get").unwrap() {
///     println!("{} bytes", response.body.len());
/// }
/// ```
///
#[derive(Debug)]
pub struct FixtureStore {
    dir: PathBuf,
    hosts: HashMap<String, Vec<FixtureEntry>>,
}

impl FixtureStore {
    ///
    /// Scans `dir` and parses every fixture file in it. Any malformed file fails the whole load.
    ///
    pub fn new(dir: impl AsRef<Path>) -> Result<FixtureStore, Error> {
        let dir = fs::canonicalize(dir.as_ref()).map_err(|err| {
            Error::new_with_context(
                ErrorKind::FixtureLoad,
                format!("{}: {}", dir.as_ref().display(), err),
            )
        })?;

        let mut hosts = HashMap::new();
        for file in scan(&dir)? {
            let Some(host) = file.file_stem().and_then(OsStr::to_str) else {
                return Err(Error::new_with_context(
                    ErrorKind::FixtureLoad,
                    format!("{}: the file name is not valid UTF-8", file.display()),
                ));
            };

            let source = fs::read_to_string(&file).map_err(|err| {
                Error::new_with_context(
                    ErrorKind::FixtureLoad,
                    format!("{}: {}", file.display(), err),
                )
            })?;

            let entries = parse_fixtures(&source, &dir).map_err(|err| {
                Error::new_with_context(
                    ErrorKind::FixtureLoad,
                    format!("{}: {}", file.display(), err.context.unwrap_or_default()),
                )
            })?;

            log::debug!(
                "loaded {} fixture(s) for {} from {}",
                entries.len(),
                host,
                file.display()
            );

            hosts.insert(host.to_string(), entries);
        }

        Ok(FixtureStore { dir, hosts })
    }

    /// The absolute fixture directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Iterates the known hosts, in no particular order.
    pub fn iter_hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// The fixtures declared for `host`, in declaration order.
    pub fn entries(&self, host: &str) -> Option<&[FixtureEntry]> {
        self.hosts.get(host).map(Vec::as_slice)
    }

    /// The number of hosts with a fixture file.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Returns `true` if the directory held no fixture file.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    ///
    /// Returns the first fixture declared for the host of `url` whose path is exactly the path
    /// of `url` and whose method is `method`, ignoring its letter case.
    ///
    /// The query string is ignored and the path is compared as is: no trailing-slash or
    /// percent-decoding normalization happens.
    ///
    pub fn lookup(&self, url: &str, method: &str) -> Option<&FixtureEntry> {
        let (netloc, path) = split_url(url)?;
        let entries = self.hosts.get(netloc)?;

        let method = method.to_uppercase();
        entries.iter().find(|entry| entry.matches(path, &method))
    }

    ///
    /// Builds the mocked response for `url` and `method`. Returns `Ok(None)` when no fixture
    /// matches, including when `url` has no `scheme://netloc` prefix.
    ///
    pub fn find(&self, url: &str, method: &str) -> Result<Option<Response>, Error> {
        match self.lookup(url, method) {
            Some(entry) => Response::build(entry, url).map(Some),
            None => Ok(None),
        }
    }
}

///
/// Splits `url` into its netloc and path without validating or normalizing either. The netloc
/// runs from `//` to the first `/`, `?` or `#`, the path from there to the first `?` or `#`.
/// A URL without a `scheme://` prefix has no netloc.
///
fn split_url(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return None;
    }

    let rest = rest.strip_prefix("//")?;
    let netloc_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (netloc, rest) = rest.split_at(netloc_end);
    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());

    Some((netloc, &rest[..path_end]))
}

fn scan(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let read_dir = fs::read_dir(dir).map_err(|err| {
        Error::new_with_context(ErrorKind::FixtureLoad, format!("{}: {}", dir.display(), err))
    })?;

    let mut files = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry
            .map_err(|err| {
                Error::new_with_context(ErrorKind::FixtureLoad, format!("{}: {}", dir.display(), err))
            })?
            .path();

        let hidden = path
            .file_name()
            .and_then(OsStr::to_str)
            .map_or(false, |name| name.starts_with('.'));

        if !hidden && path.extension() == Some(OsStr::new(FIXTURE_EXTENSION)) && path.is_file() {
            files.push(path);
        }
    }

    Ok(files)
}
