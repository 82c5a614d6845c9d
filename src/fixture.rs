use crate::{Error, ErrorKind};
use http::{Method, StatusCode};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};

///
/// How the `body` of a fixture record should be interpreted.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    /// The body is taken verbatim as text. Mappings and sequences are still serialized as JSON.
    String,
    /// The body is a path, relative to the fixture file, of a file holding the raw payload.
    File,
    /// The body is always serialized as JSON, scalars included.
    Json,
}

///
/// The resolved body of a fixture, ready to be materialized by the response builder.
///
#[derive(Clone, Debug, PartialEq)]
pub enum FixtureBody {
    /// Literal text payload.
    Text(String),
    /// Path to a payload file, as declared. Resolved against the fixture's `cwd` on every build.
    File(PathBuf),
    /// A structured value serialized as JSON on every build.
    Structured(Value),
}

///
/// One declared mock: a `(path, method)` pair and the response it stands for.
///
/// Entries are immutable once loaded.
///
#[derive(Clone, Debug, PartialEq)]
pub struct FixtureEntry {
    pub(crate) path: String,
    pub(crate) method: String,
    pub(crate) code: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: FixtureBody,
    pub(crate) cwd: PathBuf,
}

impl FixtureEntry {
    /// The exact request path this entry answers.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The uppercase HTTP method this entry answers.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The response status code.
    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// The declared response headers, as written in the fixture file.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The declared body.
    pub fn body(&self) -> &FixtureBody {
        &self.body
    }

    /// The absolute directory of the fixture file this entry was loaded from.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub(crate) fn matches(&self, path: &str, method: &str) -> bool {
        self.path == path && self.method == method
    }
}

impl fmt::Display for FixtureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.path, self.code.as_u16())
    }
}

#[derive(Deserialize)]
struct FixtureRecord {
    path: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_code")]
    code: u16,
    #[serde(default)]
    headers: Mapping,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    body_type: Option<BodyType>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_code() -> u16 {
    200
}

///
/// Parses the contents of one fixture file. `cwd` must be the absolute directory of that file.
///
pub(crate) fn parse_fixtures(source: &str, cwd: &Path) -> Result<Vec<FixtureEntry>, Error> {
    let records: Option<Vec<FixtureRecord>> = serde_yaml::from_str(source)
        .map_err(|err| Error::new_with_context(ErrorKind::FixtureLoad, err))?;

    records
        .unwrap_or_default()
        .into_iter()
        .map(|record| FixtureEntry::from_record(record, cwd))
        .collect()
}

impl FixtureEntry {
    fn from_record(record: FixtureRecord, cwd: &Path) -> Result<FixtureEntry, Error> {
        if record.path.is_empty() {
            return Err(Error::new_with_context(
                ErrorKind::FixtureLoad,
                "`path` must not be empty",
            ));
        }

        let method = record.method.to_uppercase();
        if method.is_empty() || Method::from_bytes(method.as_bytes()).is_err() {
            return Err(Error::new_with_context(
                ErrorKind::FixtureLoad,
                format!("invalid method `{}` for {}", record.method, record.path),
            ));
        }

        let code = StatusCode::from_u16(record.code).map_err(|_| {
            let cause = Error::new_with_context(ErrorKind::InvalidStatusCode, record.code);
            Error::new_with_context(ErrorKind::FixtureLoad, cause)
        })?;

        let headers = record
            .headers
            .into_iter()
            .map(|(field, value)| header_pair(field, value))
            .collect::<Result<Vec<_>, Error>>()?;

        let body = resolve_body(record.body, record.body_type, &record.path)?;

        Ok(FixtureEntry {
            path: record.path,
            method,
            code,
            headers,
            body,
            cwd: cwd.to_path_buf(),
        })
    }
}

fn resolve_body(body: Value, body_type: Option<BodyType>, path: &str) -> Result<FixtureBody, Error> {
    if body.is_null() {
        return Err(Error::new_with_context(
            ErrorKind::FixtureLoad,
            format!("missing field `body` for {}", path),
        ));
    }

    match (body_type, body) {
        (Some(BodyType::File), Value::String(file)) => Ok(FixtureBody::File(PathBuf::from(file))),
        (Some(BodyType::File), _) => Err(Error::new_with_context(
            ErrorKind::FixtureLoad,
            format!("`body` of a file fixture must be a path for {}", path),
        )),
        (Some(BodyType::Json), value) => Ok(FixtureBody::Structured(value)),
        (_, Value::String(text)) => Ok(FixtureBody::Text(text)),
        (_, Value::Number(number)) => Ok(FixtureBody::Text(number.to_string())),
        (_, Value::Bool(flag)) => Ok(FixtureBody::Text(flag.to_string())),
        (_, value) => Ok(FixtureBody::Structured(value)),
    }
}

fn header_pair(field: Value, value: Value) -> Result<(String, String), Error> {
    let field = match field {
        Value::String(field) => field,
        other => {
            return Err(Error::new_with_context(
                ErrorKind::FixtureLoad,
                format!("header name must be a string, got {:?}", other),
            ))
        }
    };

    let value = match value {
        Value::String(value) => value,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => {
            return Err(Error::new_with_context(
                ErrorKind::FixtureLoad,
                format!("header `{}` must be a scalar, got {:?}", field, other),
            ))
        }
    };

    Ok((field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Vec<FixtureEntry>, Error> {
        parse_fixtures(source, Path::new("/fixtures"))
    }

    #[test]
    fn test_defaults() {
        let entries = parse("- path: /demo\n  body: hello\n").unwrap();

        assert_eq!(1, entries.len());
        let entry = &entries[0];
        assert_eq!("/demo", entry.path());
        assert_eq!("GET", entry.method());
        assert_eq!(StatusCode::OK, entry.code());
        assert!(entry.headers().is_empty());
        assert_eq!(&FixtureBody::Text("hello".into()), entry.body());
        assert_eq!(Path::new("/fixtures"), entry.cwd());
    }

    #[test]
    fn test_method_is_uppercased() {
        let entries = parse("- path: /users\n  method: post\n  body: ok\n").unwrap();
        assert_eq!("POST", entries[0].method());
    }

    #[test]
    fn test_structured_body_is_inferred() {
        let entries = parse("- path: /json\n  body: {code: 2}\n- path: /list\n  body: [1, 2]\n")
            .unwrap();

        assert!(matches!(entries[0].body(), FixtureBody::Structured(Value::Mapping(_))));
        assert!(matches!(entries[1].body(), FixtureBody::Structured(Value::Sequence(_))));
    }

    #[test]
    fn test_file_body() {
        let entries = parse("- path: /file\n  body: file.json\n  body_type: file\n").unwrap();
        assert_eq!(
            &FixtureBody::File(PathBuf::from("file.json")),
            entries[0].body()
        );
    }

    #[test]
    fn test_explicit_json_body_type_wraps_scalars() {
        let entries = parse("- path: /n\n  body: 42\n  body_type: json\n").unwrap();
        assert!(matches!(entries[0].body(), FixtureBody::Structured(Value::Number(_))));
    }

    #[test]
    fn test_scalar_body_becomes_text() {
        let entries = parse("- path: /n\n  body: 42\n").unwrap();
        assert_eq!(&FixtureBody::Text("42".into()), entries[0].body());
    }

    #[test]
    fn test_header_values_are_text() {
        let entries =
            parse("- path: /h\n  body: ''\n  headers:\n    x-count: 3\n    content-type: text/plain\n")
                .unwrap();

        assert_eq!(
            &[
                ("x-count".to_string(), "3".to_string()),
                ("content-type".to_string(), "text/plain".to_string()),
            ],
            entries[0].headers()
        );
    }

    #[test]
    fn test_missing_path_fails() {
        let err = parse("- body: hello\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
    }

    #[test]
    fn test_missing_body_fails() {
        let err = parse("- path: /demo\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
    }

    #[test]
    fn test_invalid_status_code_fails() {
        let err = parse("- path: /demo\n  body: x\n  code: 42\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
        assert!(err.to_string().contains("invalid status code"));
    }

    #[test]
    fn test_unknown_body_type_fails() {
        let err = parse("- path: /demo\n  body: x\n  body_type: xml\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
    }

    #[test]
    fn test_file_body_must_be_a_path() {
        let err = parse("- path: /demo\n  body: {a: 1}\n  body_type: file\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
    }

    #[test]
    fn test_not_a_sequence_fails() {
        let err = parse("path: /demo\nbody: x\n").unwrap_err();
        assert_eq!(ErrorKind::FixtureLoad, err.kind);
    }
}
